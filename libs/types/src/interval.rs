//! Kline interval table
//!
//! The nine supported candle granularities, their wire codes, nominal
//! durations and bucket alignment rules. Times are Unix epoch seconds, UTC.
//!
//! Sub-day intervals align by floor division. Day, week and month align on
//! the UTC calendar. The month's nominal 2 592 000 seconds is only used for
//! cache TTL arithmetic; its close time is always the first day of the
//! following month.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::IntervalError;

pub const SECONDS_PER_DAY: i64 = 86_400;

/// Supported kline intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KlineInterval {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
    #[serde(rename = "1w")]
    W1,
    /// Calendar month
    #[serde(rename = "1M")]
    Mo1,
}

/// How an interval's open time is derived from an instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignmentRule {
    /// Floor to a multiple of the nominal duration since the epoch.
    FixedMultiple,
    /// Start of the UTC calendar day.
    UtcDay,
    /// Monday 00:00:00 UTC of the ISO week.
    IsoWeekMonday,
    /// First day of the UTC calendar month.
    CalendarMonth,
}

/// The `[open_time, close_time)` window an instant falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bucket {
    pub open_time: i64,
    pub close_time: i64,
}

impl Bucket {
    pub fn contains(&self, epoch_seconds: i64) -> bool {
        self.open_time <= epoch_seconds && epoch_seconds < self.close_time
    }
}

impl KlineInterval {
    pub const ALL: [KlineInterval; 9] = [
        KlineInterval::M1,
        KlineInterval::M5,
        KlineInterval::M15,
        KlineInterval::M30,
        KlineInterval::H1,
        KlineInterval::H4,
        KlineInterval::D1,
        KlineInterval::W1,
        KlineInterval::Mo1,
    ];

    /// All nine intervals, shortest first.
    pub fn all() -> &'static [KlineInterval] {
        &Self::ALL
    }

    /// Wire code, e.g. "1m", "1h", "1M".
    pub fn code(&self) -> &'static str {
        match self {
            KlineInterval::M1 => "1m",
            KlineInterval::M5 => "5m",
            KlineInterval::M15 => "15m",
            KlineInterval::M30 => "30m",
            KlineInterval::H1 => "1h",
            KlineInterval::H4 => "4h",
            KlineInterval::D1 => "1d",
            KlineInterval::W1 => "1w",
            KlineInterval::Mo1 => "1M",
        }
    }

    /// Look up an interval by wire code. Codes are case-sensitive:
    /// "1m" is one minute, "1M" is one month.
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|i| i.code() == code)
    }

    /// Nominal duration in seconds. For the month this is a fixed 30 days.
    pub fn nominal_seconds(&self) -> i64 {
        match self {
            KlineInterval::M1 => 60,
            KlineInterval::M5 => 300,
            KlineInterval::M15 => 900,
            KlineInterval::M30 => 1_800,
            KlineInterval::H1 => 3_600,
            KlineInterval::H4 => 14_400,
            KlineInterval::D1 => SECONDS_PER_DAY,
            KlineInterval::W1 => 7 * SECONDS_PER_DAY,
            KlineInterval::Mo1 => 30 * SECONDS_PER_DAY,
        }
    }

    pub fn alignment_rule(&self) -> AlignmentRule {
        match self {
            KlineInterval::D1 => AlignmentRule::UtcDay,
            KlineInterval::W1 => AlignmentRule::IsoWeekMonday,
            KlineInterval::Mo1 => AlignmentRule::CalendarMonth,
            _ => AlignmentRule::FixedMultiple,
        }
    }

    /// Compute the bucket containing `time`.
    pub fn bucket(&self, time: DateTime<Utc>) -> Bucket {
        let secs = time.timestamp();
        match self.alignment_rule() {
            AlignmentRule::FixedMultiple => {
                let duration = self.nominal_seconds();
                let open_time = secs.div_euclid(duration) * duration;
                Bucket {
                    open_time,
                    close_time: open_time + duration,
                }
            }
            AlignmentRule::UtcDay => {
                let open_time = day_start(secs);
                Bucket {
                    open_time,
                    close_time: open_time + SECONDS_PER_DAY,
                }
            }
            AlignmentRule::IsoWeekMonday => {
                let back = time.weekday().num_days_from_monday() as i64;
                let open_time = day_start(secs) - back * SECONDS_PER_DAY;
                Bucket {
                    open_time,
                    close_time: open_time + 7 * SECONDS_PER_DAY,
                }
            }
            AlignmentRule::CalendarMonth => {
                let open_time = day_start(secs) - time.day0() as i64 * SECONDS_PER_DAY;
                let days = days_in_month(time.year(), time.month());
                Bucket {
                    open_time,
                    close_time: open_time + days * SECONDS_PER_DAY,
                }
            }
        }
    }

    /// Open time (epoch seconds) of the bucket containing `time`.
    pub fn align(&self, time: DateTime<Utc>) -> i64 {
        self.bucket(time).open_time
    }
}

impl fmt::Display for KlineInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for KlineInterval {
    type Err = IntervalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_code(s).ok_or_else(|| IntervalError::UnknownCode {
            code: s.to_string(),
        })
    }
}

fn day_start(epoch_seconds: i64) -> i64 {
    epoch_seconds.div_euclid(SECONDS_PER_DAY) * SECONDS_PER_DAY
}

fn days_in_month(year: i32, month: u32) -> i64 {
    match month {
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 31,
    }
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}
