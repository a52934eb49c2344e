//! Push wire protocol
//!
//! Text frames carrying JSON objects. The `type` field drives dispatch.
//!
//! Client → server: `subscribe`, `unsubscribe`, `ping`.
//! Server → client: `pong`, `subscribed`, `unsubscribed`, `error`, and push
//! frames `kline` / `depth` / `ticker` / `trade` / `stats_24h`.
//!
//! Fields that are absent are omitted from encoded frames, never `null`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use types::candle::Candle;
use types::errors::ProtocolError;
use types::ids::Symbol;
use types::interval::KlineInterval;
use types::market::{DepthSnapshot, Ticker};
use types::trade::PublicTrade;

use crate::topic::{Channel, Topic};

/// Every message type that appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Subscribe,
    Unsubscribe,
    Ping,
    Pong,
    Kline,
    Depth,
    Ticker,
    Trade,
    #[serde(rename = "stats_24h")]
    Stats24h,
    Subscribed,
    Unsubscribed,
    Error,
}

impl MessageType {
    pub const ALL: [MessageType; 12] = [
        MessageType::Subscribe,
        MessageType::Unsubscribe,
        MessageType::Ping,
        MessageType::Pong,
        MessageType::Kline,
        MessageType::Depth,
        MessageType::Ticker,
        MessageType::Trade,
        MessageType::Stats24h,
        MessageType::Subscribed,
        MessageType::Unsubscribed,
        MessageType::Error,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            MessageType::Subscribe => "subscribe",
            MessageType::Unsubscribe => "unsubscribe",
            MessageType::Ping => "ping",
            MessageType::Pong => "pong",
            MessageType::Kline => "kline",
            MessageType::Depth => "depth",
            MessageType::Ticker => "ticker",
            MessageType::Trade => "trade",
            MessageType::Stats24h => "stats_24h",
            MessageType::Subscribed => "subscribed",
            MessageType::Unsubscribed => "unsubscribed",
            MessageType::Error => "error",
        }
    }

    /// Case-insensitive lookup.
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.code().eq_ignore_ascii_case(code))
    }

    /// Whether clients may send this type.
    pub fn is_client_message(&self) -> bool {
        matches!(
            self,
            MessageType::Subscribe | MessageType::Unsubscribe | MessageType::Ping
        )
    }
}

/// Inbound frame before validation. Every field is optional so that a
/// structurally valid object with missing fields is reported as a
/// parameter error rather than a decode error.
#[derive(Debug, Default, Deserialize)]
struct RawClientMessage {
    #[serde(rename = "type")]
    message_type: Option<String>,
    channel: Option<String>,
    symbol: Option<String>,
    interval: Option<String>,
}

/// A validated client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientRequest {
    Subscribe(Topic),
    Unsubscribe(Topic),
    Ping,
}

/// Decode and validate one inbound text frame.
pub fn parse_client_message(text: &str) -> Result<ClientRequest, ProtocolError> {
    let raw: RawClientMessage =
        serde_json::from_str(text).map_err(|_| ProtocolError::InvalidMessage)?;

    let Some(type_code) = raw.message_type.as_deref() else {
        return Err(ProtocolError::InvalidMessage);
    };

    match MessageType::from_code(type_code) {
        Some(MessageType::Ping) => Ok(ClientRequest::Ping),
        Some(MessageType::Subscribe) => Ok(ClientRequest::Subscribe(parse_topic(&raw)?)),
        Some(MessageType::Unsubscribe) => Ok(ClientRequest::Unsubscribe(parse_topic(&raw)?)),
        _ => Err(ProtocolError::UnsupportedMessageType {
            message_type: type_code.to_string(),
        }),
    }
}

fn parse_topic(raw: &RawClientMessage) -> Result<Topic, ProtocolError> {
    let channel = non_empty(&raw.channel);
    let symbol = non_empty(&raw.symbol);
    let (Some(channel), Some(symbol)) = (channel, symbol) else {
        return Err(ProtocolError::missing_params());
    };

    let channel = Channel::from_code(channel).ok_or_else(|| ProtocolError::InvalidParams {
        message: format!("Unsupported channel: {channel}"),
    })?;
    let symbol = Symbol::from_pair(symbol).ok_or_else(|| ProtocolError::InvalidParams {
        message: format!("Invalid symbol: {symbol}"),
    })?;
    let interval = non_empty(&raw.interval).map(str::to_string);

    if channel == Channel::Kline {
        match interval.as_deref() {
            None => {
                return Err(ProtocolError::InvalidParams {
                    message: "Missing required parameter for kline: interval".to_string(),
                })
            }
            Some(code) if KlineInterval::from_code(code).is_none() => {
                return Err(ProtocolError::InvalidParams {
                    message: format!("Unsupported interval: {code}"),
                })
            }
            Some(_) => {}
        }
    }

    Ok(Topic::new(channel, symbol, interval))
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Payload of a push frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PushPayload {
    Kline(Candle),
    Depth(DepthSnapshot),
    Ticker(Ticker),
    Trade(PublicTrade),
    Stats24h(Ticker),
}

impl PushPayload {
    pub fn message_type(&self) -> MessageType {
        match self {
            PushPayload::Kline(_) => MessageType::Kline,
            PushPayload::Depth(_) => MessageType::Depth,
            PushPayload::Ticker(_) => MessageType::Ticker,
            PushPayload::Trade(_) => MessageType::Trade,
            PushPayload::Stats24h(_) => MessageType::Stats24h,
        }
    }

    pub fn symbol(&self) -> &Symbol {
        match self {
            PushPayload::Kline(c) => &c.symbol,
            PushPayload::Depth(d) => &d.symbol,
            PushPayload::Ticker(t) | PushPayload::Stats24h(t) => &t.symbol,
            PushPayload::Trade(t) => &t.symbol,
        }
    }
}

/// Outbound frame.
#[derive(Debug, Clone, Serialize)]
pub struct ServerMessage<'a> {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<Channel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<&'a PushPayload>,
    /// Send time, epoch milliseconds.
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<'a> ServerMessage<'a> {
    fn bare(message_type: MessageType) -> Self {
        Self {
            message_type,
            channel: None,
            symbol: None,
            interval: None,
            data: None,
            timestamp: Utc::now().timestamp_millis(),
            code: None,
            message: None,
        }
    }

    fn echo(message_type: MessageType, topic: &'a Topic) -> Self {
        Self {
            channel: Some(topic.channel),
            symbol: Some(topic.symbol.as_str()),
            interval: topic.interval(),
            ..Self::bare(message_type)
        }
    }

    pub fn pong() -> Self {
        Self::bare(MessageType::Pong)
    }

    pub fn subscribed(topic: &'a Topic) -> Self {
        Self::echo(MessageType::Subscribed, topic)
    }

    pub fn unsubscribed(topic: &'a Topic) -> Self {
        Self::echo(MessageType::Unsubscribed, topic)
    }

    pub fn error(err: &ProtocolError) -> Self {
        Self {
            code: Some(err.code()),
            message: Some(err.to_string()),
            ..Self::bare(MessageType::Error)
        }
    }

    pub fn push(payload: &'a PushPayload) -> Self {
        Self {
            symbol: Some(payload.symbol().as_str()),
            data: Some(payload),
            ..Self::bare(payload.message_type())
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
