//! Error types for the market data service
//!
//! Failures are contained at the smallest unit that can fail: one interval
//! of one trade, one inbound message, one outbound frame. Nothing here is
//! meant to be fatal to the process.

use thiserror::Error;

/// Unknown kline interval code
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IntervalError {
    #[error("Unknown interval code: {code}")]
    UnknownCode { code: String },
}

/// Candle storage tier failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Cache error: {message}")]
    Cache { message: String },

    #[error("Durable store error: {message}")]
    Durable { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

/// Failure aggregating one trade into one interval
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AggregationError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid trade: {reason}")]
    InvalidTrade { reason: String },
}

/// Client-facing protocol errors. Each maps to a wire error code.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Invalid message format")]
    InvalidMessage,

    #[error("{message}")]
    InvalidParams { message: String },

    #[error("Unsupported message type: {message_type}")]
    UnsupportedMessageType { message_type: String },

    #[error("Subscription limit reached: {limit}")]
    TooManySubscriptions { limit: usize },
}

impl ProtocolError {
    /// The `code` field of the error frame.
    pub fn code(&self) -> &'static str {
        match self {
            ProtocolError::InvalidMessage => "INVALID_MESSAGE",
            ProtocolError::InvalidParams { .. } => "INVALID_PARAMS",
            ProtocolError::UnsupportedMessageType { .. } => "UNSUPPORTED_MESSAGE_TYPE",
            ProtocolError::TooManySubscriptions { .. } => "TOO_MANY_SUBSCRIPTIONS",
        }
    }

    pub fn missing_params() -> Self {
        ProtocolError::InvalidParams {
            message: "Missing required parameters: channel and symbol".to_string(),
        }
    }
}

/// Subscription registry errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Connection not registered: {connection}")]
    UnknownConnection { connection: String },

    #[error("Subscription limit reached: {limit}")]
    SubscriptionLimit { limit: usize },
}

impl From<RegistryError> for ProtocolError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::SubscriptionLimit { limit } => ProtocolError::TooManySubscriptions { limit },
            RegistryError::UnknownConnection { .. } => ProtocolError::InvalidParams {
                message: err.to_string(),
            },
        }
    }
}

/// Outbound frame could not be queued for a connection
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EnqueueError {
    #[error("Connection closed")]
    Closed,

    #[error("Outbound queue full (capacity {capacity})")]
    Full { capacity: usize },
}
