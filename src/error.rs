use thiserror::Error;

use crate::model::OrderType;
use crate::stream::ChannelKind;

/// Inbound frame that could not be routed to the store.
/// Always contained inside the streaming path: logged, counted, dropped.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("malformed frame on {channel}: {source}")]
    Malformed {
        channel: ChannelKind,
        #[source]
        source: serde_json::Error,
    },
    #[error("frame on {channel} has no `type` field")]
    MissingType { channel: ChannelKind },
    #[error("`{kind}` frame on {channel} has no `data` payload")]
    MissingData { channel: ChannelKind, kind: String },
    #[error("invalid `{kind}` payload on {channel}: {source}")]
    InvalidPayload {
        channel: ChannelKind,
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Order request rejected before it ever reaches the network.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("symbol must not be empty")]
    EmptySymbol,
    #[error("quantity must be positive, got {0}")]
    NonPositiveQuantity(f64),
    #[error("{0} orders require a price")]
    MissingPrice(OrderType),
    #[error("price must be positive, got {0}")]
    NonPositivePrice(f64),
}

/// Failure of a single order submission.
#[derive(Error, Debug)]
pub enum OrderError {
    #[error("invalid order: {0}")]
    Validation(#[from] ValidationError),
    /// Endpoint unreachable, timed out, or answered with a non-2xx status.
    /// The outcome on the remote side is unknown unless `status` is set.
    #[error("transport error{}: {reason}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Transport { status: Option<u16>, reason: String },
    /// The server answered 2xx but the body is not an order result.
    #[error("could not decode order result: {0}")]
    Decode(String),
}

impl OrderError {
    pub fn is_validation(&self) -> bool {
        matches!(self, OrderError::Validation(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            OrderError::Transport { status, .. } => *status,
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors from the `MarketLink` handle itself.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    #[error("client has been shut down")]
    ShutDown,
}
