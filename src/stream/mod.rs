// Streaming side of the client: two WebSocket channels feeding the store
pub mod client;       // MarketLink handle: construct, reset, shutdown
pub mod dispatcher;   // raw frame -> typed envelope -> store mutation
pub mod heartbeat;    // shared keep-alive timer
pub mod reconnect;    // per-channel linear backoff state machine
pub mod status;       // aggregate connectivity pushed to observers
pub mod supervisor;   // the single event loop owning both channels
pub mod transport;    // one WebSocket connection per channel

use std::fmt;

use serde::{Deserialize, Serialize};

pub use client::MarketLink;
pub use status::{ChannelStatus, ConnectionStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelKind {
    MarketData,
    Trades,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 2] = [ChannelKind::MarketData, ChannelKind::Trades];

    /// Path of the stream endpoint below the WebSocket base.
    pub fn path(self) -> &'static str {
        match self {
            ChannelKind::MarketData => "/ws/market-data",
            ChannelKind::Trades => "/ws/trades",
        }
    }

    /// Envelope `type` this channel carries.
    pub fn envelope_type(self) -> &'static str {
        match self {
            ChannelKind::MarketData => "market_data",
            ChannelKind::Trades => "trade",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChannelKind::MarketData => "market-data",
            ChannelKind::Trades => "trades",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelState {
    Connecting,
    Open,
    Closed,
}
