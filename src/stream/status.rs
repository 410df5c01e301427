use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::info;

use super::{ChannelKind, ChannelState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelStatus {
    pub state: ChannelState,
    pub reconnect_attempts: u32,
    /// Gave up reconnecting; needs `MarketLink::reset`.
    pub exhausted: bool,
}

impl ChannelStatus {
    pub fn is_open(&self) -> bool {
        self.state == ChannelState::Open
    }
}

impl Default for ChannelStatus {
    fn default() -> Self {
        Self { state: ChannelState::Closed, reconnect_attempts: 0, exhausted: false }
    }
}

/// What observers see: both channels plus the derived overall flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub market_data: ChannelStatus,
    pub trades: ChannelStatus,
    pub connected: bool,
}

impl ConnectionStatus {
    /// Pure derivation; the two channels never influence each other here.
    pub fn derive(market_data: ChannelStatus, trades: ChannelStatus, max_attempts: u32) -> Self {
        let cap = |mut s: ChannelStatus| {
            s.reconnect_attempts = s.reconnect_attempts.min(max_attempts);
            s
        };
        let (market_data, trades) = (cap(market_data), cap(trades));
        Self { market_data, trades, connected: market_data.is_open() && trades.is_open() }
    }

    pub fn channel(&self, kind: ChannelKind) -> &ChannelStatus {
        match kind {
            ChannelKind::MarketData => &self.market_data,
            ChannelKind::Trades => &self.trades,
        }
    }

    pub fn any_exhausted(&self) -> bool {
        self.market_data.exhausted || self.trades.exhausted
    }
}

/// Recomputes the aggregate on each transition and pushes it to watchers.
pub struct StatusAggregator {
    tx: watch::Sender<ConnectionStatus>,
    max_attempts: u32,
}

impl StatusAggregator {
    pub fn new(max_attempts: u32) -> Self {
        let (tx, _) = watch::channel(ConnectionStatus::default());
        Self { tx, max_attempts }
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.tx.subscribe()
    }

    #[cfg(test)]
    fn current(&self) -> ConnectionStatus {
        *self.tx.borrow()
    }

    /// Returns true when observers were notified.
    pub fn publish(&self, market_data: ChannelStatus, trades: ChannelStatus) -> bool {
        let next = ConnectionStatus::derive(market_data, trades, self.max_attempts);
        let mut flipped = None;
        let changed = self.tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            if current.connected != next.connected {
                flipped = Some(next.connected);
            }
            *current = next;
            true
        });
        if let Some(connected) = flipped {
            info!(connected, "Overall connection status changed");
            metrics::gauge!("marketlink_connected").set(if connected { 1.0 } else { 0.0 });
        }
        changed
    }
}
