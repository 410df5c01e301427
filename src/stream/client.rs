use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

use super::status::{ConnectionStatus, StatusAggregator};
use super::supervisor::{Command, Supervisor};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::store::StateStore;

/// Handle to the streaming side: both channels, the store they feed and the
/// connection status. Construct once and pass it (or the store / status
/// receiver it hands out) to consumers.
///
/// Dropping every handle tears the connections down just like
/// [`MarketLink::shutdown`].
pub struct MarketLink {
    store: Arc<StateStore>,
    status: watch::Receiver<ConnectionStatus>,
    commands: mpsc::Sender<Command>,
}

impl MarketLink {
    /// Spawn the supervisor and start connecting both channels.
    /// Must be called from within a Tokio runtime.
    pub fn start(config: &ClientConfig) -> Self {
        let store = Arc::new(StateStore::new(config.trade_log_capacity));
        let aggregator = StatusAggregator::new(config.reconnect_max_attempts);
        let status = aggregator.subscribe();
        let (commands, commands_rx) = mpsc::channel(8);

        let supervisor = Supervisor::new(config, store.clone(), aggregator, commands_rx);
        tokio::spawn(supervisor.run());

        Self { store, status, commands }
    }

    pub fn store(&self) -> Arc<StateStore> {
        self.store.clone()
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.status.borrow().connected
    }

    /// Receiver notified on every channel transition.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    /// Clear reconnect counters (leaving any exhausted state) and reconnect
    /// channels that are down.
    pub async fn reset(&self) -> Result<(), ClientError> {
        self.commands.send(Command::Reset).await.map_err(|_| ClientError::ShutDown)
    }

    /// Cancel the heartbeat and pending reconnects, close both channels and
    /// wait for the supervisor to finish. Safe to call more than once.
    pub async fn shutdown(&self) {
        let (ack, done) = oneshot::channel();
        if self.commands.send(Command::Shutdown(ack)).await.is_err() {
            debug!("Shutdown requested after supervisor exit");
            return;
        }
        let _ = done.await;
    }
}
