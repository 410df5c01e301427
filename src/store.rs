//! In-memory view of the remote market: latest snapshot per symbol plus a
//! bounded, newest-first trade log.
//!
//! Only the stream dispatcher writes (the mutators are crate-private); any
//! number of observers read through the query methods or follow changes via
//! [`StateStore::subscribe`].

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::model::{MarketSnapshot, TradeExecution};

pub const DEFAULT_TRADE_LOG_CAPACITY: usize = 100;

const EVENT_BUFFER: usize = 1024;

/// Change notification emitted after every mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Snapshot { symbol: String },
    Trade { trade_id: String, symbol: String },
}

#[derive(Default)]
struct Inner {
    snapshots: HashMap<String, Arc<MarketSnapshot>>,
    trades: VecDeque<TradeExecution>, // front = newest
}

pub struct StateStore {
    inner: RwLock<Inner>,
    capacity: usize,
    events: broadcast::Sender<StoreEvent>,
}

impl StateStore {
    pub fn new(trade_log_capacity: usize) -> Self {
        let capacity = trade_log_capacity.max(1);
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            inner: RwLock::new(Inner { snapshots: HashMap::new(), trades: VecDeque::with_capacity(capacity) }),
            capacity,
            events,
        }
    }

    pub fn trade_log_capacity(&self) -> usize {
        self.capacity
    }

    /// Replace the stored snapshot for `snapshot.symbol` wholesale.
    pub(crate) fn apply_snapshot(&self, snapshot: MarketSnapshot) {
        let symbol = snapshot.symbol.clone();
        trace!(%symbol, bids = snapshot.bids.len(), asks = snapshot.asks.len(), "Applying snapshot");
        self.inner.write().snapshots.insert(symbol.clone(), Arc::new(snapshot));
        self.notify(StoreEvent::Snapshot { symbol });
    }

    /// Prepend to the trade log, evicting the oldest entry once full.
    pub(crate) fn append_trade(&self, trade: TradeExecution) {
        let event = StoreEvent::Trade { trade_id: trade.trade_id.clone(), symbol: trade.symbol.clone() };
        {
            let mut inner = self.inner.write();
            inner.trades.push_front(trade);
            if inner.trades.len() > self.capacity {
                if let Some(evicted) = inner.trades.pop_back() {
                    trace!(trade_id = %evicted.trade_id, "Evicted oldest trade");
                }
            }
        }
        self.notify(event);
    }

    pub fn snapshot(&self, symbol: &str) -> Option<Arc<MarketSnapshot>> {
        self.inner.read().snapshots.get(symbol).cloned()
    }

    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.inner.read().snapshots.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    /// Newest-first trades, optionally restricted to one symbol. `limit` is
    /// applied after filtering.
    pub fn trades(&self, symbol: Option<&str>, limit: Option<usize>) -> Vec<TradeExecution> {
        let inner = self.inner.read();
        inner
            .trades
            .iter()
            .filter(|t| symbol.map_or(true, |s| t.symbol == s))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    pub fn trade_count(&self) -> usize {
        self.inner.read().trades.len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn notify(&self, event: StoreEvent) {
        // No subscribers is fine.
        if self.events.send(event).is_err() {
            debug!("No store subscribers");
        }
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(DEFAULT_TRADE_LOG_CAPACITY)
    }
}
