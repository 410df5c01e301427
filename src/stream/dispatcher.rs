// Inbound frame routing: JSON envelope -> typed payload -> store mutator.
// Errors are returned to the caller (the supervisor) which logs and drops
// them; nothing here can close a channel.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, trace};

use super::ChannelKind;
use crate::error::FrameError;
use crate::model::{MarketSnapshot, TradeExecution};
use crate::store::StateStore;

/// Outcome of a successfully parsed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    Snapshot { symbol: String },
    Trade { trade_id: String },
    /// Well-formed but not for us (`pong`, wrong channel, future types).
    Ignored { kind: String },
}

pub struct Dispatcher {
    store: Arc<StateStore>,
}

impl Dispatcher {
    pub fn new(store: Arc<StateStore>) -> Self {
        Self { store }
    }

    pub fn dispatch(&self, channel: ChannelKind, raw: &str) -> Result<Dispatched, FrameError> {
        // only a JSON object is an envelope; arrays and scalars are malformed
        let mut envelope: Map<String, Value> =
            serde_json::from_str(raw).map_err(|source| FrameError::Malformed { channel, source })?;
        let kind: String = match envelope.remove("type") {
            None | Some(Value::Null) => return Err(FrameError::MissingType { channel }),
            Some(kind) => serde_json::from_value(kind).map_err(|source| FrameError::Malformed { channel, source })?,
        };

        if kind != channel.envelope_type() {
            debug!(%channel, %kind, "Ignoring frame");
            return Ok(Dispatched::Ignored { kind });
        }

        let data = match envelope.remove("data") {
            Some(Value::Null) | None => return Err(FrameError::MissingData { channel, kind }),
            Some(data) => data,
        };

        match channel {
            ChannelKind::MarketData => {
                let snapshot: MarketSnapshot = serde_json::from_value(data)
                    .map_err(|source| FrameError::InvalidPayload { channel, kind, source })?;
                let snapshot = snapshot.normalised();
                let symbol = snapshot.symbol.clone();
                trace!(%symbol, "Dispatching snapshot");
                self.store.apply_snapshot(snapshot);
                Ok(Dispatched::Snapshot { symbol })
            }
            ChannelKind::Trades => {
                let trade: TradeExecution = serde_json::from_value(data)
                    .map_err(|source| FrameError::InvalidPayload { channel, kind, source })?;
                let trade_id = trade.trade_id.clone();
                trace!(%trade_id, symbol = %trade.symbol, "Dispatching trade");
                self.store.append_trade(trade);
                Ok(Dispatched::Trade { trade_id })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PriceLevel;

    fn setup() -> (Arc<StateStore>, Dispatcher) {
        let store = Arc::new(StateStore::default());
        (store.clone(), Dispatcher::new(store))
    }

    const TRADE: &str = r#"{"type":"trade","data":{"timestamp":"2024-01-01T00:00:00","symbol":"BTC-USDT",
        "trade_id":"1","price":"30010","quantity":"0.2","aggressor_side":"buy",
        "maker_order_id":"1","taker_order_id":"2"}}"#;

    #[test]
    fn test_market_data_frames_replace_snapshot() {
        let (store, dispatcher) = setup();
        let first = r#"{"type":"market_data","data":{"symbol":"BTC-USDT","bids":[[100,1]],"asks":[]}}"#;
        let second = r#"{"type":"market_data","data":{"timestamp":"t2","symbol":"BTC-USDT","bids":[[101,2]],"asks":[]}}"#;
        assert_eq!(
            dispatcher.dispatch(ChannelKind::MarketData, first).unwrap(),
            Dispatched::Snapshot { symbol: "BTC-USDT".into() }
        );
        dispatcher.dispatch(ChannelKind::MarketData, second).unwrap();

        let snap = store.snapshot("BTC-USDT").unwrap();
        assert_eq!(snap.bids, vec![PriceLevel::new(101.0, 2.0)]);
        assert_eq!(snap.timestamp.as_deref(), Some("t2"));
    }

    #[test]
    fn test_unsorted_levels_are_normalised() {
        let (store, dispatcher) = setup();
        let frame = r#"{"type":"market_data","data":{"symbol":"X","bids":[["1","1"],["3","1"]],"asks":[["9","1"],["7","1"]]}}"#;
        dispatcher.dispatch(ChannelKind::MarketData, frame).unwrap();
        let snap = store.snapshot("X").unwrap();
        assert_eq!(snap.best_bid().unwrap().price, 3.0);
        assert_eq!(snap.best_ask().unwrap().price, 7.0);
    }

    #[test]
    fn test_trade_frame_appends() {
        let (store, dispatcher) = setup();
        assert_eq!(
            dispatcher.dispatch(ChannelKind::Trades, TRADE).unwrap(),
            Dispatched::Trade { trade_id: "1".into() }
        );
        assert_eq!(store.trade_count(), 1);
    }

    #[test]
    fn test_malformed_frames_never_mutate_store() {
        let (store, dispatcher) = setup();
        let bad = [
            "not json",
            "",
            "[1,2,3]",
            r#"{"data":{"symbol":"BTC-USDT"}}"#,
            r#"{"type":"market_data"}"#,
            r#"{"type":"market_data","data":null}"#,
            r#"{"type":"market_data","data":{"bids":[]}}"#,
            r#"{"type":"market_data","data":{"symbol":"BTC-USDT","bids":[["x","1"]]}}"#,
            r#"{"type":7,"data":{"symbol":"BTC-USDT","bids":[],"asks":[]}}"#,
            r#"["market_data",{"symbol":"X","bids":[[1,1]],"asks":[]}]"#,
        ];
        for frame in bad {
            assert!(dispatcher.dispatch(ChannelKind::MarketData, frame).is_err(), "{frame}");
        }
        assert!(dispatcher.dispatch(ChannelKind::Trades, r#"{"type":"trade","data":{"trade_id":"1"}}"#).is_err());
        assert!(store.symbols().is_empty());
        assert_eq!(store.trade_count(), 0);
    }

    #[test]
    fn test_positional_envelope_rejected() {
        let (store, dispatcher) = setup();
        // same fields as TRADE, as a [type, data] pair
        let positional = r#"["trade",{"timestamp":"2024-01-01T00:00:00","symbol":"BTC-USDT",
            "trade_id":"1","price":"30010","quantity":"0.2","aggressor_side":"buy",
            "maker_order_id":"1","taker_order_id":"2"}]"#;
        let err = dispatcher.dispatch(ChannelKind::Trades, positional).unwrap_err();
        assert!(matches!(err, FrameError::Malformed { channel: ChannelKind::Trades, .. }), "{err}");
        assert!(store.symbols().is_empty());
        assert_eq!(store.trade_count(), 0);
    }

    #[test]
    fn test_missing_type_reported() {
        let (_, dispatcher) = setup();
        let err = dispatcher.dispatch(ChannelKind::Trades, r#"{"data":{}}"#).unwrap_err();
        assert!(matches!(err, FrameError::MissingType { channel: ChannelKind::Trades }));
    }

    #[test]
    fn test_unknown_or_misrouted_types_ignored() {
        let (store, dispatcher) = setup();
        assert_eq!(
            dispatcher.dispatch(ChannelKind::MarketData, r#"{"type":"pong"}"#).unwrap(),
            Dispatched::Ignored { kind: "pong".into() }
        );
        // trade envelope on the market-data channel
        assert!(matches!(
            dispatcher.dispatch(ChannelKind::MarketData, TRADE).unwrap(),
            Dispatched::Ignored { .. }
        ));
        assert_eq!(store.trade_count(), 0);
    }
}
