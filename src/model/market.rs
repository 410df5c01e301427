use std::cmp::Reverse;
use std::fmt;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use super::decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// One `(price, quantity)` book level. On the wire: `["30000", "1.5"]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireLevel", into = "WireLevel")]
pub struct PriceLevel {
    pub price: f64,
    pub quantity: f64,
}

impl PriceLevel {
    pub fn new(price: f64, quantity: f64) -> Self {
        Self { price, quantity }
    }
}

#[derive(Serialize, Deserialize)]
struct WireLevel(#[serde(with = "decimal")] f64, #[serde(with = "decimal")] f64);

impl From<WireLevel> for PriceLevel {
    fn from(w: WireLevel) -> Self {
        PriceLevel::new(w.0, w.1)
    }
}

impl From<PriceLevel> for WireLevel {
    fn from(l: PriceLevel) -> Self {
        WireLevel(l.price, l.quantity)
    }
}

/// Complete book image for one symbol. Replaces, never merges with, the
/// previous snapshot for the same symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub bids: Vec<PriceLevel>, // highest price first
    #[serde(default)]
    pub asks: Vec<PriceLevel>, // lowest price first
}

impl MarketSnapshot {
    pub fn new(symbol: impl Into<String>, bids: Vec<PriceLevel>, asks: Vec<PriceLevel>) -> Self {
        Self { symbol: symbol.into(), timestamp: None, bids, asks }.normalised()
    }

    /// Enforce book ordering once, before the snapshot is stored. Stable, so
    /// duplicate price levels keep the order the venue sent them in.
    pub fn normalised(mut self) -> Self {
        self.bids.sort_by_key(|l| Reverse(OrderedFloat(l.price)));
        self.asks.sort_by_key(|l| OrderedFloat(l.price));
        self
    }

    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.bids.first().copied()
    }

    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.asks.first().copied()
    }

    /// best ask - best bid
    pub fn spread(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask.price - bid.price),
            _ => None,
        }
    }

    /// Spread as a percentage of the best ask.
    pub fn spread_pct(&self) -> Option<f64> {
        let ask = self.best_ask()?;
        if ask.price == 0.0 {
            return None;
        }
        self.spread().map(|s| s / ask.price * 100.0)
    }
}

/// A single fill reported by the trade channel. Immutable once received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeExecution {
    pub trade_id: String,
    pub symbol: String,
    #[serde(with = "decimal")]
    pub price: f64,
    #[serde(with = "decimal")]
    pub quantity: f64,
    pub aggressor_side: Side,
    pub maker_order_id: String,
    pub taker_order_id: String,
    pub timestamp: String,
}
