use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Side, TradeExecution};
use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
    /// Immediate-or-cancel
    Ioc,
    /// Fill-or-kill
    Fok,
}

impl OrderType {
    pub fn requires_price(self) -> bool {
        !matches!(self, OrderType::Market)
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderType::Market => "market",
            OrderType::Limit => "limit",
            OrderType::Ioc => "ioc",
            OrderType::Fok => "fok",
        };
        f.write_str(s)
    }
}

/// Order as submitted to `POST /api/orders`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub order_type: OrderType,
    pub side: Side,
    pub quantity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
}

impl OrderRequest {
    pub fn market(symbol: &str, side: Side, quantity: f64) -> Self {
        Self { symbol: symbol.to_string(), order_type: OrderType::Market, side, quantity, price: None }
    }

    pub fn limit(symbol: &str, side: Side, quantity: f64, price: f64) -> Self {
        Self::priced(symbol, OrderType::Limit, side, quantity, price)
    }

    pub fn ioc(symbol: &str, side: Side, quantity: f64, price: f64) -> Self {
        Self::priced(symbol, OrderType::Ioc, side, quantity, price)
    }

    pub fn fok(symbol: &str, side: Side, quantity: f64, price: f64) -> Self {
        Self::priced(symbol, OrderType::Fok, side, quantity, price)
    }

    fn priced(symbol: &str, order_type: OrderType, side: Side, quantity: f64, price: f64) -> Self {
        Self { symbol: symbol.to_string(), order_type, side, quantity, price: Some(price) }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.symbol.trim().is_empty() {
            return Err(ValidationError::EmptySymbol);
        }
        // `!(x > 0.0)` so NaN is rejected too
        if !(self.quantity > 0.0) {
            return Err(ValidationError::NonPositiveQuantity(self.quantity));
        }
        if self.order_type.requires_price() {
            match self.price {
                None => return Err(ValidationError::MissingPrice(self.order_type)),
                Some(p) if !(p > 0.0) => return Err(ValidationError::NonPositivePrice(p)),
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Body actually sent to the server: market orders never carry a price.
    pub fn to_wire(&self) -> OrderRequest {
        let mut wire = self.clone();
        if !wire.order_type.requires_price() {
            wire.price = None;
        }
        wire
    }
}

/// Server response to an order submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id: String,
    pub status: String,
    pub filled_quantity: f64,
    pub remaining_quantity: f64,
    #[serde(default)]
    pub average_price: Option<f64>,
    /// Informational fills for immediate feedback; never written to the trade log.
    #[serde(default)]
    pub trades: Vec<TradeExecution>,
    pub timestamp: String,
}

impl OrderResult {
    pub fn is_filled(&self) -> bool {
        self.status.eq_ignore_ascii_case("filled")
    }
}
