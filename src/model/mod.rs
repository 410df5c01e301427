// Wire types shared by the streaming channels, the store and the order gateway
pub mod market;     // order book snapshots + trade executions
pub mod order;      // order requests / results for the REST endpoint

pub use market::{MarketSnapshot, PriceLevel, Side, TradeExecution};
pub use order::{OrderRequest, OrderResult, OrderType};

/// The service sends prices and sizes as decimal strings ("30000.5") while
/// other producers emit plain JSON numbers. Accept both, reject non-finite.
pub(crate) mod decimal {
    use serde::{de, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Wire {
        Num(f64),
        Str(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        let value = match Wire::deserialize(d)? {
            Wire::Num(n) => n,
            Wire::Str(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|e| <D::Error as de::Error>::custom(format!("bad decimal {s:?}: {e}")))?,
        };
        if !value.is_finite() {
            return Err(<D::Error as de::Error>::custom("decimal must be finite"));
        }
        Ok(value)
    }

    pub fn serialize<S: Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(*v)
    }
}
