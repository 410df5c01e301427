//! Resilient client for a remote trading service.
//!
//! Two WebSocket channels (market data, trades) keep a local [`StateStore`]
//! in sync, reconnecting with linear backoff and kept alive by a shared
//! heartbeat. Orders go through the independent HTTP [`OrderGateway`].
//!
//! ```no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use marketlink::{ClientConfig, MarketLink, OrderGateway, OrderRequest, Side};
//!
//! let config = ClientConfig::load(None)?;
//! let link = MarketLink::start(&config);
//! let gateway = OrderGateway::from_config(&config);
//!
//! let store = link.store();
//! if let Some(book) = store.snapshot("BTC-USDT") {
//!     println!("best bid {:?}", book.best_bid());
//! }
//! let result = gateway.submit(&OrderRequest::market("ETH-USDT", Side::Buy, 1.0)).await?;
//! println!("order {} {}", result.order_id, result.status);
//! link.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod gateway;
pub mod model;
pub mod store;
pub mod stream;
pub mod telemetry;

pub use crate::config::ClientConfig;
pub use error::{ClientError, ConfigError, FrameError, OrderError, ValidationError};
pub use gateway::{OrderGateway, OrderSubmitter};
pub use model::{MarketSnapshot, OrderRequest, OrderResult, OrderType, PriceLevel, Side, TradeExecution};
pub use store::{StateStore, StoreEvent};
pub use stream::{ChannelKind, ChannelState, ChannelStatus, ConnectionStatus, MarketLink};
