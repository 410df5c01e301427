use std::path::Path;
use std::time::Duration;

use config::{Config, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::stream::heartbeat::DEFAULT_HEARTBEAT_INTERVAL;
use crate::stream::reconnect::{DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS};
use crate::stream::ChannelKind;
use crate::store::DEFAULT_TRADE_LOG_CAPACITY;

pub const DEFAULT_API_BASE: &str = "localhost:8000";
pub const DEFAULT_CONFIG_FILE: &str = "marketlink";
pub const DEFAULT_ORDER_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Client settings. `api_base` is `host[:port]` and drives both the
/// WebSocket base (`ws://`) and the REST base (`http://`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub api_base: String,
    pub reconnect_max_attempts: u32,
    pub reconnect_base_delay_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub order_timeout_ms: u64,
    pub trade_log_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            reconnect_max_attempts: DEFAULT_MAX_ATTEMPTS,
            reconnect_base_delay_ms: DEFAULT_BASE_DELAY.as_millis() as u64,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL.as_millis() as u64,
            order_timeout_ms: DEFAULT_ORDER_TIMEOUT.as_millis() as u64,
            trade_log_capacity: DEFAULT_TRADE_LOG_CAPACITY,
        }
    }
}

impl ClientConfig {
    /// Defaults, then `marketlink.{toml,json,..}` if present (or `path`),
    /// then `API_BASE` from the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::build(path, None, std::env::var("API_BASE").ok())
    }

    pub(crate) fn build(
        path: Option<&Path>,
        inline_toml: Option<&str>,
        api_base: Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        builder = match path {
            Some(p) => builder.add_source(File::from(p).required(true)),
            None => builder.add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        };
        if let Some(toml) = inline_toml {
            builder = builder.add_source(File::from_str(toml, FileFormat::Toml));
        }
        builder = builder.set_override_option("api_base", api_base)?;

        let config: ClientConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host().is_empty() {
            return Err(ConfigError::Invalid("api_base must not be empty".into()));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(ConfigError::Invalid("heartbeat_interval_ms must be positive".into()));
        }
        if self.order_timeout_ms == 0 {
            return Err(ConfigError::Invalid("order_timeout_ms must be positive".into()));
        }
        if self.trade_log_capacity == 0 {
            return Err(ConfigError::Invalid("trade_log_capacity must be positive".into()));
        }
        Ok(())
    }

    /// `api_base` without scheme or trailing slash.
    pub fn host(&self) -> &str {
        let base = self.api_base.trim();
        let base = ["http://", "https://", "ws://", "wss://"]
            .iter()
            .find_map(|scheme| base.strip_prefix(scheme))
            .unwrap_or(base);
        base.trim_end_matches('/')
    }

    pub fn ws_url(&self, kind: ChannelKind) -> String {
        format!("ws://{}{}", self.host(), kind.path())
    }

    pub fn orders_url(&self) -> String {
        format!("http://{}/api/orders", self.host())
    }

    pub fn reconnect_base_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_delay_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn order_timeout(&self) -> Duration {
        Duration::from_millis(self.order_timeout_ms)
    }
}
