//! Order submission over plain HTTP, independent of the streaming channels.
//!
//! Each call is one `POST /api/orders` with a bounded timeout. The gateway
//! never retries and never touches the [`StateStore`](crate::store::StateStore):
//! fills embedded in the result are for immediate feedback only.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument, warn};

use crate::config::ClientConfig;
use crate::error::OrderError;
use crate::model::{OrderRequest, OrderResult};

/// Seam for consumers that submit orders; lets them take a mock instead of
/// the HTTP gateway.
#[async_trait]
pub trait OrderSubmitter: Send + Sync {
    async fn submit(&self, request: &OrderRequest) -> Result<OrderResult, OrderError>;
}

#[derive(Clone)]
pub struct OrderGateway {
    client: Client,
    endpoint: String,
    timeout: Duration,
    request_seq: Arc<AtomicU64>,
}

impl OrderGateway {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            timeout,
            request_seq: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.orders_url(), config.order_timeout())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Submit with the gateway's default timeout.
    pub async fn submit(&self, request: &OrderRequest) -> Result<OrderResult, OrderError> {
        self.submit_with_timeout(request, self.timeout).await
    }

    #[instrument(
        skip_all,
        fields(symbol = %request.symbol, order_type = %request.order_type, side = %request.side)
    )]
    pub async fn submit_with_timeout(
        &self,
        request: &OrderRequest,
        timeout: Duration,
    ) -> Result<OrderResult, OrderError> {
        if let Err(e) = request.validate() {
            warn!(error = %e, "Rejecting order before submission");
            metrics::counter!("marketlink_orders_total", "outcome" => "invalid").increment(1);
            return Err(e.into());
        }

        let request_id = self.request_seq.fetch_add(1, Ordering::Relaxed);
        debug!(request_id, endpoint = %self.endpoint, "Submitting order");

        let result = self.exchange(request, timeout).await;
        let outcome = match &result {
            Ok(res) => {
                debug!(request_id, order_id = %res.order_id, status = %res.status, "Order acknowledged");
                "ok"
            }
            Err(e) => {
                warn!(request_id, error = %e, "Order submission failed");
                match e {
                    OrderError::Decode(_) => "decode",
                    _ => "transport",
                }
            }
        };
        metrics::counter!("marketlink_orders_total", "outcome" => outcome).increment(1);
        result
    }

    async fn exchange(&self, request: &OrderRequest, timeout: Duration) -> Result<OrderResult, OrderError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .timeout(timeout)
            .json(&request.to_wire())
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        let body = resp.text().await.map_err(transport_error)?;

        if !status.is_success() {
            let reason = if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_string()
            } else {
                body
            };
            return Err(OrderError::Transport { status: Some(status.as_u16()), reason });
        }

        serde_json::from_str(&body).map_err(|e| OrderError::Decode(e.to_string()))
    }
}

fn transport_error(e: reqwest::Error) -> OrderError {
    let reason = if e.is_timeout() { format!("request timed out: {e}") } else { e.to_string() };
    OrderError::Transport { status: e.status().map(|s| s.as_u16()), reason }
}

#[async_trait]
impl OrderSubmitter for OrderGateway {
    async fn submit(&self, request: &OrderRequest) -> Result<OrderResult, OrderError> {
        OrderGateway::submit(self, request).await
    }
}
