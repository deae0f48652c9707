//! Transport retry.
//!
//! Every gateway call gets a fixed number of attempts with linear backoff
//! (`attempt × base`). Order placement is safe to repeat because the
//! request carries a stable `client_order_id`.

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use super::ExchangeGateway;
use crate::types::{OrderRequest, OrderResult, OrderStatusReport, PositionSnapshot, TradeFill};

/// Attempts per call.
pub const DEFAULT_ATTEMPTS: u32 = 2;
/// Base delay for linear backoff.
pub const DEFAULT_BACKOFF_MS: u64 = 300;

/// Run `op` up to `attempts` times, sleeping `attempt × backoff` between tries.
pub async fn with_retry<T, F, Fut>(label: &str, attempts: u32, backoff: Duration, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < attempts => {
                let delay = backoff * attempt;
                warn!(op = label, attempt, delay_ms = delay.as_millis() as u64, error = %e, "Retrying gateway call");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                debug!(op = label, attempts, "Gateway call exhausted retries");
                return Err(e.context(format!("{label} failed after {attempts} attempts")));
            }
        }
    }
}

/// Wraps a gateway so every call is retried at the transport level.
pub struct RetryingGateway<G> {
    inner: G,
    attempts: u32,
    backoff: Duration,
}

impl<G: ExchangeGateway> RetryingGateway<G> {
    pub fn new(inner: G) -> Self {
        Self::with_policy(inner, DEFAULT_ATTEMPTS, Duration::from_millis(DEFAULT_BACKOFF_MS))
    }

    pub fn with_policy(inner: G, attempts: u32, backoff: Duration) -> Self {
        Self { inner, attempts, backoff }
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }
}

#[async_trait]
impl<G: ExchangeGateway> ExchangeGateway for RetryingGateway<G> {
    async fn place_order(&self, request: &OrderRequest) -> Result<OrderResult> {
        with_retry("place_order", self.attempts, self.backoff, || self.inner.place_order(request)).await
    }

    async fn get_order(&self, symbol: &str, order_id: &str) -> Result<OrderStatusReport> {
        with_retry("get_order", self.attempts, self.backoff, || self.inner.get_order(symbol, order_id)).await
    }

    async fn get_user_trades(&self, symbol: &str, order_id: Option<String>) -> Result<Vec<TradeFill>> {
        with_retry("get_user_trades", self.attempts, self.backoff, || {
            self.inner.get_user_trades(symbol, order_id.clone())
        })
        .await
    }

    async fn get_positions(&self, symbol: &str) -> Result<PositionSnapshot> {
        with_retry("get_positions", self.attempts, self.backoff, || self.inner.get_positions(symbol)).await
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<()> {
        with_retry("cancel_order", self.attempts, self.backoff, || self.inner.cancel_order(symbol, order_id)).await
    }

    async fn get_mark_price(&self, symbol: &str) -> Result<Decimal> {
        with_retry("get_mark_price", self.attempts, self.backoff, || self.inner.get_mark_price(symbol)).await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
