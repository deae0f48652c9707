//! Exchange integrations.
//!
//! Defines the `ExchangeGateway` trait consumed by the engine and provides:
//! - `RetryingGateway`: transport retry decorator (2 attempts, linear backoff)
//! - `PaperGateway`: in-memory hedge-mode margin account for dry runs
//! - `ticker`: public price feed shared by paper gateways

pub mod paper;
pub mod retry;
pub mod ticker;

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::types::{OrderRequest, OrderResult, OrderStatusReport, PositionSnapshot, TradeFill};

/// Abstraction over a hedge-mode margin exchange account.
///
/// Signing and transport live behind this trait; the engine only sees
/// typed requests and raw status payloads.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Place an order. A repeated `client_order_id` must not open twice.
    async fn place_order(&self, request: &OrderRequest) -> Result<OrderResult>;

    /// Status of a previously placed order.
    async fn get_order(&self, symbol: &str, order_id: &str) -> Result<OrderStatusReport>;

    /// The account's fills on `symbol`, optionally narrowed to one order.
    async fn get_user_trades(&self, symbol: &str, order_id: Option<String>) -> Result<Vec<TradeFill>>;

    /// Current long and short legs on `symbol`.
    async fn get_positions(&self, symbol: &str) -> Result<PositionSnapshot>;

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<()>;

    /// Latest mark price of `symbol`.
    async fn get_mark_price(&self, symbol: &str) -> Result<Decimal>;

    /// Gateway name for logging.
    fn name(&self) -> &str;
}
