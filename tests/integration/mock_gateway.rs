//! Scripted gateway for integration testing.
//!
//! Wraps a `PaperGateway` and degrades selected endpoints so each
//! confirmation fallback can be exercised end to end. Prices and positions
//! are fully controllable from test code.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex};

use hedgelock::exchange::paper::PaperGateway;
use hedgelock::exchange::ticker::PriceBoard;
use hedgelock::exchange::ExchangeGateway;
use hedgelock::types::*;

/// Which confirmation paths the exchange answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmMode {
    /// Everything answers.
    Normal,
    /// Order status fails; trade history answers.
    TradesOnly,
    /// Status and trades fail; only positions answer.
    PositionOnly,
    /// Orders are acknowledged but never fill.
    Silent,
    /// Orders are acknowledged and held until `release_pending`.
    Delayed,
}

pub struct ScriptedGateway {
    paper: PaperGateway,
    mode: Mutex<ConfirmMode>,
    /// If set, all operations will return this error.
    force_error: Mutex<Option<String>>,
    placed: Mutex<Vec<OrderRequest>>,
    pending: Mutex<Vec<OrderRequest>>,
    cancelled: Mutex<Vec<String>>,
}

impl ScriptedGateway {
    pub fn new(symbol: &str, price: Decimal) -> Arc<Self> {
        let board = Arc::new(PriceBoard::new());
        board.set(symbol, price);
        Arc::new(Self {
            paper: PaperGateway::new("scripted", board),
            mode: Mutex::new(ConfirmMode::Normal),
            force_error: Mutex::new(None),
            placed: Mutex::new(Vec::new()),
            pending: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
        })
    }

    pub fn set_price(&self, symbol: &str, price: Decimal) {
        self.paper.prices().set(symbol, price);
    }

    pub fn set_mode(&self, mode: ConfirmMode) {
        *self.mode.lock().unwrap() = mode;
    }

    /// Force all subsequent operations to return an error.
    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    /// Change positions behind the engine's back.
    pub fn set_positions(&self, symbol: &str, snapshot: PositionSnapshot) {
        self.paper.set_positions(symbol, snapshot).unwrap();
    }

    pub fn placed(&self) -> Vec<OrderRequest> {
        self.placed.lock().unwrap().clone()
    }

    /// Order ids the engine asked to cancel.
    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }

    /// Fill every held order at the current price.
    pub async fn release_pending(&self) {
        let held: Vec<OrderRequest> = self.pending.lock().unwrap().drain(..).collect();
        for request in held {
            self.paper.place_order(&request).await.unwrap();
        }
    }

    fn mode(&self) -> ConfirmMode {
        *self.mode.lock().unwrap()
    }

    fn check_error(&self) -> Result<()> {
        match self.force_error.lock().unwrap().as_ref() {
            Some(msg) => Err(anyhow!("{msg}")),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ExchangeGateway for ScriptedGateway {
    async fn place_order(&self, request: &OrderRequest) -> Result<OrderResult> {
        self.check_error()?;
        self.placed.lock().unwrap().push(request.clone());
        let mode = self.mode();
        if mode == ConfirmMode::Delayed {
            self.pending.lock().unwrap().push(request.clone());
        }
        if matches!(mode, ConfirmMode::Silent | ConfirmMode::Delayed) {
            return Ok(OrderResult {
                order_id: format!("held-{}", request.client_order_id),
                status: OrderStatus::New,
                filled_qty: Decimal::ZERO,
                avg_price: Decimal::ZERO,
            });
        }
        self.paper.place_order(request).await
    }

    async fn get_order(&self, symbol: &str, order_id: &str) -> Result<OrderStatusReport> {
        self.check_error()?;
        match self.mode() {
            ConfirmMode::Normal => self.paper.get_order(symbol, order_id).await,
            _ => Err(anyhow!("order status unavailable")),
        }
    }

    async fn get_user_trades(&self, symbol: &str, order_id: Option<String>) -> Result<Vec<TradeFill>> {
        self.check_error()?;
        match self.mode() {
            ConfirmMode::Normal | ConfirmMode::TradesOnly => self.paper.get_user_trades(symbol, order_id).await,
            _ => Err(anyhow!("trade history unavailable")),
        }
    }

    async fn get_positions(&self, symbol: &str) -> Result<PositionSnapshot> {
        self.check_error()?;
        self.paper.get_positions(symbol).await
    }

    async fn cancel_order(&self, _symbol: &str, order_id: &str) -> Result<()> {
        self.check_error()?;
        self.cancelled.lock().unwrap().push(order_id.to_string());
        Ok(())
    }

    async fn get_mark_price(&self, symbol: &str) -> Result<Decimal> {
        self.check_error()?;
        self.paper.get_mark_price(symbol).await
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
