//! Paper exchange.
//!
//! Simulates a hedge-mode margin account in memory. Market orders fill
//! immediately at the current mark price from the shared [`PriceBoard`].
//! Used by the binary for dry runs against live public prices and by the
//! integration tests.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use super::ticker::PriceBoard;
use super::ExchangeGateway;
use crate::precision::{trunc_price, trunc_qty};
use crate::types::{
    OrderRequest, OrderResult, OrderStatus, OrderStatusReport, PositionLeg, PositionSnapshot,
    TradeFill,
};

#[derive(Debug, Default)]
struct Book {
    next_id: u64,
    positions: HashMap<String, PositionSnapshot>,
    orders: HashMap<String, OrderResult>,
    by_client_id: HashMap<String, String>,
    trades: Vec<(String, TradeFill)>,
}

pub struct PaperGateway {
    name: String,
    prices: Arc<PriceBoard>,
    book: Mutex<Book>,
}

impl PaperGateway {
    pub fn new(name: &str, prices: Arc<PriceBoard>) -> Self {
        Self {
            name: name.to_string(),
            prices,
            book: Mutex::new(Book::default()),
        }
    }

    pub fn prices(&self) -> &Arc<PriceBoard> {
        &self.prices
    }

    /// Overwrite a symbol's legs, as if the account were changed outside
    /// the engine.
    pub fn set_positions(&self, symbol: &str, snapshot: PositionSnapshot) -> Result<()> {
        let mut book = self.lock()?;
        book.positions.insert(symbol.to_string(), snapshot);
        Ok(())
    }

    /// Number of distinct orders accepted so far.
    pub fn order_count(&self) -> usize {
        self.book.lock().map(|b| b.orders.len()).unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Book>> {
        self.book.lock().map_err(|_| anyhow!("paper book poisoned"))
    }

    fn mark(&self, symbol: &str) -> Result<Decimal> {
        self.prices
            .get(symbol)
            .ok_or_else(|| anyhow!("no price for {symbol}"))
    }
}

/// Apply a fill to one leg. Reductions are capped at the open quantity.
fn apply_fill(leg: &mut PositionLeg, opening: bool, qty: Decimal, price: Decimal) -> Decimal {
    if opening {
        let total = leg.qty + qty;
        leg.avg_price = trunc_price((leg.qty * leg.avg_price + qty * price) / total);
        leg.qty = trunc_qty(total);
        qty
    } else {
        let filled = qty.min(leg.qty);
        leg.qty = trunc_qty(leg.qty - filled);
        if leg.qty.is_zero() {
            leg.avg_price = Decimal::ZERO;
        }
        filled
    }
}

#[async_trait]
impl ExchangeGateway for PaperGateway {
    async fn place_order(&self, request: &OrderRequest) -> Result<OrderResult> {
        if request.quantity <= Decimal::ZERO {
            bail!("order quantity must be positive, got {}", request.quantity);
        }
        let price = self.mark(&request.symbol)?;
        let mut book = self.lock()?;

        if let Some(existing) = book
            .by_client_id
            .get(&request.client_order_id)
            .and_then(|id| book.orders.get(id))
        {
            debug!(client_order_id = %request.client_order_id, "Duplicate order ignored");
            return Ok(existing.clone());
        }

        book.next_id += 1;
        let order_id = book.next_id.to_string();

        let snapshot = book.positions.entry(request.symbol.clone()).or_default();
        let leg = snapshot.leg_mut(request.position_side.direction());
        let filled = apply_fill(leg, request.is_opening(), request.quantity, price);

        let status = if filled.is_zero() {
            OrderStatus::Expired
        } else {
            OrderStatus::Filled
        };
        let result = OrderResult {
            order_id: order_id.clone(),
            status,
            filled_qty: filled,
            avg_price: if filled.is_zero() { Decimal::ZERO } else { price },
        };

        if !filled.is_zero() {
            book.trades.push((
                request.symbol.clone(),
                TradeFill {
                    order_id: order_id.clone(),
                    qty: filled.to_string(),
                    price: price.to_string(),
                },
            ));
        }
        book.orders.insert(order_id.clone(), result.clone());
        book.by_client_id.insert(request.client_order_id.clone(), order_id);

        info!(gateway = %self.name, order = %request, %price, filled = %filled, "Paper order filled");
        Ok(result)
    }

    async fn get_order(&self, _symbol: &str, order_id: &str) -> Result<OrderStatusReport> {
        let book = self.lock()?;
        let order = book
            .orders
            .get(order_id)
            .ok_or_else(|| anyhow!("unknown order {order_id}"))?;
        let status = serde_json::to_value(order.status)?
            .as_str()
            .unwrap_or("NEW")
            .to_string();
        Ok(OrderStatusReport {
            order_id: order.order_id.clone(),
            status,
            executed_qty: order.filled_qty.to_string(),
            avg_price: order.avg_price.to_string(),
        })
    }

    async fn get_user_trades(&self, symbol: &str, order_id: Option<String>) -> Result<Vec<TradeFill>> {
        let book = self.lock()?;
        Ok(book
            .trades
            .iter()
            .filter(|(s, t)| s == symbol && order_id.as_ref().map_or(true, |id| &t.order_id == id))
            .map(|(_, t)| t.clone())
            .collect())
    }

    async fn get_positions(&self, symbol: &str) -> Result<PositionSnapshot> {
        let book = self.lock()?;
        Ok(book.positions.get(symbol).copied().unwrap_or_default())
    }

    async fn cancel_order(&self, _symbol: &str, order_id: &str) -> Result<()> {
        let book = self.lock()?;
        match book.orders.get(order_id) {
            // Market orders fill on arrival; nothing is ever resting.
            Some(_) => Ok(()),
            None => bail!("unknown order {order_id}"),
        }
    }

    async fn get_mark_price(&self, symbol: &str) -> Result<Decimal> {
        self.mark(symbol)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
