//! Fill confirmation.
//!
//! A placed order is accepted through the first of three checks that
//! succeeds, tried in this order on every poll:
//!
//! ```text
//! [1] order status   executed_qty ≥ min_fill_ratio × expected
//! [2] trade records  Σ fills for the order id, same threshold
//! [3] position delta opening: increase ≥ min_fill_ratio × expected
//!                    closing: remaining ≤ close_residual_ratio × expected
//! ```
//!
//! All checks are pure; the polling loop lives in the executor. Malformed
//! numeric fields parse as zero and simply fail the threshold.

use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use tracing::debug;

use crate::config::ConfirmationConfig;
use crate::precision::{parse_or_zero, trunc_price, trunc_qty};
use crate::types::{OrderStatusReport, PositionLeg, TradeFill};

/// Which check accepted the fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmMethod {
    OrderStatus,
    Trades,
    PositionDelta,
}

impl fmt::Display for ConfirmMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConfirmMethod::OrderStatus => "order_status",
            ConfirmMethod::Trades => "trades",
            ConfirmMethod::PositionDelta => "position_delta",
        };
        f.write_str(s)
    }
}

/// An accepted fill. `avg_price` is zero when the check cannot know it
/// (a closing position delta); callers substitute the reference price.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fill {
    pub qty: Decimal,
    pub avg_price: Decimal,
    pub method: ConfirmMethod,
}

/// Outcome of reading an order-status payload.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusVerdict {
    Accepted(Fill),
    /// Not enough fill yet; keep polling.
    Pending,
    /// The order is done without enough fill; other checks get one last look.
    Terminal,
}

fn is_terminal(status: &str) -> bool {
    matches!(status, "FILLED" | "CANCELED" | "REJECTED" | "EXPIRED")
}

fn meets_fill_ratio(filled: Decimal, expected: Decimal, config: &ConfirmationConfig) -> bool {
    filled > Decimal::ZERO && filled >= expected * config.min_fill_ratio
}

/// [1] Order status.
pub fn check_order_status(
    report: &OrderStatusReport,
    expected: Decimal,
    config: &ConfirmationConfig,
) -> StatusVerdict {
    let executed = trunc_qty(parse_or_zero("executed_qty", &report.executed_qty));
    let avg_price = trunc_price(parse_or_zero("avg_price", &report.avg_price));

    if meets_fill_ratio(executed, expected, config) {
        return StatusVerdict::Accepted(Fill {
            qty: executed,
            avg_price,
            method: ConfirmMethod::OrderStatus,
        });
    }

    debug!(
        order_id = %report.order_id,
        status = %report.status,
        executed = %executed,
        expected = %expected,
        "Order status inconclusive"
    );
    if is_terminal(&report.status) {
        StatusVerdict::Terminal
    } else {
        StatusVerdict::Pending
    }
}

/// [2] Trade records for `order_id`, aggregated into a quantity-weighted
/// average price.
pub fn check_trades(
    trades: &[TradeFill],
    order_id: &str,
    expected: Decimal,
    config: &ConfirmationConfig,
) -> Option<Fill> {
    let (qty, notional) = trades
        .iter()
        .filter(|t| t.order_id == order_id)
        .fold((Decimal::ZERO, Decimal::ZERO), |(q, n), t| {
            let qty = parse_or_zero("trade.qty", &t.qty);
            let price = parse_or_zero("trade.price", &t.price);
            (q + qty, n + qty * price)
        });

    let qty = trunc_qty(qty);
    if !meets_fill_ratio(qty, expected, config) {
        return None;
    }
    Some(Fill {
        qty,
        avg_price: trunc_price(notional / qty),
        method: ConfirmMethod::Trades,
    })
}

/// [3] Position delta against the pre-order `baseline` leg.
pub fn check_position_delta(
    baseline: PositionLeg,
    current: PositionLeg,
    expected: Decimal,
    opening: bool,
    config: &ConfirmationConfig,
) -> Option<Fill> {
    if opening {
        let increase = trunc_qty(current.qty - baseline.qty);
        if !meets_fill_ratio(increase, expected, config) {
            return None;
        }
        // Back the fill price out of the two weighted averages.
        let notional = current.qty * current.avg_price - baseline.qty * baseline.avg_price;
        let avg_price = if notional > Decimal::ZERO {
            trunc_price(notional / increase)
        } else {
            Decimal::ZERO
        };
        Some(Fill {
            qty: increase,
            avg_price,
            method: ConfirmMethod::PositionDelta,
        })
    } else {
        if current.qty > expected * config.close_residual_ratio {
            return None;
        }
        let reduced = trunc_qty((baseline.qty - current.qty).max(Decimal::ZERO));
        Some(Fill {
            qty: reduced,
            avg_price: Decimal::ZERO,
            method: ConfirmMethod::PositionDelta,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
