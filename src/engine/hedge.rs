//! Hedge coordinator.
//!
//! Executes the three pair-wide transitions: lock, unlock take-profit and
//! unlock stop-loss. Each places its order first; a failed placement
//! returns before any state is written, so the triggering condition is
//! simply re-evaluated on the next tick. State changes go through the
//! pair-wide methods on [`AccountState`], which update both directions in
//! one call.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};

use super::executor::OrderExecutor;
use crate::events::{EventKind, EventSink};
use crate::precision::trunc_qty;
use crate::state::AccountState;
use crate::strategy::{PerDirection, StrategyConfig};
use crate::types::{Direction, HedgeError, OrderRequest};

/// What a completed lock did.
#[derive(Debug, Clone, PartialEq)]
pub struct LockReport {
    pub balanced_side: Option<Direction>,
    pub balancing_qty: Decimal,
    pub corrective_attempted: bool,
    /// Quantity difference left after the corrective order.
    pub residual: Decimal,
}

/// Result of an unlock attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnlockOutcome {
    /// Close confirmed and the transition applied.
    Released { realized: Decimal },
    /// Close confirmed for part of the side. The profit is credited and
    /// the pair stays locked until the rest is closed.
    Partial { realized: Decimal, remaining: Decimal },
    /// Close placed but not confirmed; state left for the next tick.
    Unconfirmed,
}

pub struct HedgeCoordinator<'a> {
    executor: &'a OrderExecutor,
    events: &'a EventSink,
    account: &'a str,
    symbol: &'a str,
}

impl<'a> HedgeCoordinator<'a> {
    pub fn new(executor: &'a OrderExecutor, events: &'a EventSink, account: &'a str, symbol: &'a str) -> Self {
        Self { executor, events, account, symbol }
    }

    fn open_order(&self, direction: Direction, qty: Decimal) -> OrderRequest {
        OrderRequest::market(self.symbol, direction.open_side(), direction.position_side(), qty)
    }

    fn close_order(&self, direction: Direction, qty: Decimal) -> OrderRequest {
        OrderRequest::market(self.symbol, direction.close_side(), direction.position_side(), qty)
    }

    /// The lighter side and the quantity that would balance the pair, if
    /// the difference exceeds `eps`.
    fn imbalance(state: &AccountState, eps: Decimal) -> Option<(Direction, Decimal)> {
        let diff = state.long.qty - state.short.qty;
        if diff.abs() <= eps {
            return None;
        }
        let lighter = if diff > Decimal::ZERO { Direction::Short } else { Direction::Long };
        Some((lighter, trunc_qty(diff.abs())))
    }

    async fn resync(&self, state: &mut AccountState) {
        match self.executor.gateway().get_positions(self.symbol).await {
            Ok(snapshot) => state.sync_positions(&snapshot),
            Err(e) => warn!(account = self.account, error = %e, "Position re-sync after lock failed"),
        }
    }

    /// Lock transition triggered by `trigger`.
    pub async fn lock(
        &self,
        state: &mut AccountState,
        config: &StrategyConfig,
        trigger: Direction,
        now: DateTime<Utc>,
    ) -> Result<LockReport, HedgeError> {
        let eps = config.hedge.equal_eps;
        let balancing = Self::imbalance(state, eps);

        if let Some((side, qty)) = balancing {
            info!(account = self.account, trigger = %trigger, side = %side, qty = %qty, "Placing hedge balancing order");
            // Confirmation is not required: the re-sync below reads the truth.
            self.executor.execute(self.open_order(side, qty)).await?;
        } else {
            info!(account = self.account, trigger = %trigger, "Pair already balanced, locking without order");
        }

        let full = PerDirection {
            long: config.long.is_full(state.long.add_times),
            short: config.short.is_full(state.short.add_times),
        };
        state.apply_hedge_lock(|d| full.get(d));
        self.resync(state).await;

        let mut corrective_attempted = false;
        if let Some((side, qty)) = Self::imbalance(state, eps) {
            corrective_attempted = true;
            warn!(account = self.account, side = %side, qty = %qty, "Residual imbalance after lock, one corrective order");
            match self.executor.execute(self.open_order(side, qty)).await {
                Ok(_) => self.resync(state).await,
                Err(e) => warn!(account = self.account, error = %e, "Corrective order failed"),
            }
        }

        let residual = (state.long.qty - state.short.qty).abs();
        if residual > eps {
            self.events.emit(
                self.account,
                now,
                EventKind::HedgeResidualImbalance {
                    long_qty: state.long.qty,
                    short_qty: state.short.qty,
                    diff: residual,
                },
            );
        }

        state.set_cooldown_both(now + config.hedge_wait());

        let (balanced_side, balancing_qty) = match balancing {
            Some((side, qty)) => (Some(side), qty),
            None => (None, Decimal::ZERO),
        };
        self.events.emit(
            self.account,
            now,
            EventKind::HedgeLocked {
                balanced_side,
                balancing_qty,
                long_qty: state.long.qty,
                short_qty: state.short.qty,
            },
        );
        info!(account = self.account, state = %state, "Hedge locked");

        Ok(LockReport {
            balanced_side,
            balancing_qty,
            corrective_attempted,
            residual,
        })
    }

    /// Close `direction` with profit. The realized amount is credited to
    /// the opposite side, which stays locked.
    pub async fn unlock_take_profit(
        &self,
        state: &mut AccountState,
        direction: Direction,
        price: Decimal,
        now: DateTime<Utc>,
    ) -> Result<UnlockOutcome, HedgeError> {
        let side = state.get(direction);
        let (qty, avg_price) = (side.qty, side.avg_price);

        let outcome = self.executor.execute(self.close_order(direction, qty)).await?;
        let Some(fill) = outcome.fill else {
            self.events.emit(
                self.account,
                now,
                EventKind::OrderUnconfirmed {
                    request: Box::new(outcome.request.clone()),
                    order_id: outcome.order.order_id.clone(),
                },
            );
            return Ok(UnlockOutcome::Unconfirmed);
        };

        let closed_qty = if fill.qty > Decimal::ZERO { fill.qty.min(qty) } else { qty };
        let exit = outcome.price_or(price);
        let realized = match direction {
            Direction::Long => (exit - avg_price) * closed_qty,
            Direction::Short => (avg_price - exit) * closed_qty,
        };

        // An accepted fill may still leave part of the side open.
        let remaining = match self.executor.gateway().get_positions(self.symbol).await {
            Ok(snapshot) => {
                state.sync_positions(&snapshot);
                state.get(direction).qty
            }
            Err(e) => {
                warn!(account = self.account, error = %e, "Position re-sync after unlock failed");
                trunc_qty((qty - closed_qty).max(Decimal::ZERO))
            }
        };
        if remaining > Decimal::ZERO {
            let credited = state.credit_partial_take_profit(direction, realized);
            self.events.emit(
                self.account,
                now,
                EventKind::HedgeTakeProfitPartial { direction, realized, credited, remaining },
            );
            info!(
                account = self.account,
                direction = %direction,
                realized = %realized,
                remaining = %remaining,
                "Hedge unlock part-filled, side stays locked"
            );
            return Ok(UnlockOutcome::Partial { realized, remaining });
        }

        let credited = state.release_take_profit(direction, realized);
        if state.is_locked() {
            self.events.emit(
                self.account,
                now,
                EventKind::HedgeTakeProfitReleased { direction, realized, credited },
            );
            info!(account = self.account, direction = %direction, realized = %realized, credited = %credited, "Hedge side released with profit");
        } else {
            self.events.emit(
                self.account,
                now,
                EventKind::HedgeFullyReleased {
                    direction: Some(direction),
                    reason: "take profit with opposite side already released".to_string(),
                },
            );
            info!(account = self.account, direction = %direction, realized = %realized, "Hedge fully released");
        }
        Ok(UnlockOutcome::Released { realized })
    }

    /// Close `direction` and release both sides.
    pub async fn unlock_stop_loss(
        &self,
        state: &mut AccountState,
        direction: Direction,
        price: Decimal,
        now: DateTime<Utc>,
    ) -> Result<UnlockOutcome, HedgeError> {
        let side = state.get(direction);
        let (qty, avg_price) = (side.qty, side.avg_price);

        let outcome = self.executor.execute(self.close_order(direction, qty)).await?;
        if !outcome.confirmed() {
            self.events.emit(
                self.account,
                now,
                EventKind::OrderUnconfirmed {
                    request: Box::new(outcome.request.clone()),
                    order_id: outcome.order.order_id.clone(),
                },
            );
            return Ok(UnlockOutcome::Unconfirmed);
        }

        let exit = outcome.price_or(price);
        let realized = match direction {
            Direction::Long => (exit - avg_price) * qty,
            Direction::Short => (avg_price - exit) * qty,
        };
        state.release_stop_loss(direction);
        self.events.emit(
            self.account,
            now,
            EventKind::HedgeFullyReleased {
                direction: Some(direction),
                reason: "stop loss covered by locked profit".to_string(),
            },
        );
        warn!(account = self.account, direction = %direction, realized = %realized, "Hedge released at a loss");
        Ok(UnlockOutcome::Released { realized })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
