//! Per-account engine state.
//!
//! `AccountState` is owned by exactly one account loop. Hedge fields are
//! private: they change only through the pair-wide transition methods below,
//! which always write both directions in one synchronous call, so no tick
//! can observe a half-applied lock.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::precision::{trunc_price, trunc_qty};
use crate::types::{Direction, HedgeError, PositionSnapshot};

// ---------------------------------------------------------------------------
// Direction state
// ---------------------------------------------------------------------------

/// State of one side (long or short) of the pair.
///
/// Decimal fields are stored as strings so a save/load round trip is exact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectionState {
    #[serde(with = "rust_decimal::serde::str")]
    pub qty: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub avg_price: Decimal,
    /// Martingale adds applied since the first order.
    pub add_times: u32,
    #[serde(with = "rust_decimal::serde::str")]
    pub last_qty: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub last_fill_price: Decimal,
    pub last_fill_ts: Option<DateTime<Utc>>,
    pub last_open_ts: Option<DateTime<Utc>>,
    #[serde(with = "rust_decimal::serde::str")]
    pub opposite_qty: Decimal,
    hedge_locked: bool,
    hedge_stop: bool,
    hedge_locked_on_full: bool,
    #[serde(with = "rust_decimal::serde::str")]
    locked_profit: Decimal,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub fast_add_paused_until: Option<DateTime<Utc>>,
}

impl DirectionState {
    pub fn hedge_locked(&self) -> bool {
        self.hedge_locked
    }

    pub fn hedge_stop(&self) -> bool {
        self.hedge_stop
    }

    pub fn hedge_locked_on_full(&self) -> bool {
        self.hedge_locked_on_full
    }

    /// Realized profit credited by an unlock take-profit on the opposite side.
    pub fn locked_profit(&self) -> Decimal {
        self.locked_profit
    }

    pub fn is_flat(&self) -> bool {
        self.qty.is_zero()
    }

    /// Reference price for adds and the hedge trigger: the last fill,
    /// falling back to the average entry.
    pub fn fill_base(&self) -> Decimal {
        if self.last_fill_price > Decimal::ZERO {
            self.last_fill_price
        } else {
            self.avg_price
        }
    }

    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.is_some_and(|until| now < until)
    }

    fn has_hedge_residue(&self) -> bool {
        self.hedge_locked || self.hedge_stop || self.hedge_locked_on_full || !self.locked_profit.is_zero()
    }

    /// Position bookkeeping left behind on a flat direction.
    fn has_position_residue(&self) -> bool {
        self.add_times > 0
            || !self.last_qty.is_zero()
            || !self.avg_price.is_zero()
            || !self.last_fill_price.is_zero()
    }

    fn clear_hedge(&mut self) {
        self.hedge_locked = false;
        self.hedge_stop = false;
        self.hedge_locked_on_full = false;
        self.locked_profit = Decimal::ZERO;
    }

    /// Drop all position bookkeeping. Cooldowns survive.
    fn reset_position(&mut self) {
        self.qty = Decimal::ZERO;
        self.avg_price = Decimal::ZERO;
        self.add_times = 0;
        self.last_qty = Decimal::ZERO;
        self.last_fill_price = Decimal::ZERO;
        self.last_fill_ts = None;
        self.last_open_ts = None;
    }

    fn record_open(&mut self, filled: Decimal, price: Decimal, now: DateTime<Utc>) {
        let filled = trunc_qty(filled);
        let price = trunc_price(price);
        self.qty = filled;
        self.avg_price = price;
        self.add_times = 0;
        self.last_qty = filled;
        self.last_fill_price = price;
        self.last_fill_ts = Some(now);
        self.last_open_ts = Some(now);
    }

    fn record_add(&mut self, filled: Decimal, price: Decimal, now: DateTime<Utc>, pause_until: DateTime<Utc>) {
        let filled = trunc_qty(filled);
        let price = trunc_price(price);
        let total = self.qty + filled;
        if total > Decimal::ZERO {
            self.avg_price = trunc_price((self.qty * self.avg_price + filled * price) / total);
        }
        self.qty = trunc_qty(total);
        self.add_times += 1;
        self.last_qty = filled;
        self.last_fill_price = price;
        self.last_fill_ts = Some(now);
        self.fast_add_paused_until = Some(pause_until);
    }
}

// ---------------------------------------------------------------------------
// Account state
// ---------------------------------------------------------------------------

/// Both directions of one account's symbol plus the exchange back-off.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountState {
    pub long: DirectionState,
    pub short: DirectionState,
    /// While in the future, ticks are skipped after a gateway failure.
    pub exchange_fault_until: Option<DateTime<Utc>>,
}

/// A correction applied by [`AccountState::reconcile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "direction", rename_all = "snake_case")]
pub enum Repair {
    /// Flat direction carried stale add-count / fill residue.
    ResetFlat(Direction),
    /// A locked direction was flattened outside the engine.
    ExternalFlatten(Direction),
    /// Both directions flat with hedge residue.
    AutoUnlock,
    /// One side locked while the other is open and unlocked.
    SplitLock,
    /// `hedge_locked` without `hedge_stop`.
    StopFlagRestored(Direction),
}

impl fmt::Display for Repair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Repair::ResetFlat(d) => write!(f, "reset stale residue on flat {d}"),
            Repair::ExternalFlatten(d) => write!(f, "locked {d} flattened externally, full release"),
            Repair::AutoUnlock => write!(f, "both directions flat, hedge cleared"),
            Repair::SplitLock => write!(f, "split hedge lock, full release"),
            Repair::StopFlagRestored(d) => write!(f, "restored hedge_stop on {d}"),
        }
    }
}

impl Repair {
    /// The inconsistency this repair corrected, as an error for logging.
    pub fn to_error(&self) -> HedgeError {
        HedgeError::StateInconsistency(self.to_string())
    }
}

impl fmt::Display for AccountState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "long qty={} avg={} adds={} locked={} | short qty={} avg={} adds={} locked={}",
            self.long.qty,
            self.long.avg_price,
            self.long.add_times,
            self.long.hedge_locked,
            self.short.qty,
            self.short.avg_price,
            self.short.add_times,
            self.short.hedge_locked,
        )
    }
}

impl AccountState {
    pub fn get(&self, direction: Direction) -> &DirectionState {
        match direction {
            Direction::Long => &self.long,
            Direction::Short => &self.short,
        }
    }

    pub fn get_mut(&mut self, direction: Direction) -> &mut DirectionState {
        match direction {
            Direction::Long => &mut self.long,
            Direction::Short => &mut self.short,
        }
    }

    /// Whether either direction holds a hedge lock.
    pub fn is_locked(&self) -> bool {
        self.long.hedge_locked || self.short.hedge_locked
    }

    pub fn is_flat(&self) -> bool {
        self.long.is_flat() && self.short.is_flat()
    }

    pub fn in_exchange_fault(&self, now: DateTime<Utc>) -> bool {
        self.exchange_fault_until.is_some_and(|until| now < until)
    }

    /// Pairing check for a stable observation.
    ///
    /// Both sides carry identical hedge flags, or the pair is partially
    /// released: one side still locked, the other flat and unlocked.
    pub fn pairing_consistent(&self) -> bool {
        let (l, s) = (&self.long, &self.short);
        if l.hedge_locked == s.hedge_locked && l.hedge_stop == s.hedge_stop {
            return true;
        }
        let (locked, free) = if l.hedge_locked { (l, s) } else { (s, l) };
        locked.hedge_locked && locked.hedge_stop && !free.hedge_locked && !free.hedge_stop && free.is_flat()
    }

    fn refresh_opposite(&mut self) {
        self.long.opposite_qty = self.short.qty;
        self.short.opposite_qty = self.long.qty;
    }

    /// Overwrite quantities and average prices from an exchange snapshot.
    pub fn sync_positions(&mut self, snapshot: &PositionSnapshot) {
        for dir in Direction::ALL {
            let leg = snapshot.leg(dir);
            let side = self.get_mut(dir);
            side.qty = trunc_qty(leg.qty.max(Decimal::ZERO));
            side.avg_price = if side.qty.is_zero() {
                Decimal::ZERO
            } else {
                trunc_price(leg.avg_price)
            };
        }
        self.refresh_opposite();
    }

    // -- Fill bookkeeping ------------------------------------------------

    pub fn record_open(&mut self, direction: Direction, filled: Decimal, price: Decimal, now: DateTime<Utc>) {
        self.get_mut(direction).record_open(filled, price, now);
        self.refresh_opposite();
    }

    pub fn record_add(
        &mut self,
        direction: Direction,
        filled: Decimal,
        price: Decimal,
        now: DateTime<Utc>,
        pause_until: DateTime<Utc>,
    ) {
        self.get_mut(direction).record_add(filled, price, now, pause_until);
        self.refresh_opposite();
    }

    /// Ordinary take-profit close: the direction goes flat and cools down.
    pub fn record_close(&mut self, direction: Direction, cooldown_until: DateTime<Utc>) {
        let side = self.get_mut(direction);
        side.reset_position();
        side.cooldown_until = Some(cooldown_until);
        self.refresh_opposite();
    }

    // -- Hedge transitions (pair-wide) -----------------------------------

    /// Lock both directions. `on_full` reports per direction whether it
    /// had reached its add limit.
    pub(crate) fn apply_hedge_lock(&mut self, on_full: impl Fn(Direction) -> bool) {
        for dir in Direction::ALL {
            let full = on_full(dir);
            let side = self.get_mut(dir);
            side.hedge_locked = true;
            side.hedge_stop = true;
            side.hedge_locked_on_full = full;
        }
    }

    pub(crate) fn set_cooldown_both(&mut self, until: DateTime<Utc>) {
        self.long.cooldown_until = Some(until);
        self.short.cooldown_until = Some(until);
    }

    /// Unlock take-profit: `direction` was closed with `realized` profit.
    ///
    /// The closed side goes flat and unlocked; its positive profit is
    /// credited to the opposite side, which stays locked. Returns the
    /// credited amount. If the opposite side was no longer locked the pair
    /// is released in full.
    pub(crate) fn release_take_profit(&mut self, direction: Direction, realized: Decimal) -> Decimal {
        let credit = trunc_qty(realized.max(Decimal::ZERO));
        let closed = self.get_mut(direction);
        closed.reset_position();
        closed.clear_hedge();

        let other = self.get_mut(direction.opposite());
        if other.hedge_locked {
            other.locked_profit = trunc_qty(other.locked_profit + credit);
        } else {
            other.clear_hedge();
        }
        self.refresh_opposite();
        credit
    }

    /// Unlock take-profit that only part-filled: the realized profit is
    /// credited to the opposite side but both sides stay locked until
    /// `direction` is actually flat. Returns the credited amount.
    pub(crate) fn credit_partial_take_profit(&mut self, direction: Direction, realized: Decimal) -> Decimal {
        let credit = trunc_qty(realized.max(Decimal::ZERO));
        let other = self.get_mut(direction.opposite());
        if other.hedge_locked {
            other.locked_profit = trunc_qty(other.locked_profit + credit);
        }
        credit
    }

    /// Unlock stop-loss: `direction` was closed; both sides are released.
    pub(crate) fn release_stop_loss(&mut self, direction: Direction) {
        self.get_mut(direction).reset_position();
        self.release_all();
        self.refresh_opposite();
    }

    pub(crate) fn release_all(&mut self) {
        self.long.clear_hedge();
        self.short.clear_hedge();
    }

    // -- Reconciliation --------------------------------------------------

    /// Correct inconsistencies left by external actions or a crash.
    /// Runs on load and at the start of every tick.
    pub fn reconcile(&mut self) -> Vec<Repair> {
        let mut repairs = Vec::new();

        for dir in Direction::ALL {
            let side = self.get(dir);
            if side.is_flat() && side.hedge_locked && !self.get(dir.opposite()).is_flat() {
                self.get_mut(dir).reset_position();
                self.release_all();
                repairs.push(Repair::ExternalFlatten(dir));
            }
        }

        if self.is_flat() && (self.long.has_hedge_residue() || self.short.has_hedge_residue()) {
            self.release_all();
            repairs.push(Repair::AutoUnlock);
        }

        for dir in Direction::ALL {
            let side = self.get(dir);
            if side.is_flat() && !side.hedge_locked && side.has_position_residue() {
                self.get_mut(dir).reset_position();
                repairs.push(Repair::ResetFlat(dir));
            }
        }

        // A lock that only lost its stop flag is still a lock; restore the
        // flag before judging the pairing.
        for dir in Direction::ALL {
            let side = self.get_mut(dir);
            if side.hedge_locked && !side.hedge_stop {
                side.hedge_stop = true;
                repairs.push(Repair::StopFlagRestored(dir));
            }
        }

        if !self.pairing_consistent() {
            self.release_all();
            repairs.push(Repair::SplitLock);
        }

        self.refresh_opposite();
        repairs
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
