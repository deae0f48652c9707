//! Strategy layer: parameters, the decision engine and the risk guard.
//!
//! `StrategyConfig` is read-only for the duration of a tick. It is loaded
//! from the `[accounts.strategy]` table of `config.toml` and validated once
//! at start.

pub mod decision;
pub mod risk;

use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::precision::{pow, trunc_qty, wait_secs, MAX_WAIT_SECS};
use crate::types::{Direction, HedgeError};

/// Upper bound on `max_add_times`.
pub const MAX_ADD_TIMES: u32 = 30;
/// Upper bound on one direction's full ladder (first order plus every add).
pub const MAX_LADDER_QTY: Decimal = rust_decimal_macros::dec!(1000000000);

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Per-direction martingale parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionParams {
    /// Quantity of the first order.
    pub first_qty: Decimal,
    /// Multiplier applied per add: add N has `first_qty × add_ratio^N`.
    pub add_ratio: Decimal,
    /// Adverse move from the last fill that triggers an add.
    pub add_interval: Decimal,
    pub max_add_times: u32,
    /// Take-profit ratio while only the first order is open.
    pub tp_first_order: Decimal,
    /// Take-profit ratio on the average price before the add limit.
    pub tp_before_full: Decimal,
    /// Take-profit ratio on the average price once fully loaded.
    pub tp_after_full: Decimal,
}

impl DirectionParams {
    /// Quantity of the next add given the adds already applied.
    /// Saturates at `Decimal::MAX`; `validate` keeps real ladders far below.
    pub fn add_qty(&self, add_times: u32) -> Decimal {
        pow(self.add_ratio, add_times + 1)
            .and_then(|factor| self.first_qty.checked_mul(factor))
            .map(trunc_qty)
            .unwrap_or(Decimal::MAX)
    }

    /// First order plus every add, `None` on overflow.
    fn ladder_total(&self) -> Option<Decimal> {
        let mut total = self.first_qty;
        for n in 1..=self.max_add_times {
            let step = self.first_qty.checked_mul(pow(self.add_ratio, n)?)?;
            total = total.checked_add(step)?;
        }
        Some(total)
    }

    pub fn is_full(&self, add_times: u32) -> bool {
        add_times >= self.max_add_times
    }

    fn validate(&self, dir: Direction) -> Result<(), HedgeError> {
        if self.first_qty <= Decimal::ZERO {
            return Err(HedgeError::Config(format!("{dir}.first_qty must be positive")));
        }
        if self.add_ratio <= Decimal::ZERO {
            return Err(HedgeError::Config(format!("{dir}.add_ratio must be positive")));
        }
        if self.max_add_times > MAX_ADD_TIMES {
            return Err(HedgeError::Config(format!("{dir}.max_add_times must be at most {MAX_ADD_TIMES}")));
        }
        match self.ladder_total() {
            Some(total) if total <= MAX_LADDER_QTY => {}
            _ => {
                return Err(HedgeError::Config(format!(
                    "{dir} ladder (first_qty, add_ratio, max_add_times) exceeds {MAX_LADDER_QTY}"
                )))
            }
        }
        for (name, v) in [
            ("add_interval", self.add_interval),
            ("tp_first_order", self.tp_first_order),
            ("tp_before_full", self.tp_before_full),
            ("tp_after_full", self.tp_after_full),
        ] {
            if v < Decimal::ZERO {
                return Err(HedgeError::Config(format!("{dir}.{name} must not be negative")));
            }
        }
        Ok(())
    }
}

/// A value kept separately for each direction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerDirection<T> {
    pub long: T,
    pub short: T,
}

impl<T: Copy> PerDirection<T> {
    pub fn get(&self, direction: Direction) -> T {
        match direction {
            Direction::Long => self.long,
            Direction::Short => self.short,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Hedge-lock parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HedgeParams {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Adverse move from the last fill on a fully loaded side that locks.
    pub trigger_loss: Decimal,
    /// Quantity difference below which the pair counts as balanced.
    pub equal_eps: Decimal,
    /// Wait after a lock. Absent or zero falls back to the risk cooldown.
    #[serde(default)]
    pub min_wait_seconds: Option<u64>,
    /// Profit ratio at which a locked side is released with profit.
    pub release_tp_after_full: PerDirection<Decimal>,
    /// Share of the opposite side's locked profit that may absorb this
    /// side's loss on release.
    pub release_sl_loss_ratio: PerDirection<Decimal>,
}

/// Account-level risk parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskParams {
    /// Multiplicative discount on take-profit thresholds.
    pub tp_slippage: Decimal,
    /// Cap on one direction's quantity after an add.
    pub max_total_qty: Decimal,
    pub cooldown_minutes: u64,
    /// Minimum seconds between two adds on the same direction.
    pub fast_add_window: u64,
}

/// Fully-resolved strategy configuration for one account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub long: DirectionParams,
    pub short: DirectionParams,
    pub hedge: HedgeParams,
    pub risk: RiskParams,
}

impl StrategyConfig {
    pub fn direction(&self, direction: Direction) -> &DirectionParams {
        match direction {
            Direction::Long => &self.long,
            Direction::Short => &self.short,
        }
    }

    /// `threshold × (1 - tp_slippage)`.
    pub fn with_slippage(&self, threshold: Decimal) -> Decimal {
        threshold * (Decimal::ONE - self.risk.tp_slippage)
    }

    pub fn cooldown(&self) -> Duration {
        wait_secs(self.risk.cooldown_minutes.saturating_mul(60))
    }

    /// Wait applied to both directions after a lock.
    pub fn hedge_wait(&self) -> Duration {
        match self.hedge.min_wait_seconds {
            Some(secs) if secs > 0 => wait_secs(secs),
            _ => self.cooldown(),
        }
    }

    pub fn fast_add_window(&self) -> Duration {
        wait_secs(self.risk.fast_add_window)
    }

    pub fn validate(&self) -> Result<(), HedgeError> {
        self.long.validate(Direction::Long)?;
        self.short.validate(Direction::Short)?;

        if self.hedge.trigger_loss < Decimal::ZERO {
            return Err(HedgeError::Config("hedge.trigger_loss must not be negative".into()));
        }
        if self.hedge.equal_eps < Decimal::ZERO {
            return Err(HedgeError::Config("hedge.equal_eps must not be negative".into()));
        }
        for dir in Direction::ALL {
            if self.hedge.release_tp_after_full.get(dir) < Decimal::ZERO
                || self.hedge.release_sl_loss_ratio.get(dir) < Decimal::ZERO
            {
                return Err(HedgeError::Config(format!(
                    "hedge release ratios for {dir} must not be negative"
                )));
            }
        }
        if self.risk.tp_slippage < Decimal::ZERO || self.risk.tp_slippage >= Decimal::ONE {
            return Err(HedgeError::Config("risk.tp_slippage must be in [0, 1)".into()));
        }
        if self.risk.max_total_qty <= Decimal::ZERO {
            return Err(HedgeError::Config("risk.max_total_qty must be positive".into()));
        }
        for (name, secs) in [
            ("hedge.min_wait_seconds", self.hedge.min_wait_seconds.unwrap_or(0)),
            ("risk.cooldown_minutes", self.risk.cooldown_minutes.saturating_mul(60)),
            ("risk.fast_add_window", self.risk.fast_add_window),
        ] {
            if secs > MAX_WAIT_SECS {
                return Err(HedgeError::Config(format!("{name} exceeds {MAX_WAIT_SECS} seconds")));
            }
        }
        Ok(())
    }

    /// Parameters used throughout the unit tests.
    #[cfg(test)]
    pub fn sample() -> Self {
        use rust_decimal_macros::dec;
        let side = DirectionParams {
            first_qty: dec!(0.01),
            add_ratio: dec!(2.0),
            add_interval: dec!(0.02),
            max_add_times: 3,
            tp_first_order: dec!(0.01),
            tp_before_full: dec!(0.008),
            tp_after_full: dec!(0.005),
        };
        StrategyConfig {
            long: side.clone(),
            short: side,
            hedge: HedgeParams {
                enabled: true,
                trigger_loss: dec!(0.05),
                equal_eps: dec!(0.0001),
                min_wait_seconds: Some(300),
                release_tp_after_full: PerDirection { long: dec!(0.02), short: dec!(0.02) },
                release_sl_loss_ratio: PerDirection { long: dec!(1.0), short: dec!(1.0) },
            },
            risk: RiskParams {
                tp_slippage: Decimal::ZERO,
                max_total_qty: dec!(1.0),
                cooldown_minutes: 5,
                fast_add_window: 60,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
