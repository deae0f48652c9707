//! Risk guard.
//!
//! Stateless checks run before an add is honoured: the per-direction
//! position cap and the fast-add cooldown. A denial never errors the tick;
//! the decision engine moves on to its next rule.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;

use crate::state::DirectionState;
use crate::strategy::StrategyConfig;
use crate::types::Direction;

/// Why an add was denied.
#[derive(Debug, Clone, PartialEq)]
pub enum RiskDenial {
    /// The add would push the direction past `max_total_qty`.
    PositionCap { projected: Decimal, max_total_qty: Decimal },
    /// A previous add on this direction is too recent.
    FastAddCooldown { remaining_secs: i64 },
}

impl fmt::Display for RiskDenial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskDenial::PositionCap { projected, max_total_qty } => {
                write!(f, "projected qty {projected} exceeds cap {max_total_qty}")
            }
            RiskDenial::FastAddCooldown { remaining_secs } => {
                write!(f, "fast-add cooldown, {remaining_secs}s remaining")
            }
        }
    }
}

pub struct RiskGuard;

impl RiskGuard {
    /// Check whether `direction` may add now.
    pub fn check_add(
        direction: Direction,
        side: &DirectionState,
        config: &StrategyConfig,
        now: DateTime<Utc>,
    ) -> Result<(), RiskDenial> {
        let params = config.direction(direction);

        let projected = side.qty.checked_add(params.add_qty(side.add_times)).unwrap_or(Decimal::MAX);
        if projected > config.risk.max_total_qty {
            return Err(RiskDenial::PositionCap {
                projected,
                max_total_qty: config.risk.max_total_qty,
            });
        }

        if let Some(until) = side.fast_add_paused_until {
            if now < until {
                let remaining = until - now;
                // Round up so a sub-second wait never reports zero.
                let secs = remaining.num_seconds() + i64::from(remaining.num_milliseconds() % 1000 != 0);
                return Err(RiskDenial::FastAddCooldown { remaining_secs: secs });
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
