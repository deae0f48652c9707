//! Fixed-point helpers.
//!
//! Quantities and ratios are truncated toward zero at 8 decimal places,
//! prices at 4, matching exchange lot-size and tick-size conventions.
//! Nothing in the decision path touches binary floating point.

use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;
use tracing::warn;

use crate::types::HedgeError;

/// Decimal places kept for quantities (lot size).
pub const QTY_DP: u32 = 8;
/// Decimal places kept for prices (tick size).
pub const PRICE_DP: u32 = 4;
/// Decimal places kept for price-move ratios.
pub const RATIO_DP: u32 = 8;
/// Longest wait any configured duration may ask for (30 days).
pub const MAX_WAIT_SECS: u64 = 30 * 24 * 3600;

/// Truncate a quantity toward zero at 8 decimal places.
pub fn trunc_qty(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(QTY_DP, RoundingStrategy::ToZero)
}

/// Truncate a price toward zero at 4 decimal places.
pub fn trunc_price(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(PRICE_DP, RoundingStrategy::ToZero)
}

/// Truncate a ratio toward zero at 8 decimal places.
pub fn trunc_ratio(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(RATIO_DP, RoundingStrategy::ToZero)
}

/// `base^exp` by repeated multiplication (no float round-trip).
/// `None` when the result does not fit in a `Decimal`.
pub fn pow(base: Decimal, exp: u32) -> Option<Decimal> {
    let mut acc = Decimal::ONE;
    for _ in 0..exp {
        acc = acc.checked_mul(base)?;
    }
    Some(acc)
}

/// Seconds as a chrono duration, capped at [`MAX_WAIT_SECS`].
pub fn wait_secs(secs: u64) -> chrono::Duration {
    chrono::Duration::seconds(secs.min(MAX_WAIT_SECS) as i64)
}

/// `(a - b) / b`, truncated; zero when `b` is zero.
pub fn relative_change(a: Decimal, b: Decimal) -> Decimal {
    if b.is_zero() {
        return Decimal::ZERO;
    }
    trunc_ratio((a - b) / b)
}

/// Parse a numeric field from an exchange payload. Blank is zero.
pub fn parse_decimal(field: &str, raw: &str) -> Result<Decimal, HedgeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Decimal::ZERO);
    }
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|_| HedgeError::Precision {
            field: field.to_string(),
            value: raw.to_string(),
        })
}

/// [`parse_decimal`] for the confirmation path: malformed values default
/// to zero and are logged; they never propagate.
pub fn parse_or_zero(field: &str, raw: &str) -> Decimal {
    parse_decimal(field, raw).unwrap_or_else(|e| {
        warn!(error = %e, "Defaulting malformed field to zero");
        Decimal::ZERO
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
