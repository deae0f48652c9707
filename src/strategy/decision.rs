//! Decision engine.
//!
//! Turns the current price plus persisted per-direction state into at most
//! one trading intent per tick. Directions are evaluated in fixed order
//! (long, then short); within a direction the rules run in priority order:
//!
//! 1. hedge gate: a stopped direction only checks its unlock conditions
//! 2. hedge trigger on a fully loaded, deeply underwater direction
//! 3. cooldown gate
//! 4. open the first order on a flat direction
//! 5. first-order take-profit
//! 6. martingale add (through the risk guard)
//! 7. average-price take-profit
//!
//! The first rule that qualifies wins. Auto-unlock of flattened pairs is a
//! state repair and runs in [`AccountState::reconcile`] before evaluation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::debug;

use crate::precision::{trunc_price, trunc_qty};
use crate::state::{AccountState, DirectionState};
use crate::strategy::risk::RiskGuard;
use crate::strategy::StrategyConfig;
use crate::types::{Direction, ProfitType, SignalMetadata, SignalType, StopType, TradingSignal};

/// Inputs shared by every rule for one direction.
struct Ctx<'a> {
    dir: Direction,
    side: &'a DirectionState,
    state: &'a AccountState,
    config: &'a StrategyConfig,
    symbol: &'a str,
    price: Decimal,
    now: DateTime<Utc>,
}

impl Ctx<'_> {
    fn signal(&self, kind: SignalType, quantity: Decimal, reason: String, metadata: SignalMetadata) -> TradingSignal {
        TradingSignal {
            kind,
            symbol: self.symbol.to_string(),
            quantity: trunc_qty(quantity),
            price: Some(self.price),
            reason,
            metadata: SignalMetadata {
                direction: Some(self.dir),
                ..metadata
            },
        }
    }
}

pub struct DecisionEngine;

impl DecisionEngine {
    /// Evaluate one tick. Returns a `None`-kind signal when nothing qualifies.
    pub fn evaluate(
        state: &AccountState,
        config: &StrategyConfig,
        symbol: &str,
        price: Decimal,
        now: DateTime<Utc>,
    ) -> TradingSignal {
        if price <= Decimal::ZERO {
            debug!(symbol, %price, "Non-positive price, skipping evaluation");
            return TradingSignal::none(symbol);
        }
        if state.in_exchange_fault(now) {
            debug!(symbol, until = ?state.exchange_fault_until, "Exchange fault back-off active");
            return TradingSignal::none(symbol);
        }

        for dir in Direction::ALL {
            let ctx = Ctx {
                dir,
                side: state.get(dir),
                state,
                config,
                symbol,
                price,
                now,
            };
            if let Some(signal) = Self::evaluate_direction(&ctx) {
                return signal;
            }
        }

        TradingSignal::none(symbol)
    }

    fn evaluate_direction(ctx: &Ctx<'_>) -> Option<TradingSignal> {
        if ctx.side.hedge_stop() {
            return Self::check_unlock_take_profit(ctx).or_else(|| Self::check_unlock_stop_loss(ctx));
        }

        if let Some(signal) = Self::check_hedge_trigger(ctx) {
            return Some(signal);
        }

        if ctx.side.in_cooldown(ctx.now) {
            debug!(direction = %ctx.dir, until = ?ctx.side.cooldown_until, "Direction cooling down");
            return None;
        }

        if ctx.side.is_flat() {
            return Self::check_open(ctx);
        }

        Self::check_first_order_take_profit(ctx)
            .or_else(|| Self::check_add(ctx))
            .or_else(|| Self::check_average_take_profit(ctx))
    }

    // -- Hedge gate ------------------------------------------------------

    fn check_unlock_take_profit(ctx: &Ctx<'_>) -> Option<TradingSignal> {
        let side = ctx.side;
        if !side.hedge_locked() || side.is_flat() {
            return None;
        }
        let profit_ratio = ctx.dir.favorable_ratio(side.avg_price, ctx.price);
        let threshold = ctx.config.with_slippage(ctx.config.hedge.release_tp_after_full.get(ctx.dir));
        if profit_ratio < threshold {
            return None;
        }
        Some(ctx.signal(
            SignalType::TakeProfit,
            side.qty,
            format!("hedge unlock take-profit: {} ratio {profit_ratio} >= {threshold}", ctx.dir),
            SignalMetadata {
                profit_type: Some(ProfitType::HedgeUnlock),
                ratio: Some(profit_ratio),
                threshold: Some(threshold),
                ..Default::default()
            },
        ))
    }

    /// Release a losing locked side once its loss fits inside the profit
    /// the opposite side banked on its own release. Without banked profit
    /// there is nothing to absorb the loss and the lock holds.
    fn check_unlock_stop_loss(ctx: &Ctx<'_>) -> Option<TradingSignal> {
        let side = ctx.side;
        if !side.hedge_locked() || side.is_flat() || side.locked_profit() <= Decimal::ZERO {
            return None;
        }
        let loss_ratio = (-ctx.dir.favorable_ratio(side.avg_price, ctx.price)).max(Decimal::ZERO);
        let loss_amount = trunc_qty(side.qty * side.avg_price * loss_ratio);
        let allowance = trunc_qty(side.locked_profit() * ctx.config.hedge.release_sl_loss_ratio.get(ctx.dir));
        if loss_amount > allowance {
            debug!(
                direction = %ctx.dir,
                %loss_amount,
                %allowance,
                "Locked loss not yet covered"
            );
            return None;
        }
        Some(ctx.signal(
            SignalType::StopLoss,
            side.qty,
            format!("hedge unlock stop-loss: loss {loss_amount} <= covered {allowance}"),
            SignalMetadata {
                stop_type: Some(StopType::HedgeUnlock),
                ratio: Some(loss_ratio),
                threshold: Some(allowance),
                ..Default::default()
            },
        ))
    }

    // -- Hedge trigger ---------------------------------------------------

    fn check_hedge_trigger(ctx: &Ctx<'_>) -> Option<TradingSignal> {
        let side = ctx.side;
        let params = ctx.config.direction(ctx.dir);
        if !ctx.config.hedge.enabled || side.hedge_locked() || side.is_flat() || !params.is_full(side.add_times) {
            return None;
        }
        let base = side.fill_base();
        let loss_ratio = (-ctx.dir.favorable_ratio(base, ctx.price)).max(Decimal::ZERO);
        let trigger = ctx.config.hedge.trigger_loss;
        if loss_ratio < trigger || side.qty < side.opposite_qty {
            return None;
        }
        let hedge_side = ctx.dir.opposite();
        Some(ctx.signal(
            SignalType::Hedge,
            (side.qty - side.opposite_qty).abs(),
            format!("{} fully loaded, down {loss_ratio} from {base} >= {trigger}, lock with {hedge_side}", ctx.dir),
            SignalMetadata {
                hedge_side: Some(hedge_side),
                ratio: Some(loss_ratio),
                threshold: Some(trigger),
                ..Default::default()
            },
        ))
    }

    // -- Ordinary rules --------------------------------------------------

    fn check_open(ctx: &Ctx<'_>) -> Option<TradingSignal> {
        // A partially released pair waits for the locked side to resolve.
        if ctx.state.get(ctx.dir.opposite()).hedge_locked() {
            debug!(direction = %ctx.dir, "Opposite side still locked, not reopening");
            return None;
        }
        let qty = ctx.config.direction(ctx.dir).first_qty;
        Some(ctx.signal(
            SignalType::open(ctx.dir),
            qty,
            format!("{} flat, open first order", ctx.dir),
            SignalMetadata::default(),
        ))
    }

    fn check_first_order_take_profit(ctx: &Ctx<'_>) -> Option<TradingSignal> {
        let side = ctx.side;
        if side.add_times != 0 {
            return None;
        }
        let ratio = ctx.dir.favorable_ratio(side.avg_price, ctx.price);
        let threshold = ctx.config.with_slippage(ctx.config.direction(ctx.dir).tp_first_order);
        if ratio < threshold {
            return None;
        }
        Some(ctx.signal(
            SignalType::TakeProfit,
            side.qty,
            format!("first order take-profit: ratio {ratio} >= {threshold}"),
            SignalMetadata {
                profit_type: Some(ProfitType::FirstOrder),
                ratio: Some(ratio),
                threshold: Some(threshold),
                ..Default::default()
            },
        ))
    }

    fn check_add(ctx: &Ctx<'_>) -> Option<TradingSignal> {
        let side = ctx.side;
        let params = ctx.config.direction(ctx.dir);
        if params.is_full(side.add_times) {
            return None;
        }
        let base = side.fill_base();
        let target = match ctx.dir {
            Direction::Long => trunc_price(base * (Decimal::ONE - params.add_interval)),
            Direction::Short => trunc_price(base * (Decimal::ONE + params.add_interval)),
        };
        let crossed = match ctx.dir {
            Direction::Long => ctx.price <= target,
            Direction::Short => ctx.price >= target,
        };
        if !crossed {
            return None;
        }
        if let Err(denial) = RiskGuard::check_add(ctx.dir, side, ctx.config, ctx.now) {
            debug!(
                direction = %ctx.dir,
                add_times = side.add_times,
                qty = %side.qty,
                price = %ctx.price,
                reason = %denial,
                "Add denied by risk guard"
            );
            return None;
        }
        let qty = params.add_qty(side.add_times);
        Some(ctx.signal(
            SignalType::add(ctx.dir),
            qty,
            format!("add #{}: price {} crossed {target} (base {base})", side.add_times + 1, ctx.price),
            SignalMetadata {
                threshold: Some(target),
                ..Default::default()
            },
        ))
    }

    fn check_average_take_profit(ctx: &Ctx<'_>) -> Option<TradingSignal> {
        let side = ctx.side;
        if side.add_times == 0 {
            return None;
        }
        let params = ctx.config.direction(ctx.dir);
        let (profit_type, raw) = if params.is_full(side.add_times) {
            (ProfitType::AfterFull, params.tp_after_full)
        } else {
            (ProfitType::BeforeFull, params.tp_before_full)
        };
        let threshold = ctx.config.with_slippage(raw);
        let ratio = ctx.dir.favorable_ratio(side.avg_price, ctx.price);
        if ratio < threshold {
            return None;
        }
        Some(ctx.signal(
            SignalType::TakeProfit,
            side.qty,
            format!("average take-profit ({}): ratio {ratio} >= {threshold}", profit_type.as_str()),
            SignalMetadata {
                profit_type: Some(profit_type),
                ratio: Some(ratio),
                threshold: Some(threshold),
                ..Default::default()
            },
        ))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    const SYMBOL: &str = "ETHUSDT";

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z").unwrap().with_timezone(&Utc)
    }

    fn earlier() -> DateTime<Utc> {
        now() - Duration::hours(1)
    }

    /// Both directions open with one first order at 3000.
    fn open_pair() -> AccountState {
        let mut state = AccountState::default();
        state.record_open(Direction::Long, dec!(0.01), dec!(3000), earlier());
        state.record_open(Direction::Short, dec!(0.01), dec!(3000), earlier());
        state
    }

    /// Long fully loaded (3 adds, 0.15 total) at a last fill of 3000.
    fn loaded_long() -> AccountState {
        let mut state = AccountState::default();
        state.record_open(Direction::Long, dec!(0.01), dec!(3000), earlier());
        state.record_add(Direction::Long, dec!(0.02), dec!(3000), earlier(), earlier());
        state.record_add(Direction::Long, dec!(0.04), dec!(3000), earlier(), earlier());
        state.record_add(Direction::Long, dec!(0.08), dec!(3000), earlier(), earlier());
        state
    }

    fn locked(mut state: AccountState) -> AccountState {
        state.apply_hedge_lock(|_| true);
        state
    }

    fn eval(state: &AccountState, cfg: &StrategyConfig, price: Decimal) -> TradingSignal {
        DecisionEngine::evaluate(state, cfg, SYMBOL, price, now())
    }

    #[test]
    fn test_scenario_a_add_long() {
        let cfg = StrategyConfig::sample();
        let state = open_pair();
        let sig = eval(&state, &cfg, dec!(2940));
        assert_eq!(sig.kind, SignalType::AddLong);
        assert_eq!(sig.quantity, dec!(0.02));
        assert_eq!(sig.symbol, SYMBOL);
        assert_eq!(sig.price, Some(dec!(2940)));
    }

    #[test]
    fn test_add_quantity_follows_add_count() {
        let cfg = StrategyConfig::sample();
        let mut state = open_pair();
        state.record_add(Direction::Long, dec!(0.02), dec!(3000), earlier(), earlier());
        state.record_add(Direction::Long, dec!(0.04), dec!(3000), earlier(), earlier());
        let sig = eval(&state, &cfg, dec!(2940));
        assert_eq!(sig.kind, SignalType::AddLong);
        assert_eq!(sig.quantity, dec!(0.01) * dec!(8));
    }

    #[test]
    fn test_no_add_before_target() {
        let cfg = StrategyConfig::sample();
        let state = open_pair();
        assert_ne!(eval(&state, &cfg, dec!(2941)).kind, SignalType::AddLong);
    }

    #[test]
    fn test_quiet_market_yields_none() {
        let cfg = StrategyConfig::sample();
        let state = open_pair();
        assert!(eval(&state, &cfg, dec!(2990)).is_none());
    }

    #[test]
    fn test_short_add_on_rise() {
        let cfg = StrategyConfig::sample();
        let mut state = open_pair();
        state.record_close(Direction::Long, earlier());
        state.long.cooldown_until = Some(now() + Duration::minutes(1));
        let sig = eval(&state, &cfg, dec!(3060));
        assert_eq!(sig.kind, SignalType::AddShort);
        assert_eq!(sig.quantity, dec!(0.02));
        assert_eq!(sig.direction(), Some(Direction::Short));
    }

    #[test]
    fn test_scenario_b_first_order_take_profit() {
        let cfg = StrategyConfig::sample();
        let state = open_pair();
        let sig = eval(&state, &cfg, dec!(3030));
        assert_eq!(sig.kind, SignalType::TakeProfit);
        assert_eq!(sig.quantity, dec!(0.01));
        assert_eq!(sig.metadata.direction, Some(Direction::Long));
        assert_eq!(sig.metadata.profit_type, Some(ProfitType::FirstOrder));
    }

    #[test]
    fn test_slippage_lowers_threshold() {
        let mut cfg = StrategyConfig::sample();
        assert!(eval(&open_pair(), &cfg, dec!(3029)).is_none());
        cfg.risk.tp_slippage = dec!(0.05);
        // 0.01 × 0.95 = 0.0095; 3029 is +0.00966
        let sig = eval(&open_pair(), &cfg, dec!(3029));
        assert_eq!(sig.kind, SignalType::TakeProfit);
        assert_eq!(sig.metadata.threshold, Some(dec!(0.0095)));
    }

    #[test]
    fn test_scenario_c_hedge_trigger() {
        let cfg = StrategyConfig::sample();
        let state = loaded_long();
        assert_eq!(state.long.qty, dec!(0.15));
        let sig = eval(&state, &cfg, dec!(2850));
        assert_eq!(sig.kind, SignalType::Hedge);
        assert_eq!(sig.quantity, dec!(0.15));
        assert_eq!(sig.metadata.direction, Some(Direction::Long));
        assert_eq!(sig.metadata.hedge_side, Some(Direction::Short));
    }

    #[test]
    fn test_hedge_quantity_is_difference() {
        let cfg = StrategyConfig::sample();
        let mut state = loaded_long();
        state.record_open(Direction::Short, dec!(0.05), dec!(3000), earlier());
        let sig = eval(&state, &cfg, dec!(2850));
        assert_eq!(sig.kind, SignalType::Hedge);
        assert_eq!(sig.quantity, dec!(0.10));
    }

    #[test]
    fn test_no_hedge_when_opposite_heavier() {
        let cfg = StrategyConfig::sample();
        let mut state = loaded_long();
        state.record_open(Direction::Short, dec!(0.2), dec!(3000), earlier());
        let sig = eval(&state, &cfg, dec!(2850));
        assert_ne!(sig.kind, SignalType::Hedge);
    }

    #[test]
    fn test_no_hedge_before_trigger_loss() {
        let cfg = StrategyConfig::sample();
        let state = loaded_long();
        let sig = eval(&state, &cfg, dec!(2851));
        assert_ne!(sig.kind, SignalType::Hedge);
    }

    #[test]
    fn test_hedge_disabled() {
        let mut cfg = StrategyConfig::sample();
        cfg.hedge.enabled = false;
        let sig = eval(&loaded_long(), &cfg, dec!(2850));
        assert_ne!(sig.kind, SignalType::Hedge);
    }

    #[test]
    fn test_locked_state_never_rehedges() {
        let cfg = StrategyConfig::sample();
        let mut state = loaded_long();
        state.record_open(Direction::Short, dec!(0.15), dec!(2850), now());
        let state = locked(state);
        for _ in 0..3 {
            let sig = eval(&state, &cfg, dec!(2800));
            assert_ne!(sig.kind, SignalType::Hedge);
            assert_ne!(sig.kind, SignalType::AddLong);
        }
    }

    #[test]
    fn test_scenario_d_unlock_take_profit_signal() {
        let cfg = StrategyConfig::sample();
        let mut state = loaded_long();
        state.record_open(Direction::Short, dec!(0.15), dec!(2850), now());
        let state = locked(state);
        // Long avg 3000; release threshold 0.02 → 3060.
        let sig = eval(&state, &cfg, dec!(3060));
        assert_eq!(sig.kind, SignalType::TakeProfit);
        assert_eq!(sig.quantity, dec!(0.15));
        assert_eq!(sig.metadata.direction, Some(Direction::Long));
        assert_eq!(sig.metadata.profit_type, Some(ProfitType::HedgeUnlock));
        assert!(sig.is_hedge_unlock());
    }

    #[test]
    fn test_unlock_take_profit_for_short_side() {
        let cfg = StrategyConfig::sample();
        let mut state = loaded_long();
        state.record_open(Direction::Short, dec!(0.15), dec!(2850), now());
        let state = locked(state);
        // Short avg 2850, +2% for short is 2793.
        let sig = eval(&state, &cfg, dec!(2793));
        assert_eq!(sig.kind, SignalType::TakeProfit);
        assert_eq!(sig.metadata.direction, Some(Direction::Short));
        assert_eq!(sig.metadata.profit_type, Some(ProfitType::HedgeUnlock));
    }

    #[test]
    fn test_locked_pair_without_banked_profit_holds() {
        let cfg = StrategyConfig::sample();
        let mut state = loaded_long();
        state.record_open(Direction::Short, dec!(0.15), dec!(2850), now());
        let state = locked(state);
        // Short is slightly in profit, long in loss; nothing banked yet.
        assert!(eval(&state, &cfg, dec!(2840)).is_none());
    }

    #[test]
    fn test_unlock_stop_loss_when_covered() {
        let cfg = StrategyConfig::sample();
        let mut state = loaded_long();
        state.record_open(Direction::Short, dec!(0.15), dec!(2850), now());
        let mut state = locked(state);
        // Short released with 9 profit banked on long.
        state.release_take_profit(Direction::Short, dec!(9));

        // Long avg 3000, qty 0.15: at 2950 loss = 0.15 × 3000 × 0.01666666 = 7.499997
        let sig = eval(&state, &cfg, dec!(2950));
        assert_eq!(sig.kind, SignalType::StopLoss);
        assert_eq!(sig.quantity, dec!(0.15));
        assert_eq!(sig.metadata.stop_type, Some(StopType::HedgeUnlock));
        assert_eq!(sig.metadata.direction, Some(Direction::Long));

        // At 2900 loss = 15 > 9: still locked.
        assert!(eval(&state, &cfg, dec!(2900)).is_none());
    }

    #[test]
    fn test_unlock_stop_loss_scaled_by_ratio() {
        let mut cfg = StrategyConfig::sample();
        cfg.hedge.release_sl_loss_ratio.long = dec!(0.5);
        let mut state = locked(loaded_long());
        state.release_take_profit(Direction::Short, dec!(9));
        // Allowance 4.5 < loss 7.499997 at 2950.
        assert!(eval(&state, &cfg, dec!(2950)).is_none());
        // At 2990 loss = 0.15 × 3000 × 0.00333333 = 1.4999985
        assert_eq!(eval(&state, &cfg, dec!(2990)).kind, SignalType::StopLoss);
    }

    #[test]
    fn test_partial_release_does_not_reopen_flat_side() {
        let cfg = StrategyConfig::sample();
        let mut state = loaded_long();
        state.record_open(Direction::Short, dec!(0.15), dec!(2850), now());
        let mut state = locked(state);
        state.release_take_profit(Direction::Short, dec!(9));
        // Long loss at 2700 far exceeds 9: long holds, short must not reopen.
        assert!(eval(&state, &cfg, dec!(2700)).is_none());
    }

    #[test]
    fn test_open_first_when_flat() {
        let cfg = StrategyConfig::sample();
        let state = AccountState::default();
        let sig = eval(&state, &cfg, dec!(3000));
        assert_eq!(sig.kind, SignalType::OpenLong);
        assert_eq!(sig.quantity, dec!(0.01));
    }

    #[test]
    fn test_open_short_when_long_open() {
        let cfg = StrategyConfig::sample();
        let mut state = AccountState::default();
        state.record_open(Direction::Long, dec!(0.01), dec!(3000), earlier());
        let sig = eval(&state, &cfg, dec!(3000));
        assert_eq!(sig.kind, SignalType::OpenShort);
    }

    #[test]
    fn test_cooldown_skips_direction() {
        let cfg = StrategyConfig::sample();
        let mut state = AccountState::default();
        state.long.cooldown_until = Some(now() + Duration::seconds(30));
        let sig = eval(&state, &cfg, dec!(3000));
        assert_eq!(sig.kind, SignalType::OpenShort);

        state.short.cooldown_until = Some(now() + Duration::seconds(30));
        assert!(eval(&state, &cfg, dec!(3000)).is_none());
    }

    #[test]
    fn test_hedge_trigger_ignores_cooldown() {
        let cfg = StrategyConfig::sample();
        let mut state = loaded_long();
        state.long.cooldown_until = Some(now() + Duration::minutes(10));
        assert_eq!(eval(&state, &cfg, dec!(2850)).kind, SignalType::Hedge);
    }

    #[test]
    fn test_average_take_profit_before_full() {
        let cfg = StrategyConfig::sample();
        let mut state = open_pair();
        state.record_add(Direction::Long, dec!(0.02), dec!(2940), earlier(), earlier());
        // avg 2960; +0.8% = 2983.68
        assert!(eval(&state, &cfg, dec!(2983)).is_none());
        let sig = eval(&state, &cfg, dec!(2983.68));
        assert_eq!(sig.kind, SignalType::TakeProfit);
        assert_eq!(sig.quantity, dec!(0.03));
        assert_eq!(sig.metadata.profit_type, Some(ProfitType::BeforeFull));
    }

    #[test]
    fn test_average_take_profit_after_full() {
        let cfg = StrategyConfig::sample();
        let mut state = loaded_long();
        state.record_open(Direction::Short, dec!(0.01), dec!(3000), earlier());
        // avg 3000; after-full threshold 0.5% → 3015
        let sig = eval(&state, &cfg, dec!(3015));
        assert_eq!(sig.kind, SignalType::TakeProfit);
        assert_eq!(sig.metadata.profit_type, Some(ProfitType::AfterFull));
    }

    fn assert_short_take_profit(sig: &TradingSignal) {
        assert_eq!(sig.kind, SignalType::TakeProfit);
        assert_eq!(sig.metadata.direction, Some(Direction::Short));
        assert_eq!(sig.metadata.profit_type, Some(ProfitType::FirstOrder));
    }

    #[test]
    fn test_risk_denial_falls_through() {
        let mut cfg = StrategyConfig::sample();
        cfg.risk.max_total_qty = dec!(0.02);
        let state = open_pair();
        // Long add would reach 0.03 > 0.02: denied, evaluation moves on to
        // the short side, which is +2% and takes profit.
        assert_short_take_profit(&eval(&state, &cfg, dec!(2940)));
    }

    #[test]
    fn test_fast_add_window_blocks_add() {
        let cfg = StrategyConfig::sample();
        let mut state = open_pair();
        state.long.fast_add_paused_until = Some(now() + Duration::seconds(10));
        assert_short_take_profit(&eval(&state, &cfg, dec!(2940)));
    }

    #[test]
    fn test_long_evaluated_before_short() {
        let cfg = StrategyConfig::sample();
        let mut state = open_pair();
        // Short first-order TP at 2970 (+1% for short) and long add at 2940
        // both qualify at 2940; long wins.
        state.short.avg_price = dec!(2970);
        let sig = eval(&state, &cfg, dec!(2940));
        assert_eq!(sig.kind, SignalType::AddLong);
    }

    #[test]
    fn test_exchange_fault_suppresses_signals() {
        let cfg = StrategyConfig::sample();
        let mut state = AccountState::default();
        state.exchange_fault_until = Some(now() + Duration::seconds(5));
        assert!(eval(&state, &cfg, dec!(3000)).is_none());
    }

    #[test]
    fn test_non_positive_price() {
        let cfg = StrategyConfig::sample();
        assert!(eval(&AccountState::default(), &cfg, Decimal::ZERO).is_none());
    }
}
