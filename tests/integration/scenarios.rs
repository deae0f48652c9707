//! Full tick-loop scenarios.
//!
//! Every test drives a real `AccountRunner` against the scripted exchange
//! with explicit timestamps, and checks the pairing invariant after every
//! tick.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

use hedgelock::config::ConfirmationConfig;
use hedgelock::engine::account::{AccountRunner, RunnerSettings, TickOutcome};
use hedgelock::events::{EngineEvent, EventKind, EventSink};
use hedgelock::precision::trunc_qty;
use hedgelock::state::Repair;
use hedgelock::storage::{JsonFileStore, MemoryStore, StateStore};
use hedgelock::strategy::{DirectionParams, HedgeParams, PerDirection, RiskParams, StrategyConfig};
use hedgelock::types::{Direction, PositionLeg, PositionSnapshot, SignalType};

use crate::mock_gateway::{ConfirmMode, ScriptedGateway};

const SYM: &str = "ETHUSDT";

fn strategy() -> StrategyConfig {
    let side = DirectionParams {
        first_qty: dec!(0.01),
        add_ratio: dec!(2),
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
            release_sl_loss_ratio: PerDirection { long: dec!(1), short: dec!(1) },
        },
        risk: RiskParams {
            tp_slippage: Decimal::ZERO,
            max_total_qty: dec!(1),
            cooldown_minutes: 5,
            fast_add_window: 60,
        },
    }
}

struct Harness {
    runner: AccountRunner,
    gw: Arc<ScriptedGateway>,
    events: broadcast::Receiver<EngineEvent>,
    _config: watch::Sender<StrategyConfig>,
    t0: DateTime<Utc>,
}

impl Harness {
    fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    fn with_store(store: Arc<dyn StateStore>) -> Self {
        let gw = ScriptedGateway::new(SYM, dec!(3000));
        let sink = EventSink::new(256);
        let events = sink.subscribe();
        let (config_tx, config_rx) = watch::channel(strategy());
        let settings = RunnerSettings {
            tick_interval: std::time::Duration::from_millis(10),
            fault_backoff: Duration::seconds(30),
            confirmation: ConfirmationConfig {
                max_wait_ms: 300,
                poll_interval_ms: 50,
                ..ConfirmationConfig::default()
            },
        };
        let t0 = DateTime::parse_from_rfc3339("2026-03-01T00:00:00Z").unwrap().with_timezone(&Utc);
        let mut runner = AccountRunner::new("acct-1", SYM, gw.clone(), store, sink, config_rx, settings);
        runner.load(t0).unwrap();
        Self { runner, gw, events, _config: config_tx, t0 }
    }

    fn at(&self, secs: i64) -> DateTime<Utc> {
        self.t0 + Duration::seconds(secs)
    }

    async fn tick(&mut self, price: Decimal, secs: i64) -> TickOutcome {
        self.gw.set_price(SYM, price);
        let outcome = self.runner.tick(self.at(secs)).await;
        let state = self.runner.state();
        assert!(state.pairing_consistent(), "pairing broken after tick at {secs}s: {state}");
        outcome
    }

    async fn expect_signal(&mut self, price: Decimal, secs: i64, kind: SignalType) {
        match self.tick(price, secs).await {
            TickOutcome::Acted(signal) => assert_eq!(signal.kind, kind, "at {secs}s: {signal}"),
            other => panic!("expected {kind} at {secs}s, got {other:?}"),
        }
    }

    fn drain(&mut self) -> Vec<EventKind> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            assert_eq!(event.account, "acct-1");
            out.push(event.kind);
        }
        out
    }

    /// Open both sides, load long to its add limit, then lock at 2680.
    async fn drive_to_lock(&mut self) {
        self.expect_signal(dec!(3000), 0, SignalType::OpenLong).await;
        self.expect_signal(dec!(3000), 1, SignalType::OpenShort).await;
        self.expect_signal(dec!(2940), 120, SignalType::AddLong).await;
        self.expect_signal(dec!(2881.2), 240, SignalType::AddLong).await;
        self.expect_signal(dec!(2823.5), 360, SignalType::AddLong).await;
        self.expect_signal(dec!(2680), 480, SignalType::Hedge).await;
    }
}

fn placed_events(kinds: &[EventKind]) -> Vec<String> {
    kinds
        .iter()
        .filter_map(|k| match k {
            EventKind::OrderPlaced { method, .. } => Some(method.clone()),
            _ => None,
        })
        .collect()
}

// -- Scenarios ----------------------------------------------------------

#[tokio::test]
async fn scenario_a_adds_long_after_adverse_move() {
    let mut h = Harness::new();
    h.expect_signal(dec!(3000), 0, SignalType::OpenLong).await;
    h.expect_signal(dec!(3000), 1, SignalType::OpenShort).await;
    h.expect_signal(dec!(2940), 120, SignalType::AddLong).await;

    let long = &h.runner.state().long;
    assert_eq!(long.qty, dec!(0.03));
    assert_eq!(long.avg_price, dec!(2960));
    assert_eq!(long.add_times, 1);
    assert_eq!(long.last_fill_price, dec!(2940));
    assert_eq!(long.fast_add_paused_until, Some(h.at(180)));

    let placed = h.gw.placed();
    assert_eq!(placed.len(), 3);
    assert_eq!(placed[2].quantity, dec!(0.02));
}

#[tokio::test]
async fn scenario_b_first_order_take_profit_then_cooldown() {
    let mut h = Harness::new();
    h.expect_signal(dec!(3000), 0, SignalType::OpenLong).await;
    h.expect_signal(dec!(3000), 1, SignalType::OpenShort).await;
    h.expect_signal(dec!(3030), 2, SignalType::TakeProfit).await;

    let long = &h.runner.state().long;
    assert!(long.is_flat());
    assert_eq!(long.add_times, 0);
    assert_eq!(long.cooldown_until, Some(h.at(2) + Duration::minutes(5)));

    // The flat long side waits out its cooldown.
    assert!(matches!(h.tick(dec!(3030), 3).await, TickOutcome::Idle));
    h.expect_signal(dec!(3030), 303, SignalType::OpenLong).await;
}

#[tokio::test]
async fn scenario_c_hedge_lock_balances_pair() {
    let mut h = Harness::new();
    h.drive_to_lock().await;

    let state = h.runner.state();
    assert_eq!(state.long.qty, dec!(0.15));
    assert_eq!(state.short.qty, dec!(0.15));
    assert_eq!(state.long.add_times, 3);
    for dir in Direction::ALL {
        let side = state.get(dir);
        assert!(side.hedge_locked());
        assert!(side.hedge_stop());
        assert_eq!(side.cooldown_until, Some(h.at(480 + 300)));
    }
    assert!(state.long.hedge_locked_on_full());
    assert!(!state.short.hedge_locked_on_full());

    let last = h.gw.placed().pop().unwrap();
    assert_eq!(last.position_side.direction(), Direction::Short);
    assert_eq!(last.quantity, dec!(0.14));

    let kinds = h.drain();
    assert!(kinds.iter().any(|k| matches!(k, EventKind::HedgeLocked { balanced_side: Some(Direction::Short), .. })));
    assert!(!kinds.iter().any(|k| matches!(k, EventKind::HedgeResidualImbalance { .. })));
}

#[tokio::test]
async fn scenario_d_unlock_take_profit_then_stop_loss() {
    let mut h = Harness::new();
    h.drive_to_lock().await;
    let long_avg = h.runner.state().long.avg_price;

    // Long recovers past release_tp_after_full.
    h.expect_signal(dec!(2930), 540, SignalType::TakeProfit).await;
    let state = h.runner.state();
    assert!(state.long.is_flat());
    assert!(!state.long.hedge_locked());
    assert!(!state.long.hedge_stop());
    assert!(state.short.hedge_locked());
    assert!(state.short.hedge_stop());
    let credited = trunc_qty((dec!(2930) - long_avg) * dec!(0.15));
    assert!(credited > Decimal::ZERO);
    assert_eq!(state.short.locked_profit(), credited);

    // Short's loss is larger than the banked profit; the flat long side
    // does not reopen while short is locked.
    assert!(matches!(h.tick(dec!(2930), 600).await, TickOutcome::Idle));
    assert!(matches!(h.tick(dec!(2930), 800).await, TickOutcome::Idle));

    // Loss now fits inside the banked profit.
    h.expect_signal(dec!(2750), 860, SignalType::StopLoss).await;
    let state = h.runner.state();
    assert!(!state.is_locked());
    assert!(state.is_flat());
    assert!(state.short.locked_profit().is_zero());

    let kinds = h.drain();
    assert!(kinds.iter().any(|k| matches!(k, EventKind::HedgeTakeProfitReleased { direction: Direction::Long, .. })));
    assert!(kinds.iter().any(|k| matches!(k, EventKind::HedgeFullyReleased { direction: Some(Direction::Short), .. })));

    // The pair starts over.
    h.expect_signal(dec!(2750), 861, SignalType::OpenLong).await;
}

#[tokio::test]
async fn locked_pair_never_rehedges() {
    let mut h = Harness::new();
    h.drive_to_lock().await;
    let orders = h.gw.placed().len();
    let locked = h.runner.state().clone();

    for secs in [490, 500, 600] {
        assert!(matches!(h.tick(dec!(2680), secs).await, TickOutcome::Idle));
    }
    assert_eq!(h.gw.placed().len(), orders);
    assert_eq!(h.runner.state(), &locked);
}

// -- Confirmation fallbacks ---------------------------------------------

#[tokio::test]
async fn open_confirmed_by_trade_history() {
    let mut h = Harness::new();
    h.gw.set_mode(ConfirmMode::TradesOnly);
    h.expect_signal(dec!(3000), 0, SignalType::OpenLong).await;

    assert_eq!(h.runner.state().long.qty, dec!(0.01));
    assert_eq!(h.runner.state().long.last_fill_price, dec!(3000));
    assert_eq!(placed_events(&h.drain()), vec!["trades".to_string()]);
}

#[tokio::test]
async fn open_confirmed_by_position_delta() {
    let mut h = Harness::new();
    h.gw.set_mode(ConfirmMode::PositionOnly);
    h.expect_signal(dec!(3000), 0, SignalType::OpenLong).await;

    assert_eq!(h.runner.state().long.qty, dec!(0.01));
    assert_eq!(h.runner.state().long.avg_price, dec!(3000));
    assert_eq!(placed_events(&h.drain()), vec!["position_delta".to_string()]);
}

#[tokio::test]
async fn unconfirmed_open_leaves_state_unchanged() {
    let mut h = Harness::new();
    h.gw.set_mode(ConfirmMode::Silent);
    h.expect_signal(dec!(3000), 0, SignalType::OpenLong).await;

    assert!(h.runner.state().long.is_flat());
    assert!(h.runner.state().long.last_open_ts.is_none());
    let kinds = h.drain();
    assert!(kinds.iter().any(|k| matches!(k, EventKind::OrderUnconfirmed { .. })));
    assert!(placed_events(&kinds).is_empty());
    assert!(h.gw.cancelled().is_empty());
}

#[tokio::test]
async fn unconfirmed_add_is_left_working_and_synced() {
    let mut h = Harness::new();
    h.expect_signal(dec!(3000), 0, SignalType::OpenLong).await;
    h.expect_signal(dec!(3000), 1, SignalType::OpenShort).await;

    h.gw.set_mode(ConfirmMode::Delayed);
    h.expect_signal(dec!(2940), 120, SignalType::AddLong).await;
    assert_eq!(h.runner.state().long.add_times, 1);
    assert_eq!(h.runner.state().long.qty, dec!(0.03));
    assert!(h.gw.cancelled().is_empty());

    // The add fills after the confirmation window closed.
    h.gw.release_pending().await;
    h.gw.set_mode(ConfirmMode::Normal);
    h.tick(dec!(2950), 130).await;

    let long = &h.runner.state().long;
    assert_eq!(long.qty, dec!(0.03));
    assert_eq!(long.avg_price, dec!(2960));
    assert_eq!(long.add_times, 1);
    assert_eq!(long.last_fill_price, dec!(2940));

    // The ladder continues from the real fill.
    h.expect_signal(dec!(2881.2), 240, SignalType::AddLong).await;
    assert_eq!(h.gw.placed().last().unwrap().quantity, dec!(0.04));
}

// -- Failures and repairs -----------------------------------------------

#[tokio::test]
async fn gateway_outage_backs_off_then_recovers() {
    let mut h = Harness::new();
    h.gw.set_error("connection refused");

    assert!(matches!(h.tick(dec!(3000), 0).await, TickOutcome::Failed(ref e) if e.is_gateway()));
    assert_eq!(h.runner.state().exchange_fault_until, Some(h.at(30)));
    assert!(matches!(
        h.drain().as_slice(),
        [EventKind::TickFailed { backoff_until: Some(_), .. }]
    ));

    h.gw.clear_error();
    assert!(matches!(h.tick(dec!(3000), 10).await, TickOutcome::Skipped));
    h.expect_signal(dec!(3000), 30, SignalType::OpenLong).await;
    assert_eq!(h.runner.state().exchange_fault_until, None);
}

#[tokio::test]
async fn external_flatten_of_locked_side_releases_pair() {
    let mut h = Harness::new();
    h.drive_to_lock().await;
    h.drain();

    let short = PositionLeg { qty: dec!(0.15), avg_price: h.runner.state().short.avg_price };
    h.gw.set_positions(SYM, PositionSnapshot { long: PositionLeg::default(), short });

    assert!(matches!(h.tick(dec!(2680), 500).await, TickOutcome::Idle));
    let state = h.runner.state();
    assert!(!state.is_locked());
    assert!(state.long.is_flat());
    assert_eq!(state.long.add_times, 0);
    assert!(h
        .drain()
        .iter()
        .any(|k| matches!(k, EventKind::StateRepaired { repair: Repair::ExternalFlatten(Direction::Long) })));
}

#[tokio::test]
async fn locked_state_survives_restart() {
    let mut dir = std::env::temp_dir();
    dir.push(format!("hedgelock_it_{}", uuid::Uuid::new_v4()));
    let store: Arc<dyn StateStore> = Arc::new(tokio_test::assert_ok!(JsonFileStore::new(&dir)));

    let mut h = Harness::with_store(store.clone());
    h.drive_to_lock().await;
    assert!(h.runner.persist());
    let saved = h.runner.state().clone();

    let restarted = Harness::with_store(store);
    assert_eq!(restarted.runner.state(), &saved);
    assert!(restarted.runner.state().is_locked());

    std::fs::remove_dir_all(dir).unwrap();
}
