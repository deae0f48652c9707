//! Per-account tick loop.
//!
//! One `AccountRunner` owns one account's state and evaluates it one tick at
//! a time: sync positions, reconcile, decide, act, persist. The loop is the
//! only place that turns a failure into skip or back-off; no error ends it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, info_span, warn, Instrument};

use super::executor::{ExecutionOutcome, OrderExecutor};
use super::hedge::HedgeCoordinator;
use crate::config::{AppConfig, ConfirmationConfig};
use crate::events::{EventKind, EventSink};
use crate::exchange::ExchangeGateway;
use crate::state::AccountState;
use crate::storage::StateStore;
use crate::strategy::decision::DecisionEngine;
use crate::strategy::StrategyConfig;
use crate::types::{Direction, HedgeError, OrderRequest, SignalType, TradingSignal};

/// Loop timing and confirmation settings shared by every account.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub tick_interval: Duration,
    pub fault_backoff: chrono::Duration,
    pub confirmation: ConfirmationConfig,
}

impl RunnerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            tick_interval: config.engine.tick_interval(),
            fault_backoff: config.engine.fault_backoff(),
            confirmation: config.confirmation.clone(),
        }
    }
}

/// What one tick did.
#[derive(Debug)]
pub enum TickOutcome {
    /// Exchange back-off active; nothing was called.
    Skipped,
    /// Evaluated, nothing qualified.
    Idle,
    /// A signal was acted on.
    Acted(TradingSignal),
    Failed(HedgeError),
}

pub struct AccountRunner {
    account_id: String,
    symbol: String,
    gateway: Arc<dyn ExchangeGateway>,
    store: Arc<dyn StateStore>,
    executor: OrderExecutor,
    events: EventSink,
    config: watch::Receiver<StrategyConfig>,
    settings: RunnerSettings,
    state: AccountState,
}

impl AccountRunner {
    pub fn new(
        account_id: &str,
        symbol: &str,
        gateway: Arc<dyn ExchangeGateway>,
        store: Arc<dyn StateStore>,
        events: EventSink,
        config: watch::Receiver<StrategyConfig>,
        settings: RunnerSettings,
    ) -> Self {
        let executor = OrderExecutor::new(gateway.clone(), settings.confirmation.clone());
        Self {
            account_id: account_id.to_string(),
            symbol: symbol.to_string(),
            gateway,
            store,
            executor,
            events,
            config,
            settings,
            state: AccountState::default(),
        }
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn state(&self) -> &AccountState {
        &self.state
    }

    /// Load persisted state (fresh if none) and repair it.
    pub fn load(&mut self, now: DateTime<Utc>) -> Result<(), HedgeError> {
        let loaded = self
            .store
            .load(&self.account_id)
            .map_err(|e| HedgeError::Storage(format!("{e:#}")))?;
        self.state = loaded.unwrap_or_default();
        self.apply_repairs(now);
        Ok(())
    }

    /// Save state; failures are logged and retried on the next save.
    pub fn persist(&self) -> bool {
        match self.store.save(&self.account_id, &self.state) {
            Ok(()) => true,
            Err(e) => {
                error!(account = %self.account_id, error = %e, "Failed to persist state");
                false
            }
        }
    }

    fn apply_repairs(&mut self, now: DateTime<Utc>) {
        for repair in self.state.reconcile() {
            warn!(account = %self.account_id, error = %repair.to_error(), "State repaired");
            self.events.emit(&self.account_id, now, EventKind::StateRepaired { repair });
        }
    }

    /// Run one evaluation.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> TickOutcome {
        if self.state.in_exchange_fault(now) {
            return TickOutcome::Skipped;
        }
        self.state.exchange_fault_until = None;

        match self.try_tick(now).await {
            Ok(Some(signal)) => TickOutcome::Acted(signal),
            Ok(None) => TickOutcome::Idle,
            Err(e) => {
                let backoff_until = if e.is_gateway() {
                    let until = now + self.settings.fault_backoff;
                    self.state.exchange_fault_until = Some(until);
                    Some(until)
                } else {
                    None
                };
                warn!(account = %self.account_id, error = %e, backoff_until = ?backoff_until, "Tick failed");
                self.events.emit(
                    &self.account_id,
                    now,
                    EventKind::TickFailed { error: e.to_string(), backoff_until },
                );
                TickOutcome::Failed(e)
            }
        }
    }

    async fn try_tick(&mut self, now: DateTime<Utc>) -> Result<Option<TradingSignal>, HedgeError> {
        // Any hot-merged update is picked up whole, between ticks.
        let config = self.config.borrow().clone();

        let price = self
            .gateway
            .get_mark_price(&self.symbol)
            .await
            .map_err(|e| HedgeError::gateway("get_mark_price", e))?;
        let snapshot = self
            .gateway
            .get_positions(&self.symbol)
            .await
            .map_err(|e| HedgeError::gateway("get_positions", e))?;

        self.state.sync_positions(&snapshot);
        self.apply_repairs(now);

        let signal = DecisionEngine::evaluate(&self.state, &config, &self.symbol, price, now);
        if signal.is_none() {
            return Ok(None);
        }

        info!(
            account = %self.account_id,
            signal = %signal.kind,
            direction = ?signal.direction(),
            qty = %signal.quantity,
            price = %price,
            reason = %signal.reason,
            "Signal emitted"
        );
        self.events.emit(
            &self.account_id,
            now,
            EventKind::SignalEmitted { signal: Box::new(signal.clone()) },
        );

        self.dispatch(&signal, &config, price, now).await?;
        Ok(Some(signal))
    }

    async fn dispatch(
        &mut self,
        signal: &TradingSignal,
        config: &StrategyConfig,
        price: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(), HedgeError> {
        let Some(direction) = signal.direction() else {
            return Ok(());
        };
        let coordinator = HedgeCoordinator::new(&self.executor, &self.events, &self.account_id, &self.symbol);

        match signal.kind {
            SignalType::Hedge => {
                coordinator.lock(&mut self.state, config, direction, now).await?;
            }
            SignalType::TakeProfit if signal.is_hedge_unlock() => {
                coordinator.unlock_take_profit(&mut self.state, direction, price, now).await?;
            }
            SignalType::StopLoss if signal.is_hedge_unlock() => {
                coordinator.unlock_stop_loss(&mut self.state, direction, price, now).await?;
            }
            SignalType::OpenLong | SignalType::OpenShort => {
                let request = self.order(direction, true, signal.quantity);
                let outcome = self.execute(request, now).await?;
                if let Some(fill) = outcome.fill {
                    self.state.record_open(direction, fill.qty, outcome.price_or(price), now);
                }
            }
            SignalType::AddLong | SignalType::AddShort => {
                let request = self.order(direction, true, signal.quantity);
                let outcome = self.execute(request, now).await?;
                // Applied even unconfirmed; the next position sync corrects qty.
                self.state.record_add(
                    direction,
                    outcome.qty_or_requested(),
                    outcome.price_or(price),
                    now,
                    now + config.fast_add_window(),
                );
            }
            SignalType::TakeProfit => {
                let request = self.order(direction, false, signal.quantity);
                let outcome = self.execute(request, now).await?;
                if outcome.confirmed() {
                    self.state.record_close(direction, now + config.cooldown());
                }
            }
            SignalType::StopLoss | SignalType::None => {}
        }
        Ok(())
    }

    fn order(&self, direction: Direction, opening: bool, qty: Decimal) -> OrderRequest {
        let side = if opening { direction.open_side() } else { direction.close_side() };
        OrderRequest::market(&self.symbol, side, direction.position_side(), qty)
    }

    async fn execute(&self, request: OrderRequest, now: DateTime<Utc>) -> Result<ExecutionOutcome, HedgeError> {
        let outcome = self.executor.execute(request).await?;
        let kind = match outcome.fill {
            Some(fill) => EventKind::OrderPlaced {
                request: Box::new(outcome.request.clone()),
                order_id: outcome.order.order_id.clone(),
                filled_qty: fill.qty,
                avg_price: fill.avg_price,
                method: fill.method.to_string(),
            },
            None => EventKind::OrderUnconfirmed {
                request: Box::new(outcome.request.clone()),
                order_id: outcome.order.order_id.clone(),
            },
        };
        self.events.emit(&self.account_id, now, kind);
        Ok(outcome)
    }

    /// Tick on an interval until `shutdown` flips, saving after every tick.
    ///
    /// A tick that has started always runs to completion (including its
    /// confirmation poll) before shutdown is observed, so a just-confirmed
    /// fill is never lost.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> AccountState {
        let span = info_span!("account", id = %self.account_id);
        async move {
            info!(symbol = %self.symbol, state = %self.state, "Account loop started");
            let mut timer = tokio::time::interval(self.settings.tick_interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                if *shutdown.borrow() {
                    break;
                }
                tokio::select! {
                    _ = timer.tick() => {
                        self.tick(Utc::now()).await;
                        self.persist();
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            self.persist();
            info!(state = %self.state, "Account loop stopped");
            self.state
        }
        .instrument(span)
        .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
