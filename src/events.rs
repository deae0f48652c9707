//! Engine events.
//!
//! Every state change worth auditing is published on a broadcast channel as
//! an [`EngineEvent`]. Publishing never fails a tick: with no subscribers the
//! event is dropped.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::state::Repair;
use crate::types::{Direction, OrderRequest, TradingSignal};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    SignalEmitted {
        signal: Box<TradingSignal>,
    },

    /// The order was placed and confirmed.
    OrderPlaced {
        request: Box<OrderRequest>,
        order_id: String,
        filled_qty: Decimal,
        avg_price: Decimal,
        method: String,
    },

    /// Placed, but no confirmation path succeeded in time.
    OrderUnconfirmed {
        request: Box<OrderRequest>,
        order_id: String,
    },

    HedgeLocked {
        /// Side that received the balancing order, if any.
        balanced_side: Option<Direction>,
        balancing_qty: Decimal,
        long_qty: Decimal,
        short_qty: Decimal,
    },

    /// Quantities still differ after the corrective order.
    HedgeResidualImbalance {
        long_qty: Decimal,
        short_qty: Decimal,
        diff: Decimal,
    },

    HedgeTakeProfitReleased {
        direction: Direction,
        realized: Decimal,
        credited: Decimal,
    },

    /// Unlock close filled only in part; both sides stay locked.
    HedgeTakeProfitPartial {
        direction: Direction,
        realized: Decimal,
        credited: Decimal,
        remaining: Decimal,
    },

    HedgeFullyReleased {
        direction: Option<Direction>,
        reason: String,
    },

    StateRepaired {
        repair: Repair,
    },

    TickFailed {
        error: String,
        backoff_until: Option<DateTime<Utc>>,
    },
}

/// An event tagged with the account that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct EngineEvent {
    pub account: String,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl EngineEvent {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"event":"SERIALIZATION_ERROR"}"#.to_string())
    }
}

/// Cloneable publisher handle.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventSink {
    pub fn new(buffer: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, account: &str, at: DateTime<Utc>, kind: EventKind) {
        let _ = self.tx.send(EngineEvent {
            account: account.to_string(),
            at,
            kind,
        });
    }
}

/// Write every event to the log as JSON until the channel closes.
pub async fn log_events(mut rx: broadcast::Receiver<EngineEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => info!(account = %event.account, event = %event.to_json(), "Engine event"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event log lagging, events dropped")
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
