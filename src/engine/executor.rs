//! Order executor.
//!
//! Places one order through the gateway and polls for a confirmed fill.
//! Placement is a single call (transport retries belong to the gateway);
//! confirmation polling is time-boxed by `max_wait`, and a timeout
//! degrades to an unconfirmed outcome rather than an error.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::confirmation::{
    check_order_status, check_position_delta, check_trades, Fill, StatusVerdict,
};
use crate::config::ConfirmationConfig;
use crate::exchange::ExchangeGateway;
use crate::types::{HedgeError, OrderRequest, OrderResult, OrderStatus, PositionLeg};

// ---------------------------------------------------------------------------
// Execution result
// ---------------------------------------------------------------------------

/// A placed order and, if one of the checks accepted it, its fill.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub request: OrderRequest,
    pub order: OrderResult,
    pub fill: Option<Fill>,
}

impl ExecutionOutcome {
    pub fn confirmed(&self) -> bool {
        self.fill.is_some()
    }

    /// Filled quantity, or the requested quantity when unconfirmed.
    pub fn qty_or_requested(&self) -> Decimal {
        self.fill.map_or(self.request.quantity, |f| f.qty)
    }

    /// Fill price, or `reference` when the fill price is unknown.
    pub fn price_or(&self, reference: Decimal) -> Decimal {
        match self.fill {
            Some(f) if f.avg_price > Decimal::ZERO => f.avg_price,
            _ => reference,
        }
    }
}

enum Poll {
    Filled(Fill),
    Pending,
    Terminal,
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

pub struct OrderExecutor {
    gateway: Arc<dyn ExchangeGateway>,
    config: ConfirmationConfig,
}

impl OrderExecutor {
    pub fn new(gateway: Arc<dyn ExchangeGateway>, config: ConfirmationConfig) -> Self {
        Self { gateway, config }
    }

    pub fn gateway(&self) -> &Arc<dyn ExchangeGateway> {
        &self.gateway
    }

    /// Place `request` and wait for confirmation.
    ///
    /// Only the placement can fail; everything after it resolves to an
    /// outcome with or without a fill. An unconfirmed close is cancelled so
    /// the unchanged state stays true; an unconfirmed open is left working
    /// and the next position sync picks up whatever fills.
    pub async fn execute(&self, request: OrderRequest) -> Result<ExecutionOutcome, HedgeError> {
        let direction = request.position_side.direction();

        let baseline = match self.gateway.get_positions(&request.symbol).await {
            Ok(snapshot) => Some(snapshot.leg(direction)),
            Err(e) => {
                debug!(error = %e, "Baseline position unavailable, delta check disabled");
                None
            }
        };

        let order = self
            .gateway
            .place_order(&request)
            .await
            .map_err(|e| HedgeError::gateway("place_order", e))?;

        if order.status == OrderStatus::Rejected {
            return Err(HedgeError::Gateway {
                op: "place_order".to_string(),
                message: format!("order {} rejected", order.order_id),
            });
        }

        info!(
            order = %request,
            order_id = %order.order_id,
            gateway = self.gateway.name(),
            "Order placed"
        );

        let fill = self.confirm(&request, &order, baseline).await;
        match &fill {
            Some(f) => info!(
                order_id = %order.order_id,
                method = %f.method,
                filled = %f.qty,
                avg_price = %f.avg_price,
                "Order confirmed"
            ),
            None => {
                let err = HedgeError::ConfirmationTimeout { order_id: order.order_id.clone() };
                warn!(order = %request, error = %err, "Order unconfirmed");
                if !request.is_opening() {
                    self.cancel_remainder(&request, &order).await;
                }
            }
        }

        Ok(ExecutionOutcome { request, order, fill })
    }

    async fn confirm(
        &self,
        request: &OrderRequest,
        order: &OrderResult,
        baseline: Option<PositionLeg>,
    ) -> Option<Fill> {
        let poll = async {
            loop {
                match self.poll_once(request, order, baseline).await {
                    Poll::Filled(fill) => return Some(fill),
                    Poll::Terminal => return None,
                    Poll::Pending => tokio::time::sleep(self.config.poll_interval()).await,
                }
            }
        };
        tokio::time::timeout(self.config.max_wait(), poll).await.ok().flatten()
    }

    async fn poll_once(
        &self,
        request: &OrderRequest,
        order: &OrderResult,
        baseline: Option<PositionLeg>,
    ) -> Poll {
        let symbol = &request.symbol;
        let expected = request.quantity;
        let mut terminal = false;

        if !order.order_id.is_empty() {
            match self.gateway.get_order(symbol, &order.order_id).await {
                Ok(report) => match check_order_status(&report, expected, &self.config) {
                    StatusVerdict::Accepted(fill) => return Poll::Filled(fill),
                    StatusVerdict::Terminal => terminal = true,
                    StatusVerdict::Pending => {}
                },
                Err(e) => debug!(order_id = %order.order_id, error = %e, "Order status query failed"),
            }

            match self.gateway.get_user_trades(symbol, Some(order.order_id.clone())).await {
                Ok(trades) => {
                    if let Some(fill) = check_trades(&trades, &order.order_id, expected, &self.config) {
                        return Poll::Filled(fill);
                    }
                }
                Err(e) => debug!(order_id = %order.order_id, error = %e, "Trade query failed"),
            }
        }

        if let Some(baseline) = baseline {
            match self.gateway.get_positions(symbol).await {
                Ok(snapshot) => {
                    let current = snapshot.leg(request.position_side.direction());
                    if let Some(fill) =
                        check_position_delta(baseline, current, expected, request.is_opening(), &self.config)
                    {
                        return Poll::Filled(fill);
                    }
                }
                Err(e) => debug!(error = %e, "Position query failed"),
            }
        }

        if terminal {
            Poll::Terminal
        } else {
            Poll::Pending
        }
    }

    /// Best-effort cancel of whatever is left of an unconfirmed order.
    async fn cancel_remainder(&self, request: &OrderRequest, order: &OrderResult) {
        if order.order_id.is_empty() {
            return;
        }
        if let Err(e) = self.gateway.cancel_order(&request.symbol, &order.order_id).await {
            debug!(order_id = %order.order_id, error = %e, "Cancel after timeout failed");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
