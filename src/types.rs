//! Shared types for the HEDGELOCK engine.
//!
//! These types form the data model used across all modules: directions,
//! signals, order requests and results, exchange payloads, and the error
//! taxonomy. Engine state lives in [`crate::state`].

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Directions & sides
// ---------------------------------------------------------------------------

/// One side of a symbol's paired position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// Fixed evaluation order for every tick.
    pub const ALL: [Direction; 2] = [Direction::Long, Direction::Short];

    pub fn opposite(&self) -> Self {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }

    /// Order side that increases this direction's position.
    pub fn open_side(&self) -> OrderSide {
        match self {
            Direction::Long => OrderSide::Buy,
            Direction::Short => OrderSide::Sell,
        }
    }

    /// Order side that reduces this direction's position.
    pub fn close_side(&self) -> OrderSide {
        self.open_side().opposite()
    }

    pub fn position_side(&self) -> PositionSide {
        match self {
            Direction::Long => PositionSide::Long,
            Direction::Short => PositionSide::Short,
        }
    }

    /// Signed price move in this direction's favour, as a ratio of `base`.
    /// Positive means profit for the direction.
    pub fn favorable_ratio(&self, base: Decimal, price: Decimal) -> Decimal {
        let raw = crate::precision::relative_change(price, base);
        match self {
            Direction::Long => raw,
            Direction::Short => -raw,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "long",
            Direction::Short => "short",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Hedge-mode position side on the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    pub fn direction(&self) -> Direction {
        match self {
            PositionSide::Long => Direction::Long,
            PositionSide::Short => Direction::Short,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Market,
    Limit,
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    None,
    OpenLong,
    OpenShort,
    AddLong,
    AddShort,
    TakeProfit,
    StopLoss,
    Hedge,
}

impl SignalType {
    pub fn open(direction: Direction) -> Self {
        match direction {
            Direction::Long => SignalType::OpenLong,
            Direction::Short => SignalType::OpenShort,
        }
    }

    pub fn add(direction: Direction) -> Self {
        match direction {
            Direction::Long => SignalType::AddLong,
            Direction::Short => SignalType::AddShort,
        }
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignalType::None => "none",
            SignalType::OpenLong => "open_long",
            SignalType::OpenShort => "open_short",
            SignalType::AddLong => "add_long",
            SignalType::AddShort => "add_short",
            SignalType::TakeProfit => "take_profit",
            SignalType::StopLoss => "stop_loss",
            SignalType::Hedge => "hedge",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfitType {
    FirstOrder,
    BeforeFull,
    AfterFull,
    HedgeUnlock,
}

impl ProfitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfitType::FirstOrder => "first_order",
            ProfitType::BeforeFull => "before_full",
            ProfitType::AfterFull => "after_full",
            ProfitType::HedgeUnlock => "hedge_unlock",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopType {
    HedgeUnlock,
}

impl StopType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopType::HedgeUnlock => "hedge_unlock",
        }
    }
}

/// Typed signal metadata. Numeric fields record the inputs behind the
/// decision so it can be reconstructed from logs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalMetadata {
    pub direction: Option<Direction>,
    pub profit_type: Option<ProfitType>,
    pub stop_type: Option<StopType>,
    /// For `Hedge`: the side that receives the balancing order.
    pub hedge_side: Option<Direction>,
    /// Price-move ratio that satisfied the rule.
    pub ratio: Option<Decimal>,
    /// Threshold the ratio was compared against (slippage applied).
    pub threshold: Option<Decimal>,
}

/// One trading intent, produced fresh each tick and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingSignal {
    pub kind: SignalType,
    pub symbol: String,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub reason: String,
    pub metadata: SignalMetadata,
}

impl TradingSignal {
    pub fn none(symbol: &str) -> Self {
        Self {
            kind: SignalType::None,
            symbol: symbol.to_string(),
            quantity: Decimal::ZERO,
            price: None,
            reason: String::new(),
            metadata: SignalMetadata::default(),
        }
    }

    pub fn is_none(&self) -> bool {
        self.kind == SignalType::None
    }

    /// The direction this signal acts on.
    pub fn direction(&self) -> Option<Direction> {
        match self.kind {
            SignalType::OpenLong | SignalType::AddLong => Some(Direction::Long),
            SignalType::OpenShort | SignalType::AddShort => Some(Direction::Short),
            SignalType::None => None,
            SignalType::TakeProfit | SignalType::StopLoss | SignalType::Hedge => {
                self.metadata.direction
            }
        }
    }

    /// Whether this signal releases a hedge lock.
    pub fn is_hedge_unlock(&self) -> bool {
        self.metadata.profit_type == Some(ProfitType::HedgeUnlock)
            || self.metadata.stop_type == Some(StopType::HedgeUnlock)
    }
}

impl fmt::Display for TradingSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} qty={}", self.kind, self.symbol, self.quantity)?;
        if let Some(dir) = self.direction() {
            write!(f, " dir={dir}")?;
        }
        if let Some(p) = self.price {
            write!(f, " @ {p}")?;
        }
        if !self.reason.is_empty() {
            write!(f, " ({})", self.reason)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

/// A request to the exchange. `client_order_id` is fixed per placement so
/// transport retries are deduplicated by the venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub position_side: PositionSide,
    pub quantity: Decimal,
    pub order_type: OrderType,
    pub price: Option<Decimal>,
    pub client_order_id: String,
}

impl OrderRequest {
    pub fn market(symbol: &str, side: OrderSide, position_side: PositionSide, quantity: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            position_side,
            quantity,
            order_type: OrderType::Market,
            price: None,
            client_order_id: format!("hl-{}", uuid::Uuid::new_v4().simple()),
        }
    }

    /// Whether this order increases the position on `position_side`.
    pub fn is_opening(&self) -> bool {
        self.side == self.position_side.direction().open_side()
    }
}

impl fmt::Display for OrderRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {:?} {} {:?} [{}]",
            self.side, self.symbol, self.position_side, self.quantity, self.order_type,
            self.client_order_id,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
}

/// Acknowledgement of a placed order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id: String,
    pub status: OrderStatus,
    pub filled_qty: Decimal,
    pub avg_price: Decimal,
}

/// Raw order-status payload. Numeric fields arrive as exchange strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatusReport {
    pub order_id: String,
    pub status: String,
    pub executed_qty: String,
    pub avg_price: String,
}

/// One execution record from the user's trade history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeFill {
    pub order_id: String,
    pub qty: String,
    pub price: String,
}

/// One hedge-mode position leg.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionLeg {
    pub qty: Decimal,
    pub avg_price: Decimal,
}

/// Both legs of a symbol's position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub long: PositionLeg,
    pub short: PositionLeg,
}

impl PositionSnapshot {
    pub fn leg(&self, direction: Direction) -> PositionLeg {
        match direction {
            Direction::Long => self.long,
            Direction::Short => self.short,
        }
    }

    pub fn leg_mut(&mut self, direction: Direction) -> &mut PositionLeg {
        match direction {
            Direction::Long => &mut self.long,
            Direction::Short => &mut self.short,
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for HEDGELOCK.
#[derive(Debug, thiserror::Error)]
pub enum HedgeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Gateway error ({op}): {message}")]
    Gateway { op: String, message: String },

    #[error("Confirmation timed out for order {order_id}")]
    ConfirmationTimeout { order_id: String },

    #[error("State inconsistency: {0}")]
    StateInconsistency(String),

    #[error("Malformed numeric field {field}: {value}")]
    Precision { field: String, value: String },

    #[error("Storage error: {0}")]
    Storage(String),
}

impl HedgeError {
    pub fn gateway(op: &str, err: anyhow::Error) -> Self {
        HedgeError::Gateway {
            op: op.to_string(),
            message: format!("{err:#}"),
        }
    }

    /// Whether the account should back off from the exchange.
    pub fn is_gateway(&self) -> bool {
        matches!(self, HedgeError::Gateway { .. })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
