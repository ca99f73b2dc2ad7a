use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// One OHLCV price sample for an instrument.
///
/// Produced by a feed and never mutated after emission. A replayed bar is a
/// fresh value built from the ticks folded into it so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Feed name, e.g. `"data0"`. Strategies subscribe by this name.
    pub instrument: String,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub open_interest: f64,
}

/// Sampling granularity of a feed or a replay target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimeFrame {
    #[default]
    Ticks,
    MicroSeconds,
    Seconds,
    Minutes,
    Days,
    Weeks,
}

impl TimeFrame {
    /// Length of one base unit. `Ticks` have no fixed length.
    pub fn period(&self) -> Option<Duration> {
        match self {
            TimeFrame::Ticks => None,
            TimeFrame::MicroSeconds => Some(Duration::microseconds(1)),
            TimeFrame::Seconds => Some(Duration::seconds(1)),
            TimeFrame::Minutes => Some(Duration::minutes(1)),
            TimeFrame::Days => Some(Duration::days(1)),
            TimeFrame::Weeks => Some(Duration::weeks(1)),
        }
    }
}

impl std::fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeFrame::Ticks => write!(f, "ticks"),
            TimeFrame::MicroSeconds => write!(f, "microseconds"),
            TimeFrame::Seconds => write!(f, "seconds"),
            TimeFrame::Minutes => write!(f, "minutes"),
            TimeFrame::Days => write!(f, "days"),
            TimeFrame::Weeks => write!(f, "weeks"),
        }
    }
}

/// Side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// A strategy's request to buy or sell. Not a guaranteed execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Intent {
    /// `size: None` leaves sizing to the broker.
    Buy { instrument: String, size: Option<f64> },
    /// `size: None` closes the whole position.
    Sell { instrument: String, size: Option<f64> },
}

impl Intent {
    pub fn instrument(&self) -> &str {
        match self {
            Intent::Buy { instrument, .. } | Intent::Sell { instrument, .. } => instrument,
        }
    }

    pub fn size(&self) -> Option<f64> {
        match self {
            Intent::Buy { size, .. } | Intent::Sell { size, .. } => *size,
        }
    }

    pub fn side(&self) -> OrderSide {
        match self {
            Intent::Buy { .. } => OrderSide::Buy,
            Intent::Sell { .. } => OrderSide::Sell,
        }
    }
}

/// An order handed to the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub instrument: String,
    pub side: OrderSide,
    /// `None` = let the broker size it.
    pub quantity: Option<f64>,
}

impl Order {
    pub fn market(instrument: impl Into<String>, side: OrderSide, quantity: Option<f64>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            instrument: instrument.into(),
            side,
            quantity,
        }
    }
}

impl From<&Intent> for Order {
    fn from(intent: &Intent) -> Self {
        Order::market(intent.instrument(), intent.side(), intent.size())
    }
}

/// Confirmation of an executed order returned by the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: String,
    pub instrument: String,
    pub side: OrderSide,
    pub fill_price: f64,
    pub quantity: f64,
    pub timestamp: DateTime<Utc>,
}

/// Current holding for one instrument. Owned by the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub instrument: String,
    /// Units held; `0.0` when flat.
    pub size: f64,
    /// Average entry price; `0.0` when flat.
    pub price: f64,
}

impl Position {
    pub fn flat(instrument: impl Into<String>) -> Self {
        Self {
            instrument: instrument.into(),
            size: 0.0,
            price: 0.0,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.size == 0.0
    }
}

/// Reason an order was refused by the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RejectionReason {
    NoPrice,
    InsufficientCash,
    InsufficientPosition,
    InvalidQuantity,
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectionReason::NoPrice => write!(f, "no price known for instrument"),
            RejectionReason::InsufficientCash => write!(f, "insufficient cash"),
            RejectionReason::InsufficientPosition => write!(f, "sell exceeds held position"),
            RejectionReason::InvalidQuantity => write!(f, "quantity must be positive"),
        }
    }
}

/// Current state of the driver loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    #[default]
    Stopped,
    Running,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Stopped => write!(f, "stopped"),
            EngineState::Running => write!(f, "running"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_have_no_fixed_period() {
        assert!(TimeFrame::Ticks.period().is_none());
        assert_eq!(TimeFrame::Minutes.period(), Some(Duration::seconds(60)));
    }

    #[test]
    fn order_from_intent_keeps_side_and_size() {
        let intent = Intent::Sell {
            instrument: "data0".into(),
            size: None,
        };
        let order = Order::from(&intent);
        assert_eq!(order.side, OrderSide::Sell);
        assert_eq!(order.instrument, "data0");
        assert!(order.quantity.is_none());
        assert!(!order.id.is_empty());
    }

    #[test]
    fn timeframe_parses_lowercase() {
        #[derive(Deserialize)]
        struct Wrapper {
            tf: TimeFrame,
        }
        let w: Wrapper = toml::from_str("tf = \"seconds\"").unwrap();
        assert_eq!(w.tf, TimeFrame::Seconds);
    }
}
