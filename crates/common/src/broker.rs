use async_trait::async_trait;

use crate::{Fill, Order, Position, Result};

/// Boundary to whatever executes orders.
///
/// `PaperBroker` implements this for simulation. Strategies never hold a
/// broker; the engine reads positions and submits orders on their behalf,
/// and any error returned here is surfaced to the engine's caller unchanged.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Current holding for an instrument. Flat instruments report size `0.0`.
    async fn position(&self, instrument: &str) -> Result<Position>;

    /// Submit an order and return the fill confirmation.
    async fn submit_order(&self, order: &Order) -> Result<Fill>;

    /// Record the latest traded price for an instrument.
    async fn update_price(&self, instrument: &str, price: f64);
}
