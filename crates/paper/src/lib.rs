use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use common::{Broker, Error, Fill, Order, OrderSide, Position, RejectionReason, Result};

/// Simulated broker with immediate fills.
///
/// Fills are simulated at the latest known price with configurable slippage.
/// Orders without a quantity buy `stake` units or close the whole position.
pub struct PaperBroker {
    /// Simulated cash balance.
    cash: Arc<RwLock<f64>>,
    /// Open simulated positions, keyed by instrument.
    positions: Arc<RwLock<HashMap<String, Position>>>,
    /// Latest known price per instrument, updated via `update_price`.
    prices: Arc<RwLock<HashMap<String, f64>>>,
    /// Units bought when an order carries no quantity.
    stake: f64,
    /// Slippage in basis points applied to all fills.
    slippage_bps: f64,
}

impl PaperBroker {
    pub fn new(initial_cash: f64, stake: f64, slippage_bps: f64) -> Result<Self> {
        if !(stake.is_finite() && stake > 0.0) {
            return Err(Error::config(format!("paper stake must be > 0, got {stake}")));
        }
        if !(initial_cash.is_finite() && initial_cash >= 0.0) {
            return Err(Error::config(format!(
                "initial cash must be >= 0, got {initial_cash}"
            )));
        }
        info!(
            cash = initial_cash,
            stake = stake,
            slippage_bps = slippage_bps,
            "PaperBroker initialized"
        );
        Ok(Self {
            cash: Arc::new(RwLock::new(initial_cash)),
            positions: Arc::new(RwLock::new(HashMap::new())),
            prices: Arc::new(RwLock::new(HashMap::new())),
            stake,
            slippage_bps,
        })
    }

    pub async fn cash(&self) -> f64 {
        *self.cash.read().await
    }

    /// Cash plus open positions marked at the latest price.
    pub async fn value(&self) -> f64 {
        let prices = self.prices.read().await;
        let marked: f64 = self
            .positions
            .read()
            .await
            .values()
            .map(|p| p.size * prices.get(&p.instrument).copied().unwrap_or(p.price))
            .sum();
        *self.cash.read().await + marked
    }
}

#[async_trait]
impl Broker for PaperBroker {
    async fn position(&self, instrument: &str) -> Result<Position> {
        Ok(self
            .positions
            .read()
            .await
            .get(instrument)
            .cloned()
            .unwrap_or_else(|| Position::flat(instrument)))
    }

    async fn submit_order(&self, order: &Order) -> Result<Fill> {
        let mid_price = self
            .prices
            .read()
            .await
            .get(&order.instrument)
            .copied()
            .ok_or(Error::OrderRejected {
                reason: RejectionReason::NoPrice,
            })?;

        if matches!(order.quantity, Some(q) if !(q.is_finite() && q > 0.0)) {
            return Err(Error::OrderRejected {
                reason: RejectionReason::InvalidQuantity,
            });
        }

        // Apply slippage: buys pay more, sells receive less
        let fill_price = match order.side {
            OrderSide::Buy => mid_price * (1.0 + self.slippage_bps / 10_000.0),
            OrderSide::Sell => mid_price * (1.0 - self.slippage_bps / 10_000.0),
        };

        let mut positions = self.positions.write().await;
        let mut cash = self.cash.write().await;
        let held = positions
            .get(&order.instrument)
            .map(|p| p.size)
            .unwrap_or(0.0);

        let quantity = match order.side {
            OrderSide::Buy => {
                let quantity = order.quantity.unwrap_or(self.stake);
                if quantity * fill_price > *cash {
                    return Err(Error::OrderRejected {
                        reason: RejectionReason::InsufficientCash,
                    });
                }
                *cash -= quantity * fill_price;
                let position = positions
                    .entry(order.instrument.clone())
                    .or_insert_with(|| Position::flat(order.instrument.clone()));
                let new_size = position.size + quantity;
                position.price = (position.price * position.size + fill_price * quantity) / new_size;
                position.size = new_size;
                quantity
            }
            OrderSide::Sell => {
                let quantity = order.quantity.unwrap_or(held);
                if quantity <= 0.0 || quantity > held {
                    return Err(Error::OrderRejected {
                        reason: RejectionReason::InsufficientPosition,
                    });
                }
                *cash += quantity * fill_price;
                if quantity == held {
                    positions.remove(&order.instrument);
                } else if let Some(position) = positions.get_mut(&order.instrument) {
                    position.size -= quantity;
                }
                quantity
            }
        };

        debug!(
            instrument = %order.instrument,
            side = %order.side,
            mid = mid_price,
            fill = fill_price,
            qty = quantity,
            cash = *cash,
            "Paper fill simulated"
        );

        Ok(Fill {
            order_id: order.id.clone(),
            instrument: order.instrument.clone(),
            side: order.side,
            fill_price,
            quantity,
            timestamp: Utc::now(),
        })
    }

    async fn update_price(&self, instrument: &str, price: f64) {
        self.prices.write().await.insert(instrument.to_string(), price);
    }
}
