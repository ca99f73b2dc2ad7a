use std::sync::Arc;

use tracing::{error, info};

use common::{Broker, Fill, Intent, Order, Result};

/// Turns strategy intents into orders and submits them to the broker.
///
/// This is the ONLY component that calls `Broker::submit_order`. Rejections
/// are logged and returned unchanged; nothing is retried.
pub struct OrderExecutor {
    broker: Arc<dyn Broker>,
}

impl OrderExecutor {
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self { broker }
    }

    pub async fn execute(&self, intent: &Intent) -> Result<Fill> {
        let order = Order::from(intent);
        info!(
            instrument = %order.instrument,
            side = %order.side,
            qty = ?order.quantity,
            "Executing order"
        );

        match self.broker.submit_order(&order).await {
            Ok(fill) => {
                info!(
                    instrument = %fill.instrument,
                    price = fill.fill_price,
                    qty = fill.quantity,
                    "Order filled"
                );
                Ok(fill)
            }
            Err(e) => {
                error!(instrument = %order.instrument, error = %e, "Order submission failed");
                Err(e)
            }
        }
    }
}
