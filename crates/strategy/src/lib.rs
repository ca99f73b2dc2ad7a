pub mod indicators;
pub mod periodic;
pub mod registry;

pub use periodic::PeriodicStrategy;
pub use registry::StrategyRegistry;

use common::{Bar, Intent};

/// What the driver knows about a bar when it hands it to a strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarContext {
    /// 1-based count of bars seen so far for the strategy's instrument.
    pub bar_index: u64,
    /// Position size read from the broker once, before the strategy runs.
    pub position_size: f64,
}

/// All strategy implementations must satisfy this trait.
///
/// The driver calls `on_bar` once per bar of `instrument()` and submits the
/// returned intents in order. Fills are applied after `on_bar` returns, so a
/// strategy never observes its own orders within the same call.
pub trait Strategy: Send + Sync {
    /// Human-readable name of this strategy instance.
    fn name(&self) -> &str;

    /// The feed this strategy trades (e.g. "data0").
    fn instrument(&self) -> &str;

    /// Evaluate the latest bar and return zero or more intents.
    fn on_bar(&self, bar: &Bar, ctx: &BarContext) -> Vec<Intent>;
}
