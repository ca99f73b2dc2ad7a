use tracing::debug;

use common::{Bar, Error, Intent, Result, StrategyParams};

use crate::{BarContext, Strategy};

/// Buys every `modbuy`-th bar while flat and sells every `modsell`-th bar
/// while long.
///
/// Stateless beyond its parameters: the decision is a pure function of the
/// bar index and the position size.
#[derive(Debug, Clone)]
pub struct PeriodicStrategy {
    name: String,
    instrument: String,
    params: StrategyParams,
}

impl PeriodicStrategy {
    pub fn new(
        name: impl Into<String>,
        instrument: impl Into<String>,
        params: StrategyParams,
    ) -> Result<Self> {
        let name = name.into();
        if params.modbuy == 0 || params.modsell == 0 {
            return Err(Error::config(format!(
                "strategy '{name}': modbuy and modsell must be >= 1, got {}/{}",
                params.modbuy, params.modsell
            )));
        }
        Ok(Self {
            name,
            instrument: instrument.into(),
            params,
        })
    }

    pub fn params(&self) -> StrategyParams {
        self.params
    }

    /// Buy check first, then sell check. Both read the same `position_size`,
    /// so at most one of them can fire.
    pub fn evaluate(&self, bar_index: u64, position_size: f64) -> Vec<Intent> {
        let mut intents = Vec::new();

        if bar_index % self.params.modbuy == 0 && position_size == 0.0 {
            intents.push(Intent::Buy {
                instrument: self.instrument.clone(),
                size: None,
            });
        }

        if bar_index % self.params.modsell == 0 && position_size > 0.0 {
            intents.push(Intent::Sell {
                instrument: self.instrument.clone(),
                size: None,
            });
        }

        intents
    }
}

impl Strategy for PeriodicStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn instrument(&self) -> &str {
        &self.instrument
    }

    fn on_bar(&self, bar: &Bar, ctx: &BarContext) -> Vec<Intent> {
        let intents = self.evaluate(ctx.bar_index, ctx.position_size);
        if !intents.is_empty() {
            debug!(
                strategy = %self.name,
                bar = ctx.bar_index,
                close = bar.close,
                position = ctx.position_size,
                intents = ?intents,
                "Periodic strategy fired"
            );
        }
        intents
    }
}
