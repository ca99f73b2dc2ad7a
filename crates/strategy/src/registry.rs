use tracing::info;

use common::{Error, Result, StrategyConfig};

use crate::periodic::PeriodicStrategy;
use crate::Strategy;

/// Holds all active strategy instances and selects those interested in a bar.
#[derive(Default)]
pub struct StrategyRegistry {
    strategies: Vec<Box<dyn Strategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry from config. Unknown strategy types are a
    /// configuration error.
    pub fn from_config(configs: &[StrategyConfig]) -> Result<Self> {
        let mut registry = Self::new();
        for cfg in configs {
            registry.add(build_strategy(cfg)?);
        }
        Ok(registry)
    }

    pub fn add(&mut self, strategy: Box<dyn Strategy>) {
        info!(name = %strategy.name(), instrument = %strategy.instrument(), "Registered strategy");
        self.strategies.push(strategy);
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Strategy> + '_ {
        self.strategies.iter().map(|s| s.as_ref())
    }

    /// Strategies trading `instrument`, in registration order.
    pub fn for_instrument<'a>(
        &'a self,
        instrument: &'a str,
    ) -> impl Iterator<Item = &'a dyn Strategy> + 'a {
        self.strategies
            .iter()
            .filter(move |s| s.instrument() == instrument)
            .map(|s| s.as_ref())
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

// ─── Strategy builders ────────────────────────────────────────────────────────

fn build_strategy(cfg: &StrategyConfig) -> Result<Box<dyn Strategy>> {
    match cfg.strategy_type.as_str() {
        "periodic" => Ok(Box::new(PeriodicStrategy::new(
            cfg.name.clone(),
            cfg.instrument.clone(),
            cfg.params,
        )?)),
        other => Err(Error::config(format!(
            "strategy '{}': unknown type '{other}'",
            cfg.name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::StrategyParams;

    fn cfg(strategy_type: &str, instrument: &str) -> StrategyConfig {
        StrategyConfig {
            strategy_type: strategy_type.into(),
            name: format!("{strategy_type}-{instrument}"),
            instrument: instrument.into(),
            params: StrategyParams::default(),
        }
    }

    #[test]
    fn builds_periodic_strategies() {
        let registry =
            StrategyRegistry::from_config(&[cfg("periodic", "data0"), cfg("periodic", "data1")])
                .unwrap();
        assert_eq!(registry.len(), 2);
        let names: Vec<&str> = registry.for_instrument("data1").map(|s| s.name()).collect();
        assert_eq!(names, vec!["periodic-data1"]);
    }

    #[test]
    fn unknown_type_is_config_error() {
        let result = StrategyRegistry::from_config(&[cfg("rsi", "data0")]);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn invalid_params_propagate() {
        let mut bad = cfg("periodic", "data0");
        bad.params.modsell = 0;
        assert!(StrategyRegistry::from_config(&[bad]).is_err());
    }
}
