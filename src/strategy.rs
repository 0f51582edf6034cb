use crate::models::{ParameterValue, PriceBar, RawSignal};
use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Produces one raw signal per bar for a positional parameter list.
///
/// `None` entries mean "no decision on this bar"; the evaluator forward-fills them.
pub trait SignalStrategy: Send + Sync {
    fn name(&self) -> &str;
    /// Names of the positional parameters, in the order `generate_signals` expects them.
    fn parameter_names(&self) -> Vec<String>;
    fn generate_signals(&self, bars: &[PriceBar], params: &[ParameterValue])
        -> Result<Vec<RawSignal>>;
    fn description(&self) -> &str {
        ""
    }
}

#[path = "strategies/ma_crossover.rs"]
pub mod ma_crossover;

pub use ma_crossover::MaCrossoverStrategy;

#[path = "strategies/buy_and_hold.rs"]
pub mod buy_and_hold;

pub use buy_and_hold::BuyAndHoldStrategy;

/// Adapts any closure with the strategy shape.
pub struct FnStrategy<F> {
    name: String,
    parameter_names: Vec<String>,
    func: F,
}

impl<F> FnStrategy<F>
where
    F: Fn(&[PriceBar], &[ParameterValue]) -> Result<Vec<RawSignal>> + Send + Sync,
{
    pub fn new<S: Into<String>>(name: S, parameter_names: &[&str], func: F) -> Self {
        Self {
            name: name.into(),
            parameter_names: parameter_names.iter().map(|p| p.to_string()).collect(),
            func,
        }
    }
}

impl<F> SignalStrategy for FnStrategy<F>
where
    F: Fn(&[PriceBar], &[ParameterValue]) -> Result<Vec<RawSignal>> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn parameter_names(&self) -> Vec<String> {
        self.parameter_names.clone()
    }

    fn generate_signals(
        &self,
        bars: &[PriceBar],
        params: &[ParameterValue],
    ) -> Result<Vec<RawSignal>> {
        (self.func)(bars, params)
    }
}

/// Name-keyed strategy lookup, populated once at startup.
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    strategies: BTreeMap<String, Arc<dyn SignalStrategy>>,
    aliases: BTreeMap<String, String>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in strategy.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(MaCrossoverStrategy::new()));
        registry.register(Arc::new(BuyAndHoldStrategy::new()));
        registry.alias("ma", MaCrossoverStrategy::NAME);
        registry.alias("dual_ma", MaCrossoverStrategy::NAME);
        registry
    }

    pub fn register(&mut self, strategy: Arc<dyn SignalStrategy>) {
        self.strategies
            .insert(normalize_key(strategy.name()), strategy);
    }

    pub fn alias(&mut self, alias: &str, target: &str) {
        self.aliases
            .insert(normalize_key(alias), normalize_key(target));
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn SignalStrategy>> {
        let key = normalize_key(name);
        let key = self.aliases.get(&key).cloned().unwrap_or(key);
        self.strategies.get(&key).cloned().ok_or_else(|| {
            anyhow!(
                "Unknown strategy: {} (available: {})",
                name,
                self.names().join(", ")
            )
        })
    }

    pub fn names(&self) -> Vec<String> {
        self.strategies.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn SignalStrategy>> {
        self.strategies.values()
    }
}

fn normalize_key(name: &str) -> String {
    name.trim().to_ascii_lowercase().replace(['-', ' '], "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Signal;

    #[test]
    fn resolves_builtin_names_and_aliases() {
        let registry = StrategyRegistry::with_builtin();
        assert_eq!(registry.resolve("ma_crossover").unwrap().name(), "ma_crossover");
        assert_eq!(registry.resolve("MA").unwrap().name(), "ma_crossover");
        assert_eq!(registry.resolve("dual-ma").unwrap().name(), "ma_crossover");
        assert_eq!(registry.resolve("buy_and_hold").unwrap().name(), "buy_and_hold");

        let error = registry.resolve("martingale").err().unwrap().to_string();
        assert!(error.contains("martingale"));
        assert!(error.contains("buy_and_hold"));
    }

    #[test]
    fn closures_register_as_strategies() {
        let mut registry = StrategyRegistry::new();
        registry.register(Arc::new(FnStrategy::new(
            "always_flat",
            &["unused"],
            |bars: &[PriceBar], _params: &[ParameterValue]| Ok(vec![Some(Signal::Flat); bars.len()]),
        )));

        let strategy = registry.resolve("always_flat").unwrap();
        assert_eq!(strategy.parameter_names(), vec!["unused".to_string()]);
        assert!(strategy
            .generate_signals(&[], &[ParameterValue::Int(1)])
            .unwrap()
            .is_empty());
    }
}
