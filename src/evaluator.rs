use crate::accounting::compute_trades;
use crate::config::AccountingConfig;
use crate::models::{closes, Evaluation, OptimizationResult, ParameterCombination, PriceBar};
use crate::performance::signal_sharpe_ratio;
use crate::signals::resolve_aligned;
use crate::strategy::SignalStrategy;
use crate::worker_pool::panic_message;
use anyhow::{anyhow, Result};
use log::warn;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Runs one strategy over one price series for any number of parameter combinations.
///
/// Cloning is cheap: bars, closes and the strategy are shared.
#[derive(Clone)]
pub struct StrategyEvaluator {
    bars: Arc<[PriceBar]>,
    closes: Arc<[f64]>,
    strategy: Arc<dyn SignalStrategy>,
    config: AccountingConfig,
}

impl StrategyEvaluator {
    pub fn new(
        bars: Arc<[PriceBar]>,
        strategy: Arc<dyn SignalStrategy>,
        config: AccountingConfig,
    ) -> Self {
        let closes: Arc<[f64]> = closes(&bars).into();
        Self {
            bars,
            closes,
            strategy,
            config,
        }
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    pub fn bar_count(&self) -> usize {
        self.bars.len()
    }

    pub fn config(&self) -> &AccountingConfig {
        &self.config
    }

    /// Evaluate one combination. Errors and panics raised by the strategy or the
    /// accounting become a failed result instead of propagating.
    pub fn evaluate(&self, parameters: &ParameterCombination) -> OptimizationResult {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run(parameters)));
        match outcome {
            Ok(Ok(evaluation)) => OptimizationResult::completed(parameters.clone(), evaluation),
            Ok(Err(error)) => {
                warn!(
                    "{} failed for [{}]: {:#}",
                    self.strategy.name(),
                    parameters,
                    error
                );
                OptimizationResult::failed(parameters.clone(), format!("{:#}", error))
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(
                    "{} panicked for [{}]: {}",
                    self.strategy.name(),
                    parameters,
                    message
                );
                OptimizationResult::failed(parameters.clone(), message)
            }
        }
    }

    /// Evaluate one combination, returning errors to the caller.
    pub fn run(&self, parameters: &ParameterCombination) -> Result<Evaluation> {
        let raw = self
            .strategy
            .generate_signals(&self.bars, &parameters.values())?;
        let signals = resolve_aligned(&raw, self.bars.len(), self.config.undecided_policy)?;
        let trades = compute_trades(&self.bars, &signals, &self.config)?;

        let return_ratio = trades.total_return_rate / 100.0;
        if !return_ratio.is_finite() {
            return Err(anyhow!("return is not finite ({})", return_ratio));
        }

        Ok(Evaluation {
            return_ratio,
            sharpe_ratio: signal_sharpe_ratio(&self.closes, &signals),
            trades,
        })
    }
}
