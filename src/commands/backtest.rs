use crate::config::AccountingConfig;
use crate::data_loader::{load_price_bars, DateWindow};
use crate::evaluator::StrategyEvaluator;
use crate::export::{backtest_summary, export_summary, export_trades_csv, BacktestReport};
use crate::models::{ParameterCombination, ParameterValue};
use crate::strategy::{SignalStrategy, StrategyRegistry};
use anyhow::{anyhow, Result};
use log::info;
use std::path::PathBuf;
use std::sync::Arc;

pub struct BacktestOptions {
    pub data_file: PathBuf,
    pub strategy: String,
    /// Positional values in the strategy's declared parameter order.
    pub parameters: Vec<f64>,
    pub window: DateWindow,
    pub config: AccountingConfig,
    pub trades_csv: Option<PathBuf>,
    pub summary_file: Option<PathBuf>,
}

/// Pair positional values with the strategy's parameter names.
pub fn bind_parameters(
    strategy: &dyn SignalStrategy,
    values: &[f64],
) -> Result<ParameterCombination> {
    let names = strategy.parameter_names();
    if names.len() != values.len() {
        return Err(anyhow!(
            "{} expects {} parameter(s) ({}), got {}",
            strategy.name(),
            names.len(),
            names.join(", "),
            values.len()
        ));
    }

    Ok(names
        .into_iter()
        .zip(values)
        .fold(ParameterCombination::new(), |combination, (name, value)| {
            let value = if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
                ParameterValue::Int(*value as i64)
            } else {
                ParameterValue::Float(*value)
            };
            combination.with(name, value)
        }))
}

pub fn run(registry: &StrategyRegistry, options: &BacktestOptions) -> Result<BacktestReport> {
    let strategy = registry.resolve(&options.strategy)?;
    let parameters = bind_parameters(strategy.as_ref(), &options.parameters)?;
    info!(
        "Received backtest command for strategy={} [{}]",
        strategy.name(),
        parameters
    );

    let bars = load_price_bars(&options.data_file, options.window)?;
    let evaluator = StrategyEvaluator::new(
        Arc::from(bars.as_slice()),
        strategy,
        options.config.clone(),
    );
    let report = BacktestReport::run(&bars, &evaluator, &parameters)?;

    if let Some(path) = &options.trades_csv {
        export_trades_csv(path, &report.evaluation.trades.trades)?;
    }
    let summary = backtest_summary(&report);
    match &options.summary_file {
        Some(path) => export_summary(path, &summary)?,
        None => println!("{}", summary),
    }

    Ok(report)
}
