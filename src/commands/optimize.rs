use crate::config::{AccountingConfig, OptimizerSettings};
use crate::data_loader::{load_price_bars, DateWindow};
use crate::export::{export_report_json, export_results_csv, export_summary, sweep_summary};
use crate::models::OptimizationReport;
use crate::optimizer::{print_results, ParallelOptimizer};
use crate::param_utils::{ParameterAxis, ParameterSpec};
use crate::strategy::{SignalStrategy, StrategyRegistry};
use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

pub struct OptimizeOptions {
    pub data_file: PathBuf,
    pub strategy: String,
    pub period_range: RangeInclusive<i64>,
    pub window: DateWindow,
    pub config: AccountingConfig,
    pub settings: OptimizerSettings,
    pub results_csv: Option<PathBuf>,
    pub report_json: Option<PathBuf>,
    pub summary_file: Option<PathBuf>,
    pub show_progress: bool,
}

/// Two declared parameters sweep as (short, long) pairs; any other count sweeps each
/// parameter independently over the same range.
pub fn sweep_spec_for(strategy: &dyn SignalStrategy, range: RangeInclusive<i64>) -> ParameterSpec {
    let names = strategy.parameter_names();
    match names.as_slice() {
        [short_name, long_name] => ParameterSpec::PairedRange {
            short_name: short_name.clone(),
            long_name: long_name.clone(),
            values: range.collect(),
        },
        _ => ParameterSpec::Grid(
            names
                .iter()
                .map(|name| ParameterAxis::int_range(name.clone(), range.clone()))
                .collect(),
        ),
    }
}

pub fn run(registry: &StrategyRegistry, options: &OptimizeOptions) -> Result<OptimizationReport> {
    let strategy = registry.resolve(&options.strategy)?;
    info!(
        "Received optimize command for strategy={} periods={}-{}",
        strategy.name(),
        options.period_range.start(),
        options.period_range.end()
    );
    let bars = load_price_bars(&options.data_file, options.window)?;

    let spec = sweep_spec_for(strategy.as_ref(), options.period_range.clone());
    if strategy.parameter_names().is_empty() {
        warn!(
            "{} declares no parameters; nothing to optimize",
            strategy.name()
        );
    }

    let spinner = if options.show_progress {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            spinner.set_style(style);
        }
        spinner.enable_steady_tick(Duration::from_millis(120));
        spinner
    } else {
        ProgressBar::hidden()
    };

    let optimizer = ParallelOptimizer::new(options.config.clone(), options.settings.clone());
    let report = optimizer.optimize(&bars, strategy.clone(), &spec, |message| {
        spinner.set_message(message.to_string())
    });
    spinner.finish_and_clear();

    print_results(&report, options.settings.top_n);

    if let Some(path) = &options.results_csv {
        export_results_csv(path, &report.results)?;
    }
    if let Some(path) = &options.report_json {
        export_report_json(path, &report)?;
    }
    let summary = sweep_summary(strategy.name(), &report, &options.config);
    match &options.summary_file {
        Some(path) => export_summary(path, &summary)?,
        None => println!("\n{}", summary),
    }

    Ok(report)
}
