use crate::config::{AccountingConfig, OptimizerSettings};
use crate::evaluator::StrategyEvaluator;
use crate::models::{OptimizationReport, OptimizationResult, ParameterCombination, PriceBar};
use crate::optimizer_status::{progress_message, ProgressThrottle};
use crate::param_utils::{expand, ParameterSpec};
use crate::strategy::SignalStrategy;
use crate::worker_pool::{panic_message, WorkerPool};
use log::{debug, info, warn};
use std::cmp::Ordering;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

/// Sweeps a parameter space for one strategy over one price series on a worker pool.
pub struct ParallelOptimizer {
    config: AccountingConfig,
    settings: OptimizerSettings,
}

/// Best completed result seen so far and the submission index it came from.
struct BestTracker {
    best: Option<(usize, OptimizationResult)>,
}

impl BestTracker {
    fn new() -> Self {
        Self { best: None }
    }

    /// Returns true when `candidate` replaced the previous best.
    fn offer(&mut self, index: usize, candidate: &OptimizationResult) -> bool {
        let Some(candidate_return) = candidate.return_ratio() else {
            return false;
        };
        let improves = match &self.best {
            None => true,
            Some((best_index, best)) => {
                let best_return = best.return_ratio().unwrap_or(f64::NEG_INFINITY);
                candidate_return > best_return
                    || (candidate_return == best_return && index < *best_index)
            }
        };
        if improves {
            self.best = Some((index, candidate.clone()));
        }
        improves
    }

    fn into_best(self) -> Option<OptimizationResult> {
        self.best.map(|(_, best)| best)
    }
}

impl ParallelOptimizer {
    pub fn new(config: AccountingConfig, settings: OptimizerSettings) -> Self {
        Self {
            config,
            settings,
        }
    }

    pub fn config(&self) -> &AccountingConfig {
        &self.config
    }

    pub fn settings(&self) -> &OptimizerSettings {
        &self.settings
    }

    /// Evaluate every combination of `spec` and return the top results, best first.
    ///
    /// Individual failures are recorded in the report and never abort the sweep.
    /// `on_progress` receives human-readable status lines on the calling thread.
    pub fn optimize<F>(
        &self,
        bars: &[PriceBar],
        strategy: Arc<dyn SignalStrategy>,
        spec: &ParameterSpec,
        mut on_progress: F,
    ) -> OptimizationReport
    where
        F: FnMut(&str),
    {
        let start_time = Instant::now();
        let combinations = expand(spec);
        let total = combinations.len();

        if combinations.is_empty() {
            info!("No parameter combinations to evaluate for {}", strategy.name());
            return OptimizationReport::empty(start_time.elapsed());
        }

        let worker_count = self.settings.worker_count(total);
        info!(
            "Optimizing {} over {} bars: {} combinations",
            strategy.name(),
            bars.len(),
            total
        );
        info!("Using {} worker threads", worker_count);
        notify(
            &mut on_progress,
            &format!("Optimization starting: {} combinations", total),
        );
        notify(
            &mut on_progress,
            &format!("Using {} worker threads", worker_count),
        );
        notify(
            &mut on_progress,
            &progress_message(0, total, 0.0, start_time.elapsed()),
        );

        let evaluator = StrategyEvaluator::new(Arc::from(bars), strategy, self.config.clone());

        let mut slots: Vec<Option<OptimizationResult>> = vec![None; total];
        let mut best = BestTracker::new();
        let mut throttle = ProgressThrottle::new(total);
        let mut completed = 0usize;

        let mut record = |index: usize, result: OptimizationResult| {
            completed += 1;
            if best.offer(index, &result) {
                let message = format!(
                    "Found better parameters: [{}] return {:.2}%",
                    result.parameters,
                    result.return_ratio().unwrap_or(0.0) * 100.0
                );
                info!("{}", message);
                notify(&mut on_progress, &message);
            }
            slots[index] = Some(result);

            if throttle.should_report(completed) {
                let message = progress_message(
                    completed,
                    total,
                    throttle.percent(completed),
                    start_time.elapsed(),
                );
                debug!("{}", message);
                notify(&mut on_progress, &message);
            }
        };

        let handler_evaluator = evaluator.clone();
        match WorkerPool::new(worker_count, total, move |parameters: ParameterCombination| {
            handler_evaluator.evaluate(&parameters)
        }) {
            Ok(mut pool) => {
                // Pool indices only count accepted submissions.
                let mut submitted: Vec<usize> = Vec::with_capacity(total);
                for (index, parameters) in combinations.iter().enumerate() {
                    match pool.submit(parameters.clone()) {
                        Ok(_) => submitted.push(index),
                        Err(error) => {
                            warn!("Could not queue combination {}: {}", index, error);
                            record(
                                index,
                                OptimizationResult::failed(parameters.clone(), error.to_string()),
                            );
                        }
                    }
                }

                for completion in pool.drain() {
                    let Some(&index) = submitted.get(completion.index) else {
                        warn!("Discarding completion for unknown task {}", completion.index);
                        continue;
                    };
                    let result = match completion.outcome {
                        Ok(result) => result,
                        Err(message) => {
                            warn!("Worker panicked on combination {}: {}", index, message);
                            OptimizationResult::failed(combinations[index].clone(), message)
                        }
                    };
                    record(index, result);
                }

                if let Err(error) = pool.shutdown() {
                    warn!("Worker pool shutdown reported errors: {}", error);
                }
            }
            Err(error) => {
                warn!(
                    "Could not start worker pool ({}); evaluating on the calling thread",
                    error
                );
                for (index, parameters) in combinations.iter().enumerate() {
                    record(index, evaluator.evaluate(parameters));
                }
            }
        }

        let results: Vec<OptimizationResult> = slots
            .into_iter()
            .zip(combinations)
            .map(|(slot, parameters)| {
                slot.unwrap_or_else(|| {
                    OptimizationResult::failed(parameters, "combination was never evaluated")
                })
            })
            .collect();
        let failed_combinations = results.iter().filter(|result| result.is_failed()).count();

        let (mut ranked, sorted) = rank_results(results);
        ranked.truncate(self.settings.top_n);

        let elapsed = start_time.elapsed();
        let best = best.into_best();
        if failed_combinations > 0 {
            warn!(
                "Optimization completed with {} failed combinations out of {}",
                failed_combinations, total
            );
        }
        info!(
            "Optimization complete: {} combinations in {:.2}s",
            total,
            elapsed.as_secs_f64()
        );
        notify(
            &mut on_progress,
            &format!(
                "Optimization complete, elapsed {:.2}s",
                elapsed.as_secs_f64()
            ),
        );

        OptimizationReport {
            results: ranked,
            best,
            elapsed,
            total_combinations: total,
            failed_combinations,
            sorted,
        }
    }
}

/// Deliver a progress line; a panicking callback is logged and otherwise ignored.
fn notify<F: FnMut(&str)>(on_progress: &mut F, message: &str) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| on_progress(message))) {
        warn!(
            "Progress callback failed: {}",
            panic_message(payload.as_ref())
        );
    }
}

/// Order results best first with failures last, keeping submission order among ties.
/// Returns the input order and `false` if the sort could not complete.
pub fn rank_results(results: Vec<OptimizationResult>) -> (Vec<OptimizationResult>, bool) {
    rank_results_by(results, OptimizationResult::rank_cmp)
}

pub(crate) fn rank_results_by<C>(
    results: Vec<OptimizationResult>,
    compare: C,
) -> (Vec<OptimizationResult>, bool)
where
    C: Fn(&OptimizationResult, &OptimizationResult) -> Ordering,
{
    let mut order: Vec<usize> = (0..results.len()).collect();
    match panic::catch_unwind(AssertUnwindSafe(|| {
        order.sort_by(|&a, &b| compare(&results[a], &results[b]))
    })) {
        Ok(()) => {
            let mut slots: Vec<Option<OptimizationResult>> =
                results.into_iter().map(Some).collect();
            let ranked = order
                .into_iter()
                .filter_map(|index| slots[index].take())
                .collect();
            (ranked, true)
        }
        Err(payload) => {
            warn!(
                "Ranking failed ({}); returning results in submission order",
                panic_message(payload.as_ref())
            );
            (results, false)
        }
    }
}

pub fn print_results(report: &OptimizationReport, top_n: usize) {
    println!(
        "\n=== TOP {} PARAMETER COMBINATIONS ===\n",
        std::cmp::min(top_n, report.results.len())
    );

    for (i, result) in report.results.iter().take(top_n).enumerate() {
        println!("Rank {}:", i + 1);
        match result.evaluation() {
            Some(evaluation) => {
                println!("  Return: {:.2}%", evaluation.return_ratio * 100.0);
                println!("  Sharpe Ratio: {:.4}", evaluation.sharpe_ratio);
                println!(
                    "  Total Return: ${:.2}",
                    evaluation.trades.total_return
                );
                println!("  Total Fees: ${:.2}", evaluation.trades.total_fee);
                println!("  Win Rate: {:.2}%", evaluation.trades.win_rate * 100.0);
                println!(
                    "  Profit/Loss Ratio: {}",
                    evaluation.trades.profit_loss_ratio
                );
                println!("  Total Trades: {}", evaluation.trades.trade_count);
            }
            None => {
                println!("  Failed: {}", result.error().unwrap_or("unknown error"));
            }
        }
        println!("  Parameters:");
        for (key, value) in result.parameters.iter() {
            println!("    {}: {}", key, value);
        }
        println!();
    }

    println!(
        "Evaluated {} combinations ({} failed) in {:.2}s{}",
        report.total_combinations,
        report.failed_combinations,
        report.elapsed.as_secs_f64(),
        if report.sorted { "" } else { " (unsorted)" }
    );
}
