use crate::accounting::buy_and_hold;
use crate::config::AccountingConfig;
use crate::evaluator::StrategyEvaluator;
use crate::models::{Evaluation, OptimizationReport, OptimizationResult, ParameterCombination, PriceBar, Trade};
use anyhow::{Context, Result};
use log::info;
use std::fmt::Write as _;
use std::fs::File;
use std::io::Write;
use std::path::Path;

const RESULT_HEADERS: [&str; 8] = [
    "rank",
    "parameters",
    "return_pct",
    "sharpe_ratio",
    "trade_count",
    "win_rate_pct",
    "profit_loss_ratio",
    "error",
];

const TRADE_HEADERS: [&str; 11] = [
    "buy_date",
    "buy_price",
    "sell_date",
    "sell_price",
    "principal",
    "return",
    "return_rate_pct",
    "fee",
    "buy_fee",
    "sell_fee",
    "hold_days",
];

/// One strategy run over the full series plus the buy-and-hold baseline.
#[derive(Debug, Clone)]
pub struct BacktestReport {
    pub strategy: String,
    pub parameters: ParameterCombination,
    pub evaluation: Evaluation,
    pub buy_and_hold: Option<Trade>,
}

impl BacktestReport {
    pub fn run(
        bars: &[PriceBar],
        evaluator: &StrategyEvaluator,
        parameters: &ParameterCombination,
    ) -> Result<Self> {
        let evaluation = evaluator
            .run(parameters)
            .with_context(|| format!("Backtest failed for [{}]", parameters))?;
        let baseline = buy_and_hold(bars, evaluator.config())?;
        Ok(Self {
            strategy: evaluator.strategy_name().to_string(),
            parameters: parameters.clone(),
            evaluation,
            buy_and_hold: baseline,
        })
    }

    /// Strategy return minus buy-and-hold return, in percentage points.
    pub fn excess_return_pct(&self) -> Option<f64> {
        self.buy_and_hold
            .as_ref()
            .map(|hold| self.evaluation.trades.total_return_rate - hold.return_rate)
    }
}

fn result_row(rank: usize, result: &OptimizationResult) -> Vec<String> {
    let mut row = vec![rank.to_string(), result.parameters.to_string()];
    match result.evaluation() {
        Some(evaluation) => row.extend([
            format!("{:.4}", evaluation.return_ratio * 100.0),
            format!("{:.4}", evaluation.sharpe_ratio),
            evaluation.trades.trade_count.to_string(),
            format!("{:.2}", evaluation.trades.win_rate * 100.0),
            evaluation.trades.profit_loss_ratio.to_string(),
            String::new(),
        ]),
        None => row.extend([
            String::new(),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
            result.error().unwrap_or_default().to_string(),
        ]),
    }
    row
}

pub fn write_results_csv<W: Write>(writer: W, results: &[OptimizationResult]) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(RESULT_HEADERS)?;
    for (i, result) in results.iter().enumerate() {
        csv_writer.write_record(result_row(i + 1, result))?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn write_trades_csv<W: Write>(writer: W, trades: &[Trade]) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(TRADE_HEADERS)?;
    for trade in trades {
        csv_writer.write_record([
            trade.buy_date.format("%Y-%m-%d").to_string(),
            format!("{:.4}", trade.buy_price),
            trade.sell_date.format("%Y-%m-%d").to_string(),
            format!("{:.4}", trade.sell_price),
            format!("{:.2}", trade.principal),
            format!("{:.2}", trade.net_return),
            format!("{:.4}", trade.return_rate),
            format!("{:.2}", trade.fee),
            format!("{:.2}", trade.buy_fee),
            format!("{:.2}", trade.sell_fee),
            trade.hold_days.to_string(),
        ])?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn export_results_csv(path: &Path, results: &[OptimizationResult]) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    write_results_csv(file, results)?;
    info!("Wrote {} ranked results to {}", results.len(), path.display());
    Ok(())
}

pub fn export_trades_csv(path: &Path, trades: &[Trade]) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    write_trades_csv(file, trades)?;
    info!("Wrote {} trades to {}", trades.len(), path.display());
    Ok(())
}

/// Full report, including failed combinations and their errors, as pretty JSON.
pub fn export_report_json(path: &Path, report: &OptimizationReport) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(file, report)
        .with_context(|| format!("Failed to serialize report to {}", path.display()))?;
    info!("Wrote JSON report to {}", path.display());
    Ok(())
}

pub fn export_summary(path: &Path, summary: &str) -> Result<()> {
    std::fs::write(path, summary)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Wrote summary to {}", path.display());
    Ok(())
}

fn metric(out: &mut String, label: &str, value: impl std::fmt::Display) {
    let _ = writeln!(out, "{:<24}{}", label, value);
}

/// Row-per-metric summary of a finished sweep.
pub fn sweep_summary(
    strategy: &str,
    report: &OptimizationReport,
    config: &AccountingConfig,
) -> String {
    let mut out = String::new();
    metric(&mut out, "Strategy", strategy);
    metric(&mut out, "Principal", format!("{:.2}", config.principal));
    metric(&mut out, "Fee rate", config.fee_rate);
    metric(&mut out, "Combinations", report.total_combinations);
    metric(&mut out, "Failed", report.failed_combinations);
    metric(&mut out, "Elapsed (s)", format!("{:.2}", report.elapsed.as_secs_f64()));
    if !report.sorted {
        metric(&mut out, "Ranking", "unsorted (ranking failed)");
    }

    match report.best.as_ref().and_then(|best| best.evaluation().map(|e| (best, e))) {
        Some((best, evaluation)) => {
            metric(&mut out, "Best parameters", &best.parameters);
            push_evaluation(&mut out, evaluation);
        }
        None => metric(&mut out, "Best parameters", "none"),
    }
    out
}

/// Row-per-metric summary of a single backtest, including the buy-and-hold comparison.
pub fn backtest_summary(report: &BacktestReport) -> String {
    let mut out = String::new();
    metric(&mut out, "Strategy", &report.strategy);
    metric(&mut out, "Parameters", &report.parameters);
    push_evaluation(&mut out, &report.evaluation);

    match (&report.buy_and_hold, report.excess_return_pct()) {
        (Some(hold), Some(excess)) => {
            metric(&mut out, "Buy & hold return", format!("{:.2}", hold.net_return));
            metric(&mut out, "Buy & hold return %", format!("{:.2}%", hold.return_rate));
            let verdict = if excess >= 0.0 { "beat" } else { "trailed" };
            let _ = writeln!(
                out,
                "Strategy {} buy & hold by {:.2}%",
                verdict,
                excess.abs()
            );
        }
        _ => metric(&mut out, "Buy & hold", "not enough bars"),
    }
    out
}

fn push_evaluation(out: &mut String, evaluation: &Evaluation) {
    let trades = &evaluation.trades;
    metric(out, "Total return", format!("{:.2}", trades.total_return));
    metric(out, "Total return %", format!("{:.2}%", trades.total_return_rate));
    metric(out, "Sharpe ratio", format!("{:.4}", evaluation.sharpe_ratio));
    metric(out, "Trades", trades.trade_count);
    metric(out, "Winning trades", trades.winning_trades);
    metric(out, "Win rate", format!("{:.2}%", trades.win_rate * 100.0));
    metric(out, "Profit/loss ratio", trades.profit_loss_ratio);
    metric(out, "Total fees", format!("{:.2}", trades.total_fee));
}
