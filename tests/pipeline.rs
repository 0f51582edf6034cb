use anyhow::Result;
use chrono::{Duration, TimeZone, Utc};
use engine::commands::{backtest, optimize};
use engine::config::{AccountingConfig, OptimizerSettings};
use engine::data_loader::DateWindow;
use engine::strategy::StrategyRegistry;
use std::f64::consts::PI;
use std::fmt::Write;
use std::fs;
use std::path::PathBuf;
use std::sync::Once;

const TOTAL_DAYS: i64 = 300;

fn ensure_test_env() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

struct Workspace {
    dir: PathBuf,
}

impl Workspace {
    fn create(name: &str) -> Result<Self> {
        let dir = std::env::temp_dir().join(format!("{}_{}", name, std::process::id()));
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    /// Trending sine wave, so crossovers happen at a steady rhythm.
    fn write_market_data(&self) -> Result<PathBuf> {
        let start = Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap();
        let mut csv = String::from("timestamp,open,high,low,close,volume\n");
        for day in 0..TOTAL_DAYS {
            let date = start + Duration::days(day);
            let close = 100.0 + day as f64 * 0.05 + 8.0 * (2.0 * PI * day as f64 / 40.0).sin();
            writeln!(
                csv,
                "{},{:.4},{:.4},{:.4},{:.4},{}",
                date.format("%Y-%m-%d"),
                close,
                close + 1.0,
                close - 1.0,
                close,
                1_000 + day
            )?;
        }
        let path = self.path("market-data.csv");
        fs::write(&path, csv)?;
        Ok(path)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.dir);
    }
}

#[test]
fn optimize_command_writes_ranked_csv_and_summary() -> Result<()> {
    ensure_test_env();
    let workspace = Workspace::create("optimize_command")?;
    let data_file = workspace.write_market_data()?;

    let options = optimize::OptimizeOptions {
        data_file,
        strategy: "ma".to_string(),
        period_range: 5..=15,
        window: DateWindow::default(),
        config: AccountingConfig::default(),
        settings: OptimizerSettings {
            max_workers: Some(2),
            top_n: 10,
        },
        results_csv: Some(workspace.path("results.csv")),
        report_json: None,
        summary_file: Some(workspace.path("summary.txt")),
        show_progress: false,
    };
    let report = optimize::run(&StrategyRegistry::with_builtin(), &options)?;

    assert_eq!(report.total_combinations, 55);
    assert_eq!(report.results.len(), 10);

    let csv = fs::read_to_string(workspace.path("results.csv"))?;
    let lines: Vec<_> = csv.lines().collect();
    assert_eq!(lines.len(), 11);
    assert!(lines[0].starts_with("rank,parameters,return_pct"));
    assert!(lines[1].starts_with("1,"));

    let summary = fs::read_to_string(workspace.path("summary.txt"))?;
    assert!(summary.contains("ma_crossover"));
    assert!(summary.contains(&report.best_parameters().unwrap().to_string()));
    Ok(())
}

#[test]
fn backtest_command_compares_with_buy_and_hold() -> Result<()> {
    ensure_test_env();
    let workspace = Workspace::create("backtest_command")?;
    let data_file = workspace.write_market_data()?;

    let options = backtest::BacktestOptions {
        data_file,
        strategy: "ma_crossover".to_string(),
        parameters: vec![5.0, 20.0],
        window: DateWindow {
            start: Some(Utc.with_ymd_and_hms(2023, 2, 1, 0, 0, 0).unwrap()),
            end: None,
        },
        config: AccountingConfig::new(50_000.0, 0.002),
        trades_csv: Some(workspace.path("trades.csv")),
        summary_file: Some(workspace.path("backtest.txt")),
    };
    let report = backtest::run(&StrategyRegistry::with_builtin(), &options)?;

    let trades = &report.evaluation.trades;
    assert!(trades.trade_count > 1);
    assert!(trades.trades.iter().all(|trade| trade.principal == 50_000.0));
    assert!(trades.trades[0].buy_date >= Utc.with_ymd_and_hms(2023, 2, 1, 0, 0, 0).unwrap());
    assert!(report.buy_and_hold.is_some());

    let trades_csv = fs::read_to_string(workspace.path("trades.csv"))?;
    assert_eq!(trades_csv.lines().count(), trades.trade_count + 1);
    let summary = fs::read_to_string(workspace.path("backtest.txt"))?;
    assert!(summary.contains("buy & hold by"));
    Ok(())
}

#[test]
fn unknown_strategy_is_an_error() -> Result<()> {
    ensure_test_env();
    let workspace = Workspace::create("unknown_strategy")?;
    let data_file = workspace.write_market_data()?;

    let options = backtest::BacktestOptions {
        data_file,
        strategy: "momentum".to_string(),
        parameters: Vec::new(),
        window: DateWindow::default(),
        config: AccountingConfig::default(),
        trades_csv: None,
        summary_file: None,
    };
    let error = backtest::run(&StrategyRegistry::with_builtin(), &options)
        .err()
        .map(|error| error.to_string())
        .unwrap_or_default();
    assert!(error.contains("Unknown strategy: momentum"));
    Ok(())
}
