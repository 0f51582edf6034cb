use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use engine::{
    commands::{backtest, optimize, strategies},
    config::{
        settings_from_env, validate_fee_rate, validate_principal, AccountingConfig,
        OptimizerSettings, UndecidedSignalPolicy,
    },
    data_loader::{parse_timestamp, DateWindow},
    param_utils::{clamp_period_range, parse_period_range, DEFAULT_PERIOD_RANGE},
    strategy::StrategyRegistry,
};
use log::info;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "engine")]
#[command(about = "Moving-average crossover backtester and parallel parameter sweeper")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct MarketArgs {
    /// CSV file with timestamp,open,high,low,close[,volume] columns
    #[arg(long = "data-file", value_name = "PATH")]
    data_file: PathBuf,
    /// Strategy name (see `strategies`)
    #[arg(long, default_value = "ma_crossover")]
    strategy: String,
    /// First bar to include (YYYY-MM-DD, RFC 3339 or unix time)
    #[arg(long)]
    from: Option<String>,
    /// Last bar to include
    #[arg(long)]
    to: Option<String>,
    /// Capital committed to every trade (overrides BACKTEST_PRINCIPAL)
    #[arg(long)]
    principal: Option<String>,
    /// Fee charged on each leg as a fraction of the traded amount (overrides BACKTEST_FEE_RATE)
    #[arg(long = "fee-rate")]
    fee_rate: Option<String>,
    /// How bars before the first decision are treated: long or flat
    #[arg(long = "undecided")]
    undecided: Option<String>,
    /// Write the plain-text summary here instead of printing it
    #[arg(long = "summary", value_name = "PATH")]
    summary_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sweep strategy parameters in parallel and rank the results
    Optimize {
        #[command(flatten)]
        market: MarketArgs,
        /// Period range as START-END, e.g. 5-60
        #[arg(long, conflicts_with_all = ["start", "end"])]
        range: Option<String>,
        /// Lowest period to sweep
        #[arg(long)]
        start: Option<i64>,
        /// Highest period to sweep
        #[arg(long)]
        end: Option<i64>,
        /// Worker threads (overrides OPTIMIZER_MAX_WORKERS)
        #[arg(long)]
        workers: Option<usize>,
        /// Number of ranked results to keep (overrides OPTIMIZER_TOP_N)
        #[arg(long = "top-n")]
        top_n: Option<usize>,
        /// Write ranked results as CSV
        #[arg(long = "output", value_name = "PATH")]
        output: Option<PathBuf>,
        /// Write the full report as JSON
        #[arg(long = "json", value_name = "PATH")]
        json: Option<PathBuf>,
        /// Disable the progress spinner
        #[arg(long)]
        quiet: bool,
    },
    /// Run one parameter set and compare it with buy and hold
    Backtest {
        #[command(flatten)]
        market: MarketArgs,
        /// Parameter values in declared order, e.g. 5,20
        #[arg(long, value_delimiter = ',')]
        params: Vec<f64>,
        /// Write the trade list as CSV
        #[arg(long = "trades", value_name = "PATH")]
        trades: Option<PathBuf>,
    },
    /// List registered strategies
    Strategies,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let registry = StrategyRegistry::with_builtin();

    match cli.command {
        Commands::Optimize {
            market,
            range,
            start,
            end,
            workers,
            top_n,
            output,
            json,
            quiet,
        } => {
            let settings_map = settings_from_env();
            let mut settings = OptimizerSettings::from_settings_map(&settings_map)?;
            if let Some(workers) = workers {
                settings.max_workers = Some(workers.max(1));
            }
            if let Some(top_n) = top_n {
                settings.top_n = top_n.max(1);
            }

            let period_range = match (range, start, end) {
                (Some(raw), _, _) => parse_period_range(&raw),
                (None, None, None) => DEFAULT_PERIOD_RANGE,
                (None, start, end) => clamp_period_range(
                    start.unwrap_or(*DEFAULT_PERIOD_RANGE.start()),
                    end.unwrap_or(*DEFAULT_PERIOD_RANGE.end()),
                ),
            };

            let options = optimize::OptimizeOptions {
                data_file: market.data_file.clone(),
                strategy: market.strategy.clone(),
                period_range,
                window: date_window(&market)?,
                config: accounting_config(&market)?,
                settings,
                results_csv: output,
                report_json: json,
                summary_file: market.summary_file.clone(),
                show_progress: !quiet,
            };
            let report = optimize::run(&registry, &options)?;
            if let Some(best) = report.best_parameters() {
                info!("Best parameters: {}", best);
            }
        }
        Commands::Backtest {
            market,
            params,
            trades,
        } => {
            let options = backtest::BacktestOptions {
                data_file: market.data_file.clone(),
                strategy: market.strategy.clone(),
                parameters: params,
                window: date_window(&market)?,
                config: accounting_config(&market)?,
                trades_csv: trades,
                summary_file: market.summary_file.clone(),
            };
            backtest::run(&registry, &options)?;
        }
        Commands::Strategies => strategies::run(&registry),
    }

    Ok(())
}

/// Environment settings first, then command-line overrides.
fn accounting_config(market: &MarketArgs) -> Result<AccountingConfig> {
    let mut config = AccountingConfig::from_settings_map(&settings_from_env())?;
    if let Some(raw) = &market.principal {
        config.principal = validate_principal(raw);
    }
    if let Some(raw) = &market.fee_rate {
        config.fee_rate = validate_fee_rate(raw);
    }
    if let Some(raw) = &market.undecided {
        config.undecided_policy = UndecidedSignalPolicy::parse(raw)?;
    }
    info!(
        "Principal {:.2}, fee rate {}, undecided bars treated as {}",
        config.principal,
        config.fee_rate,
        config.undecided_policy.label()
    );
    Ok(config)
}

fn date_window(market: &MarketArgs) -> Result<DateWindow> {
    let parse = |raw: &Option<String>, flag: &str| -> Result<_> {
        raw.as_deref()
            .map(|value| {
                parse_timestamp(value)
                    .ok_or_else(|| anyhow!("--{} is not a valid date: {}", flag, value))
            })
            .transpose()
    };
    Ok(DateWindow {
        start: parse(&market.from, "from")?,
        end: parse(&market.to, "to")?,
    })
}
