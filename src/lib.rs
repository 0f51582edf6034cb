pub mod accounting;
pub mod config;
pub mod data_loader;
pub mod evaluator;
pub mod export;
pub mod indicators;
pub mod models;
pub mod optimizer;
pub mod optimizer_status;
pub mod param_utils;
pub mod performance;
pub mod signals;
pub mod strategy;
pub mod worker_pool;

pub mod commands {
    pub mod backtest;
    pub mod optimize;
    pub mod strategies;
}
