use anyhow::{anyhow, Result};
use log::warn;
use std::collections::HashMap;
use std::env;

pub const DEFAULT_PRINCIPAL: f64 = 100_000.0;
pub const DEFAULT_FEE_RATE: f64 = 0.001;
pub const DEFAULT_TOP_N: usize = 50;
pub const DEFAULT_WORKER_CAP: usize = 4;

/// Environment keys recognised by [`settings_from_env`].
const SETTING_KEYS: [&str; 5] = [
    "BACKTEST_PRINCIPAL",
    "BACKTEST_FEE_RATE",
    "UNDECIDED_SIGNAL_POLICY",
    "OPTIMIZER_MAX_WORKERS",
    "OPTIMIZER_TOP_N",
];

/// How leading undecided signal entries (no earlier decision to carry forward) are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UndecidedSignalPolicy {
    /// Treat the instrument as already bought from the first bar.
    #[default]
    Long,
    Flat,
}

impl UndecidedSignalPolicy {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "long" | "1" => Ok(Self::Long),
            "flat" | "0" => Ok(Self::Flat),
            other => Err(anyhow!(
                "UNDECIDED_SIGNAL_POLICY must be LONG or FLAT (value: {})",
                other
            )),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Long => "long",
            Self::Flat => "flat",
        }
    }
}

/// Capital and fee basis applied to every accounting call.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountingConfig {
    pub principal: f64,
    pub fee_rate: f64,
    pub undecided_policy: UndecidedSignalPolicy,
}

impl Default for AccountingConfig {
    fn default() -> Self {
        Self {
            principal: DEFAULT_PRINCIPAL,
            fee_rate: DEFAULT_FEE_RATE,
            undecided_policy: UndecidedSignalPolicy::default(),
        }
    }
}

impl AccountingConfig {
    pub fn new(principal: f64, fee_rate: f64) -> Self {
        Self {
            principal,
            fee_rate,
            ..Self::default()
        }
    }

    pub fn with_undecided_policy(mut self, policy: UndecidedSignalPolicy) -> Self {
        self.undecided_policy = policy;
        self
    }

    pub fn from_settings_map(settings: &HashMap<String, String>) -> Result<Self> {
        let principal = optional_setting_f64(settings, "BACKTEST_PRINCIPAL", Some(0.0), None)?
            .unwrap_or(DEFAULT_PRINCIPAL);
        if principal <= 0.0 {
            return Err(anyhow!(
                "Setting BACKTEST_PRINCIPAL must be > 0 (value: {})",
                principal
            ));
        }
        let fee_rate = optional_setting_f64(settings, "BACKTEST_FEE_RATE", Some(0.0), Some(1.0))?
            .unwrap_or(DEFAULT_FEE_RATE);
        let undecided_policy = match optional_setting(settings, "UNDECIDED_SIGNAL_POLICY") {
            Some(raw) => UndecidedSignalPolicy::parse(raw)?,
            None => UndecidedSignalPolicy::default(),
        };

        Ok(Self {
            principal,
            fee_rate,
            undecided_policy,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizerSettings {
    /// Worker count; `None` picks [`default_worker_count`].
    pub max_workers: Option<usize>,
    pub top_n: usize,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            max_workers: None,
            top_n: DEFAULT_TOP_N,
        }
    }
}

impl OptimizerSettings {
    pub fn from_settings_map(settings: &HashMap<String, String>) -> Result<Self> {
        let max_workers = optional_setting_usize(settings, "OPTIMIZER_MAX_WORKERS", 1)?;
        let top_n =
            optional_setting_usize(settings, "OPTIMIZER_TOP_N", 1)?.unwrap_or(DEFAULT_TOP_N);
        Ok(Self { max_workers, top_n })
    }

    /// Resolve the pool size for a sweep of `task_count` combinations.
    pub fn worker_count(&self, task_count: usize) -> usize {
        let requested = self.max_workers.unwrap_or_else(default_worker_count).max(1);
        requested.min(task_count.max(1))
    }
}

/// Capped below full hardware concurrency so a sweep does not starve a shared machine.
pub fn default_worker_count() -> usize {
    std::cmp::min(DEFAULT_WORKER_CAP, std::cmp::max(1, num_cpus::get()))
}

/// Parse a user-entered principal, falling back to the default on garbage or non-positive input.
pub fn validate_principal(raw: &str) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() && value > 0.0 => value,
        _ => {
            warn!(
                "Invalid principal '{}'; using default {:.2}",
                raw, DEFAULT_PRINCIPAL
            );
            DEFAULT_PRINCIPAL
        }
    }
}

/// Parse a user-entered fee rate, falling back to the default on garbage or negative input.
pub fn validate_fee_rate(raw: &str) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => value,
        _ => {
            warn!(
                "Invalid fee rate '{}'; using default {}",
                raw, DEFAULT_FEE_RATE
            );
            DEFAULT_FEE_RATE
        }
    }
}

/// Snapshot of the recognised settings present in the process environment.
pub fn settings_from_env() -> HashMap<String, String> {
    SETTING_KEYS
        .iter()
        .filter_map(|key| env::var(key).ok().map(|value| (key.to_string(), value)))
        .collect()
}

fn optional_setting<'a>(settings: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    settings
        .get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

fn optional_setting_f64(
    settings: &HashMap<String, String>,
    key: &str,
    min: Option<f64>,
    max: Option<f64>,
) -> Result<Option<f64>> {
    let Some(raw) = optional_setting(settings, key) else {
        return Ok(None);
    };
    let value = raw
        .parse::<f64>()
        .map_err(|_| anyhow!("Setting {} must be a number (value: {})", key, raw))?;
    if !value.is_finite() {
        return Err(anyhow!("Setting {} must be finite (value: {})", key, raw));
    }
    if let Some(min_value) = min {
        if value < min_value {
            return Err(anyhow!(
                "Setting {} must be >= {} (value: {})",
                key,
                min_value,
                raw
            ));
        }
    }
    if let Some(max_value) = max {
        if value > max_value {
            return Err(anyhow!(
                "Setting {} must be <= {} (value: {})",
                key,
                max_value,
                raw
            ));
        }
    }
    Ok(Some(value))
}

fn optional_setting_usize(
    settings: &HashMap<String, String>,
    key: &str,
    min: usize,
) -> Result<Option<usize>> {
    let Some(raw) = optional_setting(settings, key) else {
        return Ok(None);
    };
    let value = raw
        .parse::<f64>()
        .map_err(|_| anyhow!("Setting {} must be a number (value: {})", key, raw))?;
    if !value.is_finite() {
        return Err(anyhow!("Setting {} must be finite (value: {})", key, raw));
    }
    if value.fract() != 0.0 {
        return Err(anyhow!(
            "Setting {} must be an integer (value: {})",
            key,
            raw
        ));
    }
    if value < min as f64 {
        return Err(anyhow!(
            "Setting {} must be >= {} (value: {})",
            key,
            min,
            raw
        ));
    }
    Ok(Some(value as usize))
}
