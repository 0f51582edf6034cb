use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: Option<f64>,
}

impl PriceBar {
    pub fn new(date: DateTime<Utc>, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            date,
            open,
            high,
            low,
            close,
            volume: None,
        }
    }

    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = Some(volume);
        self
    }
}

/// Collect the close column, which is the price every trade is executed at.
pub fn closes(bars: &[PriceBar]) -> Vec<f64> {
    bars.iter().map(|bar| bar.close).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signal {
    Flat,
    Long,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Flat => "flat",
            Signal::Long => "long",
        }
    }

    /// Exposure multiplier applied to the next bar's price change.
    pub fn exposure(self) -> f64 {
        match self {
            Signal::Flat => 0.0,
            Signal::Long => 1.0,
        }
    }
}

/// Strategy output before undecided entries are resolved.
pub type RawSignal = Option<Signal>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub buy_date: DateTime<Utc>,
    pub buy_price: f64,
    pub sell_date: DateTime<Utc>,
    pub sell_price: f64,
    pub principal: f64,
    #[serde(rename = "return")]
    pub net_return: f64,
    pub return_rate: f64,
    pub fee: f64,
    pub buy_fee: f64,
    pub sell_fee: f64,
    pub hold_days: usize,
}

impl Trade {
    pub fn is_winner(&self) -> bool {
        self.net_return > 0.0
    }
}

/// Sum of winning P&L over the absolute sum of losing P&L.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfitLossRatio {
    Finite(f64),
    /// Winning trades exist and nothing was lost.
    Unbounded,
}

impl ProfitLossRatio {
    pub fn from_totals(total_winning: f64, total_losing: f64) -> Self {
        if total_losing > 0.0 {
            ProfitLossRatio::Finite(total_winning / total_losing)
        } else if total_winning > 0.0 {
            ProfitLossRatio::Unbounded
        } else {
            ProfitLossRatio::Finite(0.0)
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            ProfitLossRatio::Finite(value) => *value,
            ProfitLossRatio::Unbounded => f64::INFINITY,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        matches!(self, ProfitLossRatio::Unbounded)
    }
}

impl PartialOrd for ProfitLossRatio {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (ProfitLossRatio::Unbounded, ProfitLossRatio::Unbounded) => Some(Ordering::Equal),
            (ProfitLossRatio::Unbounded, ProfitLossRatio::Finite(_)) => Some(Ordering::Greater),
            (ProfitLossRatio::Finite(_), ProfitLossRatio::Unbounded) => Some(Ordering::Less),
            (ProfitLossRatio::Finite(a), ProfitLossRatio::Finite(b)) => a.partial_cmp(b),
        }
    }
}

impl fmt::Display for ProfitLossRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfitLossRatio::Finite(value) => write!(f, "{:.2}", value),
            ProfitLossRatio::Unbounded => write!(f, "inf"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeAggregate {
    pub trades: Vec<Trade>,
    pub total_return: f64,
    pub total_return_rate: f64,
    pub total_fee: f64,
    pub trade_count: usize,
    pub winning_trades: usize,
    /// Fraction of trades with a positive return, 0 without trades.
    pub win_rate: f64,
    pub profit_loss_ratio: ProfitLossRatio,
}

impl TradeAggregate {
    pub fn empty() -> Self {
        Self {
            trades: Vec::new(),
            total_return: 0.0,
            total_return_rate: 0.0,
            total_fee: 0.0,
            trade_count: 0,
            winning_trades: 0,
            win_rate: 0.0,
            profit_loss_ratio: ProfitLossRatio::Finite(0.0),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Int(i64),
    Float(f64),
}

impl ParameterValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            ParameterValue::Int(value) => *value as f64,
            ParameterValue::Float(value) => *value,
        }
    }

    /// Integer view; floats are accepted only when they carry no fractional part.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParameterValue::Int(value) => Some(*value),
            ParameterValue::Float(value) if value.is_finite() && value.fract() == 0.0 => {
                Some(*value as i64)
            }
            ParameterValue::Float(_) => None,
        }
    }
}

impl PartialEq for ParameterValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ParameterValue::Int(a), ParameterValue::Int(b)) => a == b,
            (ParameterValue::Float(a), ParameterValue::Float(b)) => a.to_bits() == b.to_bits(),
            _ => false,
        }
    }
}

impl Eq for ParameterValue {}

impl Hash for ParameterValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            ParameterValue::Int(value) => {
                0u8.hash(state);
                value.hash(state);
            }
            ParameterValue::Float(value) => {
                1u8.hash(state);
                value.to_bits().hash(state);
            }
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Int(value) => write!(f, "{}", value),
            ParameterValue::Float(value) => {
                let formatted = format!("{:.4}", value);
                let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
                if trimmed.is_empty() || trimmed == "-0" {
                    write!(f, "0")
                } else {
                    write!(f, "{}", trimmed)
                }
            }
        }
    }
}

impl From<i64> for ParameterValue {
    fn from(value: i64) -> Self {
        ParameterValue::Int(value)
    }
}

impl From<i32> for ParameterValue {
    fn from(value: i32) -> Self {
        ParameterValue::Int(i64::from(value))
    }
}

impl From<f64> for ParameterValue {
    fn from(value: f64) -> Self {
        ParameterValue::Float(value)
    }
}

/// Ordered parameter assignment; declaration order is the order strategies receive values in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ParameterCombination {
    entries: Vec<(String, ParameterValue)>,
}

impl ParameterCombination {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<S: Into<String>, V: Into<ParameterValue>>(mut self, name: S, value: V) -> Self {
        self.insert(name, value);
        self
    }

    /// Replaces the value in place when the name is already present.
    pub fn insert<S: Into<String>, V: Into<ParameterValue>>(&mut self, name: S, value: V) {
        let name = name.into();
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|(key, _)| *key == name) {
            entry.1 = value;
        } else {
            self.entries.push((name, value));
        }
    }

    pub fn get(&self, name: &str) -> Option<ParameterValue> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| *value)
    }

    pub fn values(&self) -> Vec<ParameterValue> {
        self.entries.iter().map(|(_, value)| *value).collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ParameterValue)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), *value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for ParameterCombination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .entries
            .iter()
            .map(|(key, value)| format!("{}: {}", key, value))
            .collect::<Vec<String>>()
            .join(", ");
        write!(f, "{}", rendered)
    }
}

impl Serialize for ParameterCombination {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    /// Total return as a fraction of principal (0.0979 for 9.79%).
    pub return_ratio: f64,
    pub sharpe_ratio: f64,
    pub trades: TradeAggregate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationOutcome {
    Completed(Evaluation),
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationResult {
    pub parameters: ParameterCombination,
    pub outcome: EvaluationOutcome,
}

impl OptimizationResult {
    pub fn completed(parameters: ParameterCombination, evaluation: Evaluation) -> Self {
        Self {
            parameters,
            outcome: EvaluationOutcome::Completed(evaluation),
        }
    }

    pub fn failed<S: Into<String>>(parameters: ParameterCombination, error: S) -> Self {
        Self {
            parameters,
            outcome: EvaluationOutcome::Failed {
                error: error.into(),
            },
        }
    }

    pub fn evaluation(&self) -> Option<&Evaluation> {
        match &self.outcome {
            EvaluationOutcome::Completed(evaluation) => Some(evaluation),
            EvaluationOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            EvaluationOutcome::Completed(_) => None,
            EvaluationOutcome::Failed { error } => Some(error.as_str()),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, EvaluationOutcome::Failed { .. })
    }

    /// Ranking score; `None` for failed evaluations.
    pub fn return_ratio(&self) -> Option<f64> {
        self.evaluation().map(|evaluation| evaluation.return_ratio)
    }

    /// Descending-by-return order with failures after every completed result.
    /// Zero returns compare equal regardless of sign.
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        match (self.return_ratio(), other.return_ratio()) {
            (Some(a), Some(b)) => (b + 0.0).total_cmp(&(a + 0.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OptimizationReport {
    pub results: Vec<OptimizationResult>,
    pub best: Option<OptimizationResult>,
    #[serde(serialize_with = "serialize_elapsed_secs")]
    pub elapsed: std::time::Duration,
    pub total_combinations: usize,
    pub failed_combinations: usize,
    pub sorted: bool,
}

impl OptimizationReport {
    pub fn empty(elapsed: std::time::Duration) -> Self {
        Self {
            results: Vec::new(),
            best: None,
            elapsed,
            total_combinations: 0,
            failed_combinations: 0,
            sorted: true,
        }
    }

    pub fn best_parameters(&self) -> Option<&ParameterCombination> {
        self.best.as_ref().map(|result| &result.parameters)
    }
}

fn serialize_elapsed_secs<S: Serializer>(
    elapsed: &std::time::Duration,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(elapsed.as_secs_f64())
}
