use crate::models::{ParameterCombination, ParameterValue};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ops::RangeInclusive;

/// Lowest and highest moving-average period a sweep accepts.
pub const PERIOD_BOUNDS: RangeInclusive<i64> = 1..=360;
/// Sweep used when the requested period range is empty or inverted.
pub const DEFAULT_PERIOD_RANGE: RangeInclusive<i64> = 5..=60;

pub const SHORT_MA: &str = "short_ma";
pub const LONG_MA: &str = "long_ma";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterRange {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl ParameterRange {
    /// Values `min, min + step, ...` up to and including `max` (within rounding).
    pub fn values(&self) -> Vec<f64> {
        if !self.min.is_finite() || !self.max.is_finite() || !self.step.is_finite() {
            return Vec::new();
        }
        if self.step <= 0.0 || self.max < self.min {
            return Vec::new();
        }

        let steps = ((self.max - self.min) / self.step + 1e-9).floor() as usize;
        (0..=steps)
            .map(|i| (self.min + i as f64 * self.step).min(self.max))
            .collect()
    }
}

/// One named dimension of a grid sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterAxis {
    pub name: String,
    pub values: Vec<ParameterValue>,
}

impl ParameterAxis {
    pub fn new<S: Into<String>>(name: S, values: Vec<ParameterValue>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn int_range<S: Into<String>>(name: S, range: RangeInclusive<i64>) -> Self {
        Self::new(name, range.map(ParameterValue::Int).collect())
    }

    pub fn float_range<S: Into<String>>(name: S, range: &ParameterRange) -> Self {
        Self::new(
            name,
            range.values().into_iter().map(ParameterValue::Float).collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParameterSpec {
    /// Cartesian product over every axis.
    Grid(Vec<ParameterAxis>),
    /// Every ordered pair `(short, long)` drawn from one range with `short < long`.
    PairedRange {
        short_name: String,
        long_name: String,
        values: Vec<i64>,
    },
}

impl ParameterSpec {
    pub fn moving_average_pairs(range: RangeInclusive<i64>) -> Self {
        ParameterSpec::PairedRange {
            short_name: SHORT_MA.to_string(),
            long_name: LONG_MA.to_string(),
            values: range.collect(),
        }
    }

    /// Number of combinations `expand` will produce.
    pub fn combination_count(&self) -> usize {
        expand(self).len()
    }
}

/// Stable identity of a combination, independent of declaration order.
pub(crate) fn parameter_signature(combination: &ParameterCombination) -> String {
    let mut sorted: Vec<_> = combination.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    format!("{:?}", sorted)
}

fn push_unique(
    combination: ParameterCombination,
    seen: &mut HashSet<String>,
    combinations: &mut Vec<ParameterCombination>,
) {
    if seen.insert(parameter_signature(&combination)) {
        combinations.push(combination);
    }
}

/// Expand a sweep definition into concrete, duplicate-free combinations in a
/// deterministic enumeration order.
pub fn expand(spec: &ParameterSpec) -> Vec<ParameterCombination> {
    let mut seen = HashSet::new();
    let mut combinations = Vec::new();

    match spec {
        ParameterSpec::Grid(axes) => {
            if axes.is_empty() || axes.iter().any(|axis| axis.values.is_empty()) {
                return combinations;
            }

            let mut partials = vec![ParameterCombination::new()];
            for axis in axes {
                let mut next = Vec::with_capacity(partials.len() * axis.values.len());
                for partial in &partials {
                    for value in &axis.values {
                        next.push(partial.clone().with(axis.name.clone(), *value));
                    }
                }
                partials = next;
            }

            for combination in partials {
                push_unique(combination, &mut seen, &mut combinations);
            }
        }
        ParameterSpec::PairedRange {
            short_name,
            long_name,
            values,
        } => {
            let mut ordered = values.clone();
            ordered.sort_unstable();
            ordered.dedup();

            for (i, short) in ordered.iter().enumerate() {
                for long in &ordered[i + 1..] {
                    let combination = ParameterCombination::new()
                        .with(short_name.clone(), *short)
                        .with(long_name.clone(), *long);
                    push_unique(combination, &mut seen, &mut combinations);
                }
            }
        }
    }

    combinations
}

/// Clamp a user-entered period range into [`PERIOD_BOUNDS`]; an empty or inverted
/// result is replaced by [`DEFAULT_PERIOD_RANGE`].
pub fn clamp_period_range(start: i64, end: i64) -> RangeInclusive<i64> {
    let (lower, upper) = (*PERIOD_BOUNDS.start(), *PERIOD_BOUNDS.end());
    let start_clamped = start.clamp(lower, upper);
    let end_clamped = end.clamp(lower, upper);

    if start_clamped >= end_clamped {
        warn!(
            "Period range {}-{} is empty after clamping to {}-{}; using default {}-{}",
            start,
            end,
            lower,
            upper,
            DEFAULT_PERIOD_RANGE.start(),
            DEFAULT_PERIOD_RANGE.end()
        );
        return DEFAULT_PERIOD_RANGE;
    }

    start_clamped..=end_clamped
}

/// Parse `"5-60"` style input, falling back to the default range on malformed text.
pub fn parse_period_range(raw: &str) -> RangeInclusive<i64> {
    let parsed = raw.split_once('-').and_then(|(start, end)| {
        let start = start.trim().parse::<i64>().ok()?;
        let end = end.trim().parse::<i64>().ok()?;
        Some((start, end))
    });

    match parsed {
        Some((start, end)) => clamp_period_range(start, end),
        None => {
            warn!(
                "Could not parse period range '{}'; using default {}-{}",
                raw,
                DEFAULT_PERIOD_RANGE.start(),
                DEFAULT_PERIOD_RANGE.end()
            );
            DEFAULT_PERIOD_RANGE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(combination: &ParameterCombination) -> (i64, i64) {
        (
            combination.get(SHORT_MA).and_then(|v| v.as_i64()).unwrap(),
            combination.get(LONG_MA).and_then(|v| v.as_i64()).unwrap(),
        )
    }

    #[test]
    fn paired_range_yields_strictly_increasing_pairs() {
        let spec = ParameterSpec::PairedRange {
            short_name: SHORT_MA.to_string(),
            long_name: LONG_MA.to_string(),
            values: (5..8).collect(),
        };
        let pairs: Vec<_> = expand(&spec).iter().map(pair).collect();
        assert_eq!(pairs, vec![(5, 6), (5, 7), (6, 7)]);
    }

    #[test]
    fn paired_range_size_is_n_choose_two() {
        let combinations = expand(&ParameterSpec::moving_average_pairs(5..=60));
        assert_eq!(combinations.len(), 56 * 55 / 2);
        assert!(combinations.iter().map(pair).all(|(a, b)| a < b));

        let unique: HashSet<_> = combinations.iter().cloned().collect();
        assert_eq!(unique.len(), combinations.len());
    }

    #[test]
    fn paired_range_ignores_duplicate_and_unordered_values() {
        let spec = ParameterSpec::PairedRange {
            short_name: SHORT_MA.to_string(),
            long_name: LONG_MA.to_string(),
            values: vec![9, 3, 9, 6],
        };
        let pairs: Vec<_> = expand(&spec).iter().map(pair).collect();
        assert_eq!(pairs, vec![(3, 6), (3, 9), (6, 9)]);

        let single = ParameterSpec::moving_average_pairs(4..=4);
        assert!(expand(&single).is_empty());
    }

    #[test]
    fn grid_is_a_deduplicated_cartesian_product() {
        let spec = ParameterSpec::Grid(vec![
            ParameterAxis::int_range("short_ma", 5..=6),
            ParameterAxis::new(
                "long_ma",
                vec![
                    ParameterValue::Int(20),
                    ParameterValue::Int(30),
                    ParameterValue::Int(20),
                ],
            ),
        ]);
        let combinations = expand(&spec);
        assert_eq!(combinations.len(), 4);
        assert_eq!(
            combinations[0].values(),
            vec![ParameterValue::Int(5), ParameterValue::Int(20)]
        );
        assert_eq!(
            combinations[3].values(),
            vec![ParameterValue::Int(6), ParameterValue::Int(30)]
        );
    }

    #[test]
    fn empty_specs_expand_to_nothing() {
        assert!(expand(&ParameterSpec::Grid(Vec::new())).is_empty());
        assert!(expand(&ParameterSpec::Grid(vec![
            ParameterAxis::int_range("a", 1..=3),
            ParameterAxis::new("b", Vec::new()),
        ]))
        .is_empty());
    }

    #[test]
    fn float_ranges_include_the_upper_bound() {
        let range = ParameterRange {
            min: 0.1,
            max: 0.3,
            step: 0.1,
        };
        let values = range.values();
        assert_eq!(values.len(), 3);
        assert!((values[2] - 0.3).abs() < 1e-12);
        assert!(ParameterRange {
            min: 1.0,
            max: 0.0,
            step: 0.1
        }
        .values()
        .is_empty());
    }

    #[test]
    fn period_ranges_are_clamped_or_replaced() {
        assert_eq!(clamp_period_range(0, 500), 1..=360);
        assert_eq!(clamp_period_range(20, 10), DEFAULT_PERIOD_RANGE);
        assert_eq!(clamp_period_range(400, 900), DEFAULT_PERIOD_RANGE);
        assert_eq!(parse_period_range("10-30"), 10..=30);
        assert_eq!(parse_period_range("ten-thirty"), DEFAULT_PERIOD_RANGE);
    }
}
