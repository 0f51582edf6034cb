use crate::config::UndecidedSignalPolicy;
use crate::models::{RawSignal, Signal};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignalError {
    #[error("strategy returned {signals} signals for {bars} price bars")]
    LengthMismatch { bars: usize, signals: usize },
}

/// Forward-fill undecided entries from the last decision; entries before any decision
/// take the policy's default.
pub fn resolve_signals(raw: &[RawSignal], policy: UndecidedSignalPolicy) -> Vec<Signal> {
    let default_signal = match policy {
        UndecidedSignalPolicy::Long => Signal::Long,
        UndecidedSignalPolicy::Flat => Signal::Flat,
    };

    let mut last: Option<Signal> = None;
    raw.iter()
        .map(|entry| {
            if let Some(signal) = entry {
                last = Some(*signal);
            }
            last.unwrap_or(default_signal)
        })
        .collect()
}

/// Resolve a strategy's output, rejecting series that do not line up with the bars.
pub fn resolve_aligned(
    raw: &[RawSignal],
    bar_count: usize,
    policy: UndecidedSignalPolicy,
) -> Result<Vec<Signal>, SignalError> {
    if raw.len() != bar_count {
        return Err(SignalError::LengthMismatch {
            bars: bar_count,
            signals: raw.len(),
        });
    }
    Ok(resolve_signals(raw, policy))
}

/// Number of Flat/Long state changes, counting an initial Long as an entry.
pub fn count_transitions(signals: &[Signal]) -> usize {
    let mut previous = Signal::Flat;
    let mut transitions = 0;
    for signal in signals {
        if *signal != previous {
            transitions += 1;
            previous = *signal;
        }
    }
    transitions
}

#[cfg(test)]
mod tests {
    use super::*;
    use Signal::{Flat, Long};

    #[test]
    fn leading_undecided_defaults_to_long() {
        let raw = vec![None, None, Some(Flat), None, Some(Long), None];
        let resolved = resolve_signals(&raw, UndecidedSignalPolicy::Long);
        assert_eq!(resolved, vec![Long, Long, Flat, Flat, Long, Long]);
    }

    #[test]
    fn flat_policy_keeps_leading_entries_out_of_the_market() {
        let raw = vec![None, None, Some(Long), None];
        let resolved = resolve_signals(&raw, UndecidedSignalPolicy::Flat);
        assert_eq!(resolved, vec![Flat, Flat, Long, Long]);
    }

    #[test]
    fn misaligned_series_is_rejected() {
        let raw = vec![Some(Long); 3];
        let error = resolve_aligned(&raw, 4, UndecidedSignalPolicy::Long).unwrap_err();
        assert_eq!(error, SignalError::LengthMismatch { bars: 4, signals: 3 });
    }

    #[test]
    fn counts_entries_and_exits() {
        assert_eq!(count_transitions(&[Flat, Flat]), 0);
        assert_eq!(count_transitions(&[Long, Flat, Long]), 3);
        assert_eq!(count_transitions(&[Flat, Long, Long, Flat]), 2);
    }
}
