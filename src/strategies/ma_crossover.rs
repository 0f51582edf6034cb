use crate::indicators::calculate_sma;
use crate::models::{closes, ParameterValue, PriceBar, RawSignal, Signal};
use anyhow::{anyhow, Result};

/// Dual moving-average timing: go long on a golden cross, go flat on a death cross and
/// hold the previous state on every other bar.
pub struct MaCrossoverStrategy {
    name: String,
}

impl MaCrossoverStrategy {
    pub const NAME: &'static str = "ma_crossover";
    pub const SHORT_PERIOD: &'static str = "short_ma";
    pub const LONG_PERIOD: &'static str = "long_ma";

    pub fn new() -> Self {
        Self {
            name: Self::NAME.to_string(),
        }
    }

    fn period(params: &[ParameterValue], index: usize, label: &str) -> Result<usize> {
        let value = params
            .get(index)
            .ok_or_else(|| anyhow!("missing {} parameter", label))?;
        let period = value
            .as_i64()
            .ok_or_else(|| anyhow!("{} must be a whole number (value: {})", label, value))?;
        if period < 1 {
            return Err(anyhow!("{} must be at least 1 (value: {})", label, period));
        }
        Ok(period as usize)
    }
}

impl Default for MaCrossoverStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl super::SignalStrategy for MaCrossoverStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn parameter_names(&self) -> Vec<String> {
        vec![Self::SHORT_PERIOD.to_string(), Self::LONG_PERIOD.to_string()]
    }

    fn generate_signals(
        &self,
        bars: &[PriceBar],
        params: &[ParameterValue],
    ) -> Result<Vec<RawSignal>> {
        let short_period = Self::period(params, 0, Self::SHORT_PERIOD)?;
        let long_period = Self::period(params, 1, Self::LONG_PERIOD)?;

        let prices = closes(bars);
        let ma_short = calculate_sma(&prices, short_period);
        let ma_long = calculate_sma(&prices, long_period);

        let mut signals = vec![None; prices.len()];
        for i in 1..prices.len() {
            let (short_now, long_now) = (ma_short[i], ma_long[i]);
            let (short_prev, long_prev) = (ma_short[i - 1], ma_long[i - 1]);

            if short_now > long_now && short_prev <= long_prev {
                signals[i] = Some(Signal::Long);
            } else if short_now < long_now && short_prev >= long_prev {
                signals[i] = Some(Signal::Flat);
            }
        }

        Ok(signals)
    }

    fn description(&self) -> &str {
        "Long when the short moving average crosses above the long one, flat when it crosses below."
    }
}
