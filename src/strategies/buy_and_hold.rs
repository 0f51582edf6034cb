use crate::models::{ParameterValue, PriceBar, RawSignal, Signal};
use anyhow::Result;

pub struct BuyAndHoldStrategy {
    name: String,
}

impl BuyAndHoldStrategy {
    pub const NAME: &'static str = "buy_and_hold";

    pub fn new() -> Self {
        Self {
            name: Self::NAME.to_string(),
        }
    }
}

impl Default for BuyAndHoldStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl super::SignalStrategy for BuyAndHoldStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn parameter_names(&self) -> Vec<String> {
        Vec::new()
    }

    fn generate_signals(
        &self,
        bars: &[PriceBar],
        _params: &[ParameterValue],
    ) -> Result<Vec<RawSignal>> {
        // Parameters are accepted and ignored so the strategy can sit inside any sweep.
        Ok(vec![Some(Signal::Long); bars.len()])
    }

    fn description(&self) -> &str {
        "Always long; the baseline every timing strategy is compared against."
    }
}
