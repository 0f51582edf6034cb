use crate::models::Signal;
use statrs::statistics::Statistics;

/// Daily bars per year used to annualize the risk-adjusted ratio.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Net result as a percentage of the principal.
pub fn return_rate(total_return: f64, principal: f64) -> f64 {
    if principal > 0.0 {
        total_return / principal * 100.0
    } else {
        0.0
    }
}

/// Bar-over-bar fractional change of a price series. The first element is 0, as is any
/// change measured from a zero price.
pub fn pct_change(prices: &[f64]) -> Vec<f64> {
    if prices.is_empty() {
        return Vec::new();
    }

    let mut changes = Vec::with_capacity(prices.len());
    changes.push(0.0);
    changes.extend(prices.windows(2).map(|window| {
        let previous = window[0];
        let current = window[1];
        if previous != 0.0 && previous.is_finite() && current.is_finite() {
            (current - previous) / previous
        } else {
            0.0
        }
    }));
    changes
}

/// Strategy return per bar: a bar's price change only counts when the previous bar's
/// signal was Long.
pub fn strategy_daily_returns(prices: &[f64], signals: &[Signal]) -> Vec<f64> {
    let changes = pct_change(prices);
    changes
        .iter()
        .enumerate()
        .map(|(index, change)| {
            if index == 0 {
                return 0.0;
            }
            let exposure = signals
                .get(index - 1)
                .map(|signal| signal.exposure())
                .unwrap_or(0.0);
            change * exposure
        })
        .collect()
}

/// Annualized mean/std ratio of a daily return series (no risk-free offset).
/// Returns 0 when the sample standard deviation is zero or undefined.
pub fn annualized_ratio(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }

    let mean_return = returns.mean();
    let std_dev = returns.std_dev();

    if !std_dev.is_finite() || std_dev <= 0.0 || !mean_return.is_finite() {
        return 0.0;
    }

    mean_return / std_dev * TRADING_DAYS_PER_YEAR.sqrt()
}

/// Risk-adjusted ratio of a signal series applied to closes.
pub fn signal_sharpe_ratio(prices: &[f64], signals: &[Signal]) -> f64 {
    annualized_ratio(&strategy_daily_returns(prices, signals))
}
