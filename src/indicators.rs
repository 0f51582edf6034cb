/// Simple moving average where the first `period - 1` values average whatever history
/// exists so far, so the output always lines up with the input.
pub fn calculate_sma(prices: &[f64], period: usize) -> Vec<f64> {
    if prices.is_empty() {
        return Vec::new();
    }
    if period <= 1 {
        return prices.to_vec();
    }

    let mut sma_values = Vec::with_capacity(prices.len());
    let mut window_sum = 0.0;
    for i in 0..prices.len() {
        window_sum += prices[i];
        if i >= period {
            window_sum -= prices[i - period];
        }
        let window_len = (i + 1).min(period);
        sma_values.push(window_sum / window_len as f64);
    }

    sma_values
}
