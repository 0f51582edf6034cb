use crate::config::AccountingConfig;
use crate::models::{PriceBar, ProfitLossRatio, Signal, Trade, TradeAggregate};
use crate::performance::return_rate;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum AccountingError {
    #[error("price series has {bars} bars but signal series has {signals} entries")]
    LengthMismatch { bars: usize, signals: usize },
    #[error("principal must be a positive finite amount (value: {0})")]
    InvalidPrincipal(f64),
    #[error("fee rate must be a non-negative finite rate (value: {0})")]
    InvalidFeeRate(f64),
    #[error("cannot enter a position at bar {index}: close price {price} is not positive")]
    InvalidEntryPrice { index: usize, price: f64 },
    #[error("close price at bar {index} is not finite")]
    NonFinitePrice { index: usize },
}

pub fn calculate_fee(amount: f64, fee_rate: f64) -> f64 {
    amount * fee_rate
}

struct OpenPosition {
    index: usize,
    date: DateTime<Utc>,
    price: f64,
    fee: f64,
}

impl OpenPosition {
    fn enter(
        bar: &PriceBar,
        index: usize,
        config: &AccountingConfig,
    ) -> Result<Self, AccountingError> {
        if bar.close.is_nan() || bar.close <= 0.0 {
            return Err(AccountingError::InvalidEntryPrice {
                index,
                price: bar.close,
            });
        }
        Ok(Self {
            index,
            date: bar.date,
            price: bar.close,
            fee: calculate_fee(config.principal, config.fee_rate),
        })
    }

    fn close(self, bar: &PriceBar, index: usize, config: &AccountingConfig) -> Trade {
        let principal = config.principal;
        let sell_amount = principal * (bar.close / self.price);
        let sell_fee = calculate_fee(sell_amount, config.fee_rate);
        let net_return = sell_amount - principal - self.fee - sell_fee;

        Trade {
            buy_date: self.date,
            buy_price: self.price,
            sell_date: bar.date,
            sell_price: bar.close,
            principal,
            net_return,
            return_rate: return_rate(net_return, principal),
            fee: self.fee + sell_fee,
            buy_fee: self.fee,
            sell_fee,
            hold_days: index - self.index,
        }
    }
}

fn validate_config(config: &AccountingConfig) -> Result<(), AccountingError> {
    if !config.principal.is_finite() || config.principal <= 0.0 {
        return Err(AccountingError::InvalidPrincipal(config.principal));
    }
    if !config.fee_rate.is_finite() || config.fee_rate < 0.0 {
        return Err(AccountingError::InvalidFeeRate(config.fee_rate));
    }
    Ok(())
}

/// Walk the signal series once and turn every Flat→Long→Flat cycle into a trade.
///
/// Each trade is sized at the full principal; gains are never compounded into the next
/// trade. A position still open after the last bar is closed against the final close.
pub fn compute_trades(
    bars: &[PriceBar],
    signals: &[Signal],
    config: &AccountingConfig,
) -> Result<TradeAggregate, AccountingError> {
    if bars.len() != signals.len() {
        return Err(AccountingError::LengthMismatch {
            bars: bars.len(),
            signals: signals.len(),
        });
    }
    validate_config(config)?;

    let mut trades = Vec::new();
    let mut total_fee = 0.0;
    let mut position: Option<OpenPosition> = None;

    for (index, (bar, signal)) in bars.iter().zip(signals.iter()).enumerate() {
        if !bar.close.is_finite() {
            return Err(AccountingError::NonFinitePrice { index });
        }
        match (signal, position.take()) {
            (Signal::Long, None) => {
                let entry = OpenPosition::enter(bar, index, config)?;
                total_fee += entry.fee;
                position = Some(entry);
            }
            (Signal::Flat, Some(open)) => {
                let trade = open.close(bar, index, config);
                total_fee += trade.sell_fee;
                trades.push(trade);
            }
            (_, held) => position = held,
        }
    }

    if let (Some(open), Some(last_bar)) = (position, bars.last()) {
        let trade = open.close(last_bar, bars.len() - 1, config);
        total_fee += trade.sell_fee;
        trades.push(trade);
    }

    Ok(aggregate_trades(trades, total_fee, config.principal))
}

/// Derive the aggregate figures from a finished trade list.
pub fn aggregate_trades(trades: Vec<Trade>, total_fee: f64, principal: f64) -> TradeAggregate {
    let total_return: f64 = trades.iter().map(|trade| trade.net_return).sum();
    let mut winning_trades = 0usize;
    let mut total_winning = 0.0;
    let mut total_losing = 0.0;

    for trade in &trades {
        if trade.is_winner() {
            winning_trades += 1;
            total_winning += trade.net_return;
        } else {
            total_losing += trade.net_return.abs();
        }
    }

    let trade_count = trades.len();
    let win_rate = if trade_count > 0 {
        winning_trades as f64 / trade_count as f64
    } else {
        0.0
    };

    TradeAggregate {
        trades,
        total_return,
        total_return_rate: if principal > 0.0 {
            return_rate(total_return, principal)
        } else {
            0.0
        },
        total_fee,
        trade_count,
        winning_trades,
        win_rate,
        profit_loss_ratio: ProfitLossRatio::from_totals(total_winning, total_losing),
    }
}

/// Baseline: buy at the first close, sell at the last close, same fee model.
/// Returns `None` when there are fewer than two bars to trade between.
pub fn buy_and_hold(
    bars: &[PriceBar],
    config: &AccountingConfig,
) -> Result<Option<Trade>, AccountingError> {
    validate_config(config)?;
    let (Some(first), Some(last)) = (bars.first(), bars.last()) else {
        return Ok(None);
    };
    if bars.len() < 2 {
        return Ok(None);
    }
    if !last.close.is_finite() {
        return Err(AccountingError::NonFinitePrice {
            index: bars.len() - 1,
        });
    }

    let entry = OpenPosition::enter(first, 0, config)?;
    Ok(Some(entry.close(last, bars.len() - 1, config)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use Signal::{Flat, Long};

    fn bars_from_closes(closes: &[f64]) -> Vec<PriceBar> {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, close)| {
                PriceBar::new(base + Duration::days(i as i64), *close, *close, *close, *close)
            })
            .collect()
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-6,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn single_round_trip_charges_both_legs() {
        let bars = bars_from_closes(&[100.0, 110.0]);
        let config = AccountingConfig::new(100_000.0, 0.001);
        let aggregate = compute_trades(&bars, &[Long, Flat], &config).unwrap();

        assert_eq!(aggregate.trade_count, 1);
        let trade = &aggregate.trades[0];
        assert_close(trade.buy_fee, 100.0);
        assert_close(trade.sell_fee, 110.0);
        assert_close(trade.net_return, 9_790.0);
        assert_close(trade.return_rate, 9.79);
        assert_eq!(trade.hold_days, 1);
        assert_close(aggregate.total_fee, 210.0);
        assert_close(aggregate.total_return_rate, 9.79);
        assert!(aggregate.profit_loss_ratio.is_unbounded());
        assert_eq!(aggregate.win_rate, 1.0);
    }

    #[test]
    fn open_position_is_closed_on_final_bar() {
        let bars = bars_from_closes(&[10.0, 12.0, 9.0, 11.0]);
        let config = AccountingConfig::new(1_000.0, 0.0);
        let aggregate = compute_trades(&bars, &[Flat, Long, Long, Long], &config).unwrap();

        assert_eq!(aggregate.trade_count, 1);
        let trade = &aggregate.trades[0];
        assert_eq!(trade.buy_date, bars[1].date);
        assert_eq!(trade.sell_date, bars[3].date);
        assert_eq!(trade.hold_days, 2);
        assert_close(trade.net_return, 1_000.0 * 11.0 / 12.0 - 1_000.0);
        assert_eq!(aggregate.profit_loss_ratio, ProfitLossRatio::Finite(0.0));
        assert_eq!(aggregate.win_rate, 0.0);
    }

    #[test]
    fn all_flat_produces_nothing() {
        let bars = bars_from_closes(&[1.0, 2.0, 3.0]);
        let aggregate =
            compute_trades(&bars, &[Flat, Flat, Flat], &AccountingConfig::default()).unwrap();
        assert_eq!(aggregate.trade_count, 0);
        assert_eq!(aggregate.total_return, 0.0);
        assert_eq!(aggregate.total_fee, 0.0);
        assert_eq!(aggregate.profit_loss_ratio, ProfitLossRatio::Finite(0.0));
    }

    #[test]
    fn mixed_trades_compute_ratio_from_sums() {
        let bars = bars_from_closes(&[100.0, 120.0, 100.0, 90.0]);
        let config = AccountingConfig::new(1_000.0, 0.0);
        let aggregate = compute_trades(&bars, &[Long, Flat, Long, Flat], &config).unwrap();

        assert_eq!(aggregate.trade_count, 2);
        assert_eq!(aggregate.winning_trades, 1);
        assert_close(aggregate.win_rate, 0.5);
        assert_close(aggregate.total_return, 200.0 - 100.0);
        assert_close(aggregate.profit_loss_ratio.as_f64(), 2.0);
    }

    #[test]
    fn length_mismatch_fails_fast() {
        let bars = bars_from_closes(&[1.0, 2.0, 3.0]);
        let error = compute_trades(&bars, &[Long, Flat], &AccountingConfig::default()).unwrap_err();
        assert_eq!(
            error,
            AccountingError::LengthMismatch {
                bars: 3,
                signals: 2
            }
        );
    }

    #[test]
    fn rejects_invalid_config_and_prices() {
        let bars = bars_from_closes(&[0.0, 2.0]);
        assert!(matches!(
            compute_trades(&bars, &[Long, Flat], &AccountingConfig::default()),
            Err(AccountingError::InvalidEntryPrice { index: 0, .. })
        ));
        assert!(matches!(
            compute_trades(&bars, &[Flat, Flat], &AccountingConfig::new(0.0, 0.001)),
            Err(AccountingError::InvalidPrincipal(_))
        ));
        assert!(matches!(
            compute_trades(&bars, &[Flat, Flat], &AccountingConfig::new(1.0, -0.5)),
            Err(AccountingError::InvalidFeeRate(_))
        ));
    }

    #[test]
    fn buy_and_hold_spans_whole_series() {
        let bars = bars_from_closes(&[100.0, 50.0, 110.0]);
        let config = AccountingConfig::new(100_000.0, 0.001);
        let trade = buy_and_hold(&bars, &config).unwrap().unwrap();

        assert_eq!(trade.hold_days, 2);
        assert_eq!(trade.buy_date, bars[0].date);
        assert_eq!(trade.sell_date, bars[2].date);
        assert_close(trade.net_return, 9_790.0);
        assert_close(trade.fee, 210.0);

        assert!(buy_and_hold(&bars[..1], &config).unwrap().is_none());
        assert!(buy_and_hold(&[], &config).unwrap().is_none());
    }
}
