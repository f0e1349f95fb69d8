//! Performance metrics derived from the trade list and equity curve.

use atlas_core::Trade;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

const TRADING_DAYS_PER_YEAR: f64 = 250.0;

/// Aggregated results of one backtest run.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceReport {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// Percentage of trades with positive PnL.
    pub win_rate: f64,
    pub total_pnl: Decimal,
    /// Total PnL as a percentage of the initial balance.
    pub roi: f64,
    pub final_balance: Decimal,
    /// Largest peak-to-trough fall of the equity curve, in quote currency.
    pub max_drawdown: Decimal,
    /// Gross profit over gross loss; 0.0 with no losses.
    pub profit_factor: f64,
    /// Mean over stdev of per-trade percent returns, annualized by sqrt(250).
    pub sharpe_ratio: f64,
    pub average_win: Decimal,
    pub average_loss: Decimal,
    pub largest_win: Decimal,
    pub largest_loss: Decimal,
    pub average_hold_secs: i64,
}

impl PerformanceReport {
    /// Derives the full report from a finished run.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_results(
        initial_balance: Decimal,
        equity_curve: &[Decimal],
        trades: &[Trade],
    ) -> Self {
        let final_balance = equity_curve.last().copied().unwrap_or(initial_balance);
        if trades.is_empty() {
            return Self {
                total_trades: 0,
                winning_trades: 0,
                losing_trades: 0,
                win_rate: 0.0,
                total_pnl: Decimal::ZERO,
                roi: 0.0,
                final_balance,
                max_drawdown: max_drawdown(equity_curve),
                profit_factor: 0.0,
                sharpe_ratio: 0.0,
                average_win: Decimal::ZERO,
                average_loss: Decimal::ZERO,
                largest_win: Decimal::ZERO,
                largest_loss: Decimal::ZERO,
                average_hold_secs: 0,
            };
        }

        let total_trades = trades.len();
        let winning_trades = trades.iter().filter(|t| t.pnl > Decimal::ZERO).count();
        let losing_trades = total_trades - winning_trades;
        let win_rate = winning_trades as f64 / total_trades as f64 * 100.0;

        let total_pnl: Decimal = trades.iter().map(|t| t.pnl).sum();
        let roi = if initial_balance.is_zero() {
            0.0
        } else {
            (total_pnl / initial_balance).to_f64().unwrap_or(0.0) * 100.0
        };

        let gross_profit: Decimal = trades
            .iter()
            .filter(|t| t.pnl > Decimal::ZERO)
            .map(|t| t.pnl)
            .sum();
        let gross_loss: Decimal = trades
            .iter()
            .filter(|t| t.pnl < Decimal::ZERO)
            .map(|t| -t.pnl)
            .sum();
        let profit_factor = if gross_loss.is_zero() {
            0.0
        } else {
            (gross_profit / gross_loss).to_f64().unwrap_or(0.0)
        };

        let wins: Vec<Decimal> = trades
            .iter()
            .filter(|t| t.pnl > Decimal::ZERO)
            .map(|t| t.pnl)
            .collect();
        let losses: Vec<Decimal> = trades
            .iter()
            .filter(|t| t.pnl < Decimal::ZERO)
            .map(|t| t.pnl)
            .collect();

        let average = |values: &[Decimal]| {
            if values.is_empty() {
                Decimal::ZERO
            } else {
                values.iter().copied().sum::<Decimal>() / Decimal::from(values.len())
            }
        };

        let hold_total: i64 = trades
            .iter()
            .map(|t| (t.exit_time - t.entry_time).num_seconds())
            .sum();

        Self {
            total_trades,
            winning_trades,
            losing_trades,
            win_rate,
            total_pnl,
            roi,
            final_balance,
            max_drawdown: max_drawdown(equity_curve),
            profit_factor,
            sharpe_ratio: sharpe_ratio(trades),
            average_win: average(&wins),
            average_loss: average(&losses),
            largest_win: wins.iter().copied().max().unwrap_or(Decimal::ZERO),
            largest_loss: losses.iter().copied().min().unwrap_or(Decimal::ZERO),
            average_hold_secs: hold_total / total_trades as i64,
        }
    }
}

/// Largest peak-to-trough fall of the equity curve, in quote currency.
#[must_use]
pub fn max_drawdown(equity_curve: &[Decimal]) -> Decimal {
    let mut worst = Decimal::ZERO;
    let mut peak = match equity_curve.first() {
        Some(first) => *first,
        None => return Decimal::ZERO,
    };

    for &equity in equity_curve {
        if equity > peak {
            peak = equity;
        }
        let drawdown = peak - equity;
        if drawdown > worst {
            worst = drawdown;
        }
    }
    worst
}

/// Mean over standard deviation of per-trade percent returns, annualized by
/// the square root of 250 trading days. 0.0 with fewer than two trades or
/// zero variance.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn sharpe_ratio(trades: &[Trade]) -> f64 {
    if trades.len() < 2 {
        return 0.0;
    }
    let returns: Vec<f64> = trades.iter().map(|t| t.pnl_percent / 100.0).collect();
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();
    if std_dev <= f64::EPSILON {
        return 0.0;
    }
    mean / std_dev * TRADING_DAYS_PER_YEAR.sqrt()
}
