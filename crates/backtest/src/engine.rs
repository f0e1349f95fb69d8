//! Deterministic replay of the signal + risk pipeline over historical
//! candles.
//!
//! Strictly single-threaded: the same data and configuration always produce
//! the same trades. Entries fill at the next bar's open; exit checks are
//! skipped on the entry bar and the bar immediately following it to prevent
//! same-bar stop-outs.

use crate::data::MultiTimeframeData;
use crate::fills;
use crate::metrics::PerformanceReport;
use crate::sync::SyncIndex;
use anyhow::{Context, Result};
use atlas_core::{ExitReason, OrderSide, PositionSide, Trade, TradingConfig};
use atlas_risk::RiskManager;
use atlas_strategy::engine::{SignalEngine, TimeframeWindows};
use atlas_strategy::indicators;
use rust_decimal::Decimal;

/// Trailing window caps per timeframe, in bars.
const FAST_WINDOW: usize = 200;
const SLOW_WINDOW: usize = 100;
const AUX_FAST_WINDOW: usize = 300;
const AUX_SLOW_WINDOW: usize = 50;

/// Everything a run produces.
#[derive(Debug)]
pub struct BacktestOutcome {
    pub report: PerformanceReport,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<Decimal>,
}

pub struct BacktestEngine {
    config: TradingConfig,
}

impl BacktestEngine {
    #[must_use]
    pub const fn new(config: TradingConfig) -> Self {
        Self { config }
    }

    /// Replays the full pipeline over `data` starting from
    /// `initial_balance`. Builds a fresh signal engine and risk manager so
    /// consecutive runs cannot leak state into each other.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty candle series, a non-positive balance,
    /// or an internal risk-manager failure that is not an admission
    /// rejection.
    pub fn run(
        &self,
        data: &MultiTimeframeData,
        initial_balance: Decimal,
    ) -> Result<BacktestOutcome> {
        if initial_balance <= Decimal::ZERO {
            anyhow::bail!("initial_balance must be positive, got {initial_balance}");
        }
        if data.fast.is_empty() || data.slow.is_empty() {
            anyhow::bail!("candle series cannot be empty");
        }

        let symbol = self.config.symbol.clone();
        let mut strategy = SignalEngine::new(self.config.clone());
        let mut risk = RiskManager::new(self.config.clone());

        let sync = SyncIndex::build(
            &data.fast,
            &data.slow,
            data.aux_fast.as_deref(),
            data.aux_slow.as_deref(),
        );

        let min_fast = indicators::min_fast_lookback(&self.config.indicators);
        let min_slow = indicators::min_slow_lookback(&self.config.indicators);

        let mut balance = initial_balance;
        let mut equity_curve = vec![initial_balance];
        let mut entry_bar: Option<usize> = None;

        for i in min_fast..data.fast.len() {
            let fast_window = &data.fast[(i + 1).saturating_sub(FAST_WINDOW)..=i];

            let Some(slow_idx) = sync.slow[i] else {
                continue;
            };
            if slow_idx + 1 < min_slow {
                continue;
            }
            let slow_window = &data.slow[(slow_idx + 1).saturating_sub(SLOW_WINDOW)..=slow_idx];

            let aux_fast_window = Self::aux_window(
                data.aux_fast.as_deref(),
                sync.aux_fast.as_ref(),
                i,
                AUX_FAST_WINDOW,
            );
            let aux_slow_window = Self::aux_window(
                data.aux_slow.as_deref(),
                sync.aux_slow.as_ref(),
                i,
                AUX_SLOW_WINDOW,
            );

            strategy.update_indicators(&TimeframeWindows {
                fast: fast_window,
                slow: slow_window,
                aux_fast: aux_fast_window,
                aux_slow: aux_slow_window,
            });
            if let Some(detector) = strategy.regime_detector() {
                risk.update_regime(detector.current());
            }

            let candle = &data.fast[i];
            let price = candle.close;
            let now = candle.timestamp;
            let atr = strategy.snapshot().atr_fast;

            if risk.has_position(&symbol) {
                // No exit checks on the entry bar or the bar after it.
                let in_hold_window = entry_bar.is_some_and(|bar| i <= bar + 1);
                if !in_hold_window && atr > Decimal::ZERO {
                    if let Some(trade) =
                        self.evaluate_exits(&mut strategy, &mut risk, &symbol, candle, atr)?
                    {
                        balance += trade.pnl;
                        entry_bar = None;
                    }
                }
            } else if risk.signals_enabled() && i + 1 < data.fast.len() {
                let signal = strategy
                    .check_long_entry(&symbol)
                    .or_else(|| strategy.check_short_entry(&symbol));
                if let Some(mut signal) = signal {
                    let fill = fills::apply_fees_and_slippage(
                        &self.config.execution,
                        data.fast[i + 1].open,
                        entry_order_side(signal.direction),
                    )?;
                    signal.price = fill;

                    let size_factor = strategy.entry_size_factor(fill);
                    match risk.open_position_scaled(&signal, balance, atr, size_factor) {
                        Ok(position) => {
                            tracing::debug!(
                                bar = i,
                                fill = %fill,
                                quantity = %position.quantity,
                                "entry simulated at next bar open"
                            );
                            entry_bar = Some(i + 1);
                        }
                        Err(err) if err.is_admission_rejection() => {
                            tracing::debug!(error = %err, "entry not admitted");
                        }
                        Err(err) => return Err(err).context("failed to open position"),
                    }
                }
            }

            let equity = balance
                + risk
                    .position(&symbol)
                    .map(|p| p.pnl_at(price))
                    .unwrap_or(Decimal::ZERO);
            equity_curve.push(equity);
        }

        // Liquidate whatever is still open at the last close.
        if risk.has_position(&symbol) {
            let last = data.fast.last().expect("non-empty");
            let side = risk.position(&symbol).expect("open").side;
            let fill = fills::apply_fees_and_slippage(
                &self.config.execution,
                last.close,
                exit_order_side(side),
            )?;
            let trade = risk.close_position(&symbol, fill, ExitReason::SignalExit, last.timestamp)?;
            balance += trade.pnl;
            if let Some(equity) = equity_curve.last_mut() {
                *equity = balance;
            }
        }

        let trades = risk.closed_trades().to_vec();
        let report = PerformanceReport::from_results(initial_balance, &equity_curve, &trades);
        Ok(BacktestOutcome {
            report,
            trades,
            equity_curve,
        })
    }

    fn aux_window<'a>(
        series: Option<&'a [atlas_core::Candle]>,
        index: Option<&Vec<Option<usize>>>,
        i: usize,
        cap: usize,
    ) -> Option<&'a [atlas_core::Candle]> {
        let series = series?;
        let idx = index?.get(i).copied().flatten()?;
        Some(&series[(idx + 1).saturating_sub(cap)..=idx])
    }

    /// One exit decision per bar, in priority order: take-profit, partial
    /// ladder, intrabar stop, time limit, regime change.
    fn evaluate_exits(
        &self,
        strategy: &mut SignalEngine,
        risk: &mut RiskManager,
        symbol: &str,
        candle: &atlas_core::Candle,
        atr: Decimal,
    ) -> Result<Option<Trade>> {
        let price = candle.close;
        let now = candle.timestamp;
        let side = risk.position(symbol).expect("caller checked").side;

        let momentum_reversed = strategy.momentum_reversed_for(side);
        risk.update_stops(symbol, price, atr, momentum_reversed)?;

        let take_profit = atlas_core::numeric::dec(self.config.risk.take_profit_pct);
        let position = risk.position(symbol).expect("still open");
        let profit_fraction = if position.entry_price.is_zero() {
            Decimal::ZERO
        } else {
            position.profit_distance(price) / position.entry_price
        };

        if profit_fraction >= take_profit {
            let fill = fills::apply_fees_and_slippage(
                &self.config.execution,
                price,
                exit_order_side(side),
            )?;
            let trade = risk.close_position(symbol, fill, ExitReason::TakeProfit, now)?;
            return Ok(Some(trade));
        }

        if let Some(partial) = risk.check_partial_exit(symbol, price, atr) {
            let fill = fills::apply_fees_and_slippage(
                &self.config.execution,
                price,
                exit_order_side(side),
            )?;
            if partial.fraction >= 1.0 {
                let trade = risk.close_position(symbol, fill, ExitReason::TakeProfit, now)?;
                return Ok(Some(trade));
            }
            let trade = risk.execute_partial_exit(
                symbol,
                fill,
                partial.fraction,
                Some(partial.level),
                now,
            )?;
            // The position stays open; realized PnL still lands on the
            // balance.
            return Ok(Some(trade));
        }

        let stop_touched = {
            let position = risk.position(symbol).expect("still open");
            match position.side {
                PositionSide::Long => candle.low <= position.trailing_stop,
                PositionSide::Short => candle.high >= position.trailing_stop,
            }
        };
        if stop_touched {
            let intrabar = fills::stop_exit_fill(candle, side);
            let fill = fills::apply_fees_and_slippage(
                &self.config.execution,
                intrabar,
                exit_order_side(side),
            )?;
            let trade = risk.close_position(symbol, fill, ExitReason::TrailingStop, now)?;
            return Ok(Some(trade));
        }

        if risk.check_time_exit(symbol, now) {
            let fill = fills::apply_fees_and_slippage(
                &self.config.execution,
                price,
                exit_order_side(side),
            )?;
            let trade = risk.close_position(symbol, fill, ExitReason::TimeLimit, now)?;
            return Ok(Some(trade));
        }

        if risk.check_regime_exit(symbol) {
            let fill = fills::apply_fees_and_slippage(
                &self.config.execution,
                price,
                exit_order_side(side),
            )?;
            let trade = risk.close_position(symbol, fill, ExitReason::RegimeChange, now)?;
            return Ok(Some(trade));
        }

        Ok(None)
    }
}

const fn exit_order_side(side: PositionSide) -> OrderSide {
    match side {
        PositionSide::Long => OrderSide::Sell,
        PositionSide::Short => OrderSide::Buy,
    }
}

const fn entry_order_side(direction: atlas_core::SignalDirection) -> OrderSide {
    match direction {
        atlas_core::SignalDirection::LongEntry => OrderSide::Buy,
        atlas_core::SignalDirection::ShortEntry => OrderSide::Sell,
    }
}
