//! Per-symbol evaluation cycles.
//!
//! Each monitored symbol runs one logical control loop: fetch fresh candle
//! windows, recompute indicators, then make at most one admit/reject/exit
//! decision before advancing. Cycles for independent symbols may run
//! concurrently, but all mutation of positions and portfolio state is
//! serialized behind a single lock so admission decisions always observe a
//! consistent snapshot of every open position.

use crate::executor::OrderExecutor;
use anyhow::{Context, Result};
use atlas_core::{
    ExitReason, MarketDataSource, PositionSide, Timeframe, Trade, TradingConfig,
};
use atlas_risk::RiskManager;
use atlas_strategy::engine::{SignalEngine, TimeframeWindows};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::Mutex;

const HISTORY_DAYS: u32 = 30;
const AUX_HISTORY_DAYS: u32 = 7;

/// The decision one evaluation cycle produced, for logging and
/// dashboarding by surrounding tooling.
#[derive(Debug)]
pub enum CycleOutcome {
    /// Nothing to do this cycle.
    Idle,
    /// A new position was opened.
    Opened { symbol: String, quantity: Decimal },
    /// An open position had its stops/PnL refreshed.
    Updated { symbol: String, unrealized: Decimal },
    /// A position (or a slice of it) was closed; the full trade record.
    Closed(Trade),
    /// A signal fired but the portfolio refused it.
    Rejected { symbol: String, reason: String },
}

/// Per-symbol state that is not shared: the signal engine and the
/// minimum-hold marker.
struct SymbolState {
    engine: SignalEngine,
    /// Cycles to skip exit checks for after an entry. Mirrors the backtest's
    /// entry-bar skip so live and replay traverse the same decision
    /// sequence.
    hold_cycles: u8,
}

pub struct TradingLoop<D: MarketDataSource + ?Sized> {
    config: TradingConfig,
    data: Arc<D>,
    executor: Arc<OrderExecutor>,
    risk: Arc<Mutex<RiskManager>>,
}

impl<D: MarketDataSource + ?Sized> TradingLoop<D> {
    #[must_use]
    pub fn new(
        config: TradingConfig,
        data: Arc<D>,
        executor: Arc<OrderExecutor>,
        risk: Arc<Mutex<RiskManager>>,
    ) -> Self {
        Self {
            config,
            data,
            executor,
            risk,
        }
    }

    #[must_use]
    pub fn risk(&self) -> Arc<Mutex<RiskManager>> {
        Arc::clone(&self.risk)
    }

    /// Builds the per-symbol state for a symbol this loop will evaluate.
    #[must_use]
    pub fn symbol_state(&self) -> SymbolStateHandle {
        SymbolStateHandle {
            inner: SymbolState {
                engine: SignalEngine::new(self.config.clone()),
                hold_cycles: 0,
            },
        }
    }

    async fn fetch_windows(
        &self,
        symbol: &str,
    ) -> Result<(Vec<atlas_core::Candle>, Vec<atlas_core::Candle>, Option<Vec<atlas_core::Candle>>, Option<Vec<atlas_core::Candle>>)>
    {
        let fast = self
            .data
            .fetch_history(symbol, Timeframe::M15, HISTORY_DAYS)
            .await
            .context("failed to fetch fast timeframe history")?;
        let slow = self
            .data
            .fetch_history(symbol, Timeframe::H1, HISTORY_DAYS)
            .await
            .context("failed to fetch slow timeframe history")?;

        // Auxiliary timeframes are best-effort: their absence degrades
        // multi-timeframe confirmation rather than failing the cycle.
        let aux_fast = if self.config.features.enable_multi_timeframe {
            self.data
                .fetch_history(symbol, Timeframe::M5, AUX_HISTORY_DAYS)
                .await
                .map_err(|err| tracing::debug!(error = %err, "5m history unavailable"))
                .ok()
        } else {
            None
        };
        let aux_slow = if self.config.features.enable_multi_timeframe {
            self.data
                .fetch_history(symbol, Timeframe::H4, HISTORY_DAYS)
                .await
                .map_err(|err| tracing::debug!(error = %err, "4h history unavailable"))
                .ok()
        } else {
            None
        };

        Ok((fast, slow, aux_fast, aux_slow))
    }

    /// Runs one evaluation cycle for `symbol`: refresh indicators, then make
    /// exactly one decision.
    ///
    /// # Errors
    ///
    /// Returns an error when market data or exchange calls fail after
    /// retries; the next cycle starts from scratch.
    pub async fn run_cycle(
        &self,
        symbol: &str,
        state: &mut SymbolStateHandle,
    ) -> Result<CycleOutcome> {
        let (fast, slow, aux_fast, aux_slow) = self.fetch_windows(symbol).await?;
        let state = &mut state.inner;
        state.engine.update_indicators(&TimeframeWindows {
            fast: &fast,
            slow: &slow,
            aux_fast: aux_fast.as_deref(),
            aux_slow: aux_slow.as_deref(),
        });

        let snapshot = state.engine.snapshot().clone();
        if !snapshot.is_ready() {
            return Ok(CycleOutcome::Idle);
        }
        let price = snapshot.price;
        let atr = snapshot.atr_fast;
        let Some(now) = fast.last().map(|c| c.timestamp) else {
            return Ok(CycleOutcome::Idle);
        };

        let mut risk = self.risk.lock().await;
        if let Some(detector) = state.engine.regime_detector() {
            risk.update_regime(detector.current());
        }

        if risk.has_position(symbol) {
            if state.hold_cycles > 0 {
                state.hold_cycles -= 1;
                return Ok(CycleOutcome::Idle);
            }

            let side = risk.position(symbol).expect("checked above").side;
            let momentum_reversed = state.engine.momentum_reversed_for(side);
            risk.update_stops(symbol, price, atr, momentum_reversed)?;

            if risk.check_stop_hit(symbol, price) {
                let trade = self
                    .close_tracked(&mut risk, symbol, price, ExitReason::TrailingStop, now)
                    .await?;
                return Ok(CycleOutcome::Closed(trade));
            }
            if let Some(partial) = risk.check_partial_exit(symbol, price, atr) {
                let side = risk.position(symbol).expect("open").side;
                let quantity = risk.position(symbol).expect("open").quantity;
                if partial.fraction >= 1.0 {
                    let trade = self
                        .close_tracked(&mut risk, symbol, price, ExitReason::TakeProfit, now)
                        .await?;
                    return Ok(CycleOutcome::Closed(trade));
                }
                let close_quantity = quantity * atlas_core::numeric::dec(partial.fraction);
                self.executor
                    .close_market(symbol, side, close_quantity.round_dp(8))
                    .await
                    .context("partial exit order failed")?;
                let trade = risk.execute_partial_exit(
                    symbol,
                    price,
                    partial.fraction,
                    Some(partial.level),
                    now,
                )?;
                return Ok(CycleOutcome::Closed(trade));
            }
            if risk.check_time_exit(symbol, now) {
                let trade = self
                    .close_tracked(&mut risk, symbol, price, ExitReason::TimeLimit, now)
                    .await?;
                return Ok(CycleOutcome::Closed(trade));
            }
            if risk.check_regime_exit(symbol) {
                let trade = self
                    .close_tracked(&mut risk, symbol, price, ExitReason::RegimeChange, now)
                    .await?;
                return Ok(CycleOutcome::Closed(trade));
            }

            let unrealized = risk
                .position(symbol)
                .map(|p| p.unrealized_pnl)
                .unwrap_or(Decimal::ZERO);
            return Ok(CycleOutcome::Updated {
                symbol: symbol.to_string(),
                unrealized,
            });
        }

        if !risk.signals_enabled() {
            return Ok(CycleOutcome::Idle);
        }

        let signal = state
            .engine
            .check_long_entry(symbol)
            .or_else(|| state.engine.check_short_entry(symbol));
        let Some(signal) = signal else {
            return Ok(CycleOutcome::Idle);
        };

        let balance = self.executor.balance().await?;

        // Margin is validated against the exchange before any position is
        // tracked, so a refusal leaves no trace on the books.
        let sizing = atlas_risk::sizer::size(&self.config.risk, balance, signal.price, atr)?;
        if !self
            .executor
            .validate_margin(symbol, sizing.margin_required)
            .await?
        {
            tracing::warn!(symbol, margin = %sizing.margin_required, "margin rejected by exchange");
            return Ok(CycleOutcome::Rejected {
                symbol: symbol.to_string(),
                reason: "insufficient margin".to_string(),
            });
        }

        let size_factor = state.engine.entry_size_factor(price);
        match risk.open_position_scaled(&signal, balance, atr, size_factor) {
            Ok(position) => {
                if let Err(err) = self
                    .executor
                    .open_market(symbol, position.side, position.quantity)
                    .await
                {
                    // The exchange never accepted the entry: unwind the
                    // tracked position so the books stay consistent.
                    tracing::error!(symbol, error = %err, "entry order failed, unwinding");
                    risk.close_position(symbol, signal.price, ExitReason::SignalExit, now)?;
                    return Err(err).context("entry order failed after retries");
                }
                state.hold_cycles = 1;
                Ok(CycleOutcome::Opened {
                    symbol: symbol.to_string(),
                    quantity: position.quantity,
                })
            }
            Err(err) if err.is_admission_rejection() => {
                tracing::info!(symbol, error = %err, "signal not admitted");
                Ok(CycleOutcome::Rejected {
                    symbol: symbol.to_string(),
                    reason: err.to_string(),
                })
            }
            Err(err) => Err(err).context("failed to open position"),
        }
    }

    async fn close_tracked(
        &self,
        risk: &mut RiskManager,
        symbol: &str,
        price: Decimal,
        reason: ExitReason,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Trade> {
        let position = risk
            .position(symbol)
            .context("no position to close")?
            .clone();
        self.executor
            .close_market(symbol, position.side, position.quantity)
            .await
            .context("exit order failed")?;
        Ok(risk.close_position(symbol, price, reason, now)?)
    }

    /// The kill switch: closes every open position with reduce-only orders,
    /// records PANIC trades, and disables signal generation for the process
    /// lifetime (or until an explicit re-arm). This is the one synchronous,
    /// no-timeout critical section: it holds the risk lock until every
    /// position is closed.
    ///
    /// # Errors
    ///
    /// Returns an error for a non-positive price. Individual close-order
    /// failures are logged and do not stop the sweep: the accounting close
    /// is always total.
    pub async fn panic_close_all(&self, price: Decimal) -> Result<Vec<Trade>> {
        let mut risk = self.risk.lock().await;
        let open: Vec<(String, PositionSide, Decimal)> = risk
            .open_positions()
            .iter()
            .map(|p| (p.symbol.clone(), p.side, p.quantity))
            .collect();

        for (symbol, side, quantity) in open {
            if let Err(err) = self.executor.close_market(&symbol, side, quantity).await {
                tracing::error!(symbol, error = %err, "panic close order failed, continuing sweep");
            }
        }

        let trades = risk.close_all(price, chrono::Utc::now())?;
        tracing::warn!(closed = trades.len(), "panic close-all completed");
        Ok(trades)
    }
}

impl<D: MarketDataSource + ?Sized + 'static> TradingLoop<D> {
    /// Spawns the evaluation loop for one symbol. Cycles repeat on
    /// `interval`; a failed cycle is logged and the next one retries from
    /// scratch.
    pub fn spawn_symbol(
        self: &Arc<Self>,
        symbol: String,
        interval: std::time::Duration,
    ) -> tokio::task::JoinHandle<()> {
        let runner = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = runner
                .executor
                .setup_symbol(&symbol, runner.config.risk.leverage)
                .await
            {
                tracing::error!(symbol = %symbol, error = %err, "symbol setup failed");
            }
            let mut state = runner.symbol_state();
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match runner.run_cycle(&symbol, &mut state).await {
                    Ok(outcome) => {
                        tracing::debug!(symbol = %symbol, ?outcome, "cycle complete");
                    }
                    Err(err) => {
                        tracing::error!(symbol = %symbol, error = %err, "cycle failed");
                    }
                }
            }
        })
    }
}

/// Opaque wrapper so callers hold per-symbol state without reaching into
/// its internals.
pub struct SymbolStateHandle {
    inner: SymbolState,
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use atlas_core::{Candle, ExchangeClient, MarginType, OrderAck, OrderSide};
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct StaticData {
        fast: Vec<Candle>,
        slow: Vec<Candle>,
    }

    #[async_trait]
    impl MarketDataSource for StaticData {
        async fn fetch_history(
            &self,
            _symbol: &str,
            timeframe: Timeframe,
            _lookback_days: u32,
        ) -> Result<Vec<Candle>> {
            match timeframe {
                Timeframe::M15 => Ok(self.fast.clone()),
                Timeframe::H1 => Ok(self.slow.clone()),
                _ => anyhow::bail!("timeframe not served"),
            }
        }
    }

    #[derive(Default)]
    struct MockExchange {
        orders: AtomicU32,
        fail_orders: bool,
    }

    #[async_trait]
    impl ExchangeClient for MockExchange {
        async fn balance(&self) -> Result<Decimal> {
            Ok(dec!(10000))
        }

        async fn place_market_order(
            &self,
            symbol: &str,
            side: OrderSide,
            quantity: Decimal,
            _reduce_only: bool,
        ) -> Result<OrderAck> {
            if self.fail_orders {
                anyhow::bail!("exchange unavailable");
            }
            self.orders.fetch_add(1, Ordering::SeqCst);
            Ok(OrderAck {
                order_id: format!("ord-{}", self.orders.load(Ordering::SeqCst)),
                symbol: symbol.to_string(),
                side,
                quantity,
                fill_price: dec!(50000),
                timestamp: Utc::now(),
            })
        }

        async fn validate_margin(&self, _symbol: &str, _margin: Decimal) -> Result<bool> {
            Ok(true)
        }

        async fn set_leverage(&self, _symbol: &str, _leverage: u8) -> Result<()> {
            Ok(())
        }

        async fn set_margin_type(&self, _symbol: &str, _margin: MarginType) -> Result<()> {
            Ok(())
        }
    }

    fn rising(count: usize, step_minutes: i64) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap();
        let mut price = dec!(10000);
        (0..count)
            .map(|i| {
                let open = price;
                let close = open * dec!(1.004);
                price = close;
                Candle {
                    timestamp: start + Duration::minutes(i as i64 * step_minutes),
                    open,
                    high: close * dec!(1.001),
                    low: open * dec!(0.999),
                    close,
                    volume: if i == count - 1 { dec!(300) } else { dec!(100) },
                }
            })
            .collect()
    }

    fn trading_loop(
        fail_orders: bool,
    ) -> (TradingLoop<StaticData>, SymbolStateHandle, Arc<MockExchange>) {
        let config = TradingConfig::default();
        let data = Arc::new(StaticData {
            fast: rising(120, 15),
            slow: rising(60, 60),
        });
        let exchange = Arc::new(MockExchange {
            orders: AtomicU32::new(0),
            fail_orders,
        });
        let executor = Arc::new(OrderExecutor::new(
            exchange.clone() as Arc<dyn ExchangeClient>,
            &config.execution,
        ));
        let risk = Arc::new(Mutex::new(RiskManager::new(config.clone())));
        let runner = TradingLoop::new(config, data, executor, risk);
        let state = runner.symbol_state();
        (runner, state, exchange)
    }

    #[tokio::test]
    async fn bullish_cycle_opens_a_position() {
        let (runner, mut state, exchange) = trading_loop(false);
        let outcome = runner.run_cycle("BTCUSDT", &mut state).await.unwrap();

        assert!(matches!(outcome, CycleOutcome::Opened { .. }), "{outcome:?}");
        assert_eq!(exchange.orders.load(Ordering::SeqCst), 1);
        assert!(runner.risk().lock().await.has_position("BTCUSDT"));
    }

    #[tokio::test]
    async fn failed_entry_order_unwinds_tracking() {
        let (runner, mut state, _exchange) = trading_loop(true);
        let result = runner.run_cycle("BTCUSDT", &mut state).await;

        assert!(result.is_err());
        let risk = runner.risk();
        let risk = risk.lock().await;
        assert!(!risk.has_position("BTCUSDT"));
    }

    #[tokio::test]
    async fn exit_checks_skip_one_cycle_after_entry() {
        let (runner, mut state, _exchange) = trading_loop(false);
        runner.run_cycle("BTCUSDT", &mut state).await.unwrap();

        // The cycle immediately after the entry performs no exit checks.
        let outcome = runner.run_cycle("BTCUSDT", &mut state).await.unwrap();
        assert!(matches!(outcome, CycleOutcome::Idle));

        // The one after that manages the position normally.
        let outcome = runner.run_cycle("BTCUSDT", &mut state).await.unwrap();
        assert!(matches!(outcome, CycleOutcome::Updated { .. }), "{outcome:?}");
    }

    #[tokio::test]
    async fn panic_close_drains_everything_and_disarms() {
        let (runner, mut state, _exchange) = trading_loop(false);
        runner.run_cycle("BTCUSDT", &mut state).await.unwrap();

        let trades = runner.panic_close_all(dec!(50000)).await.unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].exit_reason, ExitReason::Panic);

        let risk = runner.risk();
        let risk = risk.lock().await;
        assert!(risk.open_positions().is_empty());
        assert!(!risk.signals_enabled());
    }
}
