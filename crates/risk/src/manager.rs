//! Position lifecycle and risk controls.
//!
//! The risk manager owns every open position: it opens them (after portfolio
//! admission), trails their stops, evaluates partial/time/regime exits,
//! records closed trades, and carries the kill switch that disarms signal
//! generation after a panic close. Positions move OPEN -> partially closed
//! -> CLOSED; once closed only the derived trade records persist.

use crate::exits::{AdvancedExitManager, PartialExitSignal};
use crate::portfolio::{Admission, PortfolioManager, PortfolioMetrics};
use crate::sizer;
use atlas_core::numeric::dec;
use atlas_core::{
    EngineError, ExitReason, FeatureManager, PartialExit, Position, PositionSide, Regime, Result,
    Signal, SignalDirection, Trade, TradingConfig,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

pub const FEATURE_ADVANCED_EXITS: &str = "advanced_exits";
pub const FEATURE_PORTFOLIO: &str = "portfolio";

const QUANTITY_DP: u32 = 8;

pub struct RiskManager {
    config: TradingConfig,
    features: FeatureManager,
    positions: std::collections::HashMap<String, Position>,
    closed_trades: Vec<Trade>,
    /// Kill switch state: cleared by `close_all`, restored only by
    /// `rearm_signals`.
    signals_enabled: bool,
    exits: Option<AdvancedExitManager>,
    portfolio: Option<PortfolioManager>,
    current_regime: Regime,
    previous_regime: Regime,
}

impl RiskManager {
    #[must_use]
    pub fn new(config: TradingConfig) -> Self {
        let mut features = FeatureManager::new();

        let exits = config.features.enable_advanced_exits.then(|| {
            features.register(FEATURE_ADVANCED_EXITS, true, true);
            AdvancedExitManager::new(config.exits.clone())
        });
        let portfolio = config.features.enable_portfolio.then(|| {
            features.register(FEATURE_PORTFOLIO, true, true);
            PortfolioManager::new(config.portfolio.clone())
        });

        Self {
            config,
            features,
            positions: std::collections::HashMap::new(),
            closed_trades: Vec::new(),
            signals_enabled: true,
            exits,
            portfolio,
            current_regime: Regime::Uncertain,
            previous_regime: Regime::Uncertain,
        }
    }

    #[must_use]
    pub const fn signals_enabled(&self) -> bool {
        self.signals_enabled
    }

    /// Re-arms signal generation after a panic close.
    pub fn rearm_signals(&mut self) {
        tracing::warn!("signal generation re-armed by operator");
        self.signals_enabled = true;
    }

    #[must_use]
    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    #[must_use]
    pub fn has_position(&self, symbol: &str) -> bool {
        self.positions.contains_key(symbol)
    }

    #[must_use]
    pub fn open_positions(&self) -> Vec<&Position> {
        self.positions.values().collect()
    }

    #[must_use]
    pub fn closed_trades(&self) -> &[Trade] {
        &self.closed_trades
    }

    #[must_use]
    pub const fn portfolio(&self) -> Option<&PortfolioManager> {
        self.portfolio.as_ref()
    }

    pub fn portfolio_mut(&mut self) -> Option<&mut PortfolioManager> {
        self.portfolio.as_mut()
    }

    /// Operator access to feature enable/disable/reset.
    pub fn features_mut(&mut self) -> &mut FeatureManager {
        &mut self.features
    }

    /// Portfolio metrics for the current balance, when portfolio management
    /// is active.
    #[must_use]
    pub fn portfolio_metrics(&self, balance: Decimal) -> Option<PortfolioMetrics> {
        let portfolio = self.portfolio.as_ref()?;
        if !self.features.is_enabled(FEATURE_PORTFOLIO) {
            return None;
        }
        Some(portfolio.metrics(balance))
    }

    /// Tracks regime transitions for regime-based exits.
    pub fn update_regime(&mut self, regime: Regime) {
        self.previous_regime = self.current_regime;
        self.current_regime = regime;
        if self.previous_regime != self.current_regime {
            tracing::info!(from = %self.previous_regime, to = %self.current_regime, "regime updated");
        }
    }

    /// Opens a position for `signal`, sized by the fixed fractional-risk
    /// rule. Portfolio admission is evaluated before the position is stored;
    /// a rejection is a hard, typed failure and nothing is mutated.
    ///
    /// # Errors
    ///
    /// - `SignalsDisabled` after a panic close that has not been re-armed
    /// - `PositionExists` when the symbol already has an open position
    /// - `AdmissionRejected` when portfolio limits would be breached
    /// - sizing errors for invalid balance/price/ATR
    pub fn open_position(
        &mut self,
        signal: &Signal,
        balance: Decimal,
        atr: Decimal,
    ) -> Result<Position> {
        self.open_position_scaled(signal, balance, atr, 1.0)
    }

    /// Like [`Self::open_position`] but scales the risk-derived quantity by
    /// `size_factor` (volume-profile / regime size adjustments). The factor
    /// only ever shrinks the position.
    pub fn open_position_scaled(
        &mut self,
        signal: &Signal,
        balance: Decimal,
        atr: Decimal,
        size_factor: f64,
    ) -> Result<Position> {
        if !self.signals_enabled {
            return Err(EngineError::SignalsDisabled);
        }
        if self.positions.contains_key(&signal.symbol) {
            return Err(EngineError::PositionExists(signal.symbol.clone()));
        }

        let sizing = sizer::size(&self.config.risk, balance, signal.price, atr)?;
        let mut quantity = sizing.quantity;
        if (size_factor - 1.0).abs() > f64::EPSILON {
            let factor = dec(size_factor.clamp(0.0, 1.0));
            let min_order = dec(self.config.risk.min_order_size);
            quantity = (quantity * factor).round_dp(QUANTITY_DP).max(min_order);
        }

        let side = match signal.direction {
            SignalDirection::LongEntry => PositionSide::Long,
            SignalDirection::ShortEntry => PositionSide::Short,
        };
        let stop_loss = match side {
            PositionSide::Long => signal.price - sizing.stop_distance,
            PositionSide::Short => signal.price + sizing.stop_distance,
        };

        let position = Position::new(
            signal.symbol.clone(),
            side,
            signal.price,
            quantity,
            self.config.risk.leverage,
            stop_loss,
            signal.timestamp,
        );

        if let Some(portfolio) = self.portfolio.as_mut() {
            if self.features.is_enabled(FEATURE_PORTFOLIO) {
                match portfolio.can_admit(&signal.symbol, &position, balance) {
                    Admission::Admitted => portfolio.record_position(&position),
                    Admission::Rejected(reason) => {
                        return Err(EngineError::AdmissionRejected {
                            symbol: signal.symbol.clone(),
                            reason,
                        });
                    }
                }
            }
        }

        tracing::info!(
            symbol = %position.symbol,
            side = %position.side,
            quantity = %position.quantity,
            entry = %position.entry_price,
            stop = %position.stop_loss,
            "position opened"
        );
        self.positions
            .insert(signal.symbol.clone(), position.clone());
        Ok(position)
    }

    /// Trails the stop, refreshes unrealized PnL, and applies dynamic stop
    /// tightening when advanced exits are active.
    ///
    /// # Errors
    ///
    /// Returns `NoPosition` for an unknown symbol and sizing errors for
    /// invalid price/ATR.
    pub fn update_stops(
        &mut self,
        symbol: &str,
        current_price: Decimal,
        atr: Decimal,
        momentum_reversed: bool,
    ) -> Result<()> {
        let position = self
            .positions
            .get_mut(symbol)
            .ok_or_else(|| EngineError::NoPosition(symbol.to_string()))?;

        position.trailing_stop =
            sizer::trailing_stop(&self.config.risk, position, current_price, atr)?;
        position.unrealized_pnl = position.pnl_at(current_price);

        if let Some(exits) = self.exits.as_ref() {
            if self.features.is_enabled(FEATURE_ADVANCED_EXITS) {
                self.features.execute(FEATURE_ADVANCED_EXITS, (), || {
                    exits.update_dynamic_stops(position, current_price, atr, momentum_reversed);
                    Ok(())
                });
            }
        }
        Ok(())
    }

    /// Long stops trigger at `price <= trailing_stop`, short stops at
    /// `price >= trailing_stop`.
    #[must_use]
    pub fn check_stop_hit(&self, symbol: &str, current_price: Decimal) -> bool {
        self.positions.get(symbol).is_some_and(|position| {
            match position.side {
                PositionSide::Long => current_price <= position.trailing_stop,
                PositionSide::Short => current_price >= position.trailing_stop,
            }
        })
    }

    /// Next untriggered rung of the profit ladder, when advanced exits are
    /// active.
    #[must_use]
    pub fn check_partial_exit(
        &mut self,
        symbol: &str,
        current_price: Decimal,
        atr: Decimal,
    ) -> Option<PartialExitSignal> {
        let position = self.positions.get(symbol)?;
        let exits = self.exits.as_ref()?;
        if !self.features.is_enabled(FEATURE_ADVANCED_EXITS) {
            return None;
        }
        self.features.execute(FEATURE_ADVANCED_EXITS, None, || {
            Ok(exits.check_partial_exit(position, current_price, atr))
        })
    }

    /// Whether the position has exceeded its maximum hold duration.
    #[must_use]
    pub fn check_time_exit(&mut self, symbol: &str, now: DateTime<Utc>) -> bool {
        let Some(position) = self.positions.get(symbol) else {
            return false;
        };
        let Some(exits) = self.exits.as_ref() else {
            return false;
        };
        if !self.features.is_enabled(FEATURE_ADVANCED_EXITS) {
            return false;
        }
        self.features.execute(FEATURE_ADVANCED_EXITS, false, || {
            Ok(exits.check_time_exit(position, now))
        })
    }

    /// Whether the tracked regime transition invalidates the position.
    #[must_use]
    pub fn check_regime_exit(&mut self, symbol: &str) -> bool {
        let Some(position) = self.positions.get(symbol) else {
            return false;
        };
        let Some(exits) = self.exits.as_ref() else {
            return false;
        };
        if !self.features.is_enabled(FEATURE_ADVANCED_EXITS) {
            return false;
        }
        let (current, previous) = (self.current_regime, self.previous_regime);
        self.features.execute(FEATURE_ADVANCED_EXITS, false, || {
            Ok(exits.check_regime_exit(position, current, previous))
        })
    }

    /// Closes `fraction` of the position at `exit_price`, appending a
    /// partial-take-profit trade and tightening the stop toward breakeven.
    /// The remaining quantity never drops below zero; a fraction of 1.0
    /// closes the position outright.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFraction` outside (0, 1], `NonPositive` for a bad
    /// price, and `NoPosition` for an unknown symbol.
    pub fn execute_partial_exit(
        &mut self,
        symbol: &str,
        exit_price: Decimal,
        fraction: f64,
        level: Option<u8>,
        now: DateTime<Utc>,
    ) -> Result<Trade> {
        if fraction <= 0.0 || fraction > 1.0 {
            return Err(EngineError::InvalidFraction(fraction));
        }
        if exit_price <= Decimal::ZERO {
            return Err(EngineError::NonPositive {
                field: "exit_price",
                value: exit_price,
            });
        }

        let position = self
            .positions
            .get_mut(symbol)
            .ok_or_else(|| EngineError::NoPosition(symbol.to_string()))?;

        let fraction_dec = dec(fraction);
        let close_quantity = (position.quantity * fraction_dec)
            .round_dp(QUANTITY_DP)
            .min(position.quantity);

        let trade = Trade::from_close(
            position,
            exit_price,
            close_quantity,
            now,
            ExitReason::PartialTakeProfit,
        );

        position.quantity -= close_quantity;
        position.partial_exits.push(PartialExit {
            timestamp: now,
            price: exit_price,
            quantity: close_quantity,
            pnl: trade.pnl,
        });
        if let Some(level) = level {
            position.tp_levels_hit.insert(level);
        }
        position.unrealized_pnl = position.pnl_at(exit_price);

        // Each realized slice protects the remainder at breakeven.
        let breakeven_tighter = match position.side {
            PositionSide::Long => position.entry_price > position.trailing_stop,
            PositionSide::Short => position.entry_price < position.trailing_stop,
        };
        if breakeven_tighter {
            position.trailing_stop = position.entry_price;
        }

        tracing::info!(
            symbol,
            fraction = %format!("{:.0}%", fraction * 100.0),
            price = %exit_price,
            pnl = %trade.pnl,
            remaining = %position.quantity,
            "partial exit executed"
        );

        let fully_closed = position.quantity.is_zero();
        self.closed_trades.push(trade.clone());

        if fully_closed {
            self.positions.remove(symbol);
            self.notify_portfolio_closed(symbol, trade.pnl);
        } else if let Some(portfolio) = self.portfolio.as_mut() {
            if self.features.is_enabled(FEATURE_PORTFOLIO) {
                let position = self.positions.get(symbol).expect("position still open");
                portfolio.record_position(position);
                portfolio.record_pnl(symbol, trade.pnl);
            }
        }

        Ok(trade)
    }

    /// Closes the position at `exit_price`, records the trade, and releases
    /// the portfolio exposure.
    ///
    /// # Errors
    ///
    /// Returns `NoPosition` for an unknown symbol, `NonPositive` for a bad
    /// price, and `InvalidConfig` when called with the partial-exit reason.
    pub fn close_position(
        &mut self,
        symbol: &str,
        exit_price: Decimal,
        reason: ExitReason,
        now: DateTime<Utc>,
    ) -> Result<Trade> {
        if exit_price <= Decimal::ZERO {
            return Err(EngineError::NonPositive {
                field: "exit_price",
                value: exit_price,
            });
        }
        if reason == ExitReason::PartialTakeProfit {
            return Err(EngineError::InvalidConfig(
                "PARTIAL_TAKE_PROFIT is only valid for partial exits".to_string(),
            ));
        }

        let position = self
            .positions
            .remove(symbol)
            .ok_or_else(|| EngineError::NoPosition(symbol.to_string()))?;

        let trade = Trade::from_close(&position, exit_price, position.quantity, now, reason);
        tracing::info!(
            symbol,
            side = %position.side,
            exit = %exit_price,
            pnl = %trade.pnl,
            reason = %reason,
            "position closed"
        );
        self.closed_trades.push(trade.clone());
        self.notify_portfolio_closed(symbol, trade.pnl);
        Ok(trade)
    }

    fn notify_portfolio_closed(&mut self, symbol: &str, pnl: Decimal) {
        if let Some(portfolio) = self.portfolio.as_mut() {
            if self.features.is_enabled(FEATURE_PORTFOLIO) {
                portfolio.release_position(symbol);
                portfolio.record_pnl(symbol, pnl);
            }
        }
    }

    /// Kill switch: closes every open position at `current_price` with the
    /// PANIC reason and disarms signal generation until explicitly re-armed.
    /// Total and idempotent: after it returns no position remains open.
    ///
    /// # Errors
    ///
    /// Returns `NonPositive` for a bad price; no position is closed in that
    /// case.
    pub fn close_all(&mut self, current_price: Decimal, now: DateTime<Utc>) -> Result<Vec<Trade>> {
        if current_price <= Decimal::ZERO {
            return Err(EngineError::NonPositive {
                field: "current_price",
                value: current_price,
            });
        }

        let symbols: Vec<String> = self.positions.keys().cloned().collect();
        let mut trades = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            // Positions exist by construction of the key list.
            let trade = self.close_position(&symbol, current_price, ExitReason::Panic, now)?;
            trades.push(trade);
        }

        self.signals_enabled = false;
        tracing::warn!(
            closed = trades.len(),
            "panic close completed, signal generation disabled"
        );
        Ok(trades)
    }
}
