//! Advanced exit strategies: the partial profit ladder, dynamic stop
//! tightening, time-based exits, and regime-change exits.

use atlas_core::config::ExitConfig;
use atlas_core::{Position, PositionSide, Regime};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// A triggered rung on the profit-taking ladder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartialExitSignal {
    /// Ladder rung (1, 2, or 3 for the final target).
    pub level: u8,
    /// Fraction of the remaining quantity to close; 1.0 on the final rung.
    pub fraction: f64,
}

pub struct AdvancedExitManager {
    config: ExitConfig,
}

impl AdvancedExitManager {
    #[must_use]
    pub const fn new(config: ExitConfig) -> Self {
        Self { config }
    }

    fn profit_in_atr(position: &Position, current_price: Decimal, atr: Decimal) -> f64 {
        if atr <= Decimal::ZERO {
            return 0.0;
        }
        (position.profit_distance(current_price) / atr)
            .to_f64()
            .unwrap_or(0.0)
    }

    /// Returns the next untriggered ladder rung the profit has reached, if
    /// any. Rungs already recorded on the position never re-fire.
    #[must_use]
    pub fn check_partial_exit(
        &self,
        position: &Position,
        current_price: Decimal,
        atr: Decimal,
    ) -> Option<PartialExitSignal> {
        let profit_atr = Self::profit_in_atr(position, current_price, atr);
        let hit = &position.tp_levels_hit;

        if profit_atr >= self.config.final_atr_multiplier && !hit.contains(&3) {
            return Some(PartialExitSignal {
                level: 3,
                fraction: 1.0,
            });
        }
        if profit_atr >= self.config.partial_2_atr_multiplier && !hit.contains(&2) {
            return Some(PartialExitSignal {
                level: 2,
                fraction: self.config.partial_2_fraction,
            });
        }
        if profit_atr >= self.config.partial_1_atr_multiplier && !hit.contains(&1) {
            return Some(PartialExitSignal {
                level: 1,
                fraction: self.config.partial_1_fraction,
            });
        }
        None
    }

    /// Dynamic stop management: moves the stop to breakeven once profit
    /// reaches the configured ATR multiple, and tightens to a fraction of
    /// ATR when momentum reverses while in profit. Stops only ever tighten.
    pub fn update_dynamic_stops(
        &self,
        position: &mut Position,
        current_price: Decimal,
        atr: Decimal,
        momentum_reversed: bool,
    ) {
        let profit_atr = Self::profit_in_atr(position, current_price, atr);

        if profit_atr >= self.config.breakeven_atr_multiplier {
            Self::tighten(position, position.entry_price, "breakeven");
        }

        if momentum_reversed && profit_atr > 0.0 {
            let distance = atlas_core::numeric::dec(self.config.tight_stop_atr_multiplier) * atr;
            let candidate = match position.side {
                PositionSide::Long => current_price - distance,
                PositionSide::Short => current_price + distance,
            };
            Self::tighten(position, candidate, "momentum reversal");
        }
    }

    fn tighten(position: &mut Position, candidate: Decimal, cause: &str) {
        let tighter = match position.side {
            PositionSide::Long => candidate > position.trailing_stop,
            PositionSide::Short => candidate < position.trailing_stop,
        };
        if tighter {
            tracing::info!(
                symbol = %position.symbol,
                from = %position.trailing_stop,
                to = %candidate,
                cause,
                "stop tightened"
            );
            position.trailing_stop = candidate;
        }
    }

    /// True once the position has been held past the maximum hold duration.
    #[must_use]
    pub fn check_time_exit(&self, position: &Position, now: DateTime<Utc>) -> bool {
        let held = now - position.entry_time;
        if held >= Duration::hours(self.config.max_hold_hours) {
            tracing::info!(
                symbol = %position.symbol,
                held_hours = held.num_hours(),
                max_hours = self.config.max_hold_hours,
                "time-based exit triggered"
            );
            return true;
        }
        false
    }

    /// True when the market transitioned from a trending regime into
    /// ranging, which invalidates trend-following positions.
    #[must_use]
    pub fn check_regime_exit(
        &self,
        position: &Position,
        current: Regime,
        previous: Regime,
    ) -> bool {
        if !self.config.regime_exit_enabled {
            return false;
        }
        let triggered = previous.is_trending() && current == Regime::Ranging;
        if triggered {
            tracing::info!(
                symbol = %position.symbol,
                from = %previous,
                to = %current,
                "regime-based exit triggered"
            );
        }
        triggered
    }
}
