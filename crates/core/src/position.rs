use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Side of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionSide {
    Long,
    Short,
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
        }
    }
}

/// Why a position (or a slice of it) was closed. Closed enumeration: every
/// trade record carries exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss,
    TrailingStop,
    SignalExit,
    TakeProfit,
    PartialTakeProfit,
    Panic,
    TimeLimit,
    RegimeChange,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::StopLoss => "STOP_LOSS",
            Self::TrailingStop => "TRAILING_STOP",
            Self::SignalExit => "SIGNAL_EXIT",
            Self::TakeProfit => "TAKE_PROFIT",
            Self::PartialTakeProfit => "PARTIAL_TAKE_PROFIT",
            Self::Panic => "PANIC",
            Self::TimeLimit => "TIME_LIMIT",
            Self::RegimeChange => "REGIME_CHANGE",
        };
        write!(f, "{s}")
    }
}

/// One slice taken off a position at a profit milestone. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialExit {
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
    pub quantity: Decimal,
    pub pnl: Decimal,
}

/// An open position. Owned exclusively by the risk manager; the portfolio
/// manager only ever observes clones keyed by symbol.
///
/// Invariants: `quantity <= original_quantity`, and `trailing_stop` moves
/// only toward the entry-protecting direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: PositionSide,
    pub entry_price: Decimal,
    pub quantity: Decimal,
    pub original_quantity: Decimal,
    pub leverage: u8,
    pub stop_loss: Decimal,
    pub trailing_stop: Decimal,
    pub entry_time: DateTime<Utc>,
    pub unrealized_pnl: Decimal,
    /// Profit-taking ladder rungs already hit (1 = first partial, ...).
    pub tp_levels_hit: BTreeSet<u8>,
    pub partial_exits: Vec<PartialExit>,
}

impl Position {
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // String cannot be used in const fn
    pub fn new(
        symbol: String,
        side: PositionSide,
        entry_price: Decimal,
        quantity: Decimal,
        leverage: u8,
        stop_loss: Decimal,
        entry_time: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol,
            side,
            entry_price,
            quantity,
            original_quantity: quantity,
            leverage,
            stop_loss,
            // The trailing stop starts at the initial stop and only tightens.
            trailing_stop: stop_loss,
            entry_time,
            unrealized_pnl: Decimal::ZERO,
            tp_levels_hit: BTreeSet::new(),
            partial_exits: Vec::new(),
        }
    }

    /// Signed PnL of the remaining quantity at `price`.
    #[must_use]
    pub fn pnl_at(&self, price: Decimal) -> Decimal {
        match self.side {
            PositionSide::Long => (price - self.entry_price) * self.quantity,
            PositionSide::Short => (self.entry_price - price) * self.quantity,
        }
    }

    /// Notional value of the remaining quantity at the entry price.
    #[must_use]
    pub fn notional(&self) -> Decimal {
        self.entry_price * self.quantity
    }

    /// Distance between the entry and the initial stop.
    #[must_use]
    pub fn stop_distance(&self) -> Decimal {
        (self.entry_price - self.stop_loss).abs()
    }

    /// Signed profit distance (positive when in profit) at `price`.
    #[must_use]
    pub fn profit_distance(&self, price: Decimal) -> Decimal {
        match self.side {
            PositionSide::Long => price - self.entry_price,
            PositionSide::Short => self.entry_price - price,
        }
    }
}

/// Immutable record of a closed position or a partial slice of one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: String,
    pub side: PositionSide,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub quantity: Decimal,
    pub pnl: Decimal,
    pub pnl_percent: f64,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub exit_reason: ExitReason,
}

impl Trade {
    /// Builds the record for closing `quantity` of `position` at `exit_price`.
    #[must_use]
    pub fn from_close(
        position: &Position,
        exit_price: Decimal,
        quantity: Decimal,
        exit_time: DateTime<Utc>,
        exit_reason: ExitReason,
    ) -> Self {
        let pnl = match position.side {
            PositionSide::Long => (exit_price - position.entry_price) * quantity,
            PositionSide::Short => (position.entry_price - exit_price) * quantity,
        };
        let notional = position.entry_price * quantity;
        let pnl_percent = if notional > Decimal::ZERO {
            (pnl / notional)
                .to_string()
                .parse::<f64>()
                .unwrap_or(0.0)
                * 100.0
        } else {
            0.0
        };

        Self {
            symbol: position.symbol.clone(),
            side: position.side,
            entry_price: position.entry_price,
            exit_price,
            quantity,
            pnl,
            pnl_percent,
            entry_time: position.entry_time,
            exit_time,
            exit_reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn long_position() -> Position {
        Position::new(
            "BTCUSDT".to_string(),
            PositionSide::Long,
            dec!(50000),
            dec!(0.1),
            10,
            dec!(49000),
            Utc::now(),
        )
    }

    #[test]
    fn long_pnl_is_exit_minus_entry() {
        let position = long_position();
        assert_eq!(position.pnl_at(dec!(51000)), dec!(100.0));
        assert_eq!(position.pnl_at(dec!(49000)), dec!(-100.0));
    }

    #[test]
    fn short_pnl_is_entry_minus_exit() {
        let mut position = long_position();
        position.side = PositionSide::Short;
        position.stop_loss = dec!(51000);
        position.trailing_stop = dec!(51000);
        assert_eq!(position.pnl_at(dec!(49000)), dec!(100.0));
    }

    #[test]
    fn trailing_stop_starts_at_stop_loss() {
        let position = long_position();
        assert_eq!(position.trailing_stop, position.stop_loss);
        assert_eq!(position.stop_distance(), dec!(1000));
    }

    #[test]
    fn trade_from_close_records_pnl_percent() {
        let position = long_position();
        let trade = Trade::from_close(
            &position,
            dec!(51000),
            position.quantity,
            Utc::now(),
            ExitReason::TakeProfit,
        );
        assert_eq!(trade.pnl, dec!(100.0));
        assert!((trade.pnl_percent - 2.0).abs() < 1e-9);
    }
}
