//! Fixed fractional-risk position sizing.
//!
//! Pure and stateless: quantity is derived so that the loss at the ATR-based
//! stop equals `risk_per_trade` of balance, floored at the exchange minimum
//! order size and capped so the required margin never exceeds the balance.

use atlas_core::config::RiskConfig;
use atlas_core::numeric::dec;
use atlas_core::{EngineError, Position, PositionSide, Result};
use rust_decimal::{Decimal, RoundingStrategy};

const QUANTITY_DP: u32 = 8;

/// Output of a sizing calculation.
#[derive(Debug, Clone, PartialEq)]
pub struct Sizing {
    pub quantity: Decimal,
    pub stop_distance: Decimal,
    /// Entry minus stop distance; reference only, the live stop is tracked
    /// on the position.
    pub stop_price: Decimal,
    pub margin_required: Decimal,
}

/// Sizes a prospective position.
///
/// `quantity = balance * risk_per_trade / (stop_multiplier * atr)`, floored
/// at the minimum order size. If the implied margin exceeds the balance, the
/// quantity is re-derived from `balance * leverage / entry_price` so the
/// position never requires more margin than is available.
///
/// # Errors
///
/// Returns `EngineError::NonPositive` for non-positive balance, price, or
/// ATR, and `EngineError::InvalidLeverage` for leverage outside 1..=50.
pub fn size(
    config: &RiskConfig,
    balance: Decimal,
    entry_price: Decimal,
    atr: Decimal,
) -> Result<Sizing> {
    if balance <= Decimal::ZERO {
        return Err(EngineError::NonPositive {
            field: "balance",
            value: balance,
        });
    }
    if entry_price <= Decimal::ZERO {
        return Err(EngineError::NonPositive {
            field: "entry_price",
            value: entry_price,
        });
    }
    if atr <= Decimal::ZERO {
        return Err(EngineError::NonPositive {
            field: "atr",
            value: atr,
        });
    }
    if config.leverage == 0 || config.leverage > 50 {
        return Err(EngineError::InvalidLeverage(config.leverage));
    }

    let leverage = Decimal::from(config.leverage);
    let risk_amount = balance * dec(config.risk_per_trade);
    let stop_distance = dec(config.stop_loss_atr_multiplier) * atr;

    let mut quantity = (risk_amount / stop_distance).round_dp(QUANTITY_DP);

    // Below the exchange minimum we trade the minimum and accept slightly
    // more than the configured risk.
    let min_order = dec(config.min_order_size);
    if quantity < min_order {
        quantity = min_order;
    }

    let mut margin_required = quantity * entry_price / leverage;
    if margin_required > balance {
        // Round toward zero so the cap can never be re-breached by rounding.
        quantity = (balance * leverage / entry_price)
            .round_dp_with_strategy(QUANTITY_DP, RoundingStrategy::ToZero);
        margin_required = quantity * entry_price / leverage;
    }

    Ok(Sizing {
        quantity,
        stop_distance,
        stop_price: entry_price - stop_distance,
        margin_required,
    })
}

/// Trailing stop candidate at `trailing_multiplier * atr` from the current
/// price. Monotonic: returns the tightened stop only when it is strictly
/// closer to the entry-protecting side than the position's current stop,
/// otherwise the current stop is kept.
///
/// # Errors
///
/// Returns `EngineError::NonPositive` for non-positive price or ATR.
pub fn trailing_stop(
    config: &RiskConfig,
    position: &Position,
    current_price: Decimal,
    atr: Decimal,
) -> Result<Decimal> {
    if current_price <= Decimal::ZERO {
        return Err(EngineError::NonPositive {
            field: "current_price",
            value: current_price,
        });
    }
    if atr <= Decimal::ZERO {
        return Err(EngineError::NonPositive {
            field: "atr",
            value: atr,
        });
    }

    let distance = dec(config.trailing_stop_atr_multiplier) * atr;

    Ok(match position.side {
        PositionSide::Long => {
            let candidate = current_price - distance;
            candidate.max(position.trailing_stop)
        }
        PositionSide::Short => {
            let candidate = current_price + distance;
            candidate.min(position.trailing_stop)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    #[test]
    fn sizing_matches_one_percent_risk_rule() {
        // balance 10_000, entry 50_000, ATR 500 at 10x leverage:
        // stop = 1000, qty = 100 / 1000 = 0.1, margin = 0.1 * 50_000 / 10.
        let config = RiskConfig::default();
        let sizing = size(&config, dec!(10000), dec!(50000), dec!(500)).unwrap();

        assert_eq!(sizing.stop_distance, dec!(1000));
        assert_eq!(sizing.quantity, dec!(0.1));
        assert_eq!(sizing.margin_required, dec!(500));
        assert_eq!(sizing.stop_price, dec!(49000));
    }

    #[test]
    fn tiny_balance_floors_at_minimum_order_size() {
        let config = RiskConfig::default();
        // risk = 0.10, stop = 1000 -> raw qty 0.0001 < 0.001 minimum.
        let sizing = size(&config, dec!(10), dec!(1000), dec!(500)).unwrap();
        assert_eq!(sizing.quantity, dec!(0.001));
    }

    #[test]
    fn margin_cap_rederives_quantity() {
        let mut config = RiskConfig::default();
        config.leverage = 1;
        config.risk_per_trade = 0.9;
        // raw qty = 9000 / 20 = 450; margin = 450 * 100 = 45_000 > 10_000.
        let sizing = size(&config, dec!(10000), dec!(100), dec!(10)).unwrap();
        assert_eq!(sizing.quantity, dec!(100));
        assert_eq!(sizing.margin_required, dec!(10000));
    }

    #[test]
    fn rejects_non_positive_inputs() {
        let config = RiskConfig::default();
        assert!(size(&config, dec!(0), dec!(100), dec!(10)).is_err());
        assert!(size(&config, dec!(1000), dec!(-5), dec!(10)).is_err());
        assert!(size(&config, dec!(1000), dec!(100), dec!(0)).is_err());
    }

    #[test]
    fn rejects_invalid_leverage() {
        let mut config = RiskConfig::default();
        config.leverage = 0;
        assert!(matches!(
            size(&config, dec!(1000), dec!(100), dec!(10)),
            Err(EngineError::InvalidLeverage(0))
        ));
    }

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
    fn long_trailing_stop_only_rises() {
        let config = RiskConfig::default();
        let mut position = long_position();

        // Price moves up: stop tightens to 51_500 - 750.
        let stop = trailing_stop(&config, &position, dec!(51500), dec!(500)).unwrap();
        assert_eq!(stop, dec!(50750));
        position.trailing_stop = stop;

        // Price falls back: stop must not regress.
        let stop = trailing_stop(&config, &position, dec!(50000), dec!(500)).unwrap();
        assert_eq!(stop, dec!(50750));
    }

    #[test]
    fn short_trailing_stop_only_falls() {
        let config = RiskConfig::default();
        let mut position = long_position();
        position.side = PositionSide::Short;
        position.stop_loss = dec!(51000);
        position.trailing_stop = dec!(51000);

        let stop = trailing_stop(&config, &position, dec!(48500), dec!(500)).unwrap();
        assert_eq!(stop, dec!(49250));
        position.trailing_stop = stop;

        let stop = trailing_stop(&config, &position, dec!(50000), dec!(500)).unwrap();
        assert_eq!(stop, dec!(49250));
    }
}
