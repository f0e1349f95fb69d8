//! Simulated fill pricing.
//!
//! Entries fill at the next bar's open. Stop-style exits fill inside the
//! bar's range, biased toward the unfavorable end, never outside
//! `[low, high]`. Every fill is then adjusted by fee plus slippage in the
//! direction that hurts the trader.

use atlas_core::config::ExecutionConfig;
use atlas_core::{Candle, EngineError, OrderSide, PositionSide, Result};
use rust_decimal::Decimal;

/// Long stops fill 30% of the way up from the low; short stops fill 70% of
/// the way from the close to the high.
const LONG_STOP_FILL_RATIO: &str = "0.3";
const SHORT_STOP_FILL_RATIO: &str = "0.7";

/// Simulated fill for a stop-style exit inside `candle`.
#[must_use]
pub fn stop_exit_fill(candle: &Candle, side: PositionSide) -> Decimal {
    match side {
        PositionSide::Long => {
            let ratio: Decimal = LONG_STOP_FILL_RATIO.parse().expect("constant ratio");
            candle.low + (candle.close - candle.low) * ratio
        }
        PositionSide::Short => {
            let ratio: Decimal = SHORT_STOP_FILL_RATIO.parse().expect("constant ratio");
            candle.close + (candle.high - candle.close) * ratio
        }
    }
}

/// Adjusts a base fill price by `fee + slippage`, unfavorably: buys pay
/// more, sells receive less.
///
/// # Errors
///
/// Returns `EngineError::NonPositive` for a non-positive base price.
pub fn apply_fees_and_slippage(
    config: &ExecutionConfig,
    price: Decimal,
    side: OrderSide,
) -> Result<Decimal> {
    if price <= Decimal::ZERO {
        return Err(EngineError::NonPositive {
            field: "price",
            value: price,
        });
    }

    let total_cost =
        atlas_core::numeric::dec(config.trading_fee) + atlas_core::numeric::dec(config.slippage);

    Ok(match side {
        OrderSide::Buy => price * (Decimal::ONE + total_cost),
        OrderSide::Sell => price * (Decimal::ONE - total_cost),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn candle(low: Decimal, close: Decimal, high: Decimal) -> Candle {
        Candle {
            timestamp: Utc::now(),
            open: close,
            high,
            low,
            close,
            volume: dec!(100),
        }
    }

    #[test]
    fn buy_adjustment_is_exactly_fee_plus_slippage() {
        // 0.05% fee + 0.02% slippage on a 50_000 buy => 50_035 exactly.
        let config = ExecutionConfig::default();
        let adjusted =
            apply_fees_and_slippage(&config, dec!(50000), OrderSide::Buy).unwrap();
        assert_eq!(adjusted, dec!(50035.0000));
    }

    #[test]
    fn sell_adjustment_is_symmetric_and_unfavorable() {
        let config = ExecutionConfig::default();
        let adjusted =
            apply_fees_and_slippage(&config, dec!(50000), OrderSide::Sell).unwrap();
        assert_eq!(adjusted, dec!(49965.0000));
    }

    #[test]
    fn non_positive_price_is_rejected() {
        let config = ExecutionConfig::default();
        assert!(apply_fees_and_slippage(&config, dec!(0), OrderSide::Buy).is_err());
    }

    #[test]
    fn long_stop_fill_sits_between_low_and_close() {
        let bar = candle(dec!(100), dec!(110), dec!(115));
        let fill = stop_exit_fill(&bar, PositionSide::Long);
        assert_eq!(fill, dec!(103.0));
        assert!(fill >= bar.low && fill <= bar.high);
    }

    #[test]
    fn short_stop_fill_sits_between_close_and_high() {
        let bar = candle(dec!(100), dec!(110), dec!(120));
        let fill = stop_exit_fill(&bar, PositionSide::Short);
        assert_eq!(fill, dec!(117.0));
        assert!(fill >= bar.low && fill <= bar.high);
    }
}
