//! Pure indicator math over candle windows.
//!
//! Price-dimensioned outputs (VWAP, ATR, momentum) stay in `Decimal`;
//! dimensionless statistics (ADX, RVOL) are `f64`. Every function returns a
//! neutral value when the window is shorter than its minimum lookback.

use atlas_core::config::IndicatorConfig;
use atlas_core::{Candle, MomentumColor, TrendDirection};
use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Bollinger/Keltner window used by the squeeze indicator.
pub const SQUEEZE_PERIOD: usize = 20;

/// Momentum state for the fastest timeframe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SqueezeMomentum {
    pub value: Decimal,
    pub squeezed: bool,
    pub color: MomentumColor,
}

impl Default for SqueezeMomentum {
    fn default() -> Self {
        Self {
            value: Decimal::ZERO,
            squeezed: false,
            color: MomentumColor::Recovering,
        }
    }
}

/// Most recent Monday 00:00 UTC at or before `ts` — the anchor for weekly
/// VWAP.
#[must_use]
pub fn weekly_anchor(ts: DateTime<Utc>) -> DateTime<Utc> {
    let days_since_monday = i64::from(ts.weekday().num_days_from_monday());
    let date = ts.date_naive() - Duration::days(days_since_monday);
    Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).expect("midnight is valid"))
}

/// Volume-weighted average of the typical price, anchored at `anchor`.
/// Candles before the anchor are ignored. Returns zero when no volume has
/// traded since the anchor.
#[must_use]
pub fn vwap(candles: &[Candle], anchor: DateTime<Utc>) -> Decimal {
    let mut cumulative_tpv = Decimal::ZERO;
    let mut cumulative_volume = Decimal::ZERO;

    for candle in candles.iter().filter(|c| c.timestamp >= anchor) {
        cumulative_tpv += candle.typical_price() * candle.volume;
        cumulative_volume += candle.volume;
    }

    if cumulative_volume.is_zero() {
        return Decimal::ZERO;
    }
    cumulative_tpv / cumulative_volume
}

fn true_ranges(candles: &[Candle]) -> Vec<Decimal> {
    candles
        .windows(2)
        .map(|pair| {
            let prev_close = pair[0].close;
            let candle = &pair[1];
            (candle.high - candle.low)
                .max((candle.high - prev_close).abs())
                .max((candle.low - prev_close).abs())
        })
        .collect()
}

/// Average True Range: EMA of the true range, seeded with a simple average
/// of the first `period` values. Needs `period + 1` candles.
#[must_use]
pub fn atr(candles: &[Candle], period: usize) -> Decimal {
    if period == 0 || candles.len() < period + 1 {
        return Decimal::ZERO;
    }

    let ranges = true_ranges(candles);
    let period_dec = Decimal::from(period);
    let mut value: Decimal = ranges[..period].iter().copied().sum::<Decimal>() / period_dec;

    let multiplier = Decimal::from(2) / Decimal::from(period + 1);
    for tr in &ranges[period..] {
        value = *tr * multiplier + value * (Decimal::ONE - multiplier);
    }
    value
}

fn wilder_smooth(values: &[f64], period: usize) -> Vec<f64> {
    let alpha = 1.0 / period as f64;
    let mut smoothed = Vec::with_capacity(values.len());
    let mut state = 0.0;
    for (i, value) in values.iter().enumerate() {
        state = if i == 0 {
            *value
        } else {
            alpha * value + (1.0 - alpha) * state
        };
        smoothed.push(state);
    }
    smoothed
}

/// Average Directional Index on a 0–100 scale. Needs `2 * period` candles.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn adx(candles: &[Candle], period: usize) -> f64 {
    if period == 0 || candles.len() < 2 * period {
        return 0.0;
    }

    let n = candles.len() - 1;
    let mut plus_dm = Vec::with_capacity(n);
    let mut minus_dm = Vec::with_capacity(n);
    let mut tr = Vec::with_capacity(n);

    for pair in candles.windows(2) {
        let (prev, cur) = (&pair[0], &pair[1]);
        let up = (cur.high - prev.high).to_f64().unwrap_or(0.0);
        let down = (prev.low - cur.low).to_f64().unwrap_or(0.0);
        plus_dm.push(if up > down && up > 0.0 { up } else { 0.0 });
        minus_dm.push(if down > up && down > 0.0 { down } else { 0.0 });

        let range = (cur.high - cur.low)
            .max((cur.high - prev.close).abs())
            .max((cur.low - prev.close).abs());
        tr.push(range.to_f64().unwrap_or(0.0));
    }

    let plus_smooth = wilder_smooth(&plus_dm, period);
    let minus_smooth = wilder_smooth(&minus_dm, period);
    let tr_smooth = wilder_smooth(&tr, period);

    let dx: Vec<f64> = (0..n)
        .map(|i| {
            if tr_smooth[i] <= f64::EPSILON {
                return 0.0;
            }
            let plus_di = 100.0 * plus_smooth[i] / tr_smooth[i];
            let minus_di = 100.0 * minus_smooth[i] / tr_smooth[i];
            let sum = plus_di + minus_di;
            if sum <= f64::EPSILON {
                0.0
            } else {
                100.0 * (plus_di - minus_di).abs() / sum
            }
        })
        .collect();

    *wilder_smooth(&dx, period).last().unwrap_or(&0.0)
}

/// Relative volume: the latest bar's volume over the trailing average of the
/// previous `period` bars. Needs `period + 1` candles.
#[must_use]
pub fn rvol(candles: &[Candle], period: usize) -> f64 {
    if period == 0 || candles.len() < period + 1 {
        return 0.0;
    }

    let history = &candles[candles.len() - period - 1..candles.len() - 1];
    let avg: Decimal =
        history.iter().map(|c| c.volume).sum::<Decimal>() / Decimal::from(history.len());
    if avg.is_zero() {
        return 0.0;
    }
    (candles[candles.len() - 1].volume / avg)
        .to_f64()
        .unwrap_or(0.0)
}

/// Squeeze momentum: Bollinger Bands inside Keltner Channels flags the
/// squeeze; momentum is the close's distance from the midpoint of the
/// 20-bar high/low channel, colored by its change since the previous bar.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn squeeze_momentum(candles: &[Candle]) -> SqueezeMomentum {
    if candles.len() < SQUEEZE_PERIOD + 1 {
        return SqueezeMomentum::default();
    }

    let window = &candles[candles.len() - SQUEEZE_PERIOD..];
    let closes: Vec<f64> = window
        .iter()
        .map(|c| c.close.to_f64().unwrap_or(0.0))
        .collect();
    let n = closes.len() as f64;

    let mean = closes.iter().sum::<f64>() / n;
    // Sample standard deviation, matching rolling-window convention.
    let variance = closes.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let std_dev = variance.sqrt();
    let bb_upper = mean + 2.0 * std_dev;
    let bb_lower = mean - 2.0 * std_dev;

    let kc_atr = {
        let ranges = true_ranges(&candles[candles.len() - SQUEEZE_PERIOD - 1..]);
        let sum: f64 = ranges.iter().map(|r| r.to_f64().unwrap_or(0.0)).sum();
        sum / ranges.len() as f64
    };
    let kc_upper = mean + 1.5 * kc_atr;
    let kc_lower = mean - 1.5 * kc_atr;
    let squeezed = bb_upper < kc_upper && bb_lower > kc_lower;

    let highest_high = window.iter().map(|c| c.high).max().unwrap_or_default();
    let lowest_low = window.iter().map(|c| c.low).min().unwrap_or_default();
    let midpoint = (highest_high + lowest_low) / Decimal::from(2);

    let value = window[window.len() - 1].close - midpoint;
    let previous = window[window.len() - 2].close - midpoint;

    let color = if value > Decimal::ZERO {
        if value > previous {
            MomentumColor::Increasing
        } else {
            MomentumColor::Fading
        }
    } else if value < previous {
        MomentumColor::Decreasing
    } else {
        MomentumColor::Recovering
    };

    SqueezeMomentum {
        value,
        squeezed,
        color,
    }
}

/// Trend classification: where the latest close sits relative to VWAP.
#[must_use]
pub fn trend(candles: &[Candle], vwap: Decimal) -> TrendDirection {
    let Some(last) = candles.last() else {
        return TrendDirection::Neutral;
    };
    if vwap.is_zero() {
        return TrendDirection::Neutral;
    }
    if last.close > vwap {
        TrendDirection::Bullish
    } else if last.close < vwap {
        TrendDirection::Bearish
    } else {
        TrendDirection::Neutral
    }
}

/// Minimum fast-timeframe candles needed before any indicator update.
#[must_use]
pub fn min_fast_lookback(config: &IndicatorConfig) -> usize {
    (2 * config.atr_period)
        .max(2 * config.adx_period)
        .max(config.rvol_period + 1)
        .max(SQUEEZE_PERIOD + 1)
}

/// Minimum slow-timeframe candles needed before any indicator update.
#[must_use]
pub fn min_slow_lookback(config: &IndicatorConfig) -> usize {
    (config.atr_period + 1).max(3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(ts_minutes: i64, open: Decimal, close: Decimal, volume: Decimal) -> Candle {
        let high = open.max(close) + dec!(1);
        let low = open.min(close) - dec!(1);
        Candle {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap()
                + Duration::minutes(ts_minutes * 15),
            open,
            high,
            low,
            close,
            volume,
        }
    }

    fn flat_series(len: usize, price: Decimal) -> Vec<Candle> {
        (0..len)
            .map(|i| candle(i as i64, price, price, dec!(100)))
            .collect()
    }

    fn rising_series(len: usize) -> Vec<Candle> {
        (0..len)
            .map(|i| {
                let base = dec!(100) + Decimal::from(i as i64 * 2);
                candle(i as i64, base, base + dec!(2), dec!(100))
            })
            .collect()
    }

    #[test]
    fn weekly_anchor_is_monday_midnight() {
        // 2024-03-07 is a Thursday.
        let ts = Utc.with_ymd_and_hms(2024, 3, 7, 13, 45, 0).unwrap();
        let anchor = weekly_anchor(ts);
        assert_eq!(anchor, Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap());

        // A Monday anchors to itself at midnight.
        let monday = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
        assert_eq!(
            weekly_anchor(monday),
            Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn vwap_of_constant_prices_is_typical_price() {
        let candles = flat_series(10, dec!(100));
        let anchor = candles[0].timestamp;
        // high = 101, low = 99, close = 100 -> typical = 100.
        assert_eq!(vwap(&candles, anchor), dec!(100));
    }

    #[test]
    fn vwap_ignores_candles_before_anchor() {
        let mut candles = flat_series(5, dec!(100));
        candles.extend((5..10).map(|i| candle(i, dec!(200), dec!(200), dec!(100))));
        let anchor = candles[5].timestamp;
        assert_eq!(vwap(&candles, anchor), dec!(200));
    }

    #[test]
    fn vwap_with_no_volume_is_zero() {
        let candles: Vec<Candle> = (0..5)
            .map(|i| candle(i, dec!(100), dec!(100), Decimal::ZERO))
            .collect();
        assert_eq!(vwap(&candles, candles[0].timestamp), Decimal::ZERO);
    }

    #[test]
    fn atr_of_constant_range_equals_range() {
        // Every bar spans high - low = 2 with no gaps, so ATR = 2.
        let candles = flat_series(30, dec!(100));
        assert_eq!(atr(&candles, 14), dec!(2));
    }

    #[test]
    fn atr_requires_period_plus_one() {
        let candles = flat_series(14, dec!(100));
        assert_eq!(atr(&candles, 14), Decimal::ZERO);
    }

    #[test]
    fn adx_high_for_sustained_trend() {
        let candles = rising_series(60);
        let value = adx(&candles, 14);
        assert!(value > 25.0, "expected strong trend, got {value}");
    }

    #[test]
    fn adx_zero_when_underfilled() {
        let candles = rising_series(20);
        assert!(adx(&candles, 14) < f64::EPSILON);
    }

    #[test]
    fn rvol_measures_last_bar_against_average() {
        let mut candles = flat_series(21, dec!(100));
        candles.last_mut().unwrap().volume = dec!(300);
        let value = rvol(&candles, 20);
        assert!((value - 3.0).abs() < 1e-9);
    }

    #[test]
    fn squeeze_momentum_positive_and_rising_is_increasing() {
        let candles = rising_series(40);
        let momentum = squeeze_momentum(&candles);
        assert!(momentum.value > Decimal::ZERO);
        assert_eq!(momentum.color, MomentumColor::Increasing);
    }

    #[test]
    fn squeeze_momentum_negative_and_falling_is_decreasing() {
        let candles: Vec<Candle> = (0..40)
            .map(|i| {
                let base = dec!(200) - Decimal::from(i64::from(i) * 2);
                candle(i64::from(i), base, base - dec!(2), dec!(100))
            })
            .collect();
        let momentum = squeeze_momentum(&candles);
        assert!(momentum.value < Decimal::ZERO);
        assert_eq!(momentum.color, MomentumColor::Decreasing);
    }

    #[test]
    fn trend_follows_price_vs_vwap() {
        let candles = flat_series(5, dec!(100));
        assert_eq!(trend(&candles, dec!(90)), TrendDirection::Bullish);
        assert_eq!(trend(&candles, dec!(110)), TrendDirection::Bearish);
        assert_eq!(trend(&candles, Decimal::ZERO), TrendDirection::Neutral);
    }
}
