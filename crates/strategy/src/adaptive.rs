//! Volatility-driven recalibration of the ADX and RVOL entry thresholds.
//!
//! High volatility raises both thresholds to filter noise; low volatility
//! lowers them to capture more setups. Adjusted values are always clamped to
//! the configured bounds.

use crate::indicators;
use atlas_core::config::{AdaptiveConfig, IndicatorConfig};
use atlas_core::Candle;
use chrono::{DateTime, Duration, Utc};

/// ATR window (in slow-timeframe bars) used for the volatility percentile.
const VOLATILITY_WINDOW: usize = 24;
const ATR_PERIOD: usize = 14;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub adx: f64,
    pub rvol: f64,
}

/// One recorded recalibration.
#[derive(Debug, Clone)]
pub struct ThresholdAdjustment {
    pub timestamp: DateTime<Utc>,
    pub volatility_percentile: f64,
    pub thresholds: Thresholds,
}

pub struct AdaptiveThresholds {
    config: AdaptiveConfig,
    base: Thresholds,
    current: Thresholds,
    volatility_percentile: f64,
    history: Vec<ThresholdAdjustment>,
    last_update: Option<DateTime<Utc>>,
}

impl AdaptiveThresholds {
    #[must_use]
    pub fn new(config: AdaptiveConfig, indicators: &IndicatorConfig) -> Self {
        let base = Thresholds {
            adx: indicators.adx_threshold,
            rvol: indicators.rvol_threshold,
        };
        Self {
            config,
            base,
            current: base,
            volatility_percentile: 50.0,
            history: Vec::new(),
            last_update: None,
        }
    }

    #[must_use]
    pub const fn current(&self) -> Thresholds {
        self.current
    }

    #[must_use]
    pub fn history(&self) -> &[ThresholdAdjustment] {
        &self.history
    }

    fn due(&self, now: DateTime<Utc>) -> bool {
        self.last_update.map_or(true, |last| {
            now - last >= Duration::seconds(self.config.update_interval_secs)
        })
    }

    /// Recomputes the thresholds from slow-timeframe candles. A no-op that
    /// returns the current values when the update interval has not elapsed.
    pub fn update(&mut self, candles: &[Candle], now: DateTime<Utc>) -> Thresholds {
        if !self.due(now) {
            return self.current;
        }

        self.volatility_percentile = self.volatility_percentile(candles);
        let multiplier = Self::multiplier(self.volatility_percentile);

        let adx = (self.base.adx * multiplier).clamp(self.config.min_adx, self.config.max_adx);
        let rvol = (self.base.rvol * multiplier).clamp(self.config.min_rvol, self.config.max_rvol);

        if (adx - self.current.adx).abs() > f64::EPSILON
            || (rvol - self.current.rvol).abs() > f64::EPSILON
        {
            tracing::info!(
                volatility_percentile = %format!("{:.1}", self.volatility_percentile),
                multiplier,
                adx = %format!("{:.2} -> {adx:.2}", self.current.adx),
                rvol = %format!("{:.2} -> {rvol:.2}", self.current.rvol),
                "entry thresholds recalibrated"
            );
        }

        self.current = Thresholds { adx, rvol };
        self.last_update = Some(now);
        self.history.push(ThresholdAdjustment {
            timestamp: now,
            volatility_percentile: self.volatility_percentile,
            thresholds: self.current,
        });
        self.current
    }

    /// Percentile of the latest 24-bar ATR against its distribution over the
    /// lookback window. 50.0 when there is not enough history.
    #[allow(clippy::cast_precision_loss)]
    fn volatility_percentile(&self, candles: &[Candle]) -> f64 {
        let min_candles = self.config.lookback_days * 24;
        if candles.len() < min_candles.max(VOLATILITY_WINDOW + 1) {
            tracing::debug!(
                have = candles.len(),
                need = min_candles,
                "insufficient history for volatility percentile"
            );
            return 50.0;
        }

        let mut atr_values = Vec::new();
        for end in (VOLATILITY_WINDOW + 1)..=candles.len() {
            let window = &candles[end - VOLATILITY_WINDOW - 1..end];
            let value = indicators::atr(window, ATR_PERIOD);
            if value > rust_decimal::Decimal::ZERO {
                atr_values.push(value);
            }
        }
        if atr_values.len() < 2 {
            return 50.0;
        }

        let current = *atr_values.last().expect("non-empty");
        let below = atr_values.iter().filter(|v| **v < current).count();
        below as f64 / atr_values.len() as f64 * 100.0
    }

    fn multiplier(percentile: f64) -> f64 {
        match percentile {
            p if p < 20.0 => 0.7,
            p if p < 40.0 => 0.85,
            p if p < 60.0 => 1.0,
            p if p < 80.0 => 1.15,
            _ => 1.3,
        }
    }
}
