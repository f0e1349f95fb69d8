//! Market regime classification.
//!
//! Coarse-grains current behavior into trending / ranging / volatile /
//! uncertain buckets from ADX, the ATR percentile, and Bollinger width, and
//! exposes per-regime parameter overrides for the signal gates.

use crate::indicators;
use atlas_core::config::{IndicatorConfig, RegimeConfig};
use atlas_core::{Candle, Regime};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Strategy posture appropriate to a regime. `NoTrade` gates all entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    TrendFollowing,
    MeanReversion,
    NoTrade,
}

/// Parameter overrides for the active regime.
#[derive(Debug, Clone, Copy)]
pub struct RegimeParams {
    pub regime: Regime,
    pub threshold_multiplier: f64,
    pub size_multiplier: f64,
    pub strategy: StrategyKind,
}

pub struct RegimeDetector {
    config: RegimeConfig,
    indicators: IndicatorConfig,
    current: Regime,
    history: Vec<(DateTime<Utc>, Regime)>,
    last_update: Option<DateTime<Utc>>,
}

impl RegimeDetector {
    #[must_use]
    pub const fn new(config: RegimeConfig, indicators: IndicatorConfig) -> Self {
        Self {
            config,
            indicators,
            current: Regime::Uncertain,
            history: Vec::new(),
            last_update: None,
        }
    }

    #[must_use]
    pub const fn current(&self) -> Regime {
        self.current
    }

    fn due(&self, now: DateTime<Utc>) -> bool {
        self.last_update.map_or(true, |last| {
            now - last >= Duration::seconds(self.config.update_interval_secs)
        })
    }

    /// Reclassifies the regime from fast-timeframe candles. The confirmed
    /// regime only changes once the classification has been stable for the
    /// configured window; interval gating makes this a no-op between updates.
    pub fn update(&mut self, candles: &[Candle], now: DateTime<Utc>) -> Regime {
        if !self.due(now) {
            return self.current;
        }

        let detected = self.classify(candles);
        self.history.push((now, detected));
        let cutoff = now - Duration::hours(24);
        self.history.retain(|(ts, _)| *ts > cutoff);
        self.last_update = Some(now);

        if self.is_stable(detected, now) && detected != self.current {
            tracing::info!(from = %self.current, to = %detected, "regime changed");
            self.current = detected;
        }
        self.current
    }

    fn classify(&self, candles: &[Candle]) -> Regime {
        if candles.len() < 30 {
            return Regime::Uncertain;
        }

        let adx = indicators::adx(candles, self.indicators.adx_period);
        let atr_percentile = self.atr_percentile(candles);
        let vwap = indicators::vwap(candles, candles[0].timestamp);
        let price = candles[candles.len() - 1].close;

        if atr_percentile > self.config.volatile_atr_percentile {
            return Regime::Volatile;
        }
        if adx > self.config.trending_adx_threshold {
            return if price > vwap {
                Regime::TrendingBullish
            } else {
                Regime::TrendingBearish
            };
        }
        if adx < self.config.ranging_adx_threshold
            && atr_percentile < self.config.ranging_atr_percentile
        {
            return Regime::Ranging;
        }
        Regime::Uncertain
    }

    #[allow(clippy::cast_precision_loss)]
    fn atr_percentile(&self, candles: &[Candle]) -> f64 {
        let period = self.indicators.atr_period;
        let window = period + 1;
        if candles.len() < window + 1 {
            return 50.0;
        }

        let mut values = Vec::new();
        for end in window..=candles.len() {
            let value = indicators::atr(&candles[end - window..end], period);
            if value > Decimal::ZERO {
                values.push(value.to_f64().unwrap_or(0.0));
            }
        }
        let Some(&current) = values.last() else {
            return 50.0;
        };
        if values.len() < 2 {
            return 50.0;
        }
        // Strict ranking: the current ATR must exceed history to count as
        // elevated, so flat volatility never reads as the top percentile.
        let rank = values.iter().filter(|v| **v < current).count();
        rank as f64 / values.len() as f64 * 100.0
    }

    fn is_stable(&self, regime: Regime, now: DateTime<Utc>) -> bool {
        let cutoff = now - Duration::minutes(self.config.stability_minutes);
        let recent: Vec<_> = self
            .history
            .iter()
            .filter(|(ts, _)| *ts > cutoff)
            .collect();
        !recent.is_empty() && recent.iter().all(|(_, r)| *r == regime)
    }

    /// Parameter overrides for `regime`.
    #[must_use]
    pub fn params(&self, regime: Regime) -> RegimeParams {
        match regime {
            Regime::TrendingBullish | Regime::TrendingBearish => RegimeParams {
                regime,
                threshold_multiplier: 1.0,
                size_multiplier: 1.0,
                strategy: StrategyKind::TrendFollowing,
            },
            Regime::Ranging => RegimeParams {
                regime,
                threshold_multiplier: 1.0,
                size_multiplier: 1.0,
                strategy: StrategyKind::MeanReversion,
            },
            Regime::Volatile => RegimeParams {
                regime,
                threshold_multiplier: 1.0 + self.config.volatile_threshold_increase,
                size_multiplier: self.config.volatile_size_factor,
                strategy: StrategyKind::TrendFollowing,
            },
            Regime::Uncertain => RegimeParams {
                regime,
                threshold_multiplier: 1.0,
                size_multiplier: 0.5,
                strategy: StrategyKind::NoTrade,
            },
        }
    }

    /// (previous, current) as of the most recent confirmed transition; used
    /// by regime-based exits.
    #[must_use]
    pub fn last_transition(&self) -> Option<(Regime, Regime)> {
        let confirmed: Vec<Regime> = self.history.iter().map(|(_, r)| *r).collect();
        confirmed
            .windows(2)
            .rev()
            .find(|pair| pair[0] != pair[1])
            .map(|pair| (pair[0], pair[1]))
    }
}
