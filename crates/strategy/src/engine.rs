//! Multi-timeframe signal engine.
//!
//! Consumes candle windows for every active timeframe, recomputes the
//! indicator snapshot wholesale, and emits at most one directional entry
//! signal per evaluation cycle. All optional analytics run through the
//! feature manager and degrade to neutral defaults when disabled or failing;
//! multi-timeframe confirmation is registered as critical and is never
//! auto-disabled.

use crate::adaptive::{AdaptiveThresholds, Thresholds};
use crate::indicators;
use crate::ml::{BlendScorer, ConfidenceModel, NEUTRAL_SCORE};
use crate::regime::{RegimeDetector, RegimeParams, StrategyKind};
use crate::timeframes::{TimeframeAnalysis, TimeframeCoordinator};
use crate::volume_profile::VolumeProfileAnalyzer;
use atlas_core::{
    Candle, FeatureManager, IndicatorSnapshot, MomentumColor, PositionSide, PriceLocation, Signal,
    SignalDirection, TradingConfig, TrendDirection,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

pub const FEATURE_ADAPTIVE: &str = "adaptive_thresholds";
pub const FEATURE_MULTI_TIMEFRAME: &str = "multi_timeframe";
pub const FEATURE_VOLUME_PROFILE: &str = "volume_profile";
pub const FEATURE_REGIME: &str = "regime_detection";
pub const FEATURE_ML: &str = "ml_scoring";

/// Candle windows for one evaluation cycle, oldest first. The auxiliary
/// timeframes are optional: their absence downgrades multi-timeframe
/// confirmation without counting as a feature error.
pub struct TimeframeWindows<'a> {
    pub fast: &'a [Candle],
    pub slow: &'a [Candle],
    pub aux_fast: Option<&'a [Candle]>,
    pub aux_slow: Option<&'a [Candle]>,
}

/// Per-symbol signal engine.
pub struct SignalEngine {
    config: TradingConfig,
    features: FeatureManager,
    snapshot: IndicatorSnapshot,
    prev_momentum_color: MomentumColor,
    last_update: Option<DateTime<Utc>>,
    adaptive: Option<AdaptiveThresholds>,
    coordinator: Option<TimeframeCoordinator>,
    volume_profile: Option<VolumeProfileAnalyzer>,
    regime: Option<RegimeDetector>,
    model: Option<Box<dyn ConfidenceModel>>,
    ml_score: f64,
    analysis: Option<TimeframeAnalysis>,
    regime_params: Option<RegimeParams>,
}

impl SignalEngine {
    #[must_use]
    pub fn new(config: TradingConfig) -> Self {
        let model: Option<Box<dyn ConfidenceModel>> = config
            .features
            .enable_ml_scoring
            .then(|| Box::new(BlendScorer::new()) as Box<dyn ConfidenceModel>);
        Self::with_model(config, model)
    }

    /// Builds the engine with an injected confidence model (or none).
    #[must_use]
    pub fn with_model(config: TradingConfig, model: Option<Box<dyn ConfidenceModel>>) -> Self {
        let mut features = FeatureManager::new();
        let toggles = &config.features;

        let adaptive = toggles.enable_adaptive_thresholds.then(|| {
            features.register(FEATURE_ADAPTIVE, true, true);
            AdaptiveThresholds::new(config.adaptive.clone(), &config.indicators)
        });
        let coordinator = toggles.enable_multi_timeframe.then(|| {
            // Critical: trend alignment must never silently stop confirming.
            features.register(FEATURE_MULTI_TIMEFRAME, true, false);
            TimeframeCoordinator::new(config.timeframes.clone())
        });
        let volume_profile = toggles.enable_volume_profile.then(|| {
            features.register(FEATURE_VOLUME_PROFILE, true, true);
            VolumeProfileAnalyzer::new(config.volume_profile.clone())
        });
        let regime = toggles.enable_regime_detection.then(|| {
            features.register(FEATURE_REGIME, true, true);
            RegimeDetector::new(config.regime.clone(), config.indicators.clone())
        });
        let model = model.inspect(|_| {
            features.register(FEATURE_ML, true, true);
        });

        Self {
            config,
            features,
            snapshot: IndicatorSnapshot::default(),
            prev_momentum_color: MomentumColor::default(),
            last_update: None,
            adaptive,
            coordinator,
            volume_profile,
            regime,
            model,
            ml_score: NEUTRAL_SCORE,
            analysis: None,
            regime_params: None,
        }
    }

    #[must_use]
    pub const fn snapshot(&self) -> &IndicatorSnapshot {
        &self.snapshot
    }

    #[must_use]
    pub const fn analysis(&self) -> Option<&TimeframeAnalysis> {
        self.analysis.as_ref()
    }

    #[must_use]
    pub const fn regime_params(&self) -> Option<&RegimeParams> {
        self.regime_params.as_ref()
    }

    #[must_use]
    pub fn regime_detector(&self) -> Option<&RegimeDetector> {
        self.regime.as_ref()
    }

    /// Operator access to feature enable/disable/reset.
    pub fn features_mut(&mut self) -> &mut FeatureManager {
        &mut self.features
    }

    /// Feeds a realized trade outcome back to the confidence model.
    pub fn record_model_outcome(&mut self, predicted: f64, outcome_bullish: bool) {
        if let Some(model) = self.model.as_mut() {
            model.record_outcome(predicted, outcome_bullish);
        }
    }

    #[must_use]
    pub const fn features(&self) -> &FeatureManager {
        &self.features
    }

    /// Recomputes the indicator snapshot and runs every enabled sub-analysis
    /// on its own cadence. A no-op (logged) when any required timeframe is
    /// below its minimum lookback.
    pub fn update_indicators(&mut self, windows: &TimeframeWindows<'_>) {
        let Some(last) = windows.fast.last() else {
            tracing::warn!("no fast-timeframe candles, skipping indicator update");
            return;
        };
        let now = last.timestamp;

        let min_fast = indicators::min_fast_lookback(&self.config.indicators);
        let min_slow = indicators::min_slow_lookback(&self.config.indicators);
        if windows.fast.len() < min_fast || windows.slow.len() < min_slow {
            tracing::warn!(
                fast = windows.fast.len(),
                slow = windows.slow.len(),
                min_fast,
                min_slow,
                "insufficient candles for indicator update"
            );
            return;
        }

        if let Some(adaptive) = self.adaptive.as_mut() {
            if self.features.is_enabled(FEATURE_ADAPTIVE) {
                self.features.execute(FEATURE_ADAPTIVE, (), || {
                    adaptive.update(windows.slow, now);
                    Ok(())
                });
            }
        }

        self.analysis = None;
        if let Some(coordinator) = self.coordinator.as_ref() {
            if self.features.is_enabled(FEATURE_MULTI_TIMEFRAME) {
                let aux_fast = windows.aux_fast.filter(|w| !w.is_empty());
                let aux_slow = windows.aux_slow.filter(|w| !w.is_empty());
                if aux_fast.is_some() && aux_slow.is_some() {
                    self.analysis = self.features.execute(FEATURE_MULTI_TIMEFRAME, None, || {
                        Ok(Some(coordinator.analyze(
                            aux_fast,
                            windows.fast,
                            windows.slow,
                            aux_slow,
                        )))
                    });
                } else {
                    // Auxiliary data not loaded yet: degrade, not an error.
                    tracing::debug!("auxiliary timeframes unavailable, skipping alignment");
                }
            }
        }

        if let Some(profile) = self.volume_profile.as_mut() {
            if self.features.is_enabled(FEATURE_VOLUME_PROFILE) {
                self.features.execute(FEATURE_VOLUME_PROFILE, (), || {
                    profile.update(windows.fast, now);
                    Ok(())
                });
            }
        }

        self.regime_params = None;
        if let Some(regime) = self.regime.as_mut() {
            if self.features.is_enabled(FEATURE_REGIME) {
                let current = self.features.execute(FEATURE_REGIME, regime.current(), || {
                    Ok(regime.update(windows.fast, now))
                });
                self.regime_params = Some(regime.params(current));
            }
        }

        self.ml_score = NEUTRAL_SCORE;
        if let Some(model) = self.model.as_ref() {
            if self.features.is_enabled(FEATURE_ML) {
                self.ml_score = self
                    .features
                    .execute(FEATURE_ML, NEUTRAL_SCORE, || model.score(windows.fast));
                if model.should_disable() {
                    tracing::warn!("confidence model below accuracy floor, disabling");
                    self.features.disable(FEATURE_ML);
                    self.ml_score = NEUTRAL_SCORE;
                }
            }
        }

        self.prev_momentum_color = self.snapshot.momentum_color;
        self.snapshot = self.compute_snapshot(windows, now);
        self.last_update = Some(now);
    }

    fn compute_snapshot(
        &self,
        windows: &TimeframeWindows<'_>,
        now: DateTime<Utc>,
    ) -> IndicatorSnapshot {
        let anchor = indicators::weekly_anchor(now);
        let vwap_fast = indicators::vwap(windows.fast, anchor);
        let vwap_slow = indicators::vwap(windows.slow, anchor);
        let price = windows.fast[windows.fast.len() - 1].close;
        let momentum = indicators::squeeze_momentum(windows.fast);

        IndicatorSnapshot {
            price,
            vwap_fast,
            vwap_slow,
            atr_fast: indicators::atr(windows.fast, self.config.indicators.atr_period),
            atr_slow: indicators::atr(windows.slow, self.config.indicators.atr_period),
            adx: indicators::adx(windows.fast, self.config.indicators.adx_period),
            rvol: indicators::rvol(windows.fast, self.config.indicators.rvol_period),
            momentum: momentum.value,
            momentum_color: momentum.color,
            squeezed: momentum.squeezed,
            trend_fast: indicators::trend(windows.fast, vwap_fast),
            trend_slow: indicators::trend(windows.slow, vwap_slow),
            price_vs_vwap: if price > vwap_fast {
                PriceLocation::Above
            } else {
                PriceLocation::Below
            },
        }
    }

    /// ADX/RVOL thresholds for this cycle: adaptive when enabled, scaled by
    /// the active regime's multiplier.
    #[must_use]
    pub fn thresholds(&self) -> Thresholds {
        let mut thresholds = match &self.adaptive {
            Some(adaptive) if self.features.is_enabled(FEATURE_ADAPTIVE) => adaptive.current(),
            _ => Thresholds {
                adx: self.config.indicators.adx_threshold,
                rvol: self.config.indicators.rvol_threshold,
            },
        };
        if let Some(params) = &self.regime_params {
            thresholds.adx *= params.threshold_multiplier;
            thresholds.rvol *= params.threshold_multiplier;
        }
        thresholds
    }

    /// Entry size multiplier from volume profile and regime conditions.
    #[must_use]
    pub fn entry_size_factor(&self, price: Decimal) -> f64 {
        let mut factor = 1.0;
        if let Some(profile) = &self.volume_profile {
            if self.features.is_enabled(FEATURE_VOLUME_PROFILE) {
                factor *= profile.size_factor(price);
            }
        }
        if let Some(params) = &self.regime_params {
            factor *= params.size_multiplier;
        }
        factor
    }

    /// True when momentum has flipped against `side` since the previous
    /// cycle; feeds dynamic stop tightening.
    #[must_use]
    pub fn momentum_reversed_for(&self, side: PositionSide) -> bool {
        match side {
            PositionSide::Long => {
                self.prev_momentum_color == MomentumColor::Increasing
                    && self.snapshot.momentum_color != MomentumColor::Increasing
            }
            PositionSide::Short => {
                self.prev_momentum_color == MomentumColor::Decreasing
                    && self.snapshot.momentum_color != MomentumColor::Decreasing
            }
        }
    }

    fn gates_pass(&self, direction: SignalDirection) -> bool {
        // Confidence model: skip entries it contradicts beyond the cutoff.
        if self.model.is_some() && self.features.is_enabled(FEATURE_ML) {
            let cutoff = self.config.ml.low_confidence_threshold;
            let contradicted = match direction {
                SignalDirection::LongEntry => self.ml_score < cutoff,
                SignalDirection::ShortEntry => self.ml_score > 1.0 - cutoff,
            };
            if contradicted {
                return false;
            }
        }

        // Regime: no entries while the market is unclassifiable.
        if let Some(params) = &self.regime_params {
            if params.strategy == StrategyKind::NoTrade {
                return false;
            }
        }

        // Multi-timeframe confirmation.
        if self.coordinator.is_some() {
            if let Some(analysis) = &self.analysis {
                if analysis.alignment_score < self.config.timeframes.min_alignment {
                    return false;
                }
                let required = match direction {
                    SignalDirection::LongEntry => TrendDirection::Bullish,
                    SignalDirection::ShortEntry => TrendDirection::Bearish,
                };
                if analysis.overall_direction != required {
                    return false;
                }
            }
        }
        true
    }

    fn confidence_for(&self, direction: SignalDirection) -> f64 {
        let mut confidence = self
            .analysis
            .as_ref()
            .map_or(NEUTRAL_SCORE, |a| a.confidence);

        if self.model.is_some() && self.features.is_enabled(FEATURE_ML) {
            let strongly_agrees = match direction {
                SignalDirection::LongEntry => {
                    self.ml_score > self.config.ml.high_confidence_threshold
                }
                SignalDirection::ShortEntry => {
                    self.ml_score < 1.0 - self.config.ml.high_confidence_threshold
                }
            };
            if strongly_agrees {
                confidence = (confidence * 1.2).min(1.0);
            }
        }
        confidence
    }

    /// Emits a long-entry signal iff every gate and indicator condition
    /// holds. Mutually exclusive with [`Self::check_short_entry`] by the
    /// trend gates.
    #[must_use]
    pub fn check_long_entry(&self, symbol: &str) -> Option<Signal> {
        let timestamp = self.last_update?;
        if !self.snapshot.is_ready() || !self.gates_pass(SignalDirection::LongEntry) {
            return None;
        }

        let thresholds = self.thresholds();
        let conditions_met = self.snapshot.price_vs_vwap == PriceLocation::Above
            && self.snapshot.trend_fast == TrendDirection::Bullish
            && self.snapshot.trend_slow == TrendDirection::Bullish
            && self.snapshot.momentum > Decimal::ZERO
            && self.snapshot.momentum_color == MomentumColor::Increasing
            && self.snapshot.adx > thresholds.adx
            && self.snapshot.rvol > thresholds.rvol;
        if !conditions_met {
            return None;
        }

        Some(Signal::new(
            symbol.to_string(),
            SignalDirection::LongEntry,
            self.snapshot.price,
            timestamp,
            self.confidence_for(SignalDirection::LongEntry),
            self.snapshot.clone(),
        ))
    }

    /// Emits a short-entry signal iff every gate and indicator condition
    /// holds.
    #[must_use]
    pub fn check_short_entry(&self, symbol: &str) -> Option<Signal> {
        let timestamp = self.last_update?;
        if !self.snapshot.is_ready() || !self.gates_pass(SignalDirection::ShortEntry) {
            return None;
        }

        let thresholds = self.thresholds();
        let conditions_met = self.snapshot.price_vs_vwap == PriceLocation::Below
            && self.snapshot.trend_fast == TrendDirection::Bearish
            && self.snapshot.trend_slow == TrendDirection::Bearish
            && self.snapshot.momentum < Decimal::ZERO
            && self.snapshot.momentum_color == MomentumColor::Decreasing
            && self.snapshot.adx > thresholds.adx
            && self.snapshot.rvol > thresholds.rvol;
        if !conditions_met {
            return None;
        }

        Some(Signal::new(
            symbol.to_string(),
            SignalDirection::ShortEntry,
            self.snapshot.price,
            timestamp,
            self.confidence_for(SignalDirection::ShortEntry),
            self.snapshot.clone(),
        ))
    }
}
