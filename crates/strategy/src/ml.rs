//! Directional confidence scoring.
//!
//! The engine consumes any [`ConfidenceModel`] through the feature manager:
//! scores near 1.0 favor longs, near 0.0 favor shorts, and 0.5 is neutral.
//! [`BlendScorer`] is the built-in deterministic implementation; an external
//! learned model can be dropped in behind the same trait.

use crate::indicators;
use atlas_core::Candle;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::VecDeque;

/// Score returned when the model is disabled or cannot evaluate.
pub const NEUTRAL_SCORE: f64 = 0.5;

const ACCURACY_WINDOW: usize = 100;
const MIN_ACCURACY: f64 = 0.55;
const MIN_SAMPLES: usize = 20;

/// A directional scorer over a fast-timeframe candle window.
pub trait ConfidenceModel: Send + Sync {
    /// Bullish-continuation probability in [0.0, 1.0].
    ///
    /// # Errors
    /// Returns an error when the window cannot be evaluated; the caller
    /// degrades to [`NEUTRAL_SCORE`].
    fn score(&self, candles: &[Candle]) -> anyhow::Result<f64>;

    /// Feeds back whether a scored entry played out, for accuracy tracking.
    fn record_outcome(&mut self, _predicted: f64, _outcome_bullish: bool) {}

    /// True once the model's tracked accuracy warrants removing it from the
    /// gate set. Defaults to never.
    fn should_disable(&self) -> bool {
        false
    }
}

/// Deterministic blend of return, momentum, trend, and volume features
/// squashed through a logistic to [0, 1].
pub struct BlendScorer {
    /// Rolling record of (predicted bullish, outcome bullish).
    outcomes: VecDeque<(bool, bool)>,
}

impl BlendScorer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            outcomes: VecDeque::with_capacity(ACCURACY_WINDOW),
        }
    }

    /// Rolling hit rate; 0.0 before any outcome is recorded.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn accuracy(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        let correct = self
            .outcomes
            .iter()
            .filter(|(predicted, actual)| predicted == actual)
            .count();
        correct as f64 / self.outcomes.len() as f64
    }
}

impl Default for BlendScorer {
    fn default() -> Self {
        Self::new()
    }
}

fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

impl ConfidenceModel for BlendScorer {
    fn record_outcome(&mut self, predicted: f64, outcome_bullish: bool) {
        if self.outcomes.len() == ACCURACY_WINDOW {
            self.outcomes.pop_front();
        }
        self.outcomes
            .push_back((predicted > NEUTRAL_SCORE, outcome_bullish));
    }

    fn should_disable(&self) -> bool {
        self.outcomes.len() >= MIN_SAMPLES && self.accuracy() < MIN_ACCURACY
    }

    fn score(&self, candles: &[Candle]) -> anyhow::Result<f64> {
        if candles.len() < 30 {
            anyhow::bail!("need at least 30 candles to score, have {}", candles.len());
        }

        let last = candles[candles.len() - 1].close;
        let back4 = candles[candles.len() - 5].close;
        if back4.is_zero() || last.is_zero() {
            anyhow::bail!("cannot score a window with zero prices");
        }
        let return_4: f64 = ((last - back4) / back4).to_f64().unwrap_or(0.0);

        let vwap = indicators::vwap(candles, candles[0].timestamp);
        let vwap_distance: f64 = if vwap.is_zero() {
            0.0
        } else {
            ((last - vwap) / vwap).to_f64().unwrap_or(0.0)
        };

        let momentum = indicators::squeeze_momentum(candles);
        let momentum_sign = match momentum.value.cmp(&Decimal::ZERO) {
            std::cmp::Ordering::Greater => 1.0,
            std::cmp::Ordering::Less => -1.0,
            std::cmp::Ordering::Equal => 0.0,
        };

        let rvol = indicators::rvol(candles, 20);
        let volume_pressure = (rvol - 1.0).clamp(-1.0, 1.0) * momentum_sign;

        let blend = 40.0 * return_4 + 20.0 * vwap_distance + 0.8 * momentum_sign
            + 0.4 * volume_pressure;
        Ok(logistic(blend))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn series(len: usize, step: Decimal) -> Vec<Candle> {
        (0..len)
            .map(|i| {
                let base = dec!(1000) + step * Decimal::from(i as i64);
                Candle {
                    timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
                        + Duration::minutes(i as i64 * 15),
                    open: base,
                    high: base + dec!(2),
                    low: base - dec!(2),
                    close: base,
                    volume: dec!(100),
                }
            })
            .collect()
    }

    #[test]
    fn uptrend_scores_above_neutral() {
        let scorer = BlendScorer::new();
        let score = scorer.score(&series(60, dec!(5))).unwrap();
        assert!(score > NEUTRAL_SCORE, "got {score}");
    }

    #[test]
    fn downtrend_scores_below_neutral() {
        let scorer = BlendScorer::new();
        let score = scorer.score(&series(60, dec!(-5))).unwrap();
        assert!(score < NEUTRAL_SCORE, "got {score}");
    }

    #[test]
    fn short_window_is_an_error() {
        let scorer = BlendScorer::new();
        assert!(scorer.score(&series(10, dec!(1))).is_err());
    }

    #[test]
    fn accuracy_tracks_recorded_outcomes() {
        let mut scorer = BlendScorer::new();
        for _ in 0..10 {
            scorer.record_outcome(0.8, true);
        }
        for _ in 0..10 {
            scorer.record_outcome(0.8, false);
        }
        assert!((scorer.accuracy() - 0.5).abs() < f64::EPSILON);
        assert!(scorer.should_disable());
    }

    #[test]
    fn few_samples_never_disable() {
        let mut scorer = BlendScorer::new();
        for _ in 0..5 {
            scorer.record_outcome(0.8, false);
        }
        assert!(!scorer.should_disable());
    }
}
