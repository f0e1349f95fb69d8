//! Multi-timeframe trend confirmation.
//!
//! Each timeframe contributes a trend/momentum/volume snapshot; the
//! coordinator scores how many agree and turns the weighted vote into an
//! overall direction and a signal confidence.

use crate::indicators;
use atlas_core::config::TimeframeConfig;
use atlas_core::{Candle, Timeframe, TrendDirection};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

const MIN_TIMEFRAME_CANDLES: usize = 20;
const MOMENTUM_BARS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeTrend {
    Increasing,
    Decreasing,
    Stable,
}

/// Per-timeframe analysis inputs to the alignment vote.
#[derive(Debug, Clone)]
pub struct TimeframeSnapshot {
    pub trend: TrendDirection,
    /// Fractional price change over the last ten bars.
    pub momentum: f64,
    pub volatility: Decimal,
    pub volume_trend: VolumeTrend,
}

/// Consolidated view across all available timeframes.
#[derive(Debug, Clone)]
pub struct TimeframeAnalysis {
    pub snapshots: Vec<(Timeframe, TimeframeSnapshot)>,
    /// Number of timeframes agreeing with the dominant trend (0-4).
    pub alignment_score: usize,
    /// 1.0 with full alignment, 0.7 with three aligned, otherwise 0.0.
    pub confidence: f64,
    pub overall_direction: TrendDirection,
}

pub struct TimeframeCoordinator {
    config: TimeframeConfig,
}

impl TimeframeCoordinator {
    #[must_use]
    pub const fn new(config: TimeframeConfig) -> Self {
        Self { config }
    }

    /// Analyzes every timeframe that has data. Auxiliary timeframes may be
    /// absent; they simply do not vote.
    #[must_use]
    pub fn analyze(
        &self,
        m5: Option<&[Candle]>,
        m15: &[Candle],
        h1: &[Candle],
        h4: Option<&[Candle]>,
    ) -> TimeframeAnalysis {
        let mut snapshots = Vec::with_capacity(4);
        if let Some(candles) = m5 {
            snapshots.push((Timeframe::M5, Self::analyze_timeframe(candles)));
        }
        snapshots.push((Timeframe::M15, Self::analyze_timeframe(m15)));
        snapshots.push((Timeframe::H1, Self::analyze_timeframe(h1)));
        if let Some(candles) = h4 {
            snapshots.push((Timeframe::H4, Self::analyze_timeframe(candles)));
        }

        let alignment_score = Self::alignment(&snapshots);
        let confidence = Self::confidence(alignment_score);
        let overall_direction = self.overall_direction(&snapshots);

        TimeframeAnalysis {
            snapshots,
            alignment_score,
            confidence,
            overall_direction,
        }
    }

    fn analyze_timeframe(candles: &[Candle]) -> TimeframeSnapshot {
        if candles.len() < MIN_TIMEFRAME_CANDLES {
            return TimeframeSnapshot {
                trend: TrendDirection::Neutral,
                momentum: 0.0,
                volatility: Decimal::ZERO,
                volume_trend: VolumeTrend::Stable,
            };
        }

        let vwap = indicators::vwap(candles, candles[0].timestamp);
        let trend = indicators::trend(candles, vwap);
        let volatility = indicators::atr(candles, 14);

        let momentum = {
            let first = candles[candles.len() - MOMENTUM_BARS].close;
            let last = candles[candles.len() - 1].close;
            if first.is_zero() {
                0.0
            } else {
                ((last - first) / first).to_f64().unwrap_or(0.0)
            }
        };

        TimeframeSnapshot {
            trend,
            momentum,
            volatility,
            volume_trend: Self::volume_trend(candles),
        }
    }

    fn volume_trend(candles: &[Candle]) -> VolumeTrend {
        if candles.len() < 10 {
            return VolumeTrend::Stable;
        }
        let recent: Decimal = candles[candles.len() - 5..]
            .iter()
            .map(|c| c.volume)
            .sum::<Decimal>()
            / Decimal::from(5);
        let earlier: Decimal = candles[candles.len() - 10..candles.len() - 5]
            .iter()
            .map(|c| c.volume)
            .sum::<Decimal>()
            / Decimal::from(5);

        if earlier.is_zero() {
            return VolumeTrend::Stable;
        }
        let change = ((recent - earlier) / earlier).to_f64().unwrap_or(0.0);
        if change > 0.2 {
            VolumeTrend::Increasing
        } else if change < -0.2 {
            VolumeTrend::Decreasing
        } else {
            VolumeTrend::Stable
        }
    }

    fn alignment(snapshots: &[(Timeframe, TimeframeSnapshot)]) -> usize {
        let bullish = snapshots
            .iter()
            .filter(|(_, s)| s.trend == TrendDirection::Bullish)
            .count();
        let bearish = snapshots
            .iter()
            .filter(|(_, s)| s.trend == TrendDirection::Bearish)
            .count();
        bullish.max(bearish)
    }

    fn confidence(alignment: usize) -> f64 {
        match alignment {
            a if a >= 4 => 1.0,
            3 => 0.7,
            _ => 0.0,
        }
    }

    fn weight(&self, timeframe: Timeframe) -> f64 {
        match timeframe {
            Timeframe::M5 => self.config.weight_5m,
            Timeframe::M15 => self.config.weight_15m,
            Timeframe::H1 => self.config.weight_1h,
            Timeframe::H4 => self.config.weight_4h,
        }
    }

    fn overall_direction(&self, snapshots: &[(Timeframe, TimeframeSnapshot)]) -> TrendDirection {
        let mut bullish = 0.0;
        let mut bearish = 0.0;
        for (timeframe, snapshot) in snapshots {
            match snapshot.trend {
                TrendDirection::Bullish => bullish += self.weight(*timeframe),
                TrendDirection::Bearish => bearish += self.weight(*timeframe),
                TrendDirection::Neutral => {}
            }
        }

        if bullish > bearish && bullish > 0.5 {
            TrendDirection::Bullish
        } else if bearish > bullish && bearish > 0.5 {
            TrendDirection::Bearish
        } else {
            TrendDirection::Neutral
        }
    }
}
