use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse classification of current market behavior, used to gate entries
/// and trigger regime-change exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Regime {
    TrendingBullish,
    TrendingBearish,
    Ranging,
    Volatile,
    #[default]
    Uncertain,
}

impl Regime {
    #[must_use]
    pub const fn is_trending(self) -> bool {
        matches!(self, Self::TrendingBullish | Self::TrendingBearish)
    }
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::TrendingBullish => "TRENDING_BULLISH",
            Self::TrendingBearish => "TRENDING_BEARISH",
            Self::Ranging => "RANGING",
            Self::Volatile => "VOLATILE",
            Self::Uncertain => "UNCERTAIN",
        };
        write!(f, "{s}")
    }
}

/// Trend classification for a single timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TrendDirection {
    Bullish,
    Bearish,
    #[default]
    Neutral,
}

/// Momentum state derived from the squeeze indicator: sign of the momentum
/// value combined with whether it grew or shrank since the previous bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MomentumColor {
    /// Positive and growing.
    Increasing,
    /// Positive but shrinking.
    Fading,
    /// Negative and shrinking further.
    Decreasing,
    /// Negative but recovering toward zero.
    #[default]
    Recovering,
}

/// Where the current price sits relative to the fast-timeframe VWAP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PriceLocation {
    Above,
    #[default]
    Below,
}

/// Derived indicator state for one symbol, overwritten wholesale on every
/// indicator update. Signals carry a copy of the snapshot that produced them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub price: Decimal,
    pub vwap_fast: Decimal,
    pub vwap_slow: Decimal,
    pub atr_fast: Decimal,
    pub atr_slow: Decimal,
    pub adx: f64,
    pub rvol: f64,
    pub momentum: Decimal,
    pub momentum_color: MomentumColor,
    pub squeezed: bool,
    pub trend_fast: TrendDirection,
    pub trend_slow: TrendDirection,
    pub price_vs_vwap: PriceLocation,
}

impl IndicatorSnapshot {
    /// True once the snapshot has been populated by at least one update.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.price > Decimal::ZERO && self.atr_fast > Decimal::ZERO
    }
}
