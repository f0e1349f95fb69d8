use crate::snapshot::IndicatorSnapshot;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of an entry signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalDirection {
    LongEntry,
    ShortEntry,
}

impl SignalDirection {
    /// Returns the opposite entry direction.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::LongEntry => Self::ShortEntry,
            Self::ShortEntry => Self::LongEntry,
        }
    }
}

/// An entry decision emitted by the signal engine.
///
/// Consumed exactly once by the risk manager to open a position, then
/// discarded. The embedded snapshot is a copy of the indicator state at the
/// moment the signal fired.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub direction: SignalDirection,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
    /// Confidence in [0.0, 1.0], from multi-timeframe alignment when
    /// available, optionally boosted by the confidence model.
    pub confidence: f64,
    pub snapshot: IndicatorSnapshot,
}

impl Signal {
    /// Creates a signal, clamping confidence into [0.0, 1.0].
    #[must_use]
    pub fn new(
        symbol: String,
        direction: SignalDirection,
        price: Decimal,
        timestamp: DateTime<Utc>,
        confidence: f64,
        snapshot: IndicatorSnapshot,
    ) -> Self {
        Self {
            symbol,
            direction,
            price,
            timestamp,
            confidence: confidence.clamp(0.0, 1.0),
            snapshot,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn confidence_is_clamped() {
        let signal = Signal::new(
            "BTCUSDT".to_string(),
            SignalDirection::LongEntry,
            dec!(50000),
            Utc::now(),
            1.4,
            IndicatorSnapshot::default(),
        );
        assert!((signal.confidence - 1.0).abs() < f64::EPSILON);
    }
}
