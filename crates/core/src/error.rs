use rust_decimal::Decimal;
use thiserror::Error;

/// Errors surfaced by the decision and risk engine.
///
/// Invalid inputs and admission rejections fail fast and never partially
/// mutate state. Optional-feature failures never appear here: they are
/// absorbed by the feature manager and degrade to neutral defaults.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: Decimal },

    #[error("leverage must be between 1 and 50, got {0}")]
    InvalidLeverage(u8),

    #[error("close fraction must be in (0, 1], got {0}")]
    InvalidFraction(f64),

    #[error("cannot open position for {symbol}: {reason}")]
    AdmissionRejected { symbol: String, reason: String },

    #[error("no open position for {0}")]
    NoPosition(String),

    #[error("position already open for {0}")]
    PositionExists(String),

    #[error("signal generation is disabled (panic close engaged)")]
    SignalsDisabled,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl EngineError {
    /// True when the error is the portfolio refusing a new position, which is
    /// an expected outcome rather than a fault.
    #[must_use]
    pub const fn is_admission_rejection(&self) -> bool {
        matches!(self, Self::AdmissionRejected { .. })
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
