pub mod adaptive;
pub mod engine;
pub mod indicators;
pub mod ml;
pub mod regime;
pub mod timeframes;
pub mod volume_profile;

pub use adaptive::{AdaptiveThresholds, Thresholds};
pub use engine::{SignalEngine, TimeframeWindows};
pub use ml::{BlendScorer, ConfidenceModel, NEUTRAL_SCORE};
pub use atlas_core::Regime;
pub use regime::{RegimeDetector, RegimeParams, StrategyKind};
pub use timeframes::{TimeframeAnalysis, TimeframeCoordinator, TimeframeSnapshot, VolumeTrend};
pub use volume_profile::{VolumeProfile, VolumeProfileAnalyzer};
