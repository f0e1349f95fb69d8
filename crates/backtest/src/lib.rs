pub mod ab;
pub mod data;
pub mod engine;
pub mod fills;
pub mod metrics;
pub mod sync;

pub use ab::{run_feature_attribution, FeatureAttribution, FeatureContribution};
pub use data::{load_candles_csv, MultiTimeframeData};
pub use engine::{BacktestEngine, BacktestOutcome};
pub use fills::{apply_fees_and_slippage, stop_exit_fill};
pub use metrics::PerformanceReport;
pub use sync::align_at_or_before;
