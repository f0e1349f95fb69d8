pub mod exits;
pub mod manager;
pub mod portfolio;
pub mod sizer;

pub use exits::{AdvancedExitManager, PartialExitSignal};
pub use manager::{RiskManager, FEATURE_ADVANCED_EXITS, FEATURE_PORTFOLIO};
pub use portfolio::{Admission, PortfolioManager, PortfolioMetrics};
pub use sizer::{size, trailing_stop, Sizing};
