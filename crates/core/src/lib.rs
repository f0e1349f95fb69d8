pub mod candle;
pub mod config;
pub mod config_loader;
pub mod error;
pub mod feature;
pub mod numeric;
pub mod position;
pub mod retry;
pub mod signal;
pub mod snapshot;
pub mod traits;

pub use candle::{Candle, Timeframe};
pub use config::TradingConfig;
pub use config_loader::ConfigLoader;
pub use error::{EngineError, Result};
pub use feature::{FeatureManager, FeatureStatus};
pub use position::{ExitReason, PartialExit, Position, PositionSide, Trade};
pub use signal::{Signal, SignalDirection};
pub use snapshot::{IndicatorSnapshot, MomentumColor, PriceLocation, Regime, TrendDirection};
pub use traits::{ExchangeClient, MarginType, MarketDataSource, OrderAck, OrderSide};
