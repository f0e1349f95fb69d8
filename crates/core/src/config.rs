use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};

/// Full configuration surface recognized by the engine. All values are plain
/// scalars or lists; every section falls back to its defaults when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    pub symbol: String,
    pub risk: RiskConfig,
    pub indicators: IndicatorConfig,
    pub features: FeatureToggles,
    pub adaptive: AdaptiveConfig,
    pub timeframes: TimeframeConfig,
    pub volume_profile: VolumeProfileConfig,
    pub regime: RegimeConfig,
    pub ml: MlConfig,
    pub exits: ExitConfig,
    pub portfolio: PortfolioConfig,
    pub execution: ExecutionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Fraction of balance risked per trade.
    pub risk_per_trade: f64,
    pub leverage: u8,
    pub stop_loss_atr_multiplier: f64,
    pub trailing_stop_atr_multiplier: f64,
    /// Exchange minimum order size in base currency.
    pub min_order_size: f64,
    /// Take-profit threshold as a fraction of entry price.
    pub take_profit_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub atr_period: usize,
    pub adx_period: usize,
    pub adx_threshold: f64,
    pub rvol_period: usize,
    pub rvol_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureToggles {
    pub enable_adaptive_thresholds: bool,
    pub enable_multi_timeframe: bool,
    pub enable_volume_profile: bool,
    pub enable_ml_scoring: bool,
    pub enable_regime_detection: bool,
    pub enable_advanced_exits: bool,
    pub enable_portfolio: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveConfig {
    pub update_interval_secs: i64,
    pub lookback_days: usize,
    pub min_adx: f64,
    pub max_adx: f64,
    pub min_rvol: f64,
    pub max_rvol: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeframeConfig {
    /// Minimum aligned timeframes before a confirmed signal may fire.
    pub min_alignment: usize,
    pub weight_5m: f64,
    pub weight_15m: f64,
    pub weight_1h: f64,
    pub weight_4h: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeProfileConfig {
    pub lookback_days: i64,
    pub update_interval_secs: i64,
    /// Bin width as a fraction of price.
    pub bin_size: f64,
    /// Fraction of total volume inside the value area.
    pub value_area_pct: f64,
    /// Proximity to POC/VAH/VAL treated as "near a key level".
    pub key_level_threshold: f64,
    /// Size multiplier applied in low-volume zones.
    pub low_volume_size_factor: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeConfig {
    pub update_interval_secs: i64,
    pub stability_minutes: i64,
    pub trending_adx_threshold: f64,
    pub ranging_adx_threshold: f64,
    pub volatile_atr_percentile: f64,
    pub ranging_atr_percentile: f64,
    pub volatile_threshold_increase: f64,
    pub volatile_size_factor: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MlConfig {
    pub high_confidence_threshold: f64,
    pub low_confidence_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExitConfig {
    pub partial_1_atr_multiplier: f64,
    pub partial_1_fraction: f64,
    pub partial_2_atr_multiplier: f64,
    pub partial_2_fraction: f64,
    pub final_atr_multiplier: f64,
    pub breakeven_atr_multiplier: f64,
    pub tight_stop_atr_multiplier: f64,
    pub max_hold_hours: i64,
    pub regime_exit_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortfolioConfig {
    pub symbols: Vec<String>,
    pub max_symbols: usize,
    pub correlation_threshold: f64,
    /// Cap on the combined allocation of a correlated pair, as a fraction
    /// of balance.
    pub correlation_max_exposure: f64,
    pub max_single_allocation: f64,
    pub rebalance_interval_secs: i64,
    /// Number of most-recent daily returns used for correlation.
    pub correlation_lookback: usize,
    /// Cap on total balance-at-stop risk across all open positions.
    pub max_total_risk: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub trading_fee: f64,
    pub slippage: f64,
    pub retry_attempts: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".to_string(),
            risk: RiskConfig::default(),
            indicators: IndicatorConfig::default(),
            features: FeatureToggles::default(),
            adaptive: AdaptiveConfig::default(),
            timeframes: TimeframeConfig::default(),
            volume_profile: VolumeProfileConfig::default(),
            regime: RegimeConfig::default(),
            ml: MlConfig::default(),
            exits: ExitConfig::default(),
            portfolio: PortfolioConfig::default(),
            execution: ExecutionConfig::default(),
        }
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            risk_per_trade: 0.01,
            leverage: 10,
            stop_loss_atr_multiplier: 2.0,
            trailing_stop_atr_multiplier: 1.5,
            min_order_size: 0.001,
            take_profit_pct: 0.05,
        }
    }
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            atr_period: 14,
            adx_period: 14,
            adx_threshold: 20.0,
            rvol_period: 20,
            rvol_threshold: 1.2,
        }
    }
}

impl Default for FeatureToggles {
    fn default() -> Self {
        Self {
            enable_adaptive_thresholds: false,
            enable_multi_timeframe: false,
            enable_volume_profile: false,
            enable_ml_scoring: false,
            enable_regime_detection: false,
            enable_advanced_exits: false,
            enable_portfolio: false,
        }
    }
}

impl FeatureToggles {
    /// All optional analytics on (portfolio admission included).
    #[must_use]
    pub const fn all_enabled() -> Self {
        Self {
            enable_adaptive_thresholds: true,
            enable_multi_timeframe: true,
            enable_volume_profile: true,
            enable_ml_scoring: true,
            enable_regime_detection: true,
            enable_advanced_exits: true,
            enable_portfolio: true,
        }
    }
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            update_interval_secs: 3600,
            lookback_days: 30,
            min_adx: 15.0,
            max_adx: 35.0,
            min_rvol: 0.8,
            max_rvol: 2.0,
        }
    }
}

impl Default for TimeframeConfig {
    fn default() -> Self {
        Self {
            min_alignment: 3,
            weight_5m: 0.1,
            weight_15m: 0.2,
            weight_1h: 0.3,
            weight_4h: 0.4,
        }
    }
}

impl Default for VolumeProfileConfig {
    fn default() -> Self {
        Self {
            lookback_days: 7,
            update_interval_secs: 14_400,
            bin_size: 0.001,
            value_area_pct: 0.70,
            key_level_threshold: 0.005,
            low_volume_size_factor: 0.5,
        }
    }
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            update_interval_secs: 900,
            stability_minutes: 15,
            trending_adx_threshold: 30.0,
            ranging_adx_threshold: 20.0,
            volatile_atr_percentile: 80.0,
            ranging_atr_percentile: 40.0,
            volatile_threshold_increase: 0.3,
            volatile_size_factor: 0.5,
        }
    }
}

impl Default for MlConfig {
    fn default() -> Self {
        Self {
            high_confidence_threshold: 0.7,
            low_confidence_threshold: 0.3,
        }
    }
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            partial_1_atr_multiplier: 1.5,
            partial_1_fraction: 0.33,
            partial_2_atr_multiplier: 3.0,
            partial_2_fraction: 0.33,
            final_atr_multiplier: 5.0,
            breakeven_atr_multiplier: 2.0,
            tight_stop_atr_multiplier: 0.5,
            max_hold_hours: 24,
            regime_exit_enabled: true,
        }
    }
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            symbols: vec!["BTCUSDT".to_string()],
            max_symbols: 5,
            correlation_threshold: 0.7,
            correlation_max_exposure: 0.5,
            max_single_allocation: 0.4,
            rebalance_interval_secs: 21_600,
            correlation_lookback: 30,
            max_total_risk: 0.05,
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            trading_fee: 0.0005,
            slippage: 0.0002,
            retry_attempts: 3,
            retry_base_delay_ms: 500,
        }
    }
}

impl TradingConfig {
    /// Rejects configurations the engine cannot run safely.
    ///
    /// # Errors
    /// Returns `EngineError::InvalidConfig` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        fn fraction(name: &str, value: f64) -> Result<()> {
            if value <= 0.0 || value > 1.0 {
                return Err(EngineError::InvalidConfig(format!(
                    "{name} must be in (0, 1], got {value}"
                )));
            }
            Ok(())
        }

        if self.risk.leverage == 0 || self.risk.leverage > 50 {
            return Err(EngineError::InvalidConfig(format!(
                "leverage must be between 1 and 50, got {}",
                self.risk.leverage
            )));
        }
        fraction("risk_per_trade", self.risk.risk_per_trade)?;
        if self.risk.stop_loss_atr_multiplier <= 0.0 {
            return Err(EngineError::InvalidConfig(
                "stop_loss_atr_multiplier must be positive".to_string(),
            ));
        }
        if self.risk.trailing_stop_atr_multiplier <= 0.0 {
            return Err(EngineError::InvalidConfig(
                "trailing_stop_atr_multiplier must be positive".to_string(),
            ));
        }
        for (name, period) in [
            ("atr_period", self.indicators.atr_period),
            ("adx_period", self.indicators.adx_period),
            ("rvol_period", self.indicators.rvol_period),
        ] {
            if period == 0 {
                return Err(EngineError::InvalidConfig(format!(
                    "{name} must be greater than zero"
                )));
            }
        }
        fraction("portfolio.max_total_risk", self.portfolio.max_total_risk)?;
        fraction(
            "portfolio.max_single_allocation",
            self.portfolio.max_single_allocation,
        )?;
        fraction(
            "portfolio.correlation_max_exposure",
            self.portfolio.correlation_max_exposure,
        )?;
        if self.portfolio.max_symbols == 0 {
            return Err(EngineError::InvalidConfig(
                "portfolio.max_symbols must be greater than zero".to_string(),
            ));
        }
        fraction("exits.partial_1_fraction", self.exits.partial_1_fraction)?;
        fraction("exits.partial_2_fraction", self.exits.partial_2_fraction)?;
        if self.execution.trading_fee < 0.0 || self.execution.slippage < 0.0 {
            return Err(EngineError::InvalidConfig(
                "trading_fee and slippage must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        TradingConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_zero_leverage() {
        let mut config = TradingConfig::default();
        config.risk.leverage = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_risk() {
        let mut config = TradingConfig::default();
        config.risk.risk_per_trade = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_sections_fall_back_to_defaults() {
        let config: TradingConfig =
            serde_json::from_str(r#"{"symbol": "ETHUSDT", "risk": {"leverage": 5}}"#).unwrap();
        assert_eq!(config.symbol, "ETHUSDT");
        assert_eq!(config.risk.leverage, 5);
        assert!((config.risk.risk_per_trade - 0.01).abs() < f64::EPSILON);
        assert_eq!(config.indicators.atr_period, 14);
    }
}
