//! A/B feature attribution.
//!
//! Runs the identical pipeline with all optional features disabled
//! (baseline), with all enabled, and with each feature individually removed
//! from the all-enabled configuration, attributing the marginal
//! ROI/win-rate/profit-factor contribution of every feature.

use crate::data::MultiTimeframeData;
use crate::engine::BacktestEngine;
use crate::metrics::PerformanceReport;
use anyhow::Result;
use atlas_core::config::FeatureToggles;
use atlas_core::TradingConfig;
use rust_decimal::Decimal;
use serde::Serialize;

const OPTIONAL_FEATURES: &[&str] = &[
    "adaptive_thresholds",
    "multi_timeframe",
    "volume_profile",
    "ml_scoring",
    "regime_detection",
    "advanced_exits",
    "portfolio",
];

/// Marginal contribution of one feature, measured as all-enabled minus
/// all-enabled-without-it.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureContribution {
    pub feature: String,
    pub roi_delta: f64,
    pub win_rate_delta: f64,
    pub profit_factor_delta: f64,
    pub trade_count_delta: i64,
}

#[derive(Debug, Serialize)]
pub struct FeatureAttribution {
    pub baseline: PerformanceReport,
    pub all_features: PerformanceReport,
    pub contributions: Vec<FeatureContribution>,
}

fn set_toggle(toggles: &mut FeatureToggles, feature: &str, enabled: bool) {
    match feature {
        "adaptive_thresholds" => toggles.enable_adaptive_thresholds = enabled,
        "multi_timeframe" => toggles.enable_multi_timeframe = enabled,
        "volume_profile" => toggles.enable_volume_profile = enabled,
        "ml_scoring" => toggles.enable_ml_scoring = enabled,
        "regime_detection" => toggles.enable_regime_detection = enabled,
        "advanced_exits" => toggles.enable_advanced_exits = enabled,
        "portfolio" => toggles.enable_portfolio = enabled,
        other => tracing::warn!(feature = other, "unknown feature toggle"),
    }
}

/// Runs the attribution suite. Every run rebuilds the pipeline from its own
/// configuration, so runs cannot contaminate each other.
///
/// # Errors
///
/// Propagates any failure from the underlying backtest runs.
pub fn run_feature_attribution(
    config: &TradingConfig,
    data: &MultiTimeframeData,
    initial_balance: Decimal,
) -> Result<FeatureAttribution> {
    let mut baseline_config = config.clone();
    baseline_config.features = FeatureToggles::default();
    tracing::info!("attribution: baseline run (all optional features off)");
    let baseline = BacktestEngine::new(baseline_config)
        .run(data, initial_balance)?
        .report;

    let mut all_on_config = config.clone();
    all_on_config.features = FeatureToggles::all_enabled();
    tracing::info!("attribution: all-features run");
    let all_features = BacktestEngine::new(all_on_config.clone())
        .run(data, initial_balance)?
        .report;

    let mut contributions = Vec::with_capacity(OPTIONAL_FEATURES.len());
    for feature in OPTIONAL_FEATURES {
        let mut leave_one_out = all_on_config.clone();
        set_toggle(&mut leave_one_out.features, feature, false);
        tracing::info!(feature, "attribution: leave-one-out run");
        let without = BacktestEngine::new(leave_one_out)
            .run(data, initial_balance)?
            .report;

        contributions.push(FeatureContribution {
            feature: (*feature).to_string(),
            roi_delta: all_features.roi - without.roi,
            win_rate_delta: all_features.win_rate - without.win_rate,
            profit_factor_delta: all_features.profit_factor - without.profit_factor,
            trade_count_delta: all_features.total_trades as i64 - without.total_trades as i64,
        });
    }

    Ok(FeatureAttribution {
        baseline,
        all_features,
        contributions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggles_cover_every_optional_feature() {
        let mut toggles = FeatureToggles::default();
        for feature in OPTIONAL_FEATURES {
            set_toggle(&mut toggles, feature, true);
        }
        assert_eq!(
            serde_json::to_value(&toggles).unwrap(),
            serde_json::to_value(FeatureToggles::all_enabled()).unwrap()
        );
    }
}
