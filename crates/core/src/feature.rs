use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

const DEFAULT_MAX_ERRORS: u32 = 3;
const DEFAULT_ERROR_WINDOW_SECS: i64 = 300;

/// Health tracking for one registered feature.
#[derive(Debug, Clone)]
pub struct FeatureStatus {
    pub name: String,
    pub enabled: bool,
    pub error_count: u32,
    pub last_error_time: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub total_calls: u64,
    pub successful_calls: u64,
    /// False for critical features: they log past the threshold but are
    /// never force-disabled.
    pub auto_disable: bool,
}

impl FeatureStatus {
    fn new(name: String, enabled: bool, auto_disable: bool) -> Self {
        Self {
            name,
            enabled,
            error_count: 0,
            last_error_time: None,
            last_error: None,
            total_calls: 0,
            successful_calls: 0,
            auto_disable,
        }
    }

    /// Fraction of calls that succeeded; 1.0 before any call.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> f64 {
        if self.total_calls == 0 {
            return 1.0;
        }
        self.successful_calls as f64 / self.total_calls as f64
    }
}

/// Fault isolation for optional analytics capabilities.
///
/// Every optional sub-analysis runs through [`FeatureManager::execute`]: on
/// failure the error is logged and counted within a sliding time window, the
/// caller-supplied default is returned, and the feature is auto-disabled once
/// the error threshold is reached (unless registered as critical). A disabled
/// or unregistered feature never invokes the wrapped closure, so one
/// misbehaving capability cannot destabilize the decision loop.
pub struct FeatureManager {
    max_errors: u32,
    error_window: Duration,
    features: HashMap<String, FeatureStatus>,
}

impl FeatureManager {
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_ERRORS, DEFAULT_ERROR_WINDOW_SECS)
    }

    #[must_use]
    pub fn with_limits(max_errors: u32, error_window_secs: i64) -> Self {
        Self {
            max_errors,
            error_window: Duration::seconds(error_window_secs),
            features: HashMap::new(),
        }
    }

    /// Registers a feature. `auto_disable = false` marks it critical: errors
    /// past the threshold are warned about but never force-disable it.
    pub fn register(&mut self, name: &str, enabled: bool, auto_disable: bool) {
        tracing::info!(feature = name, enabled, auto_disable, "feature registered");
        self.features.insert(
            name.to_string(),
            FeatureStatus::new(name.to_string(), enabled, auto_disable),
        );
    }

    #[must_use]
    pub fn is_enabled(&self, name: &str) -> bool {
        self.features.get(name).is_some_and(|f| f.enabled)
    }

    /// Runs `op` under fault isolation and returns its value, or `default`
    /// when the feature is disabled, unregistered, or the call fails.
    pub fn execute<T>(
        &mut self,
        name: &str,
        default: T,
        op: impl FnOnce() -> anyhow::Result<T>,
    ) -> T {
        self.execute_at(Utc::now(), name, default, op)
    }

    fn execute_at<T>(
        &mut self,
        now: DateTime<Utc>,
        name: &str,
        default: T,
        op: impl FnOnce() -> anyhow::Result<T>,
    ) -> T {
        let Some(feature) = self.features.get_mut(name) else {
            tracing::warn!(feature = name, "feature not registered");
            return default;
        };
        if !feature.enabled {
            tracing::debug!(feature = name, "feature disabled, skipping");
            return default;
        }

        feature.total_calls += 1;

        match op() {
            Ok(value) => {
                feature.successful_calls += 1;
                if Self::window_expired(feature, now, self.error_window) {
                    feature.error_count = 0;
                }
                value
            }
            Err(err) => {
                if Self::window_expired(feature, now, self.error_window) {
                    feature.error_count = 0;
                }
                feature.error_count += 1;
                feature.last_error_time = Some(now);
                feature.last_error = Some(err.to_string());
                tracing::error!(feature = name, error = %err, "feature call failed");

                if feature.error_count >= self.max_errors {
                    if feature.auto_disable {
                        feature.enabled = false;
                        tracing::error!(
                            feature = name,
                            errors = feature.error_count,
                            window_secs = self.error_window.num_seconds(),
                            total_calls = feature.total_calls,
                            successful_calls = feature.successful_calls,
                            success_rate = %format!("{:.1}%", feature.success_rate() * 100.0),
                            last_error = feature.last_error.as_deref().unwrap_or(""),
                            "feature disabled after repeated errors"
                        );
                    } else {
                        tracing::warn!(
                            feature = name,
                            errors = feature.error_count,
                            last_error = feature.last_error.as_deref().unwrap_or(""),
                            "critical feature past error threshold, keeping enabled"
                        );
                    }
                }
                default
            }
        }
    }

    fn window_expired(feature: &FeatureStatus, now: DateTime<Utc>, window: Duration) -> bool {
        feature
            .last_error_time
            .is_some_and(|last| now - last > window)
    }

    /// Operator override: disable a feature manually.
    pub fn disable(&mut self, name: &str) {
        if let Some(feature) = self.features.get_mut(name) {
            feature.enabled = false;
            tracing::info!(feature = name, "feature manually disabled");
        }
    }

    /// Operator override: re-enable a feature and clear its error count.
    pub fn enable(&mut self, name: &str) {
        if let Some(feature) = self.features.get_mut(name) {
            feature.enabled = true;
            feature.error_count = 0;
            tracing::info!(feature = name, "feature manually enabled");
        }
    }

    /// Clears error tracking for a feature without changing enablement.
    pub fn reset_errors(&mut self, name: &str) {
        if let Some(feature) = self.features.get_mut(name) {
            feature.error_count = 0;
            feature.last_error_time = None;
            feature.last_error = None;
        }
    }

    #[must_use]
    pub fn status(&self, name: &str) -> Option<&FeatureStatus> {
        self.features.get(name)
    }

    #[must_use]
    pub fn enabled_features(&self) -> Vec<&str> {
        self.features
            .values()
            .filter(|f| f.enabled)
            .map(|f| f.name.as_str())
            .collect()
    }

    #[must_use]
    pub fn disabled_features(&self) -> Vec<&str> {
        self.features
            .values()
            .filter(|f| !f.enabled)
            .map(|f| f.name.as_str())
            .collect()
    }
}

impl Default for FeatureManager {
    fn default() -> Self {
        Self::new()
    }
}
