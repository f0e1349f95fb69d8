//! Volume-at-price histogram over a trailing window.
//!
//! Identifies the point of control (highest-volume bin) and the value area
//! containing 70% of traded volume. Price near these levels is treated as a
//! high-probability zone; low-volume zones reduce position size.

use atlas_core::config::VolumeProfileConfig;
use atlas_core::Candle;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Computed histogram with its key levels.
#[derive(Debug, Clone)]
pub struct VolumeProfile {
    /// (bin center price, volume) pairs, ascending by price.
    pub bins: Vec<(Decimal, Decimal)>,
    pub poc: Decimal,
    pub vah: Decimal,
    pub val: Decimal,
    pub total_volume: Decimal,
}

pub struct VolumeProfileAnalyzer {
    config: VolumeProfileConfig,
    current: Option<VolumeProfile>,
    last_update: Option<DateTime<Utc>>,
}

impl VolumeProfileAnalyzer {
    #[must_use]
    pub const fn new(config: VolumeProfileConfig) -> Self {
        Self {
            config,
            current: None,
            last_update: None,
        }
    }

    #[must_use]
    pub const fn current(&self) -> Option<&VolumeProfile> {
        self.current.as_ref()
    }

    fn due(&self, now: DateTime<Utc>) -> bool {
        self.last_update.map_or(true, |last| {
            now - last >= Duration::seconds(self.config.update_interval_secs)
        })
    }

    /// Recomputes the profile from the lookback window when the update
    /// interval has elapsed; otherwise keeps the previous profile.
    pub fn update(&mut self, candles: &[Candle], now: DateTime<Utc>) {
        if !self.due(now) {
            return;
        }
        let cutoff = now - Duration::days(self.config.lookback_days);
        let window: Vec<&Candle> = candles.iter().filter(|c| c.timestamp >= cutoff).collect();
        if let Some(profile) = self.compute(&window) {
            tracing::debug!(
                bins = profile.bins.len(),
                poc = %profile.poc,
                vah = %profile.vah,
                val = %profile.val,
                "volume profile recomputed"
            );
            self.current = Some(profile);
            self.last_update = Some(now);
        }
    }

    fn compute(&self, candles: &[&Candle]) -> Option<VolumeProfile> {
        if candles.is_empty() {
            return None;
        }

        let min_price = candles.iter().map(|c| c.low).min()?;
        let max_price = candles.iter().map(|c| c.high).max()?;
        if min_price <= Decimal::ZERO || max_price <= min_price {
            return None;
        }

        let bin_size = atlas_core::numeric::dec(self.config.bin_size);
        if bin_size.is_zero() {
            return None;
        }
        let range = max_price - min_price;
        let ideal_width = min_price * bin_size;
        let num_bins = (range / ideal_width)
            .trunc()
            .to_usize()
            .unwrap_or(1)
            .clamp(1, 10_000);
        let bin_width = range / Decimal::from(num_bins);

        let mut bins: Vec<(Decimal, Decimal)> = (0..num_bins)
            .map(|i| {
                let low = min_price + bin_width * Decimal::from(i);
                (low + bin_width / Decimal::from(2), Decimal::ZERO)
            })
            .collect();

        // Distribute each candle's volume across the bins its range overlaps,
        // proportional to the overlap.
        for candle in candles {
            let candle_range = candle.high - candle.low;
            for (center, volume) in &mut bins {
                let bin_low = *center - bin_width / Decimal::from(2);
                let bin_high = *center + bin_width / Decimal::from(2);
                if candle.high < bin_low || candle.low > bin_high {
                    continue;
                }
                let share = if candle_range.is_zero() {
                    Decimal::ONE
                } else {
                    let overlap = candle.high.min(bin_high) - candle.low.max(bin_low);
                    overlap / candle_range
                };
                *volume += candle.volume * share;
            }
        }

        let total_volume: Decimal = bins.iter().map(|(_, v)| *v).sum();
        if total_volume.is_zero() {
            return None;
        }

        let poc_idx = bins
            .iter()
            .enumerate()
            .max_by_key(|(_, (_, v))| *v)
            .map(|(i, _)| i)?;
        let poc = bins[poc_idx].0;

        let (val, vah) = Self::value_area(
            &bins,
            poc_idx,
            total_volume * atlas_core::numeric::dec(self.config.value_area_pct),
        );

        Some(VolumeProfile {
            bins,
            poc,
            vah,
            val,
            total_volume,
        })
    }

    /// Expands outward from the POC, taking the higher-volume neighbor each
    /// step, until the accumulated volume reaches the target.
    fn value_area(
        bins: &[(Decimal, Decimal)],
        poc_idx: usize,
        target: Decimal,
    ) -> (Decimal, Decimal) {
        let mut low = poc_idx;
        let mut high = poc_idx;
        let mut accumulated = bins[poc_idx].1;

        while accumulated < target && (low > 0 || high < bins.len() - 1) {
            let below = low.checked_sub(1).map(|i| bins[i].1);
            let above = (high + 1 < bins.len()).then(|| bins[high + 1].1);
            match (below, above) {
                (Some(b), Some(a)) if b >= a => {
                    low -= 1;
                    accumulated += b;
                }
                (_, Some(a)) => {
                    high += 1;
                    accumulated += a;
                }
                (Some(b), None) => {
                    low -= 1;
                    accumulated += b;
                }
                (None, None) => break,
            }
        }
        (bins[low].0, bins[high].0)
    }

    /// True when `price` is within the key-level proximity of POC, VAH, or
    /// VAL.
    #[must_use]
    pub fn is_near_key_level(&self, price: Decimal) -> bool {
        let Some(profile) = &self.current else {
            return false;
        };
        if price <= Decimal::ZERO {
            return false;
        }
        let threshold = atlas_core::numeric::dec(self.config.key_level_threshold);
        [profile.poc, profile.vah, profile.val]
            .iter()
            .any(|level| ((price - level) / price).abs() <= threshold)
    }

    /// Entry size multiplier at `price`: full size near key levels, reduced
    /// in below-median-volume zones, full size otherwise.
    #[must_use]
    pub fn size_factor(&self, price: Decimal) -> f64 {
        let Some(profile) = &self.current else {
            return 1.0;
        };
        if self.is_near_key_level(price) {
            return 1.0;
        }

        let Some((_, volume_at_price)) = profile
            .bins
            .iter()
            .min_by_key(|(center, _)| (*center - price).abs())
        else {
            return 1.0;
        };

        let mut volumes: Vec<Decimal> = profile.bins.iter().map(|(_, v)| *v).collect();
        volumes.sort();
        let median = volumes[volumes.len() / 2];
        if *volume_at_price < median {
            self.config.low_volume_size_factor
        } else {
            1.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn candle(hour: i64, low: Decimal, high: Decimal, volume: Decimal) -> Candle {
        Candle {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap() + Duration::hours(hour),
            open: (low + high) / dec!(2),
            high,
            low,
            close: (low + high) / dec!(2),
            volume,
        }
    }

    fn analyzer_with_profile() -> (VolumeProfileAnalyzer, DateTime<Utc>) {
        let mut analyzer = VolumeProfileAnalyzer::new(VolumeProfileConfig::default());
        let now = Utc.with_ymd_and_hms(2024, 1, 12, 0, 0, 0).unwrap();
        // Heavy trading near 100, light wings near 90 and 110.
        let mut candles = vec![
            candle(0, dec!(89), dec!(91), dec!(10)),
            candle(1, dec!(109), dec!(111), dec!(10)),
        ];
        for hour in 2..20 {
            candles.push(candle(hour, dec!(99), dec!(101), dec!(500)));
        }
        analyzer.update(&candles, now);
        (analyzer, now)
    }

    #[test]
    fn poc_lands_in_heavy_volume_zone() {
        let (analyzer, _) = analyzer_with_profile();
        let profile = analyzer.current().unwrap();
        assert!(profile.poc > dec!(98) && profile.poc < dec!(102));
        assert!(profile.val <= profile.poc);
        assert!(profile.vah >= profile.poc);
    }

    #[test]
    fn price_near_poc_is_key_level() {
        let (analyzer, _) = analyzer_with_profile();
        let profile_poc = analyzer.current().unwrap().poc;
        assert!(analyzer.is_near_key_level(profile_poc));
    }

    #[test]
    fn low_volume_zone_reduces_size() {
        let (analyzer, _) = analyzer_with_profile();
        let factor = analyzer.size_factor(dec!(93));
        assert!((factor - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn update_is_interval_gated() {
        let (mut analyzer, now) = analyzer_with_profile();
        let poc_before = analyzer.current().unwrap().poc;

        // A wildly different window inside the interval must not replace the
        // profile.
        let candles: Vec<Candle> = (0..20)
            .map(|i| candle(i, dec!(499), dec!(501), dec!(100)))
            .collect();
        analyzer.update(&candles, now + Duration::minutes(5));
        assert_eq!(analyzer.current().unwrap().poc, poc_before);
    }

    #[test]
    fn no_profile_means_neutral_factor() {
        let analyzer = VolumeProfileAnalyzer::new(VolumeProfileConfig::default());
        assert!((analyzer.size_factor(dec!(100)) - 1.0).abs() < f64::EPSILON);
        assert!(!analyzer.is_near_key_level(dec!(100)));
    }
}
