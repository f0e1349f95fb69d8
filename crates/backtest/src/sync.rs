//! Timeframe synchronization.
//!
//! Slower timeframes are aligned to the fast one by nearest-at-or-before
//! timestamp lookup. The index is built once per run with a single forward
//! merge, not recomputed per evaluation step.

use atlas_core::Candle;

/// For each fast-timeframe candle, the index of the latest `other` candle at
/// or before its timestamp (`None` before the first one exists).
#[must_use]
pub fn align_at_or_before(fast: &[Candle], other: &[Candle]) -> Vec<Option<usize>> {
    let mut mapping = Vec::with_capacity(fast.len());
    let mut cursor = 0usize;

    for candle in fast {
        while cursor < other.len() && other[cursor].timestamp <= candle.timestamp {
            cursor += 1;
        }
        mapping.push(cursor.checked_sub(1));
    }
    mapping
}

/// Precomputed alignment of every non-fast series to the fast series.
pub struct SyncIndex {
    pub slow: Vec<Option<usize>>,
    pub aux_fast: Option<Vec<Option<usize>>>,
    pub aux_slow: Option<Vec<Option<usize>>>,
}

impl SyncIndex {
    #[must_use]
    pub fn build(
        fast: &[Candle],
        slow: &[Candle],
        aux_fast: Option<&[Candle]>,
        aux_slow: Option<&[Candle]>,
    ) -> Self {
        Self {
            slow: align_at_or_before(fast, slow),
            aux_fast: aux_fast.map(|series| align_at_or_before(fast, series)),
            aux_slow: aux_slow.map(|series| align_at_or_before(fast, series)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn series(count: usize, step_minutes: i64, offset_minutes: i64) -> Vec<Candle> {
        (0..count)
            .map(|i| Candle {
                timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
                    + Duration::minutes(offset_minutes + i as i64 * step_minutes),
                open: dec!(100),
                high: dec!(101),
                low: dec!(99),
                close: dec!(100),
                volume: dec!(1),
            })
            .collect()
    }

    #[test]
    fn maps_each_fast_candle_to_latest_slow_at_or_before() {
        let fast = series(8, 15, 0);
        let slow = series(2, 60, 0);

        let mapping = align_at_or_before(&fast, &slow);
        // 00:00..00:45 -> slow[0]; 01:00..01:45 -> slow[1].
        assert_eq!(mapping[0], Some(0));
        assert_eq!(mapping[3], Some(0));
        assert_eq!(mapping[4], Some(1));
        assert_eq!(mapping[7], Some(1));
    }

    #[test]
    fn fast_candles_before_first_slow_have_no_mapping() {
        let fast = series(4, 15, 0);
        let slow = series(2, 60, 30);

        let mapping = align_at_or_before(&fast, &slow);
        assert_eq!(mapping[0], None);
        assert_eq!(mapping[1], None);
        assert_eq!(mapping[2], Some(0));
    }

    #[test]
    fn exact_timestamp_matches_are_included() {
        let fast = series(1, 15, 60);
        let slow = series(2, 60, 0);
        let mapping = align_at_or_before(&fast, &slow);
        assert_eq!(mapping[0], Some(1));
    }
}
