use anyhow::{Context, Result};
use atlas_core::Candle;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;

/// Candle series for every timeframe a backtest run consumes. The auxiliary
/// series are optional; without them multi-timeframe confirmation degrades.
#[derive(Debug, Clone, Default)]
pub struct MultiTimeframeData {
    /// Entry timeframe (15m), drives the evaluation steps.
    pub fast: Vec<Candle>,
    /// Trend filter timeframe (1h).
    pub slow: Vec<Candle>,
    /// Optional 5m series for multi-timeframe confirmation.
    pub aux_fast: Option<Vec<Candle>>,
    /// Optional 4h series for multi-timeframe confirmation.
    pub aux_slow: Option<Vec<Candle>>,
}

/// Loads candles from a CSV file with rows of
/// `timestamp,symbol,open,high,low,close,volume`, sorted oldest first.
///
/// # Errors
///
/// Returns an error when the file cannot be opened or a row fails to parse.
pub fn load_candles_csv(path: &str) -> Result<Vec<Candle>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open candle file {path}"))?;
    let mut candles = Vec::new();

    for (row, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("bad record at row {row} in {path}"))?;
        let timestamp: DateTime<Utc> = record[0]
            .parse()
            .with_context(|| format!("bad timestamp at row {row}"))?;
        let candle = Candle {
            timestamp,
            open: Decimal::from_str(&record[2])?,
            high: Decimal::from_str(&record[3])?,
            low: Decimal::from_str(&record[4])?,
            close: Decimal::from_str(&record[5])?,
            volume: Decimal::from_str(&record[6])?,
        };
        candles.push(candle);
    }

    candles.sort_by_key(|c| c.timestamp);
    Ok(candles)
}
