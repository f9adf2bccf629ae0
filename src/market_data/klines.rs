// =============================================================================
// Kline parsing — Binance REST `/api/v3/klines` payloads saved to disk
// =============================================================================
//
// The payload is an array of arrays:
//   [0] openTime, [1] open, [2] high, [3] low, [4] close, [5] volume,
//   [6] closeTime, [7] quoteAssetVolume, [8] numberOfTrades, ...
//
// Only the close price and the close time are kept.  Numeric fields may be
// JSON strings (Binance's choice) or plain numbers.
// =============================================================================

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use tracing::{debug, warn};

use crate::types::PricePoint;

const CLOSE_INDEX: usize = 4;
const CLOSE_TIME_INDEX: usize = 6;

/// Parse a kline array-of-arrays into price points, in file order.
///
/// Rows too short to carry a close time are skipped with a warning.
pub fn parse_klines(json: &str) -> Result<Vec<PricePoint>> {
    let body: serde_json::Value = serde_json::from_str(json).context("failed to parse klines JSON")?;

    let raw = body.as_array().context("klines payload is not an array")?;

    let mut points = Vec::with_capacity(raw.len());
    for (row, entry) in raw.iter().enumerate() {
        let arr = entry
            .as_array()
            .with_context(|| format!("kline entry {row} is not an array"))?;

        if arr.len() <= CLOSE_TIME_INDEX {
            warn!(row, len = arr.len(), "skipping malformed kline entry");
            continue;
        }

        let close = parse_str_f64(&arr[CLOSE_INDEX])
            .with_context(|| format!("kline entry {row}: bad close"))?;
        let close_time = arr[CLOSE_TIME_INDEX]
            .as_i64()
            .with_context(|| format!("kline entry {row}: close time is not an integer"))?;

        points.push(PricePoint::new(millis_to_utc(close_time)?, close));
    }

    debug!(count = points.len(), "klines parsed");
    Ok(points)
}

/// Parse a JSON value that may be either a string or a number into `f64`.
fn parse_str_f64(val: &serde_json::Value) -> Result<f64> {
    if let Some(s) = val.as_str() {
        s.parse::<f64>()
            .with_context(|| format!("failed to parse '{s}' as f64"))
    } else if let Some(n) = val.as_f64() {
        Ok(n)
    } else {
        anyhow::bail!("expected string or number, got: {val}")
    }
}

fn millis_to_utc(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .with_context(|| format!("timestamp {ms} ms is out of range"))
}
