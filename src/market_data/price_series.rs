// =============================================================================
// PriceSeries — validated, time-ordered closing prices
// =============================================================================
//
// The only gate between external data and the core.  Once built, the series
// is non-decreasing in time and every close is finite and positive, so the
// backtest loop has nothing left to reject.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::market_data::klines::parse_klines;
use crate::types::PricePoint;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceSeries {
    points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new(points: Vec<PricePoint>) -> Result<Self> {
        if let Some((i, p)) = points
            .iter()
            .enumerate()
            .find(|(_, p)| !p.close.is_finite() || p.close <= 0.0)
        {
            anyhow::bail!("price {i} at {} has invalid close {}", p.timestamp, p.close);
        }

        if let Some(i) = points
            .windows(2)
            .position(|w| w[1].timestamp < w[0].timestamp)
        {
            anyhow::bail!(
                "price series is not time-ordered: {} follows {}",
                points[i + 1].timestamp,
                points[i].timestamp
            );
        }

        Ok(Self { points })
    }

    /// Build a series from a kline payload.
    ///
    /// With `drop_incomplete` the last kline is discarded, since the most
    /// recent candle of a freshly fetched payload is usually still forming.
    pub fn from_klines_json(json: &str, drop_incomplete: bool) -> Result<Self> {
        let mut points = parse_klines(json)?;
        if drop_incomplete && points.pop().is_none() {
            warn!("kline payload is empty, nothing to drop");
        }
        Self::new(points)
    }

    /// Read a kline payload from `path`.
    pub fn load(path: impl AsRef<Path>, drop_incomplete: bool) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read klines from {}", path.display()))?;

        let series = Self::from_klines_json(&content, drop_incomplete)
            .with_context(|| format!("invalid klines in {}", path.display()))?;

        info!(
            path = %path.display(),
            prices = series.len(),
            first = ?series.points.first().map(|p| p.timestamp),
            last = ?series.points.last().map(|p| p.timestamp),
            "price series loaded"
        );
        Ok(series)
    }

    pub fn as_slice(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The last `n` points (all of them if fewer).
    pub fn tail(&self, n: usize) -> &[PricePoint] {
        &self.points[self.points.len().saturating_sub(n)..]
    }
}
