// =============================================================================
// Chart Export — JSON document for the rendering side
// =============================================================================
//
// Holds the trailing `chart_window` closes together with every indicator
// value and order whose timestamp falls inside that window.  Rendering
// itself happens elsewhere; this module only shapes and writes the data.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::backtest::BacktestOutcome;
use crate::market_data::PriceSeries;
use crate::runtime_config::BacktestConfig;
use crate::types::{BandPoint, Order, PricePoint, TimedValue};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Thresholds {
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartExport {
    pub pair: String,
    pub interval: String,
    pub closes: Vec<PricePoint>,
    pub rsi: Vec<TimedValue>,
    pub k_slow: Vec<TimedValue>,
    pub d_slow: Vec<TimedValue>,
    pub bands: Vec<BandPoint>,
    pub thresholds: Thresholds,
    pub orders: Vec<Order>,
}

impl ChartExport {
    /// Shape the export for the trailing `chart_window` closes.
    ///
    /// The window is closed on the left: an indicator value or order stamped
    /// with the first in-window close is included.
    pub fn build(config: &BacktestConfig, series: &PriceSeries, outcome: &BacktestOutcome) -> Self {
        let closes = series.tail(config.chart_window);
        let start = closes.first().map(|p| p.timestamp);
        let in_window = |t: DateTime<Utc>| start.map_or(false, |s| t >= s);

        let values = |history: &[TimedValue]| -> Vec<TimedValue> {
            history.iter().filter(|p| in_window(p.timestamp)).copied().collect()
        };

        let h = &outcome.histories;
        Self {
            pair: config.pair.clone(),
            interval: config.asset_interval.clone(),
            closes: closes.to_vec(),
            rsi: values(&h.rsi[..]),
            k_slow: values(&h.k_slow[..]),
            d_slow: values(&h.d_slow[..]),
            bands: h
                .bands
                .iter()
                .filter(|b| in_window(b.timestamp))
                .copied()
                .collect(),
            thresholds: Thresholds {
                lower: config.stochastic_lower_threshold,
                upper: config.stochastic_upper_threshold,
            },
            orders: outcome
                .orders
                .iter()
                .filter(|o| in_window(o.timestamp))
                .copied()
                .collect(),
        }
    }

    /// Write the export to `path` atomically (write `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self).context("failed to serialise chart export")?;

        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp chart export to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp chart export to {}", path.display()))?;

        info!(
            path = %path.display(),
            closes = self.closes.len(),
            orders = self.orders.len(),
            "chart export written"
        );
        Ok(())
    }
}
