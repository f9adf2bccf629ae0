// =============================================================================
// Bollinger Bands
// =============================================================================
//
// Middle band (SMA) flanked by an upper band (SMA + k*σ) and a lower band
// (SMA - k*σ), where σ is the population standard deviation of the same
// `period` closes.
//
// `BollingerState` keeps only the last `period` closes.  Whether a reading is
// taken on a given step is decided by the engine, so pushing a close and
// computing the bands are separate calls.
// =============================================================================

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::indicators::smoothing::{population_std_dev, window_mean};
use crate::types::BandPoint;

/// Result of a Bollinger Band calculation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerResult {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// Calculate Bollinger Bands over the last `period` values of `closes`.
///
/// Returns `None` when `period == 0` or fewer than `period` closes exist.
pub fn calculate_bollinger(closes: &[f64], period: usize, num_std: f64) -> Option<BollingerResult> {
    if period == 0 || closes.len() < period {
        return None;
    }

    let window = &closes[closes.len() - period..];
    let middle = window_mean(window);
    let std_dev = population_std_dev(window, middle);

    Some(BollingerResult {
        upper: middle + num_std * std_dev,
        middle,
        lower: middle - num_std * std_dev,
    })
}

#[derive(Debug, Clone)]
pub struct BollingerState {
    sma_period: usize,
    deviation_multiplier: f64,
    window: VecDeque<f64>,
    history: Vec<BandPoint>,
}

impl BollingerState {
    pub fn new(sma_period: usize, deviation_multiplier: f64) -> Self {
        Self {
            sma_period,
            deviation_multiplier,
            window: VecDeque::with_capacity(sma_period + 1),
            history: Vec::new(),
        }
    }

    /// Add a close to the rolling window.
    pub fn push_close(&mut self, close: f64) {
        self.window.push_back(close);
        while self.window.len() > self.sma_period {
            self.window.pop_front();
        }
    }

    /// Compute and record the bands for the current window.
    ///
    /// Returns `None` (and records nothing) until the window is full.
    pub fn compute(&mut self, timestamp: DateTime<Utc>) -> Option<BandPoint> {
        let bands = calculate_bollinger(
            self.window.make_contiguous(),
            self.sma_period,
            self.deviation_multiplier,
        )?;

        let point = BandPoint {
            timestamp,
            sma: bands.middle,
            upper: bands.upper,
            lower: bands.lower,
        };
        self.history.push(point);
        Some(point)
    }

    #[cfg(test)]
    pub fn history(&self) -> &[BandPoint] {
        &self.history
    }

    pub fn into_history(self) -> Vec<BandPoint> {
        self.history
    }
}
