// =============================================================================
// Stochastic RSI — %K-fast, %K-slow, %D-slow
// =============================================================================
//
// Position of the latest RSI inside its recent range, smoothed twice:
//
//   %K_fast = |rsi - min(window)| / (max(window) - min(window)) * 100
//   %K_slow = SMA(%K_fast, k_slow_period)
//   %D_slow = SMA(%K_slow, d_slow_period)
//
// The window is the last `stochastic_period` RSI values including the current
// one.  Each stage only emits once the previous stage has produced enough
// values, so the three histories are a strict pipeline.
// =============================================================================

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::indicators::engine::WarmupStage;
use crate::indicators::smoothing::simple_moving_average;
use crate::types::TimedValue;

/// %K-fast of an RSI window whose last element is the current RSI.
///
/// A degenerate window (max == min) yields 0 instead of NaN.
/// Returns `None` for an empty window.
pub fn k_fast(window: &[f64]) -> Option<f64> {
    let close = *window.last()?;
    let (low, high) = window
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));

    if high == low {
        return Some(0.0);
    }
    Some(((close - low) / (high - low)).abs() * 100.0)
}

/// The three Stochastic-RSI values emitted on one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StochRsiReading {
    pub k_fast: f64,
    pub k_slow: f64,
    pub d_slow: f64,
}

#[derive(Debug, Clone)]
pub struct StochRsiState {
    stoch_period: usize,
    k_slow_period: usize,
    d_slow_period: usize,
    rsi_window: VecDeque<f64>,
    k_fast_history: Vec<TimedValue>,
    k_slow_history: Vec<TimedValue>,
    d_slow_history: Vec<TimedValue>,
}

impl StochRsiState {
    pub fn new(stoch_period: usize, k_slow_period: usize, d_slow_period: usize) -> Self {
        Self {
            stoch_period,
            k_slow_period,
            d_slow_period,
            rsi_window: VecDeque::with_capacity(stoch_period + 1),
            k_fast_history: Vec::new(),
            k_slow_history: Vec::new(),
            d_slow_history: Vec::new(),
        }
    }

    /// Feed the RSI emitted on this step.
    ///
    /// On `Err` the returned stage is the first one still warming up; every
    /// stage before it has already recorded its value for this step.
    pub fn update(
        &mut self,
        rsi: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<StochRsiReading, WarmupStage> {
        self.rsi_window.push_back(rsi);
        while self.rsi_window.len() > self.stoch_period {
            self.rsi_window.pop_front();
        }
        if self.rsi_window.len() < self.stoch_period {
            return Err(WarmupStage::StochRsi);
        }

        let k_fast = k_fast(self.rsi_window.make_contiguous()).ok_or(WarmupStage::StochRsi)?;
        self.k_fast_history.push(TimedValue::new(timestamp, k_fast));

        let k_slow =
            trailing_average(&self.k_fast_history, self.k_slow_period).ok_or(WarmupStage::KSlow)?;
        self.k_slow_history.push(TimedValue::new(timestamp, k_slow));

        let d_slow =
            trailing_average(&self.k_slow_history, self.d_slow_period).ok_or(WarmupStage::DSlow)?;
        self.d_slow_history.push(TimedValue::new(timestamp, d_slow));

        Ok(StochRsiReading {
            k_fast,
            k_slow,
            d_slow,
        })
    }

    #[cfg(test)]
    pub fn k_fast_history(&self) -> &[TimedValue] {
        &self.k_fast_history
    }

    #[cfg(test)]
    pub fn k_slow_history(&self) -> &[TimedValue] {
        &self.k_slow_history
    }

    #[cfg(test)]
    pub fn d_slow_history(&self) -> &[TimedValue] {
        &self.d_slow_history
    }

    /// Consume the state, yielding (%K-fast, %K-slow, %D-slow) histories.
    pub fn into_histories(self) -> (Vec<TimedValue>, Vec<TimedValue>, Vec<TimedValue>) {
        (self.k_fast_history, self.k_slow_history, self.d_slow_history)
    }
}

/// SMA of the last `period` values of `history`, if there are that many.
fn trailing_average(history: &[TimedValue], period: usize) -> Option<f64> {
    let start = history.len().checked_sub(period)?;
    Some(simple_moving_average(
        history[start..].iter().map(|p| p.value),
        period,
    ))
}
