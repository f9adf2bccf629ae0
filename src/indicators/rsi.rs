// =============================================================================
// Relative Strength Index (RSI) — streaming, Wilder's smoothing
// =============================================================================
//
// Fed one price change (delta) per step.
//
// Step 1 — Accumulate gain = max(delta, 0) and loss = max(-delta, 0).
// Step 2 — At delta index `period` (0-based) seed the averages with the
//          accumulated gain / loss divided by `period`.
// Step 3 — Every later step applies Wilder's recurrence to the single-step
//          gain / loss:
//            avg_gain = (prev_avg_gain * (period - 1) + gain) / period
//            avg_loss = (prev_avg_loss * (period - 1) + loss) / period
// Step 4 — RS  = avg_gain / (avg_loss + ε)
//          RSI = 100 - 100 / (1 + RS)
//
// The accumulator resets after every emission, so past the seed it only
// ever holds one delta.
// =============================================================================

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::indicators::smoothing::{simple_moving_average, wilders_moving_average};
use crate::types::TimedValue;

/// Guards RS against a zero average loss.
pub const RSI_EPSILON: f64 = 1e-8;

/// Convert average gain / average loss into an RSI value in [0, 100].
///
/// With no movement at all (both averages zero) this yields 0.
pub fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    let rs = avg_gain / (avg_loss + RSI_EPSILON);
    100.0 - 100.0 / (1.0 + rs)
}

/// Running RSI state. Never reset mid-run.
#[derive(Debug, Clone)]
pub struct RsiState {
    period: usize,
    avg_gain: f64,
    avg_loss: f64,
    pending_gain: f64,
    pending_loss: f64,
    deltas_seen: usize,
    history: Vec<TimedValue>,
}

impl RsiState {
    /// `period` must be non-zero; the engine validates this up front.
    pub fn new(period: usize) -> Self {
        Self {
            period,
            avg_gain: 0.0,
            avg_loss: 0.0,
            pending_gain: 0.0,
            pending_loss: 0.0,
            deltas_seen: 0,
            history: Vec::new(),
        }
    }

    /// Feed the change between two consecutive closes. Returns the new RSI
    /// once warm-up is complete.
    pub fn update(&mut self, change: f64, timestamp: DateTime<Utc>) -> Option<f64> {
        if change > 0.0 {
            self.pending_gain += change;
        } else if change < 0.0 {
            self.pending_loss += -change;
        }

        let index = self.deltas_seen;
        self.deltas_seen += 1;

        match index.cmp(&self.period) {
            Ordering::Less => return None,
            Ordering::Equal => {
                self.avg_gain = simple_moving_average([self.pending_gain], self.period);
                self.avg_loss = simple_moving_average([self.pending_loss], self.period);
                debug!(
                    period = self.period,
                    avg_gain = self.avg_gain,
                    avg_loss = self.avg_loss,
                    "rsi seeded"
                );
            }
            Ordering::Greater => {
                self.avg_gain = wilders_moving_average(self.period, self.pending_gain, self.avg_gain);
                self.avg_loss = wilders_moving_average(self.period, self.pending_loss, self.avg_loss);
            }
        }
        self.pending_gain = 0.0;
        self.pending_loss = 0.0;

        let rsi = rsi_from_averages(self.avg_gain, self.avg_loss);
        self.history.push(TimedValue::new(timestamp, rsi));
        Some(rsi)
    }

    #[cfg(test)]
    pub fn history(&self) -> &[TimedValue] {
        &self.history
    }

    pub fn into_history(self) -> Vec<TimedValue> {
        self.history
    }
}
