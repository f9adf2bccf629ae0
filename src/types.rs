// =============================================================================
// Shared types used across the backtester
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single closing price from the historical series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub close: f64,
}

impl PricePoint {
    pub fn new(timestamp: DateTime<Utc>, close: f64) -> Self {
        Self { timestamp, close }
    }
}

/// One emitted indicator value, stamped with the price that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimedValue {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl TimedValue {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// One Bollinger Band reading (middle band plus both envelopes).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandPoint {
    pub timestamp: DateTime<Utc>,
    pub sma: f64,
    pub upper: f64,
    pub lower: f64,
}

/// Order direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// A limit order, assumed filled in full at `limit_price` the moment it is
/// emitted. Never mutated after creation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub timestamp: DateTime<Utc>,
    pub limit_price: f64,
    pub side: Side,
    pub quantity: f64,
}
