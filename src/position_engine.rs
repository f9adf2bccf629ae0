// =============================================================================
// Position Engine — two-state signal machine (Flat <-> Long)
// =============================================================================
//
// Life-cycle:
//   Flat  ->  Long   on a buy signal   (emits a BUY at the lower band)
//   Long  ->  Flat   on a sell signal  (emits a SELL at the upper band)
//
// Buy signal:  %K-slow <= lower AND %D-slow <= lower AND price breaches lower band
// Sell signal: %K-slow >= upper AND %D-slow >= upper AND price breaches upper band
//
// At most one order per step.  A buy is only possible while Flat and a sell
// only while Long, so emitted sides strictly alternate starting with BUY.
// Orders are treated as filled immediately and in full at the limit price.
// =============================================================================

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::indicators::engine::Snapshot;
use crate::runtime_config::{BacktestConfig, BandBreach, ConfigError};
use crate::types::{Order, Side};

/// Current exposure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Position {
    #[default]
    Flat,
    Long,
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Flat => write!(f, "Flat"),
            Self::Long => write!(f, "Long"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SignalStateMachine {
    position: Position,
    lower_threshold: f64,
    upper_threshold: f64,
    band_breach: BandBreach,
    quantity: f64,
}

impl SignalStateMachine {
    pub fn new(config: &BacktestConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            position: Position::Flat,
            lower_threshold: config.stochastic_lower_threshold,
            upper_threshold: config.stochastic_upper_threshold,
            band_breach: config.band_breach,
            quantity: config.trade_quantity,
        })
    }

    pub fn position(&self) -> Position {
        self.position
    }

    /// Evaluate one step. `next_price` is the close that completed the
    /// snapshot. Returns the order emitted by a transition, if any.
    pub fn evaluate(&mut self, snapshot: &Snapshot, next_price: f64) -> Option<Order> {
        let snap = snapshot.ready()?;

        let (side, limit_price, next_position) = match self.position {
            Position::Flat
                if snap.k_slow <= self.lower_threshold
                    && snap.d_slow <= self.lower_threshold
                    && self.band_breach.below(next_price, snap.lower) =>
            {
                (Side::Buy, snap.lower, Position::Long)
            }
            Position::Long
                if snap.k_slow >= self.upper_threshold
                    && snap.d_slow >= self.upper_threshold
                    && self.band_breach.above(next_price, snap.upper) =>
            {
                (Side::Sell, snap.upper, Position::Flat)
            }
            _ => return None,
        };

        let order = Order {
            timestamp: snap.timestamp,
            limit_price,
            side,
            quantity: self.quantity,
        };

        info!(
            timestamp = %order.timestamp,
            side = %order.side,
            limit_price,
            price = next_price,
            quantity = order.quantity,
            k_slow = snap.k_slow,
            d_slow = snap.d_slow,
            rsi = snap.rsi,
            sma = snap.sma,
            from = %self.position,
            to = %next_position,
            "order emitted"
        );

        self.position = next_position;
        Some(order)
    }
}
