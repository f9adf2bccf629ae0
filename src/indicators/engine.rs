// =============================================================================
// Indicator Engine — staged warm-up over RSI, Stochastic RSI and Bollinger
// =============================================================================
//
// Updated once per price.  Readiness flows through a chain of gates:
//
//   price delta -> RSI -> %K-fast -> %K-slow -> %D-slow -> Bollinger
//
// Each gate short-circuits with the `WarmupStage` still warming up, so a
// step yields either `Snapshot::NotReady(stage)` or a complete
// `Snapshot::Ready`.  Stages that did emit on a NotReady step keep their value
// in history.
//
// With `BollingerGating::Independent` the bands are computed ahead of the
// chain on every step the window is full; with `CoupledToStochastic` they are
// only computed once %D-slow has emitted.
// =============================================================================

use serde::Serialize;
use tracing::{debug, info};

use crate::indicators::bollinger::BollingerState;
use crate::indicators::rsi::RsiState;
use crate::indicators::stoch_rsi::StochRsiState;
use crate::runtime_config::{BacktestConfig, BollingerGating, ConfigError};
use crate::types::{BandPoint, PricePoint, TimedValue};

/// The first gate a step failed to pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WarmupStage {
    Rsi,
    StochRsi,
    KSlow,
    DSlow,
    Bollinger,
}

impl std::fmt::Display for WarmupStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rsi => write!(f, "RSI"),
            Self::StochRsi => write!(f, "%K-fast"),
            Self::KSlow => write!(f, "%K-slow"),
            Self::DSlow => write!(f, "%D-slow"),
            Self::Bollinger => write!(f, "Bollinger"),
        }
    }
}

/// Every indicator value for one step on which all gates passed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IndicatorSnapshot {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub rsi: f64,
    pub k_fast: f64,
    pub k_slow: f64,
    pub d_slow: f64,
    pub sma: f64,
    pub upper: f64,
    pub lower: f64,
}

/// Per-step output of the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Snapshot {
    NotReady(WarmupStage),
    Ready(IndicatorSnapshot),
}

impl Snapshot {
    pub fn ready(&self) -> Option<&IndicatorSnapshot> {
        match self {
            Self::Ready(snapshot) => Some(snapshot),
            Self::NotReady(_) => None,
        }
    }
}

/// All indicator histories, keyed by timestamp, for downstream consumers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndicatorHistories {
    pub rsi: Vec<TimedValue>,
    pub k_fast: Vec<TimedValue>,
    pub k_slow: Vec<TimedValue>,
    pub d_slow: Vec<TimedValue>,
    pub bands: Vec<BandPoint>,
}

#[derive(Debug, Clone)]
pub struct IndicatorEngine {
    rsi: RsiState,
    stoch: StochRsiState,
    bollinger: BollingerState,
    gating: BollingerGating,
    last_close: Option<f64>,
    ready_seen: bool,
}

impl IndicatorEngine {
    /// Build an engine from a validated configuration.
    pub fn new(config: &BacktestConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            rsi: RsiState::new(config.rsi_period),
            stoch: StochRsiState::new(
                config.stochastic_period,
                config.k_slow_period,
                config.d_slow_period,
            ),
            bollinger: BollingerState::new(config.sma_period, config.deviation_multiplier),
            gating: config.bollinger_gating,
            last_close: None,
            ready_seen: false,
        })
    }

    /// Number of prices needed before the first `Ready` snapshot.
    pub fn warmup_len(config: &BacktestConfig) -> usize {
        let chain = config.rsi_period
            + 2
            + (config.stochastic_period - 1)
            + (config.k_slow_period - 1)
            + (config.d_slow_period - 1);
        chain.max(config.sma_period)
    }

    /// Advance every indicator by one price.
    pub fn update(&mut self, point: &PricePoint) -> Snapshot {
        match self.advance(point) {
            Ok(snapshot) => {
                if !self.ready_seen {
                    self.ready_seen = true;
                    info!(timestamp = %snapshot.timestamp, "all indicators warmed up");
                }
                Snapshot::Ready(snapshot)
            }
            Err(stage) => {
                debug!(timestamp = %point.timestamp, stage = %stage, "indicator warming up");
                Snapshot::NotReady(stage)
            }
        }
    }

    fn advance(&mut self, point: &PricePoint) -> Result<IndicatorSnapshot, WarmupStage> {
        self.bollinger.push_close(point.close);
        let early_bands = match self.gating {
            BollingerGating::Independent => self.bollinger.compute(point.timestamp),
            BollingerGating::CoupledToStochastic => None,
        };

        let previous = self.last_close.replace(point.close).ok_or(WarmupStage::Rsi)?;
        let rsi = self
            .rsi
            .update(point.close - previous, point.timestamp)
            .ok_or(WarmupStage::Rsi)?;
        let stoch = self.stoch.update(rsi, point.timestamp)?;

        let bands = match self.gating {
            BollingerGating::Independent => early_bands,
            BollingerGating::CoupledToStochastic => self.bollinger.compute(point.timestamp),
        }
        .ok_or(WarmupStage::Bollinger)?;

        Ok(IndicatorSnapshot {
            timestamp: point.timestamp,
            rsi,
            k_fast: stoch.k_fast,
            k_slow: stoch.k_slow,
            d_slow: stoch.d_slow,
            sma: bands.sma,
            upper: bands.upper,
            lower: bands.lower,
        })
    }

    #[cfg(test)]
    pub fn rsi_history(&self) -> &[TimedValue] {
        self.rsi.history()
    }

    #[cfg(test)]
    pub fn k_fast_history(&self) -> &[TimedValue] {
        self.stoch.k_fast_history()
    }

    #[cfg(test)]
    pub fn k_slow_history(&self) -> &[TimedValue] {
        self.stoch.k_slow_history()
    }

    #[cfg(test)]
    pub fn d_slow_history(&self) -> &[TimedValue] {
        self.stoch.d_slow_history()
    }

    #[cfg(test)]
    pub fn band_history(&self) -> &[BandPoint] {
        self.bollinger.history()
    }

    pub fn into_histories(self) -> IndicatorHistories {
        let (k_fast, k_slow, d_slow) = self.stoch.into_histories();
        IndicatorHistories {
            rsi: self.rsi.into_history(),
            k_fast,
            k_slow,
            d_slow,
            bands: self.bollinger.into_history(),
        }
    }
}
