// =============================================================================
// Backtester — ordered fold of a price series through the engine and machine
// =============================================================================
//
// Pipeline per price:
//   1. IndicatorEngine::update         -> Snapshot (NotReady / Ready)
//   2. SignalStateMachine::evaluate    -> optional Order (Ready only)
//   3. OrderLog::record                   (append the order, if any)
//
// Strictly sequential and deterministic: no clock, no randomness, no shared
// state.  Two runs over the same series and config produce identical output.
// =============================================================================

use tracing::{debug, info};

use crate::indicators::engine::{IndicatorEngine, IndicatorHistories, Snapshot};
use crate::order_log::OrderLog;
use crate::position_engine::{Position, SignalStateMachine};
use crate::runtime_config::{BacktestConfig, ConfigError};
use crate::types::{Order, PricePoint, Side};

/// Everything a finished run hands to the reporting and rendering layers.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestOutcome {
    pub histories: IndicatorHistories,
    pub orders: OrderLog,
    pub final_position: Position,
    pub steps: usize,
    pub ready_steps: usize,
}

pub struct Backtester {
    engine: IndicatorEngine,
    machine: SignalStateMachine,
    orders: OrderLog,
    steps: usize,
    ready_steps: usize,
}

impl Backtester {
    pub fn new(config: &BacktestConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            engine: IndicatorEngine::new(config)?,
            machine: SignalStateMachine::new(config)?,
            orders: OrderLog::new(),
            steps: 0,
            ready_steps: 0,
        })
    }

    /// Process one price. Returns the order emitted on this step, if any.
    pub fn step(&mut self, point: &PricePoint) -> Option<&Order> {
        self.steps += 1;

        let snapshot = self.engine.update(point);
        if let Snapshot::NotReady(stage) = snapshot {
            debug!(timestamp = %point.timestamp, stage = %stage, "signal skipped");
            return None;
        }
        self.ready_steps += 1;

        let order = self.machine.evaluate(&snapshot, point.close)?;
        self.orders.record(order);
        self.orders.last()
    }

    pub fn finish(self) -> BacktestOutcome {
        BacktestOutcome {
            final_position: self.machine.position(),
            histories: self.engine.into_histories(),
            orders: self.orders,
            steps: self.steps,
            ready_steps: self.ready_steps,
        }
    }

    /// Run a whole series. Fails only on an invalid configuration.
    pub fn run(config: &BacktestConfig, series: &[PricePoint]) -> Result<BacktestOutcome, ConfigError> {
        let mut backtester = Self::new(config)?;

        info!(
            pair = %config.pair,
            interval = %config.asset_interval,
            prices = series.len(),
            warmup = IndicatorEngine::warmup_len(config),
            "backtest started"
        );

        for point in series {
            backtester.step(point);
        }

        let outcome = backtester.finish();
        info!(
            steps = outcome.steps,
            ready_steps = outcome.ready_steps,
            orders = outcome.orders.len(),
            buys = outcome.orders.count(Side::Buy),
            sells = outcome.orders.count(Side::Sell),
            final_position = %outcome.final_position,
            "backtest finished"
        );
        Ok(outcome)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::bollinger::calculate_bollinger;
    use chrono::{DateTime, TimeZone, Utc};

    fn ts(i: usize) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + i as i64 * 300, 0).unwrap()
    }

    fn series(closes: &[f64]) -> Vec<PricePoint> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| PricePoint::new(ts(i), c))
            .collect()
    }

    fn small_config() -> BacktestConfig {
        BacktestConfig {
            rsi_period: 3,
            stochastic_period: 3,
            k_slow_period: 2,
            d_slow_period: 2,
            sma_period: 5,
            deviation_multiplier: 1.0,
            stochastic_lower_threshold: 20.0,
            stochastic_upper_threshold: 80.0,
            ..BacktestConfig::default()
        }
    }

    /// Slow grind up, a sell-off through the lower band, then a rally
    /// through the upper band and a steady climb.
    const DIP_AND_RALLY: [f64; 40] = [
        100.0, 101.0, 100.5, 101.5, 101.0, 102.0, 101.5, 102.5, 102.0, 103.0, 102.5, 103.5,
        103.0, 104.0, 103.5, 102.0, 99.0, 95.0, 90.0, 84.0, 83.0, 84.0, 85.0, 86.0, 90.0,
        95.0, 101.0, 108.0, 116.0, 117.0, 118.0, 119.0, 120.0, 121.0, 122.0, 123.0, 124.0,
        125.0, 126.0, 127.0,
    ];

    #[test]
    fn dip_and_rally_buys_once_then_sells_once() {
        let outcome = Backtester::run(&small_config(), &series(&DIP_AND_RALLY)).unwrap();
        let orders = outcome.orders.as_slice();
        assert_eq!(orders.len(), 2);

        // Buy where %K-slow, %D-slow and the lower-band breach first coincide.
        let buy = orders[0];
        assert_eq!(buy.side, Side::Buy);
        assert_eq!(buy.timestamp, ts(16));
        let bands = calculate_bollinger(&DIP_AND_RALLY[..=16], 5, 1.0).unwrap();
        assert!((buy.limit_price - bands.lower).abs() < 1e-9);
        assert!(DIP_AND_RALLY[16] < buy.limit_price);

        // Sell on the first upper-band breach once both lines are >= 80.
        let sell = orders[1];
        assert_eq!(sell.side, Side::Sell);
        assert_eq!(sell.timestamp, ts(23));
        let bands = calculate_bollinger(&DIP_AND_RALLY[..=23], 5, 1.0).unwrap();
        assert!((sell.limit_price - bands.upper).abs() < 1e-9);

        assert_eq!(outcome.final_position, Position::Flat);
        assert_eq!(outcome.steps, 40);
        assert_eq!(outcome.ready_steps, 40 - 8);
    }

    #[test]
    fn dip_and_rally_order_matches_indicator_history() {
        let outcome = Backtester::run(&small_config(), &series(&DIP_AND_RALLY)).unwrap();
        let buy = outcome.orders.as_slice()[0];
        let k_slow = outcome
            .histories
            .k_slow
            .iter()
            .find(|p| p.timestamp == buy.timestamp)
            .unwrap();
        let d_slow = outcome
            .histories
            .d_slow
            .iter()
            .find(|p| p.timestamp == buy.timestamp)
            .unwrap();
        assert!(k_slow.value <= 20.0);
        assert!(d_slow.value <= 20.0);

        // One step earlier the price was already under the band but %D-slow
        // had not come down yet.
        let prev_d = outcome
            .histories
            .d_slow
            .iter()
            .find(|p| p.timestamp == ts(15))
            .unwrap();
        assert!(prev_d.value > 20.0);
    }

    #[test]
    fn constant_price_never_trades() {
        let outcome = Backtester::run(&small_config(), &series(&[42.0; 60])).unwrap();
        assert!(outcome.orders.is_empty());
        assert_eq!(outcome.final_position, Position::Flat);
        for band in &outcome.histories.bands {
            assert_eq!(band.sma, 42.0);
            assert_eq!(band.upper, band.lower);
        }
    }

    #[test]
    fn constant_inexact_price_never_trades() {
        for deviation_multiplier in [2.0, 0.5, 0.0] {
            let cfg = BacktestConfig {
                deviation_multiplier,
                ..BacktestConfig::default()
            };
            let outcome = Backtester::run(&cfg, &series(&[1.1; 60])).unwrap();
            assert!(outcome.orders.is_empty(), "orders at deviation {deviation_multiplier}");
            assert_eq!(outcome.final_position, Position::Flat);
            assert_eq!(outcome.histories.bands.len(), 60 - 28 + 1);
            for band in &outcome.histories.bands {
                assert_eq!(band.sma, 1.1);
                assert_eq!(band.upper, 1.1);
                assert_eq!(band.lower, 1.1);
            }
        }
    }

    #[test]
    fn short_series_completes_without_orders() {
        let outcome = Backtester::run(&BacktestConfig::default(), &series(&DIP_AND_RALLY[..20])).unwrap();
        assert!(outcome.orders.is_empty());
        assert_eq!(outcome.ready_steps, 0);
        assert!(outcome.histories.bands.is_empty());
    }

    #[test]
    fn empty_series() {
        let outcome = Backtester::run(&BacktestConfig::default(), &[]).unwrap();
        assert_eq!(outcome.steps, 0);
        assert!(outcome.orders.is_empty());
        assert_eq!(outcome.histories, IndicatorHistories::default());
    }

    #[test]
    fn invalid_config_aborts_before_running() {
        let cfg = BacktestConfig {
            stochastic_lower_threshold: 90.0,
            ..small_config()
        };
        assert!(matches!(
            Backtester::run(&cfg, &series(&DIP_AND_RALLY)),
            Err(ConfigError::ThresholdOrder { .. })
        ));
    }

    #[test]
    fn runs_are_deterministic() {
        let closes: Vec<f64> = (0..400)
            .map(|i| 100.0 + (i as f64 * 0.19).sin() * 6.0 + (i as f64 * 0.023).cos() * 9.0)
            .collect();
        let points = series(&closes);
        let a = Backtester::run(&small_config(), &points).unwrap();
        let b = Backtester::run(&small_config(), &points).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn orders_alternate_on_long_oscillation() {
        let closes: Vec<f64> = (0..600)
            .map(|i| 100.0 + (i as f64 * 0.15).sin() * 10.0 + (i as f64 * 0.9).sin() * 1.5)
            .collect();
        let outcome = Backtester::run(&small_config(), &series(&closes)).unwrap();
        let sides: Vec<Side> = outcome.orders.iter().map(|o| o.side).collect();
        if let Some(first) = sides.first() {
            assert_eq!(*first, Side::Buy);
        }
        assert!(sides.windows(2).all(|w| w[0] != w[1]));
        for (p, q) in outcome.orders.iter().zip(outcome.orders.iter().skip(1)) {
            assert!(p.timestamp < q.timestamp);
        }
    }

    #[test]
    fn step_by_step_matches_run() {
        let points = series(&DIP_AND_RALLY);
        let mut bt = Backtester::new(&small_config()).unwrap();
        let mut emitted = Vec::new();
        for p in &points {
            if let Some(order) = bt.step(p) {
                emitted.push(*order);
            }
        }
        let stepped = bt.finish();
        assert_eq!(stepped.orders.as_slice(), emitted.as_slice());
        assert_eq!(stepped.final_position, Position::Flat);
        assert_eq!(stepped.histories.d_slow.len(), 40 - 8);

        let outcome = Backtester::run(&small_config(), &points).unwrap();
        assert_eq!(stepped, outcome);
    }
}
