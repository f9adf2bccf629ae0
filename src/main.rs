// =============================================================================
// StochBand Backtester — Main Entry Point
// =============================================================================
//
// Replays a saved kline file through the Stochastic-RSI / Bollinger strategy
// and reports the resulting orders.  Purely offline: no network, no clock.
//
// Inputs:
//   STOCHBAND_CONFIG     backtest config JSON (default `backtest_config.json`,
//                        written with defaults when missing)
//   argv[1] or STOCHBAND_KLINES   kline file (Binance REST array-of-arrays)
//   STOCHBAND_CHART_OUT  optional path for the chart export
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod backtest;
mod export;
mod indicators;
mod market_data;
mod order_log;
mod position_engine;
mod report;
mod runtime_config;
mod types;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::backtest::Backtester;
use crate::export::ChartExport;
use crate::indicators::engine::IndicatorEngine;
use crate::market_data::PriceSeries;
use crate::runtime_config::BacktestConfig;

const DEFAULT_CONFIG_PATH: &str = "backtest_config.json";

fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path =
        std::env::var("STOCHBAND_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
    let config = match BacktestConfig::load(&config_path)? {
        Some(config) => config,
        None => {
            warn!(path = %config_path, "Config file not found, using defaults");
            let config = BacktestConfig::default();
            if let Err(e) = config.save(&config_path) {
                warn!(path = %config_path, error = %e, "Failed to write default config");
            }
            config
        }
    };
    config.validate().context("invalid backtest configuration")?;

    info!(
        pair = %config.pair,
        interval = %config.asset_interval,
        rsi = config.rsi_period,
        stoch = config.stochastic_period,
        k_slow = config.k_slow_period,
        d_slow = config.d_slow_period,
        sma = config.sma_period,
        deviation = config.deviation_multiplier,
        gating = ?config.bollinger_gating,
        breach = ?config.band_breach,
        "backtest configuration"
    );

    // ── 2. Price series ──────────────────────────────────────────────────
    let klines_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("STOCHBAND_KLINES").ok())
        .context("no kline file given (pass a path or set STOCHBAND_KLINES)")?;

    let series = PriceSeries::load(&klines_path, config.drop_incomplete_candle)?;
    let warmup = IndicatorEngine::warmup_len(&config);
    if series.is_empty() {
        warn!(path = %klines_path, "kline file holds no prices");
    } else if series.len() < warmup {
        warn!(
            prices = series.len(),
            needed = warmup,
            "series shorter than the warm-up, no orders possible"
        );
    }

    // ── 3. Run ───────────────────────────────────────────────────────────
    let outcome = Backtester::run(&config, series.as_slice())?;

    if outcome.orders.is_empty() {
        info!("no orders emitted");
    }
    for order in &outcome.orders {
        info!(
            timestamp = %order.timestamp,
            side = %order.side,
            limit_price = order.limit_price,
            quantity = order.quantity,
            "order"
        );
    }

    // ── 4. Report & export ───────────────────────────────────────────────
    report::summarize(&outcome.orders, config.trading_fee_rate).log();

    if let Ok(chart_path) = std::env::var("STOCHBAND_CHART_OUT") {
        ChartExport::build(&config, &series, &outcome).save(&chart_path)?;
    }

    info!("StochBand backtest complete.");
    Ok(())
}
