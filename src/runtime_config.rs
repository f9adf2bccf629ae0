// =============================================================================
// Runtime Configuration — backtest parameters with atomic save
// =============================================================================
//
// Every tunable of the indicator engine and the signal state machine lives
// here.  All fields carry a serde default so that a partial JSON file (or no
// file at all) still yields a complete configuration.
//
// Loading never validates; `validate()` is called by every core constructor so
// that an invalid configuration aborts before any state is built.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

// =============================================================================
// Errors
// =============================================================================

/// Reasons a configuration is rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{name} must be a positive integer")]
    ZeroPeriod { name: &'static str },

    #[error("deviation_multiplier must be non-negative, got {0}")]
    NegativeDeviation(f64),

    #[error("stochastic_lower_threshold ({lower}) must be below stochastic_upper_threshold ({upper})")]
    ThresholdOrder { lower: f64, upper: f64 },

    #[error("trade_quantity must be positive, got {0}")]
    NonPositiveQuantity(f64),

    #[error("trading_fee_rate must be non-negative, got {0}")]
    NegativeFeeRate(f64),

    #[error("{name} must be a finite number")]
    NonFinite { name: &'static str },
}

// =============================================================================
// Policy switches
// =============================================================================

/// When Bollinger Bands are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BollingerGating {
    /// Only on steps where %D-slow was also emitted.
    #[default]
    CoupledToStochastic,
    /// On every step once `sma_period` prices are available.
    Independent,
}

/// How a price must sit relative to a band to count as a breach.
///
/// `Strict` keeps a flat series (where both bands equal the price) from
/// trading.  `Inclusive` reproduces the classic `<=` / `>=` entry and exit
/// rule, under which a touch of the band is enough.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BandBreach {
    /// `price < lower` / `price > upper`.
    #[default]
    Strict,
    /// `price <= lower` / `price >= upper`.
    Inclusive,
}

impl BandBreach {
    pub fn below(self, price: f64, band: f64) -> bool {
        match self {
            Self::Strict => price < band,
            Self::Inclusive => price <= band,
        }
    }

    pub fn above(self, price: f64, band: f64) -> bool {
        match self {
            Self::Strict => price > band,
            Self::Inclusive => price >= band,
        }
    }
}

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_pair() -> String {
    "BTCUSD".to_string()
}

fn default_asset_interval() -> String {
    "5m".to_string()
}

fn default_rsi_period() -> usize {
    14
}

fn default_stochastic_period() -> usize {
    9
}

fn default_k_slow_period() -> usize {
    3
}

fn default_d_slow_period() -> usize {
    3
}

fn default_sma_period() -> usize {
    21
}

fn default_deviation_multiplier() -> f64 {
    2.0
}

fn default_stochastic_lower_threshold() -> f64 {
    20.0
}

fn default_stochastic_upper_threshold() -> f64 {
    80.0
}

fn default_trade_quantity() -> f64 {
    0.002
}

fn default_trading_fee_rate() -> f64 {
    0.001
}

fn default_chart_window() -> usize {
    500
}

fn default_true() -> bool {
    true
}

// =============================================================================
// BacktestConfig
// =============================================================================

/// Complete configuration for one backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    // --- Market labels -------------------------------------------------------

    /// Trading pair the price series belongs to (used for labelling only).
    #[serde(default = "default_pair")]
    pub pair: String,

    /// Candle interval of the price series (used for labelling only).
    #[serde(default = "default_asset_interval")]
    pub asset_interval: String,

    // --- Stochastic RSI ------------------------------------------------------

    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,

    /// Number of RSI values in the %K-fast extremum window.
    #[serde(default = "default_stochastic_period")]
    pub stochastic_period: usize,

    #[serde(default = "default_k_slow_period")]
    pub k_slow_period: usize,

    #[serde(default = "default_d_slow_period")]
    pub d_slow_period: usize,

    // --- Bollinger Bands -----------------------------------------------------

    #[serde(default = "default_sma_period")]
    pub sma_period: usize,

    /// Number of standard deviations between the SMA and each band.
    #[serde(default = "default_deviation_multiplier")]
    pub deviation_multiplier: f64,

    #[serde(default)]
    pub bollinger_gating: BollingerGating,

    // --- Signal --------------------------------------------------------------

    /// %K-slow and %D-slow must both be at or below this to buy.
    #[serde(default = "default_stochastic_lower_threshold")]
    pub stochastic_lower_threshold: f64,

    /// %K-slow and %D-slow must both be at or above this to sell.
    #[serde(default = "default_stochastic_upper_threshold")]
    pub stochastic_upper_threshold: f64,

    #[serde(default)]
    pub band_breach: BandBreach,

    /// Fixed base-asset quantity of every order.
    #[serde(default = "default_trade_quantity")]
    pub trade_quantity: f64,

    // --- Reporting -----------------------------------------------------------

    /// Fee charged per fill as a fraction of notional (0.001 = 0.1 %).
    /// Read by the trade report only.
    #[serde(default = "default_trading_fee_rate")]
    pub trading_fee_rate: f64,

    /// Number of trailing samples written to the chart export.
    #[serde(default = "default_chart_window")]
    pub chart_window: usize,

    /// Discard the last kline of the input file (it is usually still forming).
    #[serde(default = "default_true")]
    pub drop_incomplete_candle: bool,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            pair: default_pair(),
            asset_interval: default_asset_interval(),
            rsi_period: default_rsi_period(),
            stochastic_period: default_stochastic_period(),
            k_slow_period: default_k_slow_period(),
            d_slow_period: default_d_slow_period(),
            sma_period: default_sma_period(),
            deviation_multiplier: default_deviation_multiplier(),
            bollinger_gating: BollingerGating::default(),
            stochastic_lower_threshold: default_stochastic_lower_threshold(),
            stochastic_upper_threshold: default_stochastic_upper_threshold(),
            band_breach: BandBreach::default(),
            trade_quantity: default_trade_quantity(),
            trading_fee_rate: default_trading_fee_rate(),
            chart_window: default_chart_window(),
            drop_incomplete_candle: true,
        }
    }
}

impl BacktestConfig {
    /// Check every invariant the core relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let periods = [
            ("rsi_period", self.rsi_period),
            ("stochastic_period", self.stochastic_period),
            ("k_slow_period", self.k_slow_period),
            ("d_slow_period", self.d_slow_period),
            ("sma_period", self.sma_period),
        ];
        if let Some(&(name, _)) = periods.iter().find(|(_, p)| *p == 0) {
            return Err(ConfigError::ZeroPeriod { name });
        }

        let reals = [
            ("deviation_multiplier", self.deviation_multiplier),
            ("stochastic_lower_threshold", self.stochastic_lower_threshold),
            ("stochastic_upper_threshold", self.stochastic_upper_threshold),
            ("trade_quantity", self.trade_quantity),
            ("trading_fee_rate", self.trading_fee_rate),
        ];
        if let Some(&(name, _)) = reals.iter().find(|(_, v)| !v.is_finite()) {
            return Err(ConfigError::NonFinite { name });
        }

        if self.deviation_multiplier < 0.0 {
            return Err(ConfigError::NegativeDeviation(self.deviation_multiplier));
        }
        if self.stochastic_lower_threshold >= self.stochastic_upper_threshold {
            return Err(ConfigError::ThresholdOrder {
                lower: self.stochastic_lower_threshold,
                upper: self.stochastic_upper_threshold,
            });
        }
        if self.trade_quantity <= 0.0 {
            return Err(ConfigError::NonPositiveQuantity(self.trade_quantity));
        }
        if self.trading_fee_rate < 0.0 {
            return Err(ConfigError::NegativeFeeRate(self.trading_fee_rate));
        }
        Ok(())
    }

    /// Load configuration from a JSON file at `path`.
    ///
    /// Returns `Ok(None)` when the file does not exist so the caller can fall
    /// back to defaults.  Any other read error, and any parse error, is
    /// returned as an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("failed to read backtest config from {}", path.display())
                })
            }
        };

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse backtest config from {}", path.display()))?;

        info!(
            path = %path.display(),
            pair = %config.pair,
            interval = %config.asset_interval,
            "backtest config loaded"
        );

        Ok(Some(config))
    }

    /// Persist the configuration to `path` using an atomic write (write to
    /// `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise backtest config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "backtest config saved (atomic)");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_reference_values() {
        let cfg = BacktestConfig::default();
        assert_eq!(cfg.rsi_period, 14);
        assert_eq!(cfg.stochastic_period, 9);
        assert_eq!(cfg.k_slow_period, 3);
        assert_eq!(cfg.d_slow_period, 3);
        assert_eq!(cfg.sma_period, 21);
        assert!((cfg.deviation_multiplier - 2.0).abs() < f64::EPSILON);
        assert!((cfg.stochastic_lower_threshold - 20.0).abs() < f64::EPSILON);
        assert!((cfg.stochastic_upper_threshold - 80.0).abs() < f64::EPSILON);
        assert!((cfg.trade_quantity - 0.002).abs() < f64::EPSILON);
        assert_eq!(cfg.bollinger_gating, BollingerGating::CoupledToStochastic);
        assert_eq!(cfg.band_breach, BandBreach::Strict);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: BacktestConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, BacktestConfig::default());
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "rsi_period": 7, "bollinger_gating": "Independent", "band_breach": "Inclusive" }"#;
        let cfg: BacktestConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.rsi_period, 7);
        assert_eq!(cfg.bollinger_gating, BollingerGating::Independent);
        assert_eq!(cfg.band_breach, BandBreach::Inclusive);
        assert_eq!(cfg.sma_period, 21);
    }

    #[test]
    fn negative_period_fails_to_parse() {
        assert!(serde_json::from_str::<BacktestConfig>(r#"{ "sma_period": -3 }"#).is_err());
    }

    #[test]
    fn zero_period_is_rejected_by_name() {
        let cfg = BacktestConfig {
            k_slow_period: 0,
            ..BacktestConfig::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::ZeroPeriod { name: "k_slow_period" })
        );
    }

    #[test]
    fn negative_deviation_is_rejected() {
        let cfg = BacktestConfig {
            deviation_multiplier: -0.5,
            ..BacktestConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::NegativeDeviation(-0.5)));
    }

    #[test]
    fn zero_deviation_is_allowed() {
        let cfg = BacktestConfig {
            deviation_multiplier: 0.0,
            ..BacktestConfig::default()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn inverted_or_equal_thresholds_are_rejected() {
        // The reference script swapped these two; it must not load silently.
        let swapped = BacktestConfig {
            stochastic_lower_threshold: 80.0,
            stochastic_upper_threshold: 20.0,
            ..BacktestConfig::default()
        };
        assert!(matches!(
            swapped.validate(),
            Err(ConfigError::ThresholdOrder { .. })
        ));

        let equal = BacktestConfig {
            stochastic_lower_threshold: 50.0,
            stochastic_upper_threshold: 50.0,
            ..BacktestConfig::default()
        };
        assert!(matches!(equal.validate(), Err(ConfigError::ThresholdOrder { .. })));
    }

    #[test]
    fn quantity_and_fee_are_checked() {
        let zero_qty = BacktestConfig {
            trade_quantity: 0.0,
            ..BacktestConfig::default()
        };
        assert_eq!(zero_qty.validate(), Err(ConfigError::NonPositiveQuantity(0.0)));

        let negative_fee = BacktestConfig {
            trading_fee_rate: -0.01,
            ..BacktestConfig::default()
        };
        assert_eq!(negative_fee.validate(), Err(ConfigError::NegativeFeeRate(-0.01)));
    }

    #[test]
    fn non_finite_values_are_rejected() {
        let cfg = BacktestConfig {
            stochastic_upper_threshold: f64::NAN,
            ..BacktestConfig::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::NonFinite { name: "stochastic_upper_threshold" })
        );
    }

    #[test]
    fn band_breach_modes() {
        assert!(!BandBreach::Strict.below(100.0, 100.0));
        assert!(BandBreach::Strict.below(99.9, 100.0));
        assert!(BandBreach::Inclusive.below(100.0, 100.0));
        assert!(!BandBreach::Strict.above(100.0, 100.0));
        assert!(BandBreach::Inclusive.above(100.0, 100.0));
    }

    #[test]
    fn save_then_load_roundtrip() {
        let dir = std::env::temp_dir().join(format!("stochband-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("backtest_config.json");

        let cfg = BacktestConfig {
            pair: "ETHUSD".to_string(),
            sma_period: 10,
            ..BacktestConfig::default()
        };
        cfg.save(&path).unwrap();
        let loaded = BacktestConfig::load(&path).unwrap();
        assert_eq!(loaded, Some(cfg));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn load_missing_file_is_none() {
        let loaded = BacktestConfig::load("/definitely/not/here/backtest_config.json").unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn load_malformed_file_is_an_error() {
        let dir = std::env::temp_dir().join(format!("stochband-bad-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let negative = dir.join("negative.json");
        std::fs::write(&negative, r#"{ "sma_period": -3 }"#).unwrap();
        assert!(BacktestConfig::load(&negative).is_err());

        let truncated = dir.join("truncated.json");
        std::fs::write(&truncated, r#"{ "rsi_period": 14,"#).unwrap();
        assert!(BacktestConfig::load(&truncated).is_err());

        std::fs::remove_dir_all(&dir).ok();
    }
}
