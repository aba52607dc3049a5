// =============================================================================
// Configuration — trading parameters and static engine tuning, atomic save
// =============================================================================
//
// `TradingConfig` mirrors the on-disk trading config described by the engine's
// external interface: pip size, lot size, SL/TP distance, fee rate, the
// trading-active switch, and the blackout windows. `EngineConfig` carries the
// static tuning (cooldown, rolling-window periods, history bounds) that does
// not need to survive a restart in the same file but still benefits from the
// same serde-default forward-compatibility discipline.
//
// Persistence uses an atomic tmp + rename pattern so a crash mid-write never
// corrupts the file on disk. All fields carry `#[serde(default)]` so loading
// an older config file after new fields are added never fails — it just warns
// and fills in defaults.
// =============================================================================

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::blackout::BlackoutWindow;

fn default_pip_size() -> f64 {
    0.01
}

fn default_lot_size() -> f64 {
    10_000.0
}

fn default_stop_loss_pips() -> f64 {
    15.0
}

fn default_take_profit_pips() -> f64 {
    20.0
}

fn default_fee_rate() -> f64 {
    0.0002
}

fn default_trend_sma_period() -> usize {
    21
}

fn default_trend_threshold_pips() -> f64 {
    1.5
}

fn default_atr_threshold_pips() -> f64 {
    2.0
}

/// On-disk trading configuration. Every mutation from the HTTP surface
/// rewrites the whole struct and persists it atomically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    #[serde(default)]
    pub trading_active: bool,

    #[serde(default = "default_pip_size")]
    pub pip_size: f64,

    #[serde(default = "default_lot_size")]
    pub lot_size: f64,

    #[serde(default = "default_stop_loss_pips")]
    pub stop_loss_pips: f64,

    #[serde(default = "default_take_profit_pips")]
    pub take_profit_pips: f64,

    #[serde(default = "default_fee_rate")]
    pub fee_rate: f64,

    #[serde(default = "default_trend_sma_period")]
    pub trend_sma_period: usize,

    #[serde(default = "default_trend_threshold_pips")]
    pub trend_threshold_pips: f64,

    #[serde(default = "default_atr_threshold_pips")]
    pub atr_threshold_pips: f64,

    /// `None` means "use the built-in default windows" (see `blackout`).
    #[serde(default)]
    pub blackout_windows: Option<Vec<BlackoutWindow>>,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            trading_active: false,
            pip_size: default_pip_size(),
            lot_size: default_lot_size(),
            stop_loss_pips: default_stop_loss_pips(),
            take_profit_pips: default_take_profit_pips(),
            fee_rate: default_fee_rate(),
            trend_sma_period: default_trend_sma_period(),
            trend_threshold_pips: default_trend_threshold_pips(),
            atr_threshold_pips: default_atr_threshold_pips(),
            blackout_windows: None,
        }
    }
}

fn default_symbols() -> Vec<String> {
    vec!["USD_JPY".to_string()]
}

fn default_ws_endpoint() -> String {
    "wss://api.example-broker.test/ws/public/v1".to_string()
}

fn default_cooldown_sec() -> i64 {
    30
}

fn default_sma_periods() -> Vec<usize> {
    vec![5, 21]
}

fn default_rsi_periods() -> Vec<usize> {
    vec![14]
}

fn default_rci_periods() -> Vec<usize> {
    vec![9, 26]
}

fn default_atr_periods() -> Vec<usize> {
    vec![14]
}

fn default_bb_period() -> usize {
    20
}

fn default_bb_sigmas() -> Vec<f64> {
    vec![2.0]
}

fn default_max_rows() -> usize {
    1000
}

fn default_candle_history() -> usize {
    500
}

fn default_signal_history() -> usize {
    200
}

fn default_trend_window() -> usize {
    21
}

/// Static engine tuning: watched symbols, rolling-window periods, history
/// bounds. Changes here take effect on the next process restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    #[serde(default = "default_ws_endpoint")]
    pub websocket_endpoint: String,

    #[serde(default = "default_cooldown_sec")]
    pub signal_cooldown_sec: i64,

    #[serde(default = "default_sma_periods")]
    pub sma_periods: Vec<usize>,

    #[serde(default = "default_rsi_periods")]
    pub rsi_periods: Vec<usize>,

    #[serde(default = "default_rci_periods")]
    pub rci_periods: Vec<usize>,

    #[serde(default = "default_atr_periods")]
    pub atr_periods: Vec<usize>,

    #[serde(default = "default_bb_period")]
    pub bb_period: usize,

    #[serde(default = "default_bb_sigmas")]
    pub bb_sigmas: Vec<f64>,

    #[serde(default = "default_max_rows")]
    pub max_rows: usize,

    #[serde(default = "default_candle_history")]
    pub candle_history: usize,

    #[serde(default = "default_signal_history")]
    pub signal_history: usize,

    /// Width (in trend-SMA samples) of the linear-regression window used for
    /// the trend reading, distinct from `trend_sma_period` (the SMA period
    /// feeding that series).
    #[serde(default = "default_trend_window")]
    pub trend_window: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            websocket_endpoint: default_ws_endpoint(),
            signal_cooldown_sec: default_cooldown_sec(),
            sma_periods: default_sma_periods(),
            rsi_periods: default_rsi_periods(),
            rci_periods: default_rci_periods(),
            atr_periods: default_atr_periods(),
            bb_period: default_bb_period(),
            bb_sigmas: default_bb_sigmas(),
            max_rows: default_max_rows(),
            candle_history: default_candle_history(),
            signal_history: default_signal_history(),
            trend_window: default_trend_window(),
        }
    }
}

/// Load a `TradingConfig` from `path`. A missing file is not an error at this
/// layer — callers treat it as "use defaults" (see the `Ok(None)` case).
/// A malformed file is logged and treated the same way.
pub fn load_trading_config(path: impl AsRef<Path>) -> Option<TradingConfig> {
    let path = path.as_ref();
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "no trading config on disk, using defaults");
            return None;
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read trading config, using defaults");
            return None;
        }
    };

    match serde_json::from_str(&content) {
        Ok(cfg) => {
            info!(path = %path.display(), "trading config loaded");
            Some(cfg)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "malformed trading config, ignoring and using defaults");
            None
        }
    }
}

/// Persist `config` to `path` using an atomic write (write to `.tmp`, then
/// rename) so a crash mid-write never corrupts the file on disk.
pub fn save_trading_config(config: &TradingConfig, path: impl AsRef<Path>) -> anyhow::Result<()> {
    let path = path.as_ref();
    let content = serde_json::to_string_pretty(config)?;
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &content)?;
    std::fs::rename(&tmp_path, path)?;
    info!(path = %path.display(), "trading config saved (atomic)");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_trading_config_values() {
        let cfg = TradingConfig::default();
        assert!(!cfg.trading_active);
        assert_eq!(cfg.pip_size, 0.01);
        assert_eq!(cfg.lot_size, 10_000.0);
        assert!(cfg.blackout_windows.is_none());
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: TradingConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.stop_loss_pips, 15.0);
        assert_eq!(cfg.take_profit_pips, 20.0);
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "trading_active": true, "lot_size": 5000.0 }"#;
        let cfg: TradingConfig = serde_json::from_str(json).unwrap();
        assert!(cfg.trading_active);
        assert_eq!(cfg.lot_size, 5000.0);
        assert_eq!(cfg.pip_size, 0.01);
    }

    #[test]
    fn roundtrip_save_load() {
        let dir = std::env::temp_dir().join(format!("aurafx-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("trading_config.json");

        let mut cfg = TradingConfig::default();
        cfg.trading_active = true;
        cfg.lot_size = 25_000.0;
        save_trading_config(&cfg, &path).unwrap();

        let loaded = load_trading_config(&path).unwrap();
        assert!(loaded.trading_active);
        assert_eq!(loaded.lot_size, 25_000.0);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_file_returns_none() {
        let loaded = load_trading_config("/nonexistent/path/does-not-exist.json");
        assert!(loaded.is_none());
    }

    #[test]
    fn malformed_file_returns_none() {
        let dir = std::env::temp_dir().join(format!("aurafx-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("trading_config.json");
        std::fs::write(&path, "not valid json").unwrap();

        let loaded = load_trading_config(&path);
        assert!(loaded.is_none());

        std::fs::remove_dir_all(&dir).ok();
    }
}
