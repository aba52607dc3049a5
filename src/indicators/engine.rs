// =============================================================================
// IndicatorEngine — computes a full IndicatorSnapshot from rolling candle data
// =============================================================================

use std::collections::{BTreeMap, HashMap, VecDeque};

use parking_lot::RwLock;

use crate::config::EngineConfig;
use crate::indicators::{atr, bollinger, rci, rsi, sma, trend};
use crate::types::{BollingerBand, Candle, IndicatorSnapshot, TrendReading};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Key {
    symbol: String,
    timeframe: String,
}

#[derive(Default)]
struct Row {
    trend_sma_history: VecDeque<f64>,
}

/// Computes SMA/RSI/RCI/Bollinger/ATR/trend on every closed candle for every
/// configured period, caching the trend-SMA series needed for the linear
/// regression trend reading per (symbol, timeframe).
pub struct IndicatorEngine {
    config: EngineConfig,
    pip_size: f64,
    trend_sma_period: usize,
    trend_threshold_pips: f64,
    rows: RwLock<HashMap<Key, Row>>,
}

impl IndicatorEngine {
    pub fn new(config: EngineConfig, pip_size: f64, trend_sma_period: usize, trend_threshold_pips: f64) -> Self {
        Self {
            config,
            pip_size,
            trend_sma_period,
            trend_threshold_pips,
            rows: RwLock::new(HashMap::new()),
        }
    }

    /// `candles` is the bounded, closed-only history for (symbol, timeframe),
    /// oldest first, including the candle that just closed.
    pub fn handle_candle(&self, symbol: &str, timeframe: &str, candles: &[Candle]) -> IndicatorSnapshot {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let last = candles.last().expect("handle_candle requires at least one candle");

        let mut sma_map = BTreeMap::new();
        for &period in &self.config.sma_periods {
            if let Some(v) = sma::calculate_sma(&closes, period) {
                sma_map.insert(period.to_string(), v);
            }
        }

        let mut rsi_map = BTreeMap::new();
        for &period in &self.config.rsi_periods {
            if let Some((v, _)) = rsi::current_rsi(&closes, period) {
                rsi_map.insert(period.to_string(), v);
            }
        }

        let mut rci_map = BTreeMap::new();
        for &period in &self.config.rci_periods {
            if let Some(v) = rci::calculate_rci(&closes, period) {
                rci_map.insert(period.to_string(), v);
            }
        }

        let mut bb_map = BTreeMap::new();
        for &sigma in &self.config.bb_sigmas {
            if let Some(b) = bollinger::calculate_bollinger(&closes, self.config.bb_period, sigma) {
                let key = format!("{}_{}", self.config.bb_period, sigma);
                bb_map.insert(key, BollingerBand { upper: b.upper, middle: b.middle, lower: b.lower });
            }
        }

        let mut atr_map = BTreeMap::new();
        for &period in &self.config.atr_periods {
            if let Some(v) = atr::calculate_atr(candles, period) {
                atr_map.insert(period.to_string(), v);
            }
        }

        let trend_reading = self.update_trend(symbol, timeframe, &closes, self.trend_sma_period);

        IndicatorSnapshot {
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
            timestamp: last.close_time,
            close: last.close,
            sma: sma_map,
            rsi: rsi_map,
            rci: rci_map,
            bb: bb_map,
            atr: atr_map,
            trend: trend_reading,
        }
    }

    fn update_trend(&self, symbol: &str, timeframe: &str, closes: &[f64], trend_period: usize) -> TrendReading {
        let Some(current_trend_sma) = sma::calculate_sma(closes, trend_period) else {
            let mut reading = TrendReading::not_ready();
            reading.window = self.config.trend_window;
            return reading;
        };

        let key = Key { symbol: symbol.to_string(), timeframe: timeframe.to_string() };
        let mut rows = self.rows.write();
        let row = rows.entry(key).or_default();
        row.trend_sma_history.push_back(current_trend_sma);
        while row.trend_sma_history.len() > self.config.max_rows {
            row.trend_sma_history.pop_front();
        }

        let history: Vec<f64> = row.trend_sma_history.iter().copied().collect();
        trend::calculate_trend(&history, self.config.trend_window, self.pip_size, self.trend_threshold_pips)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn candle(close: f64) -> Candle {
        let t = Utc.timestamp_opt(0, 0).unwrap();
        Candle { open_time: t, close_time: t, open: close, high: close, low: close, close, volume: 1.0 }
    }

    #[test]
    fn handle_candle_produces_sma_once_window_is_full() {
        let mut cfg = EngineConfig::default();
        cfg.sma_periods = vec![5];
        cfg.rsi_periods = vec![];
        cfg.rci_periods = vec![];
        cfg.atr_periods = vec![];
        let engine = IndicatorEngine::new(cfg, 0.01, 21, 1.5);

        let candles: Vec<Candle> = (1..=5).map(|i| candle(i as f64)).collect();
        let snap = engine.handle_candle("USD_JPY", "1m", &candles);
        assert_eq!(snap.sma.get("5"), Some(&3.0));
    }

    #[test]
    fn trend_not_ready_until_sma_window_accumulates() {
        let mut cfg = EngineConfig::default();
        cfg.sma_periods = vec![3];
        let engine = IndicatorEngine::new(cfg, 0.01, 3, 1.5);
        let candles: Vec<Candle> = vec![candle(100.0), candle(100.0), candle(100.0)];
        let snap = engine.handle_candle("USD_JPY", "1m", &candles);
        assert!(!snap.trend.ready);
    }
}
