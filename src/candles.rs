// =============================================================================
// CandleAggregator — ticks to bounded OHLCV history per (symbol, timeframe)
// =============================================================================

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::types::Candle;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandleKey {
    pub symbol: String,
    pub timeframe_secs: i64,
}

impl std::fmt::Display for CandleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}s", self.symbol, self.timeframe_secs)
    }
}

struct Series {
    open: Option<Candle>,
    closed: VecDeque<Candle>,
}

impl Series {
    fn new() -> Self {
        Self { open: None, closed: VecDeque::new() }
    }
}

/// Aggregates raw ticks into OHLCV candles for every configured timeframe, in
/// parallel, per symbol. Late ticks (timestamp older than the open candle's
/// bucket) are folded into the currently open candle rather than rejected —
/// the aggregator is forward-only and never reopens a closed bucket.
pub struct CandleAggregator {
    timeframes: Vec<i64>,
    history: usize,
    series: RwLock<HashMap<CandleKey, Series>>,
}

impl CandleAggregator {
    pub fn new(timeframes_secs: Vec<i64>, history: usize) -> Self {
        assert!(!timeframes_secs.is_empty(), "CandleAggregator needs at least one timeframe");
        Self { timeframes: timeframes_secs, history, series: RwLock::new(HashMap::new()) }
    }

    fn bucket_start(&self, tf_secs: i64, ts: DateTime<Utc>) -> DateTime<Utc> {
        let epoch = ts.timestamp();
        let bucket = epoch - epoch.rem_euclid(tf_secs);
        DateTime::<Utc>::from_timestamp(bucket, 0).expect("valid bucket timestamp")
    }

    /// Feed one tick through every configured timeframe. Returns the
    /// `(timeframe_secs, candle)` pairs that closed as a result of this tick.
    pub fn add_tick(&self, symbol: &str, price: f64, volume: f64, ts: DateTime<Utc>) -> Vec<(i64, Candle)> {
        let mut closed_out = Vec::new();
        let mut guard = self.series.write();

        for &tf in &self.timeframes {
            let key = CandleKey { symbol: symbol.to_string(), timeframe_secs: tf };
            let bucket_open = self.bucket_start(tf, ts);
            let bucket_close = bucket_open + Duration::seconds(tf);
            let entry = guard.entry(key).or_insert_with(Series::new);

            match entry.open {
                None => {
                    entry.open = Some(Candle::open_at(price, volume, bucket_open, bucket_close));
                }
                Some(ref mut candle) => {
                    if ts < candle.open_time {
                        // Late tick for an already-closed bucket: fold into
                        // the open candle rather than reopening history.
                        candle.absorb(price, volume, candle.close_time);
                    } else if candle.open_time == bucket_open {
                        candle.absorb(price, volume, ts.max(candle.close_time));
                    } else {
                        let finished = *candle;
                        entry.closed.push_back(finished);
                        while entry.closed.len() > self.history {
                            entry.closed.pop_front();
                        }
                        closed_out.push((tf, finished));
                        entry.open = Some(Candle::open_at(price, volume, bucket_open, bucket_close));
                    }
                }
            }
        }

        closed_out
    }

    /// Force-close every currently open candle (used on shutdown so the last
    /// partial bar is not silently dropped).
    pub fn flush_open(&self) -> Vec<(String, i64, Candle)> {
        let mut out = Vec::new();
        let mut guard = self.series.write();
        for (key, series) in guard.iter_mut() {
            if let Some(candle) = series.open.take() {
                series.closed.push_back(candle);
                while series.closed.len() > self.history {
                    series.closed.pop_front();
                }
                out.push((key.symbol.clone(), key.timeframe_secs, candle));
            }
        }
        out
    }

    pub fn closed_candles(&self, symbol: &str, tf_secs: i64) -> Vec<Candle> {
        let key = CandleKey { symbol: symbol.to_string(), timeframe_secs: tf_secs };
        self.series.read().get(&key).map(|s| s.closed.iter().copied().collect()).unwrap_or_default()
    }

    pub fn closes(&self, symbol: &str, tf_secs: i64) -> Vec<f64> {
        self.closed_candles(symbol, tf_secs).into_iter().map(|c| c.close).collect()
    }

    pub fn last_close(&self, symbol: &str, tf_secs: i64) -> Option<f64> {
        let key = CandleKey { symbol: symbol.to_string(), timeframe_secs: tf_secs };
        self.series.read().get(&key).and_then(|s| s.closed.back().map(|c| c.close))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn one_minute_aggregation_closes_on_bucket_boundary() {
        let agg = CandleAggregator::new(vec![60], 10);
        assert!(agg.add_tick("USD_JPY", 150.0, 1.0, t(0)).is_empty());
        assert!(agg.add_tick("USD_JPY", 150.5, 1.0, t(30)).is_empty());
        let closed = agg.add_tick("USD_JPY", 151.0, 1.0, t(61));
        assert_eq!(closed.len(), 1);
        let (tf, candle) = closed[0];
        assert_eq!(tf, 60);
        assert_eq!(candle.open, 150.0);
        assert_eq!(candle.high, 150.5);
        assert_eq!(candle.close, 150.5);
    }

    #[test]
    fn five_minute_rollup_spans_multiple_one_minute_buckets() {
        let agg = CandleAggregator::new(vec![60, 300], 10);
        for i in 0..6 {
            agg.add_tick("USD_JPY", 150.0 + i as f64, 1.0, t(i * 60));
        }
        let closes_1m = agg.closes("USD_JPY", 60);
        assert_eq!(closes_1m.len(), 5);
        assert!(agg.closed_candles("USD_JPY", 300).is_empty());
        agg.add_tick("USD_JPY", 160.0, 1.0, t(301));
        assert_eq!(agg.closed_candles("USD_JPY", 300).len(), 1);
    }

    #[test]
    fn ring_buffer_trims_to_history_bound() {
        let agg = CandleAggregator::new(vec![60], 3);
        for i in 0..10 {
            agg.add_tick("USD_JPY", 150.0, 1.0, t(i * 60));
        }
        assert!(agg.closed_candles("USD_JPY", 60).len() <= 3);
    }

    #[test]
    fn flush_open_closes_partial_candle() {
        let agg = CandleAggregator::new(vec![60], 10);
        agg.add_tick("USD_JPY", 150.0, 1.0, t(0));
        let flushed = agg.flush_open();
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].0, "USD_JPY");
    }

    #[test]
    fn last_close_empty_returns_none() {
        let agg = CandleAggregator::new(vec![60], 10);
        assert_eq!(agg.last_close("USD_JPY", 60), None);
    }
}
