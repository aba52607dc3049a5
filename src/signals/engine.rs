// =============================================================================
// SignalEngine — strategy dispatch, cooldown, dedup, bounded history
// =============================================================================

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

use crate::blackout::BlackoutCalendar;
use crate::indicators::store::IndicatorStore;
use crate::signals::strategies::{StrategyContext, StrategyKind};
use crate::types::{Candle, Direction, IndicatorSnapshot, SignalEvent, TradeAction};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CooldownKey {
    strategy: String,
    symbol: String,
    timeframe: String,
    direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DedupKey {
    strategy: String,
    symbol: String,
    timeframe: String,
    direction: Direction,
    indicator_timestamp_millis: i64,
}

pub struct SignalEngineConfig {
    pub cooldown: Duration,
    pub history_limit: usize,
    pub atr_threshold_pips: f64,
    pub atr_period: usize,
    pub pip_size: f64,
}

/// Per-strategy aggregate statistics as returned by `get_summary`.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct StrategySummary {
    pub total_signals: usize,
    pub trades: usize,
    pub closes: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,
    pub total_pnl: f64,
    pub avg_pnl: f64,
    pub max_profit: f64,
    pub max_loss: f64,
}

/// Strategy evaluation, cooldown/dedup gating, bounded per-strategy history.
pub struct SignalEngine {
    cfg: SignalEngineConfig,
    blackout: Arc<BlackoutCalendar>,
    store: Arc<IndicatorStore>,
    last_signal_at: RwLock<HashMap<CooldownKey, DateTime<Utc>>>,
    seen: RwLock<HashSet<DedupKey>>,
    prev_snapshots: RwLock<HashMap<(String, String), IndicatorSnapshot>>,
    history: RwLock<HashMap<String, VecDeque<SignalEvent>>>,
}

impl SignalEngine {
    pub fn new(cfg: SignalEngineConfig, blackout: Arc<BlackoutCalendar>, store: Arc<IndicatorStore>) -> Self {
        Self {
            cfg,
            blackout,
            store,
            last_signal_at: RwLock::new(HashMap::new()),
            seen: RwLock::new(HashSet::new()),
            prev_snapshots: RwLock::new(HashMap::new()),
            history: RwLock::new(HashMap::new()),
        }
    }

    /// Evaluate every strategy registered for `timeframe` against `snapshot`.
    /// `candles` is the bounded closed-candle history for (symbol, timeframe),
    /// oldest first, ending with the candle that produced `snapshot`. Returns
    /// the admitted signal events (after blackout/readiness/ATR gate, dedup,
    /// and cooldown).
    pub fn evaluate(
        &self,
        symbol: &str,
        timeframe: &str,
        price: f64,
        snapshot: &IndicatorSnapshot,
        occurred_at: DateTime<Utc>,
        candles: &[Candle],
    ) -> Vec<SignalEvent> {
        let mut out = Vec::new();

        if self.blackout.is_blackout(Some(occurred_at)) {
            self.store_prev(symbol, timeframe, snapshot);
            return out;
        }
        if !snapshot.trend.ready {
            self.store_prev(symbol, timeframe, snapshot);
            return out;
        }
        if timeframe == "1m" && self.cfg.atr_threshold_pips > 0.0 {
            if let Some(atr) = snapshot.atr.get(&self.cfg.atr_period.to_string()) {
                let atr_pips = atr / self.cfg.pip_size;
                if atr_pips < self.cfg.atr_threshold_pips {
                    self.store_prev(symbol, timeframe, snapshot);
                    return out;
                }
            }
        }

        let prev_key = (symbol.to_string(), timeframe.to_string());
        let prev = self.prev_snapshots.read().get(&prev_key).cloned();

        let bb_key = snapshot.bb.keys().next().cloned().unwrap_or_default();
        let symbol_owned = symbol.to_string();
        let store = self.store.clone();
        let other_timeframe = move |tf: &str| -> Option<IndicatorSnapshot> { store.get_snapshot(&symbol_owned, tf) };

        let kinds = if timeframe == "5m" { StrategyKind::for_5m() } else { StrategyKind::for_1m() };

        for &kind in kinds {
            let ctx = StrategyContext {
                price,
                snapshot,
                prev: prev.as_ref(),
                candles,
                other_timeframe: &other_timeframe,
                pip_size: self.cfg.pip_size,
                bb_key: &bb_key,
            };
            let Some(direction) = kind.evaluate(&ctx) else { continue };

            let event = SignalEvent {
                symbol: symbol.to_string(),
                timeframe: timeframe.to_string(),
                direction,
                price,
                occurred_at,
                indicator_snapshot: snapshot.clone(),
                strategy: kind.name().to_string(),
                trade_action: TradeAction::Open,
                pnl: None,
                pips: None,
            };

            if self.admit(&event, true) {
                out.push(event);
            }
        }

        self.store_prev(symbol, timeframe, snapshot);
        out
    }

    /// Record a close-derived signal. Always bypasses cooldown (a close must
    /// always be recorded), but still dedups against an identical prior
    /// record.
    pub fn record_close_event(&self, event: SignalEvent) -> bool {
        self.admit(&event, false)
    }

    fn admit(&self, event: &SignalEvent, enforce_cooldown: bool) -> bool {
        let dedup_key = DedupKey {
            strategy: event.strategy.clone(),
            symbol: event.symbol.clone(),
            timeframe: event.timeframe.clone(),
            direction: event.direction,
            indicator_timestamp_millis: event.indicator_timestamp().timestamp_millis(),
        };
        {
            let mut seen = self.seen.write();
            if seen.contains(&dedup_key) {
                return false;
            }
            seen.insert(dedup_key);
        }

        if enforce_cooldown {
            let cooldown_key = CooldownKey {
                strategy: event.strategy.clone(),
                symbol: event.symbol.clone(),
                timeframe: event.timeframe.clone(),
                direction: event.direction,
            };
            let mut last = self.last_signal_at.write();
            if let Some(&prev_at) = last.get(&cooldown_key) {
                if event.occurred_at - prev_at < self.cfg.cooldown {
                    return false;
                }
            }
            last.insert(cooldown_key, event.occurred_at);
        }

        let mut history = self.history.write();
        let deque = history.entry(event.strategy.clone()).or_default();
        deque.push_back(event.clone());
        while deque.len() > self.cfg.history_limit {
            deque.pop_front();
        }
        true
    }

    fn store_prev(&self, symbol: &str, timeframe: &str, snapshot: &IndicatorSnapshot) {
        self.prev_snapshots
            .write()
            .insert((symbol.to_string(), timeframe.to_string()), snapshot.clone());
    }

    pub fn get_history(&self, strategy: Option<&str>, limit: usize) -> Vec<SignalEvent> {
        let history = self.history.read();
        match strategy {
            Some(s) => history.get(s).map(|d| d.iter().rev().take(limit).cloned().collect()).unwrap_or_default(),
            None => {
                let mut all: Vec<SignalEvent> = history.values().flat_map(|d| d.iter().cloned()).collect();
                all.sort_by_key(|e| std::cmp::Reverse(e.occurred_at));
                all.truncate(limit);
                all
            }
        }
    }

    /// Per-strategy totals over the bounded in-memory history, optionally
    /// restricted to one strategy and/or a `[from, to]` time window.
    pub fn get_summary(
        &self,
        strategy: Option<&str>,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> HashMap<String, StrategySummary> {
        let history = self.history.read();
        let mut out = HashMap::new();

        for (name, events) in history.iter() {
            if let Some(s) = strategy {
                if s != name {
                    continue;
                }
            }

            let mut summary = StrategySummary::default();
            for event in events.iter() {
                if let Some(from) = from {
                    if event.occurred_at < from {
                        continue;
                    }
                }
                if let Some(to) = to {
                    if event.occurred_at > to {
                        continue;
                    }
                }

                summary.total_signals += 1;
                match event.trade_action {
                    TradeAction::Open | TradeAction::Reverse => summary.trades += 1,
                    TradeAction::Close => {
                        summary.closes += 1;
                        let pnl = event.pnl.unwrap_or(0.0);
                        let pips = event.pips.unwrap_or(0.0);
                        summary.total_pnl += pnl;
                        summary.max_profit = summary.max_profit.max(pnl);
                        summary.max_loss = summary.max_loss.min(pnl);
                        if pips > 0.0 {
                            summary.wins += 1;
                        } else if pips < 0.0 {
                            summary.losses += 1;
                        }
                    }
                    TradeAction::None => {}
                }
            }

            if summary.closes > 0 {
                summary.win_rate = summary.wins as f64 / summary.closes as f64;
                summary.avg_pnl = summary.total_pnl / summary.closes as f64;
            }

            out.insert(name.clone(), summary);
        }

        out
    }
}
