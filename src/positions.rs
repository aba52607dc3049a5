// =============================================================================
// PositionManager — per-(symbol, strategy) position lifecycle, SL/TP, P&L
// =============================================================================
//
// Keyed by `(symbol, strategy)` so multiple strategies can hold independent
// positions on the same symbol. The authoritative policy (see DESIGN.md's
// Open Question decisions) is *no auto-reverse*: any existing position at a
// key — same direction or opposite — blocks a new open. A reversal requires
// an explicit close followed by a later open.
// =============================================================================

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::config::TradingConfig;
use crate::types::{Direction, Position, PositionEvent, PositionEventType};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PositionKey {
    symbol: String,
    strategy: String,
}

/// Bound on the in-memory closed-position history kept for the trade journal
/// API; the relational store is the durable record.
const CLOSED_HISTORY_LIMIT: usize = 500;

pub struct PositionManager {
    open: RwLock<HashMap<PositionKey, Position>>,
    closed: RwLock<VecDeque<PositionEvent>>,
    last_price: RwLock<HashMap<String, f64>>,
}

impl PositionManager {
    pub fn new() -> Self {
        Self {
            open: RwLock::new(HashMap::new()),
            closed: RwLock::new(VecDeque::new()),
            last_price: RwLock::new(HashMap::new()),
        }
    }

    /// Handle a BUY/SELL signal for `(symbol, strategy)`. No event is
    /// produced when trading is inactive, when a position already exists at
    /// this key in the same direction (don't stack), or when an opposing
    /// position already exists at this key (no-auto-reverse — it is left for
    /// the SL/TP supervisor or a manual close).
    pub fn handle_signal(
        &self,
        cfg: &TradingConfig,
        symbol: &str,
        strategy: &str,
        direction: Direction,
        price: f64,
        ts: DateTime<Utc>,
    ) -> Option<PositionEvent> {
        if !cfg.trading_active {
            return None;
        }

        let key = PositionKey { symbol: symbol.to_string(), strategy: strategy.to_string() };
        {
            let open = self.open.read();
            if open.contains_key(&key) {
                return None;
            }
        }

        let (stop_loss, take_profit) = match direction {
            Direction::Buy => (
                price - cfg.stop_loss_pips * cfg.pip_size,
                price + cfg.take_profit_pips * cfg.pip_size,
            ),
            Direction::Sell => (
                price + cfg.stop_loss_pips * cfg.pip_size,
                price - cfg.take_profit_pips * cfg.pip_size,
            ),
        };
        let open_fee = price * cfg.lot_size * cfg.fee_rate;

        let position = Position {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            strategy: strategy.to_string(),
            direction,
            entry_price: price,
            lot_size: cfg.lot_size,
            stop_loss,
            take_profit,
            opened_at: ts,
            fee_rate: cfg.fee_rate,
            open_fee,
        };

        info!(
            symbol,
            strategy,
            direction = %direction,
            entry_price = price,
            stop_loss,
            take_profit,
            "position opened"
        );

        let event = PositionEvent {
            event_type: PositionEventType::Open,
            position: position.clone(),
            price,
            timestamp: ts,
            pnl: -open_fee,
            fee_paid: open_fee,
            pips: 0.0,
        };

        self.open.write().insert(key, position);
        self.last_price.write().insert(symbol.to_string(), price);
        Some(event)
    }

    /// Scan the positions open on `symbol` for a stop-loss or take-profit
    /// trigger at `price`. At most one position is closed per call — the
    /// first match in iteration order; any other position that would also
    /// trigger on this tick is re-evaluated on the next one (documented
    /// surprise in spec.md §9's open questions).
    pub fn evaluate_price(&self, symbol: &str, price: f64, ts: DateTime<Utc>, pip_size: f64) -> Option<PositionEvent> {
        self.last_price.write().insert(symbol.to_string(), price);

        let hit = {
            let open = self.open.read();
            open.iter()
                .filter(|(k, _)| k.symbol == symbol)
                .find_map(|(k, pos)| {
                    let reason = match pos.direction {
                        Direction::Buy if price <= pos.stop_loss => Some(PositionEventType::StopLoss),
                        Direction::Buy if price >= pos.take_profit => Some(PositionEventType::TakeProfit),
                        Direction::Sell if price >= pos.stop_loss => Some(PositionEventType::StopLoss),
                        Direction::Sell if price <= pos.take_profit => Some(PositionEventType::TakeProfit),
                        _ => None,
                    };
                    reason.map(|r| (k.clone(), r))
                })
        }?;

        let (key, reason) = hit;
        self.close_key(key, reason, price, ts, pip_size)
    }

    /// Close the first matching position for `symbol` (any direction,
    /// regardless of SL/TP bounds), used for manual/API-triggered closes.
    pub fn close_position(&self, symbol: &str, price: f64, ts: DateTime<Utc>, pip_size: f64) -> Option<PositionEvent> {
        let key = {
            let open = self.open.read();
            open.keys().find(|k| k.symbol == symbol).cloned()
        }?;
        self.close_key(key, PositionEventType::ManualClose, price, ts, pip_size)
    }

    fn close_key(
        &self,
        key: PositionKey,
        reason: PositionEventType,
        price: f64,
        ts: DateTime<Utc>,
        pip_size: f64,
    ) -> Option<PositionEvent> {
        let position = self.open.write().remove(&key)?;

        let fee_paid = price * position.lot_size * position.fee_rate;
        let pnl = position.unrealized(price) - fee_paid;
        let pips = (price - position.entry_price) * position.direction.sign() / pip_size;

        info!(
            symbol = %position.symbol,
            strategy = %position.strategy,
            reason = ?reason,
            price,
            pnl,
            pips,
            "position closed"
        );

        let event = PositionEvent {
            event_type: reason,
            position,
            price,
            timestamp: ts,
            pnl,
            fee_paid,
            pips,
        };

        let mut closed = self.closed.write();
        closed.push_back(event.clone());
        while closed.len() > CLOSED_HISTORY_LIMIT {
            closed.pop_front();
        }

        Some(event)
    }

    pub fn get_open_positions(&self) -> Vec<Position> {
        self.open.read().values().cloned().collect()
    }

    pub fn get_position(&self, symbol: &str, strategy: &str) -> Option<Position> {
        let key = PositionKey { symbol: symbol.to_string(), strategy: strategy.to_string() };
        self.open.read().get(&key).cloned()
    }

    pub fn get_closed_events(&self, limit: usize) -> Vec<PositionEvent> {
        self.closed.read().iter().rev().take(limit).cloned().collect()
    }

    pub fn last_price(&self, symbol: &str) -> Option<f64> {
        self.last_price.read().get(symbol).copied()
    }
}

impl Default for PositionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn cfg() -> TradingConfig {
        let mut c = TradingConfig::default();
        c.trading_active = true;
        c.pip_size = 0.001;
        c.lot_size = 100.0;
        c.stop_loss_pips = 20.0;
        c.take_profit_pips = 40.0;
        c.fee_rate = 0.00002;
        c
    }

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn handle_signal_opens_with_fee_and_negative_pnl() {
        let pm = PositionManager::new();
        let ev = pm.handle_signal(&cfg(), "USD_JPY", "bb", Direction::Buy, 150.0, t(0)).unwrap();
        assert_eq!(ev.event_type, PositionEventType::Open);
        assert!((ev.pnl - (-0.3)).abs() < 1e-9);
        assert!((ev.position.open_fee - 0.3).abs() < 1e-9);
        assert_eq!(ev.position.stop_loss, 150.0 - 20.0 * 0.001);
        assert_eq!(ev.position.take_profit, 150.0 + 40.0 * 0.001);
    }

    #[test]
    fn handle_signal_with_trading_inactive_is_noop() {
        let pm = PositionManager::new();
        let mut c = cfg();
        c.trading_active = false;
        assert!(pm.handle_signal(&c, "USD_JPY", "bb", Direction::Buy, 150.0, t(0)).is_none());
    }

    #[test]
    fn same_direction_does_not_stack() {
        let pm = PositionManager::new();
        let c = cfg();
        pm.handle_signal(&c, "USD_JPY", "bb", Direction::Buy, 150.0, t(0)).unwrap();
        assert!(pm.handle_signal(&c, "USD_JPY", "bb", Direction::Buy, 150.2, t(1)).is_none());
    }

    #[test]
    fn opposite_direction_no_auto_reverse() {
        let pm = PositionManager::new();
        let c = cfg();
        pm.handle_signal(&c, "USD_JPY", "bb", Direction::Buy, 150.0, t(0)).unwrap();
        assert!(pm.handle_signal(&c, "USD_JPY", "bb", Direction::Sell, 150.2, t(1)).is_none());
        assert_eq!(pm.get_open_positions().len(), 1);
    }

    #[test]
    fn independent_strategies_hold_separate_positions() {
        let pm = PositionManager::new();
        let c = cfg();
        pm.handle_signal(&c, "USD_JPY", "bb", Direction::Buy, 150.0, t(0)).unwrap();
        pm.handle_signal(&c, "USD_JPY", "ma_cross", Direction::Sell, 150.0, t(0)).unwrap();
        assert_eq!(pm.get_open_positions().len(), 2);
    }

    #[test]
    fn stop_loss_triggers_and_removes_position() {
        let pm = PositionManager::new();
        let mut c = cfg();
        c.stop_loss_pips = 10.0;
        pm.handle_signal(&c, "USD_JPY", "bb", Direction::Buy, 150.0, t(0)).unwrap();

        let ev = pm.evaluate_price("USD_JPY", 149.99, t(1), c.pip_size).unwrap();
        assert_eq!(ev.event_type, PositionEventType::StopLoss);
        assert!((ev.pips - (-10.0)).abs() < 1e-6);
        assert!(pm.get_open_positions().is_empty());

        // Further price updates for the now-closed position emit nothing.
        assert!(pm.evaluate_price("USD_JPY", 100.0, t(2), c.pip_size).is_none());
    }

    #[test]
    fn take_profit_boundary_triggers_at_exact_price() {
        let pm = PositionManager::new();
        let c = cfg();
        pm.handle_signal(&c, "USD_JPY", "bb", Direction::Buy, 150.0, t(0)).unwrap();
        let tp = 150.0 + c.take_profit_pips * c.pip_size;
        let ev = pm.evaluate_price("USD_JPY", tp, t(1), c.pip_size).unwrap();
        assert_eq!(ev.event_type, PositionEventType::TakeProfit);
    }

    #[test]
    fn manual_close_closes_regardless_of_bounds() {
        let pm = PositionManager::new();
        let c = cfg();
        pm.handle_signal(&c, "USD_JPY", "bb", Direction::Buy, 150.0, t(0)).unwrap();
        let ev = pm.close_position("USD_JPY", 150.05, t(1), c.pip_size).unwrap();
        assert_eq!(ev.event_type, PositionEventType::ManualClose);
    }

    #[test]
    fn close_position_on_unknown_symbol_returns_none() {
        let pm = PositionManager::new();
        assert!(pm.close_position("EUR_USD", 1.1, t(0), 0.0001).is_none());
    }

    #[test]
    fn sell_stop_loss_sign_convention() {
        let pm = PositionManager::new();
        let c = cfg();
        pm.handle_signal(&c, "USD_JPY", "bb", Direction::Sell, 150.0, t(0)).unwrap();
        let sl = 150.0 + c.stop_loss_pips * c.pip_size;
        let ev = pm.evaluate_price("USD_JPY", sl, t(1), c.pip_size).unwrap();
        assert_eq!(ev.event_type, PositionEventType::StopLoss);
        assert!(ev.pips < 0.0);
    }
}
