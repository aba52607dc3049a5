// =============================================================================
// LiveTradingController — signal/position events -> broker order intent
// =============================================================================
//
// A thin policy layer sitting above PositionManager: it never mutates
// position state itself, it only decides whether a just-produced signal or
// position event should also become a broker order, and queues that order on
// OrderDispatcher. The gating re-check inside each job's factory (blackout,
// trading-active) guards against the gap between "queued" and "sent", which
// can be seconds wide under the dispatcher's pacing.
// =============================================================================

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::blackout::BlackoutCalendar;
use crate::broker::{GmoClient, OrderSide};
use crate::config::TradingConfig;
use crate::dispatcher::{JobFuture, OrderDispatcher};
use crate::errors::{DispatchSkip, JobError};
use crate::types::{PositionEvent, PositionEventType, SignalEvent, TradeAction};

/// Spread gate: signals/closes on a symbol quoting wider than this (in raw
/// price units) are not forwarded to the broker.
const MAX_SPREAD: f64 = 0.5;

pub struct LiveTradingController {
    broker: Option<Arc<GmoClient>>,
    dispatcher: Arc<OrderDispatcher>,
    blackout: Arc<BlackoutCalendar>,
    config: Arc<RwLock<TradingConfig>>,
}

impl LiveTradingController {
    pub fn new(
        broker: Option<Arc<GmoClient>>,
        dispatcher: Arc<OrderDispatcher>,
        blackout: Arc<BlackoutCalendar>,
        config: Arc<RwLock<TradingConfig>>,
    ) -> Self {
        Self { broker, dispatcher, blackout, config }
    }

    fn gate(&self, spread: Option<f64>) -> bool {
        let Some(_) = &self.broker else { return false };
        if !self.config.read().trading_active {
            return false;
        }
        if self.blackout.is_blackout(None) {
            return false;
        }
        if spread.map(|s| s >= MAX_SPREAD).unwrap_or(false) {
            return false;
        }
        true
    }

    /// Queue a market-open order for an OPEN/REVERSE-class signal.
    pub async fn on_signal(&self, signal: &SignalEvent, spread: Option<f64>) {
        if !matches!(signal.trade_action, TradeAction::Open | TradeAction::Reverse) {
            return;
        }
        if !self.gate(spread) {
            debug!(symbol = %signal.symbol, strategy = %signal.strategy, "live trading: signal gated out");
            return;
        }

        let Some(broker) = self.broker.clone() else { return };
        let symbol = signal.symbol.clone();
        let side: OrderSide = signal.direction.into();
        let size = self.config.read().lot_size;
        let blackout = self.blackout.clone();
        let config = self.config.clone();

        let description = format!("open {symbol} {side}", side = side.as_str());
        let _ = self
            .dispatcher
            .submit(description, make_factory(move || {
                let broker = broker.clone();
                let symbol = symbol.clone();
                let blackout = blackout.clone();
                let config = config.clone();
                async move {
                    if !config.read().trading_active || blackout.is_blackout(None) {
                        return Err(JobError::Skip(DispatchSkip("trading gate closed before send".into())));
                    }
                    broker
                        .speed_order(&symbol, side, size)
                        .await
                        .map_err(JobError::Broker)
                }
            }))
            .await;
    }

    /// Queue a close order for a non-OPEN position event (SL/TP/manual/reverse).
    pub async fn on_position_close(&self, event: &PositionEvent, spread: Option<f64>) {
        if event.event_type == PositionEventType::Open {
            return;
        }
        if !self.gate(spread) {
            debug!(symbol = %event.position.symbol, reason = ?event.event_type, "live trading: close gated out");
            return;
        }

        let Some(broker) = self.broker.clone() else { return };
        let symbol = event.position.symbol.clone();
        let side: OrderSide = OrderSide::from(event.position.direction).inverted();
        let size = event.position.lot_size;
        let blackout = self.blackout.clone();
        let config = self.config.clone();

        let description = format!("close {symbol} {side}", side = side.as_str());
        let _ = self
            .dispatcher
            .submit(description, make_factory(move || {
                let broker = broker.clone();
                let symbol = symbol.clone();
                let blackout = blackout.clone();
                let config = config.clone();
                async move {
                    if !config.read().trading_active || blackout.is_blackout(None) {
                        return Err(JobError::Skip(DispatchSkip("trading gate closed before send".into())));
                    }
                    broker
                        .close_order(&symbol, side, size)
                        .await
                        .map_err(JobError::Broker)
                }
            }))
            .await;
    }
}

/// Adapts a `Fn() -> impl Future<...>` closure into the `JobFactory` shape the
/// dispatcher expects (a boxed, type-erased future per call).
fn make_factory<F, Fut>(f: F) -> crate::dispatcher::JobFactory
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<serde_json::Value, JobError>> + Send + 'static,
{
    Box::new(move || -> JobFuture { Box::pin(f()) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::DispatcherConfig;
    use crate::types::{Direction, IndicatorSnapshot, Position};
    use chrono::Utc;
    use std::time::Duration;
    use uuid::Uuid;

    fn controller(trading_active: bool, blackout_always: bool) -> LiveTradingController {
        let dispatcher = Arc::new(OrderDispatcher::spawn(DispatcherConfig {
            min_interval: Duration::ZERO,
            ..Default::default()
        }));
        let blackout = Arc::new(if blackout_always {
            BlackoutCalendar::new(vec![crate::blackout::BlackoutWindow::parse("00:00", "23:59").unwrap()])
        } else {
            BlackoutCalendar::new(vec![])
        });
        let mut cfg = TradingConfig::default();
        cfg.trading_active = trading_active;
        let config = Arc::new(RwLock::new(cfg));
        LiveTradingController::new(None, dispatcher, blackout, config)
    }

    fn signal(trade_action: TradeAction) -> SignalEvent {
        SignalEvent {
            symbol: "USD_JPY".into(),
            timeframe: "1m".into(),
            direction: Direction::Buy,
            price: 150.0,
            occurred_at: Utc::now(),
            indicator_snapshot: IndicatorSnapshot::fallback("USD_JPY", "1m", 150.0, Utc::now()),
            strategy: "bb".into(),
            trade_action,
            pnl: None,
            pips: None,
        }
    }

    #[tokio::test]
    async fn no_broker_configured_is_a_noop() {
        let controller = controller(true, false);
        // With `broker: None` this must not panic and must simply return.
        controller.on_signal(&signal(TradeAction::Open), Some(0.1)).await;
    }

    #[tokio::test]
    async fn close_event_for_open_type_is_ignored() {
        let controller = controller(true, false);
        let position = Position {
            id: Uuid::new_v4(),
            symbol: "USD_JPY".into(),
            strategy: "bb".into(),
            direction: Direction::Buy,
            entry_price: 150.0,
            lot_size: 100.0,
            stop_loss: 149.0,
            take_profit: 151.0,
            opened_at: Utc::now(),
            fee_rate: 0.0002,
            open_fee: 0.0,
        };
        let event = PositionEvent {
            event_type: PositionEventType::Open,
            position,
            price: 150.0,
            timestamp: Utc::now(),
            pnl: 0.0,
            fee_paid: 0.0,
            pips: 0.0,
        };
        controller.on_position_close(&event, Some(0.1)).await;
    }

    #[test]
    fn gate_rejects_wide_spread() {
        let controller = controller(true, false);
        assert!(!controller.gate(Some(1.0)));
        assert!(!controller.gate(Some(0.5)));
    }

    #[test]
    fn gate_rejects_when_trading_inactive() {
        let controller = controller(false, false);
        assert!(!controller.gate(Some(0.1)));
    }

    #[test]
    fn gate_rejects_during_blackout() {
        let controller = controller(true, true);
        assert!(!controller.gate(Some(0.1)));
    }
}
