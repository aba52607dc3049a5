// =============================================================================
// MarketStream — WebSocket ingestion orchestrator, per-tick fan-out
// =============================================================================
//
// The single ingestor task: connects, subscribes every configured symbol
// (rate-limited), and drives one tick at a time through the full pipeline to
// completion before pulling the next frame off the socket. This makes the
// per-tick ordering contract (see module docs on each component) a natural
// property of single-threaded execution rather than something enforced with
// locks.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::broadcast::{BroadcastHub, Event};
use crate::candles::CandleAggregator;
use crate::config::{EngineConfig, TradingConfig};
use crate::indicators::{IndicatorEngine, IndicatorStore};
use crate::live_trading::LiveTradingController;
use crate::positions::PositionManager;
use crate::rate_limiter::RateLimiter;
use crate::repository::EventRepository;
use crate::signals::SignalEngine;
use crate::types::{Candle, IndicatorSnapshot, PersistedEvent, PositionEvent, PositionEventType, SignalEvent, Tick, TradeAction};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Serialize)]
struct CandleEvent<'a> {
    symbol: &'a str,
    timeframe: &'a str,
    #[serde(flatten)]
    candle: Candle,
}

fn timeframe_label(tf_secs: i64) -> String {
    if tf_secs % 60 == 0 {
        format!("{}m", tf_secs / 60)
    } else {
        format!("{}s", tf_secs)
    }
}

fn value_to_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Best-effort decode of an inbound ticker frame into a `Tick`. Any of
/// `bid`/`ask`/`last`/`price` may be numbers or numeric strings; `price`
/// (when present and `last` is absent) is treated as `last`.
fn parse_tick(raw: &str) -> Option<Tick> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let symbol = value.get("symbol")?.as_str()?.to_string();
    let timestamp_raw = value.get("timestamp")?.as_str()?;
    let timestamp: DateTime<Utc> = timestamp_raw.parse().ok()?;

    let bid = value.get("bid").and_then(value_to_f64);
    let ask = value.get("ask").and_then(value_to_f64);
    let last = value
        .get("last")
        .and_then(value_to_f64)
        .or_else(|| value.get("price").and_then(value_to_f64));
    let volume = value.get("volume").and_then(value_to_f64).unwrap_or(0.0);

    Some(Tick { symbol, bid, ask, last, volume, timestamp })
}

pub struct MarketStream {
    endpoint: String,
    symbols: Vec<String>,
    timeframes: Vec<i64>,
    candles: Arc<CandleAggregator>,
    indicators: Arc<IndicatorEngine>,
    indicator_store: Arc<IndicatorStore>,
    signals: Arc<SignalEngine>,
    positions: Arc<PositionManager>,
    config: Arc<RwLock<TradingConfig>>,
    broadcast: Arc<BroadcastHub>,
    repository: Arc<dyn EventRepository>,
    live_trading: Arc<LiveTradingController>,
    subscribe_limiter: RateLimiter,
}

impl MarketStream {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        engine_config: &EngineConfig,
        candles: Arc<CandleAggregator>,
        indicators: Arc<IndicatorEngine>,
        indicator_store: Arc<IndicatorStore>,
        signals: Arc<SignalEngine>,
        positions: Arc<PositionManager>,
        config: Arc<RwLock<TradingConfig>>,
        broadcast: Arc<BroadcastHub>,
        repository: Arc<dyn EventRepository>,
        live_trading: Arc<LiveTradingController>,
    ) -> Self {
        Self {
            endpoint: engine_config.websocket_endpoint.clone(),
            symbols: engine_config.symbols.clone(),
            timeframes: vec![60, 300],
            candles,
            indicators,
            indicator_store,
            signals,
            positions,
            config,
            broadcast,
            repository,
            live_trading,
            subscribe_limiter: RateLimiter::per_second(1),
        }
    }

    /// Runs until `shutdown` is flipped to `true`. Reconnects with a 5s delay
    /// on any connection-level error; on shutdown, flushes open candles and
    /// publishes them before returning.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            if let Err(err) = self.connect_and_read(&mut shutdown).await {
                warn!(error = %err, "market stream connection failed, reconnecting");
                tokio::select! {
                    _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                    _ = shutdown.changed() => {}
                }
                continue;
            }

            if *shutdown.borrow() {
                break;
            }
        }

        self.flush_and_publish_open_candles();
    }

    async fn connect_and_read(&self, shutdown: &mut watch::Receiver<bool>) -> anyhow::Result<()> {
        let (mut ws, _) = tokio_tungstenite::connect_async(self.endpoint.as_str()).await?;
        info!(endpoint = %self.endpoint, "market stream connected");

        for symbol in &self.symbols {
            self.subscribe_limiter.acquire(symbol).await;
            let cmd = serde_json::json!({"command": "subscribe", "channel": "ticker", "symbol": symbol});
            ws.send(Message::Text(cmd.to_string())).await?;
        }

        loop {
            tokio::select! {
                frame = ws.next() => {
                    let Some(frame) = frame else {
                        anyhow::bail!("market stream closed by remote");
                    };
                    match frame? {
                        Message::Text(text) => self.handle_frame(&text).await,
                        Message::Close(_) => anyhow::bail!("market stream received close frame"),
                        _ => {}
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn handle_frame(&self, raw: &str) {
        let Some(tick) = parse_tick(raw) else {
            debug!(frame = raw, "dropping unparseable ticker frame");
            return;
        };
        let Some(price) = tick.price() else {
            debug!(symbol = %tick.symbol, "dropping ticker frame with no derivable price");
            return;
        };
        let spread = tick.spread();
        let cfg = self.config.read().clone();

        self.broadcast.publish(Event::new("ticker", &tick));

        if let Some(close_event) = self.positions.evaluate_price(&tick.symbol, price, tick.timestamp, cfg.pip_size) {
            self.broadcast.publish(Event::new("position", &close_event));

            let close_signal = self.synthesize_close_signal(&tick.symbol, &close_event, price, tick.timestamp);
            self.signals.record_close_event(close_signal.clone());
            self.broadcast.publish(Event::new("signal", &close_signal));

            self.persist_signal(&close_signal).await;
            self.persist_position(&close_event).await;
            self.live_trading.on_position_close(&close_event, spread).await;
        }

        let closed = self.candles.add_tick(&tick.symbol, price, tick.volume, tick.timestamp);
        for (tf_secs, candle) in closed {
            let timeframe = timeframe_label(tf_secs);
            self.broadcast.publish(Event::new(
                "candle",
                &CandleEvent { symbol: &tick.symbol, timeframe: &timeframe, candle },
            ));

            let history = self.candles.closed_candles(&tick.symbol, tf_secs);
            let snapshot = self.indicators.handle_candle(&tick.symbol, &timeframe, &history);
            self.indicator_store.set_snapshot(snapshot.clone());
            self.broadcast.publish(Event::new("indicator", &snapshot));
        }

        for &tf_secs in &self.timeframes {
            let timeframe = timeframe_label(tf_secs);
            let Some(snapshot) = self.indicator_store.get_snapshot(&tick.symbol, &timeframe) else { continue };
            let history = self.candles.closed_candles(&tick.symbol, tf_secs);
            let signals = self.signals.evaluate(&tick.symbol, &timeframe, price, &snapshot, tick.timestamp, &history);

            for mut signal in signals {
                let position_event = self.positions.handle_signal(
                    &cfg,
                    &signal.symbol,
                    &signal.strategy,
                    signal.direction,
                    signal.price,
                    signal.occurred_at,
                );
                signal.trade_action = match &position_event {
                    Some(ev) if ev.event_type == PositionEventType::Open => TradeAction::Open,
                    Some(ev) if ev.event_type == PositionEventType::Reverse => TradeAction::Reverse,
                    _ => TradeAction::None,
                };

                self.broadcast.publish(Event::new("signal", &signal));
                self.persist_signal(&signal).await;

                if let Some(ev) = position_event {
                    self.broadcast.publish(Event::new("position", &ev));
                    self.persist_position(&ev).await;
                    self.live_trading.on_signal(&signal, spread).await;
                }
            }
        }
    }

    fn synthesize_close_signal(&self, symbol: &str, event: &PositionEvent, price: f64, ts: DateTime<Utc>) -> SignalEvent {
        let snapshot = self
            .indicator_store
            .get_snapshot(symbol, "1m")
            .unwrap_or_else(|| IndicatorSnapshot::fallback(symbol, "1m", price, ts));

        SignalEvent {
            symbol: symbol.to_string(),
            timeframe: snapshot.timeframe.clone(),
            direction: event.position.direction,
            price,
            occurred_at: ts,
            indicator_snapshot: snapshot,
            strategy: event.position.strategy.clone(),
            trade_action: TradeAction::Close,
            pnl: Some(event.pnl),
            pips: Some(event.pips),
        }
    }

    async fn persist_signal(&self, signal: &SignalEvent) {
        let record = PersistedEvent {
            id: Uuid::new_v4(),
            symbol: signal.symbol.clone(),
            timeframe: signal.timeframe.clone(),
            direction: Some(signal.direction),
            trade_action: signal.trade_action,
            strategy: signal.strategy.clone(),
            occurred_at: signal.occurred_at,
            price: signal.price,
            pnl: signal.pnl.unwrap_or(0.0),
            pips: signal.pips.unwrap_or(0.0),
            payload: serde_json::to_value(signal).unwrap_or(Value::Null),
            created_at: Utc::now(),
        };
        if let Err(err) = self.repository.record(record).await {
            warn!(%err, "failed to persist signal event");
        }
    }

    async fn persist_position(&self, event: &PositionEvent) {
        let trade_action = if event.event_type == PositionEventType::Open { TradeAction::Open } else { TradeAction::Close };
        let record = PersistedEvent {
            id: Uuid::new_v4(),
            symbol: event.position.symbol.clone(),
            timeframe: String::new(),
            direction: Some(event.position.direction),
            trade_action,
            strategy: event.position.strategy.clone(),
            occurred_at: event.timestamp,
            price: event.price,
            pnl: event.pnl,
            pips: event.pips,
            payload: serde_json::to_value(event).unwrap_or(Value::Null),
            created_at: Utc::now(),
        };
        if let Err(err) = self.repository.record(record).await {
            warn!(%err, "failed to persist position event");
        }
    }

    fn flush_and_publish_open_candles(&self) {
        for (symbol, tf_secs, candle) in self.candles.flush_open() {
            let timeframe = timeframe_label(tf_secs);
            self.broadcast.publish(Event::new(
                "candle",
                &CandleEvent { symbol: &symbol, timeframe: &timeframe, candle },
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_tick_accepts_numeric_and_string_fields() {
        let raw = r#"{"symbol":"USD_JPY","timestamp":"2026-07-28T00:00:00Z","bid":"150.00","ask":150.02,"volume":"1.5"}"#;
        let tick = parse_tick(raw).unwrap();
        assert_eq!(tick.symbol, "USD_JPY");
        assert_eq!(tick.bid, Some(150.0));
        assert_eq!(tick.ask, Some(150.02));
        assert_eq!(tick.volume, 1.5);
    }

    #[test]
    fn parse_tick_falls_back_to_generic_price_field() {
        let raw = r#"{"symbol":"USD_JPY","timestamp":"2026-07-28T00:00:00Z","price":150.5}"#;
        let tick = parse_tick(raw).unwrap();
        assert_eq!(tick.last, Some(150.5));
        assert_eq!(tick.price(), Some(150.5));
    }

    #[test]
    fn parse_tick_rejects_missing_symbol() {
        let raw = r#"{"timestamp":"2026-07-28T00:00:00Z","price":150.5}"#;
        assert!(parse_tick(raw).is_none());
    }

    #[test]
    fn timeframe_label_formats_minutes() {
        assert_eq!(timeframe_label(60), "1m");
        assert_eq!(timeframe_label(300), "5m");
    }
}
