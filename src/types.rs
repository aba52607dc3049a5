// =============================================================================
// Shared types used across the trading engine
// =============================================================================

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single ticker update from the exchange, as received on the wire. Price
/// is derived from whichever of `bid`/`ask`/`last` are present (see `price`);
/// `spread` is the raw ask-minus-bid distance used by the live trading gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: String,
    #[serde(default)]
    pub bid: Option<f64>,
    #[serde(default)]
    pub ask: Option<f64>,
    #[serde(default)]
    pub last: Option<f64>,
    #[serde(default)]
    pub volume: f64,
    pub timestamp: DateTime<Utc>,
}

impl Tick {
    /// `(bid+ask)/2` when both sides are present, else whichever side is
    /// available, else `last`.
    pub fn price(&self) -> Option<f64> {
        match (self.bid, self.ask) {
            (Some(b), Some(a)) => Some((b + a) / 2.0),
            (Some(b), None) => Some(b),
            (None, Some(a)) => Some(a),
            (None, None) => self.last,
        }
    }

    /// `ask - bid` when both sides are quoted, else `None` (no spread can be
    /// derived from a `last`-only tick).
    pub fn spread(&self) -> Option<f64> {
        match (self.bid, self.ask) {
            (Some(b), Some(a)) => Some(a - b),
            _ => None,
        }
    }
}

/// One OHLCV bar for a given symbol/timeframe bucket.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn open_at(price: f64, volume: f64, open_time: DateTime<Utc>, close_time: DateTime<Utc>) -> Self {
        Self {
            open_time,
            close_time,
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
        }
    }

    pub fn absorb(&mut self, price: f64, volume: f64, close_time: DateTime<Utc>) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
        self.volume += volume;
        self.close_time = close_time;
    }
}

/// Trade direction. `None` is only ever used for signal events that carry no
/// directional bias (never for an open position).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    pub fn sign(self) -> f64 {
        match self {
            Direction::Buy => 1.0,
            Direction::Sell => -1.0,
        }
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::Buy => Direction::Sell,
            Direction::Sell => Direction::Buy,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Buy => write!(f, "BUY"),
            Direction::Sell => write!(f, "SELL"),
        }
    }
}

/// What a signal is asking the position layer to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    None,
    Open,
    Close,
    Reverse,
}


/// Trend reading attached to an indicator snapshot: a linear regression of
/// the trend-SMA series over `window` samples. `slope`/`slope_pips` are
/// absent until `ready` (matching spec.md §3's `trend{...}` shape exactly).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendReading {
    pub method: &'static str, // always "regression"
    pub window: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slope: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slope_pips: Option<f64>,
    pub direction: String, // "up" | "down" | "flat"
    pub ready: bool,
}

impl TrendReading {
    pub fn not_ready() -> Self {
        Self { method: "regression", window: 0, slope: None, slope_pips: None, direction: "flat".to_string(), ready: false }
    }
}

/// Rolling indicator readings for one (symbol, timeframe) at the time its
/// most recent candle closed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub symbol: String,
    pub timeframe: String,
    pub timestamp: DateTime<Utc>,
    pub close: f64,
    #[serde(default)]
    pub sma: BTreeMap<String, f64>,
    #[serde(default)]
    pub rsi: BTreeMap<String, f64>,
    #[serde(default)]
    pub rci: BTreeMap<String, f64>,
    #[serde(default)]
    pub bb: BTreeMap<String, BollingerBand>,
    #[serde(default)]
    pub atr: BTreeMap<String, f64>,
    pub trend: TrendReading,
}

impl IndicatorSnapshot {
    /// The spec's authoritative fallback used when a close-derived signal
    /// has to be recorded with no live snapshot on hand.
    pub fn fallback(symbol: &str, timeframe: &str, close: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
            timestamp,
            close,
            sma: BTreeMap::new(),
            rsi: BTreeMap::new(),
            rci: BTreeMap::new(),
            bb: BTreeMap::new(),
            atr: BTreeMap::new(),
            trend: TrendReading::not_ready(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BollingerBand {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// An open (or closed) trading position, keyed by `(symbol, strategy)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub symbol: String,
    pub strategy: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub lot_size: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub opened_at: DateTime<Utc>,
    pub fee_rate: f64,
    pub open_fee: f64,
}

impl Position {
    /// Unrealised P&L at `price`, ignoring fees.
    pub fn unrealized(&self, price: f64) -> f64 {
        (price - self.entry_price) * self.lot_size * self.direction.sign()
    }
}

/// Emitted whenever a position opens or closes. `Reverse` is reserved for a
/// future close-then-reopen policy (see `PositionManager`'s no-auto-reverse
/// behaviour); it is never produced by the current implementation but is part
/// of the external event shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionEventType {
    Open,
    Reverse,
    StopLoss,
    TakeProfit,
    ManualClose,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionEvent {
    pub event_type: PositionEventType,
    pub position: Position,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    pub pnl: f64,
    pub fee_paid: f64,
    pub pips: f64,
}

/// Emitted by the signal engine (and by close-derived bookkeeping) whenever a
/// strategy produces an admissible event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalEvent {
    pub symbol: String,
    pub timeframe: String,
    pub direction: Direction,
    pub price: f64,
    pub occurred_at: DateTime<Utc>,
    pub indicator_snapshot: IndicatorSnapshot,
    pub strategy: String,
    pub trade_action: TradeAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pnl: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pips: Option<f64>,
}

impl SignalEvent {
    /// The indicator timestamp used for the signal engine's dedup key — the
    /// timestamp of the candle whose close produced `indicator_snapshot`.
    pub fn indicator_timestamp(&self) -> DateTime<Utc> {
        self.indicator_snapshot.timestamp
    }
}

/// A durable record of anything the engine wants to keep for later review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedEvent {
    pub id: Uuid,
    pub symbol: String,
    pub timeframe: String,
    pub direction: Option<Direction>,
    pub trade_action: TradeAction,
    pub strategy: String,
    pub occurred_at: DateTime<Utc>,
    pub price: f64,
    pub pnl: f64,
    pub pips: f64,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
