// =============================================================================
// Strategy table — one pure function per strategy, dispatched by a sum type
// =============================================================================
//
// Each strategy is a pure function of "current snapshot + previous snapshot
// + recent candles + the other timeframe's snapshot" to "does this admit a
// signal, and in which direction". Keeping strategies as data (a
// `StrategyKind` enum matched in one place) rather than trait objects keeps
// the dispatch table exhaustive and easy to extend with a compiler-checked
// match.
// =============================================================================

use crate::types::{Candle, Direction, IndicatorSnapshot};

const SMA_FAST: &str = "5";
const SMA_SLOW: &str = "21";
const RSI_PERIOD: &str = "14";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    BollingerMeanReversion,
    MaTouchBounce,
    FakeBreakout,
    MaCross,
    TrendPullback,
}

impl StrategyKind {
    pub fn name(self) -> &'static str {
        match self {
            StrategyKind::BollingerMeanReversion => "bb_mean_reversion",
            StrategyKind::MaTouchBounce => "ma_touch_bounce",
            StrategyKind::FakeBreakout => "fake_breakout",
            StrategyKind::MaCross => "ma_cross",
            StrategyKind::TrendPullback => "trend_pullback",
        }
    }

    /// Strategies evaluated for 1-minute candles.
    pub fn for_1m() -> &'static [StrategyKind] {
        &[
            StrategyKind::BollingerMeanReversion,
            StrategyKind::MaTouchBounce,
            StrategyKind::FakeBreakout,
            StrategyKind::MaCross,
            StrategyKind::TrendPullback,
        ]
    }

    /// Strategies evaluated for 5-minute candles.
    pub fn for_5m() -> &'static [StrategyKind] {
        &[StrategyKind::MaTouchBounce]
    }

    pub fn evaluate(self, ctx: &StrategyContext) -> Option<Direction> {
        match self {
            StrategyKind::BollingerMeanReversion => bb_mean_reversion(ctx),
            StrategyKind::MaTouchBounce => ma_touch_bounce(ctx),
            StrategyKind::FakeBreakout => fake_breakout(ctx),
            StrategyKind::MaCross => ma_cross(ctx),
            StrategyKind::TrendPullback => trend_pullback(ctx),
        }
    }
}

pub struct StrategyContext<'a> {
    pub price: f64,
    pub snapshot: &'a IndicatorSnapshot,
    pub prev: Option<&'a IndicatorSnapshot>,
    /// Closed candles for this (symbol, timeframe), oldest first, ending
    /// with the candle that just closed.
    pub candles: &'a [Candle],
    /// Looks up the latest snapshot cached for another timeframe of the same
    /// symbol, e.g. `(other_timeframe)("5m")`.
    pub other_timeframe: &'a dyn Fn(&str) -> Option<IndicatorSnapshot>,
    pub pip_size: f64,
    /// The single configured Bollinger key, e.g. "20_2".
    pub bb_key: &'a str,
}

/// Price at or beyond a band with RSI14 confirming overbought/oversold and
/// the trend not running against the reversion.
fn bb_mean_reversion(ctx: &StrategyContext) -> Option<Direction> {
    let bb = ctx.snapshot.bb.get(ctx.bb_key)?;
    let rsi = *ctx.snapshot.rsi.get(RSI_PERIOD)?;
    let trend_dir = ctx.snapshot.trend.direction.as_str();

    if ctx.price >= bb.upper && rsi >= 70.0 && matches!(trend_dir, "flat" | "up") {
        return Some(Direction::Sell);
    }
    if ctx.price <= bb.lower && rsi <= 30.0 && matches!(trend_dir, "flat" | "down") {
        return Some(Direction::Buy);
    }
    None
}

/// SMA21 sits inside the last candle's [low, high] range and the candle
/// closed on the side of it implied by the established trend.
fn ma_touch_bounce(ctx: &StrategyContext) -> Option<Direction> {
    let last = ctx.candles.last()?;
    let sma21 = *ctx.snapshot.sma.get(SMA_SLOW)?;

    if sma21 < last.low || sma21 > last.high {
        return None;
    }

    match ctx.snapshot.trend.direction.as_str() {
        "up" if last.close > sma21 => Some(Direction::Buy),
        "down" if last.close < sma21 => Some(Direction::Sell),
        _ => None,
    }
}

/// The last candle pierces the high/low of the preceding 5-candle base but
/// closes back inside it — a failed breakout, only traded while both the 1m
/// and 5m trends are flat (no directional conviction to be faded).
fn fake_breakout(ctx: &StrategyContext) -> Option<Direction> {
    if ctx.candles.len() < 6 {
        return None;
    }
    if ctx.snapshot.trend.direction != "flat" {
        return None;
    }
    let other_flat = (ctx.other_timeframe)("5m").map(|s| s.trend.direction == "flat").unwrap_or(true);
    if !other_flat {
        return None;
    }

    let n = ctx.candles.len();
    let base = &ctx.candles[n - 6..n - 1];
    let last = &ctx.candles[n - 1];

    let base_high = base.iter().fold(f64::MIN, |acc, c| acc.max(c.high));
    let base_low = base.iter().fold(f64::MAX, |acc, c| acc.min(c.low));

    if last.high > base_high && last.close <= base_high {
        return Some(Direction::Sell);
    }
    if last.low < base_low && last.close >= base_low {
        return Some(Direction::Buy);
    }
    None
}

/// SMA5 crosses SMA21, sampled against the previous snapshot, in the
/// direction the established trend is already running.
fn ma_cross(ctx: &StrategyContext) -> Option<Direction> {
    let prev = ctx.prev?;
    let cur_fast = *ctx.snapshot.sma.get(SMA_FAST)?;
    let cur_slow = *ctx.snapshot.sma.get(SMA_SLOW)?;
    let prev_fast = *prev.sma.get(SMA_FAST)?;
    let prev_slow = *prev.sma.get(SMA_SLOW)?;

    if prev_fast <= prev_slow && cur_fast > cur_slow && ctx.snapshot.trend.direction != "down" {
        return Some(Direction::Buy);
    }
    if prev_fast >= prev_slow && cur_fast < cur_slow && ctx.snapshot.trend.direction != "up" {
        return Some(Direction::Sell);
    }
    None
}

/// An established trend pulls back to SMA5 — touched by the last candle's
/// range — while price stays on the trend side of SMA21, then resumes.
fn trend_pullback(ctx: &StrategyContext) -> Option<Direction> {
    if !ctx.snapshot.trend.ready {
        return None;
    }
    let last = ctx.candles.last()?;
    let sma5 = *ctx.snapshot.sma.get(SMA_FAST)?;
    let sma21 = *ctx.snapshot.sma.get(SMA_SLOW)?;

    let touched_sma5 = sma5 >= last.low && sma5 <= last.high;
    if !touched_sma5 {
        return None;
    }

    match ctx.snapshot.trend.direction.as_str() {
        "up" if last.close > sma21 => Some(Direction::Buy),
        "down" if last.close < sma21 => Some(Direction::Sell),
        _ => None,
    }
}
