// =============================================================================
// AppState — wires every subsystem together behind Arc
// =============================================================================
//
// Component state (CandleAggregator, IndicatorEngine/Store, SignalEngine,
// PositionManager, the last-price map) is owned and mutated exclusively by
// the pipeline task (`MarketStream::run`); AppState exists so the HTTP/WS API
// can reach the same `Arc`s for read access and so `TradingConfig` mutations
// from the API are visible to the pipeline on its next tick.
// =============================================================================

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;

use crate::blackout::BlackoutCalendar;
use crate::broadcast::BroadcastHub;
use crate::broker::GmoClient;
use crate::candles::CandleAggregator;
use crate::config::{EngineConfig, TradingConfig};
use crate::dispatcher::{DispatcherConfig, OrderDispatcher};
use crate::indicators::{IndicatorEngine, IndicatorStore};
use crate::live_trading::LiveTradingController;
use crate::market_stream::MarketStream;
use crate::positions::PositionManager;
use crate::repository::EventRepository;
use crate::signals::{SignalEngine, SignalEngineConfig};

const CANDLE_TIMEFRAMES_SECS: [i64; 2] = [60, 300];

pub struct AppState {
    pub engine_config: EngineConfig,
    pub config: Arc<RwLock<TradingConfig>>,
    pub config_path: PathBuf,

    pub candles: Arc<CandleAggregator>,
    pub indicators: Arc<IndicatorEngine>,
    pub indicator_store: Arc<IndicatorStore>,
    pub signals: Arc<SignalEngine>,
    pub positions: Arc<PositionManager>,
    pub blackout: Arc<BlackoutCalendar>,
    pub broadcast: Arc<BroadcastHub>,
    pub dispatcher: Arc<OrderDispatcher>,
    pub broker: Option<Arc<GmoClient>>,
    pub repository: Arc<dyn EventRepository>,
    pub live_trading: Arc<LiveTradingController>,

    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        engine_config: EngineConfig,
        trading_config: TradingConfig,
        config_path: PathBuf,
        broker: Option<Arc<GmoClient>>,
        repository: Arc<dyn EventRepository>,
    ) -> Self {
        let config = Arc::new(RwLock::new(trading_config));

        let blackout = Arc::new(match config.read().blackout_windows.clone() {
            Some(windows) => BlackoutCalendar::new(windows),
            None => BlackoutCalendar::default(),
        });

        let candles = Arc::new(CandleAggregator::new(CANDLE_TIMEFRAMES_SECS.to_vec(), engine_config.candle_history));

        let (pip_size, trend_sma_period, trend_threshold_pips, atr_threshold_pips) = {
            let cfg = config.read();
            (cfg.pip_size, cfg.trend_sma_period, cfg.trend_threshold_pips, cfg.atr_threshold_pips)
        };

        let indicators = Arc::new(IndicatorEngine::new(
            engine_config.clone(),
            pip_size,
            trend_sma_period,
            trend_threshold_pips,
        ));
        let indicator_store = Arc::new(IndicatorStore::new());

        let signals = Arc::new(SignalEngine::new(
            SignalEngineConfig {
                cooldown: chrono::Duration::seconds(engine_config.signal_cooldown_sec),
                history_limit: engine_config.signal_history,
                atr_threshold_pips,
                atr_period: engine_config.atr_periods.first().copied().unwrap_or(14),
                pip_size,
            },
            blackout.clone(),
            indicator_store.clone(),
        ));

        let positions = Arc::new(PositionManager::new());
        let broadcast = Arc::new(BroadcastHub::new());
        let dispatcher = Arc::new(OrderDispatcher::spawn(DispatcherConfig::default()));

        let live_trading = Arc::new(LiveTradingController::new(
            broker.clone(),
            dispatcher.clone(),
            blackout.clone(),
            config.clone(),
        ));

        Self {
            engine_config,
            config,
            config_path,
            candles,
            indicators,
            indicator_store,
            signals,
            positions,
            blackout,
            broadcast,
            dispatcher,
            broker,
            repository,
            live_trading,
            start_time: Instant::now(),
        }
    }

    /// Build a fresh `MarketStream` wired to this state's shared components.
    /// Called once per connection lifecycle by `main.rs`'s ingestor task.
    pub fn market_stream(self: &Arc<Self>) -> MarketStream {
        MarketStream::new(
            &self.engine_config,
            self.candles.clone(),
            self.indicators.clone(),
            self.indicator_store.clone(),
            self.signals.clone(),
            self.positions.clone(),
            self.config.clone(),
            self.broadcast.clone(),
            self.repository.clone(),
            self.live_trading.clone(),
        )
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Persist the current `TradingConfig` to `config_path` (atomic tmp+rename).
    pub fn save_config(&self) -> anyhow::Result<()> {
        let cfg = self.config.read().clone();
        crate::config::save_trading_config(&cfg, &self.config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryEventRepository;

    #[test]
    fn new_wires_every_subsystem_without_panicking() {
        let dir = std::env::temp_dir().join(format!("aurafx-appstate-test-{}", uuid::Uuid::new_v4()));
        let config_path = dir.join("trading_config.json");
        let state = AppState::new(
            EngineConfig::default(),
            TradingConfig::default(),
            config_path,
            None,
            Arc::new(InMemoryEventRepository::default()),
        );
        assert!(state.broker.is_none());
        assert_eq!(state.broadcast.subscriber_count(), 0);
    }

    #[test]
    fn market_stream_can_be_built_from_shared_state() {
        let dir = std::env::temp_dir().join(format!("aurafx-appstate-test-{}", uuid::Uuid::new_v4()));
        let config_path = dir.join("trading_config.json");
        let state = Arc::new(AppState::new(
            EngineConfig::default(),
            TradingConfig::default(),
            config_path,
            None,
            Arc::new(InMemoryEventRepository::default()),
        ));
        let _stream = state.market_stream();
    }
}
