// =============================================================================
// Signals Module
// =============================================================================
//
// Multi-strategy signal evaluation over rolling indicator snapshots: a
// sum-type strategy dispatch table (`strategies`), cooldown/dedup-gated
// admission and bounded per-strategy history (`engine`).

pub mod engine;
pub mod strategies;

pub use engine::{SignalEngine, SignalEngineConfig, StrategySummary};
pub use strategies::StrategyKind;
