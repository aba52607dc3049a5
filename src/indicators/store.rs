// =============================================================================
// IndicatorStore — last-value cache, keyed by (symbol, timeframe)
// =============================================================================

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::types::IndicatorSnapshot;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Key {
    symbol: String,
    timeframe: String,
}

#[derive(Default)]
pub struct IndicatorStore {
    snapshots: RwLock<HashMap<Key, IndicatorSnapshot>>,
}

impl IndicatorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_snapshot(&self, snapshot: IndicatorSnapshot) {
        let key = Key { symbol: snapshot.symbol.clone(), timeframe: snapshot.timeframe.clone() };
        self.snapshots.write().insert(key, snapshot);
    }

    pub fn get_snapshot(&self, symbol: &str, timeframe: &str) -> Option<IndicatorSnapshot> {
        let key = Key { symbol: symbol.to_string(), timeframe: timeframe.to_string() };
        self.snapshots.read().get(&key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn set_then_get_roundtrips() {
        let store = IndicatorStore::new();
        let snap = IndicatorSnapshot::fallback("USD_JPY", "1m", 150.0, Utc::now());
        store.set_snapshot(snap.clone());
        let got = store.get_snapshot("USD_JPY", "1m").unwrap();
        assert_eq!(got.symbol, "USD_JPY");
    }

    #[test]
    fn missing_key_returns_none() {
        let store = IndicatorStore::new();
        assert!(store.get_snapshot("EUR_USD", "1m").is_none());
    }
}
