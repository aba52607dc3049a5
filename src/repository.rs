// =============================================================================
// EventRepository — persists PersistedEvent records for later analysis
// =============================================================================
//
// The actual relational schema is out of scope (spec.md §1); the pipeline
// only needs a narrow interface it can hold behind `Arc<dyn EventRepository>`
// so storage is swappable. Two implementations are provided: an in-memory
// bounded ring buffer (default, and what tests exercise) and a newline-
// delimited JSON file for operators who want a durable trail without standing
// up a database.
// =============================================================================

use std::collections::VecDeque;
use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use crate::types::PersistedEvent;

const DEFAULT_RING_CAPACITY: usize = 5_000;

#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn record(&self, record: PersistedEvent) -> anyhow::Result<()>;
    async fn recent(&self, limit: usize) -> anyhow::Result<Vec<PersistedEvent>>;
}

/// Bounded ring buffer behind a lock. Used by default and in tests.
pub struct InMemoryEventRepository {
    capacity: usize,
    events: Mutex<VecDeque<PersistedEvent>>,
}

impl InMemoryEventRepository {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, events: Mutex::new(VecDeque::new()) }
    }
}

impl Default for InMemoryEventRepository {
    fn default() -> Self {
        Self::new(DEFAULT_RING_CAPACITY)
    }
}

#[async_trait]
impl EventRepository for InMemoryEventRepository {
    async fn record(&self, record: PersistedEvent) -> anyhow::Result<()> {
        let mut events = self.events.lock();
        events.push_back(record);
        while events.len() > self.capacity {
            events.pop_front();
        }
        Ok(())
    }

    async fn recent(&self, limit: usize) -> anyhow::Result<Vec<PersistedEvent>> {
        let events = self.events.lock();
        Ok(events.iter().rev().take(limit).cloned().collect())
    }
}

/// Appends one JSON object per line to `path`. `recent` re-reads the tail of
/// the file rather than keeping a parallel in-memory index — this is a
/// durability convenience, not a query engine.
pub struct JsonFileEventRepository {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileEventRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_lock: Mutex::new(()) }
    }
}

#[async_trait]
impl EventRepository for JsonFileEventRepository {
    async fn record(&self, record: PersistedEvent) -> anyhow::Result<()> {
        let line = serde_json::to_string(&record)?;
        let _guard = self.write_lock.lock();
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path).await?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        Ok(())
    }

    async fn recent(&self, limit: usize) -> anyhow::Result<Vec<PersistedEvent>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        // `.lines().rev()` walks the file newest-first, matching
        // `InMemoryEventRepository::recent`'s ordering.
        let out: Vec<PersistedEvent> = content
            .lines()
            .rev()
            .take(limit)
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Direction, TradeAction};
    use chrono::Utc;
    use uuid::Uuid;

    fn sample(symbol: &str) -> PersistedEvent {
        PersistedEvent {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            timeframe: "1m".to_string(),
            direction: Some(Direction::Buy),
            trade_action: TradeAction::Open,
            strategy: "bb".to_string(),
            occurred_at: Utc::now(),
            price: 150.0,
            pnl: 0.0,
            pips: 0.0,
            payload: serde_json::json!({}),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn in_memory_returns_newest_first() {
        let repo = InMemoryEventRepository::new(10);
        repo.record(sample("USD_JPY")).await.unwrap();
        repo.record(sample("EUR_USD")).await.unwrap();
        let recent = repo.recent(10).await.unwrap();
        assert_eq!(recent[0].symbol, "EUR_USD");
        assert_eq!(recent[1].symbol, "USD_JPY");
    }

    #[tokio::test]
    async fn in_memory_evicts_oldest_past_capacity() {
        let repo = InMemoryEventRepository::new(2);
        repo.record(sample("A")).await.unwrap();
        repo.record(sample("B")).await.unwrap();
        repo.record(sample("C")).await.unwrap();
        let recent = repo.recent(10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].symbol, "C");
        assert_eq!(recent[1].symbol, "B");
    }

    #[tokio::test]
    async fn json_file_roundtrips_and_appends() {
        let dir = std::env::temp_dir().join(format!("aurafx-repo-test-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("events.jsonl");
        let repo = JsonFileEventRepository::new(&path);

        repo.record(sample("USD_JPY")).await.unwrap();
        repo.record(sample("EUR_USD")).await.unwrap();

        let recent = repo.recent(10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].symbol, "EUR_USD");
        assert_eq!(recent[1].symbol, "USD_JPY");

        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn json_file_missing_returns_empty() {
        let repo = JsonFileEventRepository::new("/nonexistent/dir/events.jsonl");
        let recent = repo.recent(10).await.unwrap();
        assert!(recent.is_empty());
    }
}
