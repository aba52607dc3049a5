// =============================================================================
// RateLimiter — per-key sliding-window admission, async `acquire`
// =============================================================================

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

struct Window {
    timestamps: Vec<Instant>,
}

/// For key *k*, `acquire(k)` waits until fewer than `max_calls` timestamps
/// have been recorded for *k* within the trailing `interval`, then records
/// *now* and returns. Used to pace WebSocket channel subscriptions (default
/// 1/sec).
pub struct RateLimiter {
    max_calls: usize,
    interval: Duration,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(max_calls: usize, interval: Duration) -> Self {
        Self { max_calls, interval, windows: Mutex::new(HashMap::new()) }
    }

    /// One call admitted per `interval`, used for WS subscribe pacing.
    pub fn per_second(max_calls: usize) -> Self {
        Self::new(max_calls, Duration::from_secs(1))
    }

    pub async fn acquire(&self, key: &str) {
        loop {
            let wait = {
                let mut windows = self.windows.lock();
                let window = windows.entry(key.to_string()).or_insert_with(|| Window { timestamps: Vec::new() });
                let now = Instant::now();
                window.timestamps.retain(|&t| now.duration_since(t) < self.interval);

                if window.timestamps.len() < self.max_calls {
                    window.timestamps.push(now);
                    None
                } else {
                    let oldest = window.timestamps[0];
                    Some(self.interval.saturating_sub(now.duration_since(oldest)))
                }
            };

            match wait {
                None => return,
                Some(d) => tokio::time::sleep(d).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn admits_up_to_max_calls_immediately() {
        let limiter = RateLimiter::new(2, Duration::from_secs(1));
        let start = Instant::now();
        limiter.acquire("USD_JPY").await;
        limiter.acquire("USD_JPY").await;
        assert!(Instant::now().duration_since(start) < Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn blocks_until_window_frees_a_slot() {
        let limiter = RateLimiter::new(1, Duration::from_secs(1));
        limiter.acquire("USD_JPY").await;

        let start = Instant::now();
        limiter.acquire("USD_JPY").await;
        let elapsed = Instant::now().duration_since(start);
        assert!(elapsed >= Duration::from_millis(900));
    }

    #[tokio::test(start_paused = true)]
    async fn keys_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(1));
        limiter.acquire("USD_JPY").await;
        let start = Instant::now();
        limiter.acquire("EUR_USD").await;
        assert!(Instant::now().duration_since(start) < Duration::from_millis(50));
    }
}
