// =============================================================================
// OrderDispatcher — single background worker, paced, retried, skip-aware
// =============================================================================
//
// Bridges fire-and-forget signal/position events to a synchronous,
// rate-limited broker API: a single worker task drains a FIFO of jobs,
// respecting a minimum interval between successfully-sent requests and
// retrying transient broker failures with exponential backoff.
// =============================================================================

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::errors::{BrokerError, JobError};

pub type JobOutput = serde_json::Value;
pub type JobFuture = Pin<Box<dyn Future<Output = Result<JobOutput, JobError>> + Send>>;
pub type JobFactory = Box<dyn Fn() -> JobFuture + Send + Sync>;

const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(1100);
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(500);

/// What `submit`'s caller ultimately observes: the factory's success value, a
/// soft skip (no error, no retry), or a hard failure surfaced after retries
/// are exhausted (spec §4.8 step 3/4: "other status codes → surface to
/// caller immediately").
#[derive(Debug, thiserror::Error)]
pub enum DispatchOutcome {
    #[error("dispatch skipped")]
    Skipped,
    #[error(transparent)]
    Failed(#[from] BrokerError),
}

pub type JobResult = Result<JobOutput, DispatchOutcome>;

struct Job {
    description: String,
    factory: JobFactory,
    reply: oneshot::Sender<JobResult>,
}

enum QueueEntry {
    Job(Job),
    Stop(oneshot::Sender<()>),
}

#[derive(Clone)]
pub struct OrderDispatcher {
    tx: mpsc::UnboundedSender<QueueEntry>,
}

pub struct DispatcherConfig {
    pub min_interval: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            min_interval: DEFAULT_MIN_INTERVAL,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
        }
    }
}

impl OrderDispatcher {
    /// Starts the background worker immediately (submissions before the
    /// first job still queue correctly since the channel is unbounded).
    pub fn spawn(config: DispatcherConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(rx, config));
        Self { tx }
    }

    /// Enqueue a job. The returned future resolves with the factory's value
    /// on success, `Err(DispatchOutcome::Skipped)` if the factory raised
    /// `DispatchSkip` (no retry, no error), or `Err(DispatchOutcome::Failed)`
    /// once retries are exhausted. If the dispatcher itself has shut down
    /// without processing the job this is also reported as `Skipped`.
    pub async fn submit(&self, description: impl Into<String>, factory: JobFactory) -> JobResult {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job = Job { description: description.into(), factory, reply: reply_tx };
        if self.tx.send(QueueEntry::Job(job)).is_err() {
            return Err(DispatchOutcome::Skipped);
        }
        reply_rx.await.unwrap_or(Err(DispatchOutcome::Skipped))
    }

    /// Enqueue a sentinel and wait for the worker to drain and exit.
    pub async fn stop(&self) {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(QueueEntry::Stop(tx)).is_ok() {
            let _ = rx.await;
        }
    }
}

async fn run_worker(mut rx: mpsc::UnboundedReceiver<QueueEntry>, config: DispatcherConfig) {
    let mut last_sent_at: Option<Instant> = None;

    while let Some(entry) = rx.recv().await {
        let job = match entry {
            QueueEntry::Job(job) => job,
            QueueEntry::Stop(done) => {
                let _ = done.send(());
                break;
            }
        };

        if let Some(last) = last_sent_at {
            let elapsed = last.elapsed();
            if elapsed < config.min_interval {
                tokio::time::sleep(config.min_interval - elapsed).await;
            }
        }

        let mut attempt: u32 = 1;
        let result: JobResult = loop {
            match (job.factory)().await {
                Ok(value) => break Ok(value),
                Err(JobError::Skip(reason)) => {
                    info!(description = %job.description, %reason, "dispatch skipped");
                    break Err(DispatchOutcome::Skipped);
                }
                Err(JobError::Broker(err)) => {
                    let retryable = matches!(err, BrokerError::Transient(_) | BrokerError::Transport(_));
                    if !retryable || attempt >= config.max_retries {
                        warn!(description = %job.description, %err, attempt, "dispatch job failed, giving up");
                        break Err(DispatchOutcome::Failed(err));
                    }
                    let delay = config.backoff_base * 2u32.pow(attempt - 1);
                    warn!(description = %job.description, %err, attempt, delay_ms = delay.as_millis() as u64, "retrying dispatch job");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        };

        if result.is_ok() {
            last_sent_at = Some(Instant::now());
        }
        let _ = job.reply.send(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn ok_factory(value: serde_json::Value) -> JobFactory {
        Box::new(move || {
            let value = value.clone();
            Box::pin(async move { Ok(value) })
        })
    }

    #[tokio::test]
    async fn submit_resolves_with_factory_result() {
        let dispatcher = OrderDispatcher::spawn(DispatcherConfig { min_interval: Duration::ZERO, ..Default::default() });
        let out = dispatcher.submit("test", ok_factory(serde_json::json!({"ok": true}))).await;
        assert_eq!(out.unwrap(), serde_json::json!({"ok": true}));
    }

    #[tokio::test]
    async fn dispatch_skip_resolves_as_skipped() {
        let dispatcher = OrderDispatcher::spawn(DispatcherConfig { min_interval: Duration::ZERO, ..Default::default() });
        let factory: JobFactory = Box::new(|| {
            Box::pin(async move { Err(JobError::Skip(crate::errors::DispatchSkip("blackout".into()))) })
        });
        let out = dispatcher.submit("test", factory).await;
        assert!(matches!(out, Err(DispatchOutcome::Skipped)));
    }

    #[tokio::test]
    async fn transient_errors_retry_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let factory: JobFactory = Box::new(move || {
            let calls = calls_clone.clone();
            Box::pin(async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(JobError::Broker(BrokerError::Transient(503)))
                } else {
                    Ok(serde_json::json!({"attempt": n}))
                }
            })
        });

        let dispatcher = OrderDispatcher::spawn(DispatcherConfig {
            min_interval: Duration::ZERO,
            backoff_base: Duration::from_millis(1),
            ..Default::default()
        });
        let out = dispatcher.submit("test", factory).await;
        assert_eq!(out.unwrap(), serde_json::json!({"attempt": 2}));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_surface_to_caller_without_retry() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let factory: JobFactory = Box::new(move || {
            let calls = calls_clone.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(JobError::Broker(BrokerError::Permanent(400, "bad request".into())))
            })
        });

        let dispatcher = OrderDispatcher::spawn(DispatcherConfig { min_interval: Duration::ZERO, ..Default::default() });
        let out = dispatcher.submit("test", factory).await;
        assert!(matches!(out, Err(DispatchOutcome::Failed(BrokerError::Permanent(400, _)))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stop_drains_queue_and_joins() {
        let dispatcher = OrderDispatcher::spawn(DispatcherConfig { min_interval: Duration::ZERO, ..Default::default() });
        let out = dispatcher.submit("test", ok_factory(serde_json::json!(1))).await;
        assert_eq!(out.unwrap(), serde_json::json!(1));
        dispatcher.stop().await;
    }
}
