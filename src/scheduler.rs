//! Rate-limited FIFO task queue.
//! One tokio task drains an mpsc channel, so at most one operation is in
//! flight and results resolve in submission order. Before every attempt the
//! worker waits until `min_interval` has passed since the previous start.
//! Failures are retried along a literal backoff table, except content
//! refusals, which fail at once. When a task fails unrecoverably, it and
//! every task behind it are failed and the queue accepts no more work.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::QueueConfig;
use crate::translate::TranslateError;

#[derive(Debug, Clone, Error)]
pub enum QueueError {
    /// Policy refusal; only this task fails.
    #[error("task {key} refused: {source}")]
    Refused {
        key: String,
        #[source]
        source: TranslateError,
    },
    #[error("task {key} failed after {attempts} attempts: {last}")]
    Exhausted {
        key: String,
        attempts: u32,
        last: TranslateError,
    },
    #[error("task {key} failed: {source}")]
    Fatal {
        key: String,
        #[source]
        source: TranslateError,
    },
    /// Failed because an earlier task failed unrecoverably.
    #[error("task {key} aborted: {cause}")]
    Aborted {
        key: String,
        #[source]
        cause: Arc<QueueError>,
    },
    #[error("task queue closed")]
    Closed,
}

impl QueueError {
    /// Whether the queue stops after this error.
    pub fn is_unrecoverable(&self) -> bool {
        !matches!(self, QueueError::Refused { .. })
    }
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = Result<T, TranslateError>> + Send>>;
type Operation<T> = Box<dyn FnMut() -> BoxFuture<T> + Send>;

struct Job<T> {
    key: String,
    op: Operation<T>,
    reply: oneshot::Sender<Result<T, QueueError>>,
}

/// Handle for submitting work; dropping it stops the worker once the queue drains.
pub struct TaskQueue<T> {
    tx: mpsc::UnboundedSender<Job<T>>,
    worker: JoinHandle<()>,
}

impl<T: Send + 'static> TaskQueue<T> {
    /// Spawn the draining worker. Must be called inside a tokio runtime.
    pub fn new(config: &QueueConfig) -> Self {
        Self::with_schedule(config.min_interval(), config.backoff())
    }

    pub fn with_schedule(min_interval: Duration, backoff: Vec<Duration>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(rx, min_interval, backoff));
        Self { tx, worker }
    }

    /// Enqueue `op` under `key`. The task is queued immediately; the returned
    /// future resolves once it has run (or been failed).
    pub fn submit<F, Fut>(
        &self,
        key: impl Into<String>,
        mut op: F,
    ) -> impl Future<Output = Result<T, QueueError>> + Send + 'static
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, TranslateError>> + Send + 'static,
    {
        let (reply, rx) = oneshot::channel();
        let job = Job {
            key: key.into(),
            op: Box::new(move || Box::pin(op()) as BoxFuture<T>),
            reply,
        };
        let queued = self.tx.send(job).is_ok();
        async move {
            if !queued {
                return Err(QueueError::Closed);
            }
            rx.await.unwrap_or(Err(QueueError::Closed))
        }
    }

    /// Stop accepting work and wait for queued tasks to finish.
    pub async fn close(self) {
        drop(self.tx);
        if let Err(e) = self.worker.await {
            error!(error = %e, "task queue worker panicked");
        }
    }
}

async fn run_worker<T>(mut rx: mpsc::UnboundedReceiver<Job<T>>, min_interval: Duration, backoff: Vec<Duration>) {
    info!(min_interval_ms = min_interval.as_millis() as u64, retries = backoff.len(), "task queue worker started");
    let mut last_start: Option<Instant> = None;
    let mut poisoned: Option<Arc<QueueError>> = None;

    while let Some(mut job) = rx.recv().await {
        if let Some(cause) = &poisoned {
            abort(job, cause);
            continue;
        }

        let outcome = run_job(&mut job, &mut last_start, min_interval, &backoff).await;
        match outcome {
            Ok(value) => {
                let _ = job.reply.send(Ok(value));
            }
            Err(err) if err.is_unrecoverable() => {
                error!(key = %job.key, error = %err, "task failed unrecoverably, aborting queue");
                let cause = Arc::new(err.clone());
                let _ = job.reply.send(Err(err));
                while let Ok(waiting) = rx.try_recv() {
                    abort(waiting, &cause);
                }
                poisoned = Some(cause);
            }
            Err(err) => {
                let _ = job.reply.send(Err(err));
            }
        }
    }
    debug!("task queue worker exiting");
}

async fn run_job<T>(
    job: &mut Job<T>,
    last_start: &mut Option<Instant>,
    min_interval: Duration,
    backoff: &[Duration],
) -> Result<T, QueueError> {
    let mut retry = 0usize;
    loop {
        if let Some(prev) = *last_start {
            tokio::time::sleep_until(prev + min_interval).await;
        }
        *last_start = Some(Instant::now());

        let err = match (job.op)().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        if let TranslateError::ContentRefused(_) = err {
            warn!(key = %job.key, error = %err, "task refused, not retrying");
            return Err(QueueError::Refused {
                key: job.key.clone(),
                source: err,
            });
        }
        if !err.is_retryable() {
            return Err(QueueError::Fatal {
                key: job.key.clone(),
                source: err,
            });
        }
        let Some(&delay) = backoff.get(retry) else {
            return Err(QueueError::Exhausted {
                key: job.key.clone(),
                attempts: retry as u32 + 1,
                last: err,
            });
        };
        retry += 1;
        warn!(key = %job.key, retry, delay_ms = delay.as_millis() as u64, error = %err, "task failed, backing off");
        tokio::time::sleep(delay).await;
    }
}

fn abort<T>(job: Job<T>, cause: &Arc<QueueError>) {
    debug!(key = %job.key, "task aborted behind failed task");
    let _ = job.reply.send(Err(QueueError::Aborted {
        key: job.key,
        cause: Arc::clone(cause),
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    fn queue() -> TaskQueue<String> {
        TaskQueue::with_schedule(
            Duration::from_millis(100),
            vec![Duration::from_millis(10), Duration::from_millis(20)],
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_aborts_tasks_behind_it() {
        let q = queue();
        let third_calls = Arc::new(AtomicUsize::new(0));

        let first = q.submit("first", || async { Ok("a".to_string()) });
        let second = q.submit("second", || async {
            Err::<String, _>(TranslateError::Transient("503".into()))
        });
        let calls = Arc::clone(&third_calls);
        let third = q.submit("third", move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok("c".to_string()) }
        });

        assert_eq!(first.await.unwrap(), "a");
        let second_err = second.await.unwrap_err();
        assert!(matches!(second_err, QueueError::Exhausted { attempts: 3, .. }));

        let third_err = third.await.unwrap_err();
        match &third_err {
            QueueError::Aborted { key, cause } => {
                assert_eq!(key, "third");
                assert!(matches!(cause.as_ref(), QueueError::Exhausted { key, .. } if key == "second"));
            }
            other => panic!("expected abort, got {other:?}"),
        }
        assert_eq!(third_calls.load(Ordering::SeqCst), 0);

        let late = q.submit("late", || async { Ok("d".to_string()) }).await;
        assert!(matches!(late, Err(QueueError::Aborted { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refusal_is_not_retried() {
        let q = queue();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let refused = q
            .submit("bad", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<String, _>(TranslateError::ContentRefused("policy".into())) }
            })
            .await;
        assert!(matches!(refused, Err(QueueError::Refused { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let next = q.submit("next", || async { Ok("ok".to_string()) }).await;
        assert_eq!(next.unwrap(), "ok");
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_is_not_retried_and_poisons_queue() {
        let q = queue();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let fatal = q
            .submit("broken", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<String, _>(TranslateError::Fatal("bad key".into())) }
            })
            .await;
        assert!(matches!(fatal, Err(QueueError::Fatal { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let next = q.submit("next", || async { Ok("ok".to_string()) }).await;
        assert!(matches!(next, Err(QueueError::Aborted { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_recovers() {
        let q = queue();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let result = q
            .submit("flaky", move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(TranslateError::Transient("429".into()))
                    } else {
                        Ok("done".to_string())
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_min_spacing_between_starts() {
        let q = queue();
        let starts = Arc::new(Mutex::new(Vec::new()));
        let mut pending = Vec::new();
        for i in 0..3 {
            let starts = Arc::clone(&starts);
            pending.push(q.submit(format!("t{i}"), move || {
                starts.lock().push(Instant::now());
                async { Ok(String::new()) }
            }));
        }
        for p in pending {
            p.await.unwrap();
        }
        let starts = starts.lock().clone();
        assert_eq!(starts.len(), 3);
        for pair in starts.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(100));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_follow_submission_order() {
        let q = queue();
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut pending = Vec::new();
        for i in 0..4 {
            let order = Arc::clone(&order);
            pending.push(q.submit(format!("t{i}"), move || {
                order.lock().push(i);
                async move { Ok(i.to_string()) }
            }));
        }
        let mut results = Vec::new();
        for p in pending {
            results.push(p.await.unwrap());
        }
        assert_eq!(results, vec!["0", "1", "2", "3"]);
        assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
        q.close().await;
    }
}
