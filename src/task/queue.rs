//! Background task queue with bounded retries.
//!
//! Questions are submitted to a bounded channel drained by a fixed pool of
//! workers. Each worker runs one task at a time. A failed attempt (a
//! transient error or a panic inside the processor) is retried after a
//! fixed delay, stretched to any upstream `retry-after` hint, until
//! [`RetryPolicy::max_retries`] is exhausted; the task then settles as
//! [`TaskStatus::Failed`]. An error that is not
//! [transient](KvasirError::is_transient) fails the task at once. Nothing a
//! processor does can take a worker down.
//!
//! ```text
//! Pending ─► Running{1} ─► Succeeded
//!                │
//!                ▼
//!           Retrying{1} ─► Running{2} ─► ... ─► Failed
//! ```
//!
//! A [`TaskHandle`] observes a task; dropping it, or giving up on it after
//! a timeout, does not cancel the task.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::QuestionProcessor;
use crate::types::TaskResult;
use crate::{KvasirError, Result, telemetry};

/// Retry behaviour for failed task attempts.
///
/// Fixed delay between attempts:
///
/// ```rust
/// # use kvasir::task::RetryPolicy;
/// # use std::time::Duration;
/// let policy = RetryPolicy::new()
///     .max_retries(5)
///     .delay(Duration::from_secs(10));
/// assert_eq!(policy.max_attempts(), 6);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. 0 = no retry. Default: 3.
    pub max_retries: u32,
    /// Delay before each retry. Default: 60s.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that makes a single attempt.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Total attempts including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// The fixed delay, or an upstream `retry_after` hint when it is longer.
    pub fn effective_delay(&self, retry_after: Option<Duration>) -> Duration {
        retry_after.map_or(self.delay, |hint| hint.max(self.delay))
    }
}

/// Queue sizing and retry configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueConfig {
    /// Concurrent workers. Default: 4.
    pub workers: usize,
    /// Submissions buffered before `submit` waits. Default: 256.
    pub capacity: usize,
    pub retry: RetryPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            capacity: 256,
            retry: RetryPolicy::default(),
        }
    }
}

impl QueueConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.workers = n;
        self
    }

    pub fn capacity(mut self, n: usize) -> Self {
        self.capacity = n;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Identifier of a submitted task, unique within one queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Where a task is in its lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskStatus {
    /// Queued, not yet picked up by a worker.
    Pending,
    /// Attempt `attempt` (1-based) is executing.
    Running { attempt: u32 },
    /// Attempt `attempt` failed; waiting out the retry delay.
    Retrying { attempt: u32 },
    Succeeded(TaskResult),
    /// Every attempt failed. `message` is the last error.
    Failed { attempts: u32, message: String },
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Succeeded(_) | TaskStatus::Failed { .. })
    }
}

/// Observer for one submitted task.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: TaskId,
    status: watch::Receiver<TaskStatus>,
}

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Current status snapshot.
    pub fn status(&self) -> TaskStatus {
        self.status.borrow().clone()
    }

    /// Wait for the task to settle.
    pub async fn wait(&self) -> Result<TaskResult> {
        let mut rx = self.status.clone();
        let settled = rx
            .wait_for(TaskStatus::is_terminal)
            .await
            .map_err(|_| KvasirError::QueueClosed)?
            .clone();

        match settled {
            TaskStatus::Succeeded(result) => Ok(result),
            TaskStatus::Failed { attempts, message } => {
                Err(KvasirError::TaskFailed { attempts, message })
            }
            _ => Err(KvasirError::QueueClosed),
        }
    }

    /// Wait at most `timeout`. On timeout the task keeps running.
    pub async fn wait_timeout(&self, timeout: Duration) -> Result<TaskResult> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| KvasirError::TimedOut(timeout))?
    }
}

struct Job {
    id: TaskId,
    question: String,
    status: watch::Sender<TaskStatus>,
}

/// Fixed pool of workers draining a bounded submission channel.
pub struct TaskQueue {
    tx: mpsc::Sender<Job>,
    next_id: AtomicU64,
    workers: Vec<JoinHandle<()>>,
}

impl TaskQueue {
    /// Spawn the worker pool. Must be called within a Tokio runtime.
    pub fn start(processor: Arc<dyn QuestionProcessor>, config: QueueConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));

        let workers = (0..config.workers.max(1))
            .map(|n| {
                let worker = Worker {
                    processor: processor.clone(),
                    rx: rx.clone(),
                    retry: config.retry.clone(),
                };
                tokio::spawn(worker.run().instrument(info_span!("worker", n)))
            })
            .collect();

        info!(
            workers = config.workers.max(1),
            capacity = config.capacity,
            max_retries = config.retry.max_retries,
            "task queue started"
        );

        Self {
            tx,
            next_id: AtomicU64::new(1),
            workers,
        }
    }

    /// Enqueue a question. Waits while the queue is full.
    pub async fn submit(&self, question: impl Into<String>) -> Result<TaskHandle> {
        let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (status_tx, status_rx) = watch::channel(TaskStatus::Pending);

        self.tx
            .send(Job {
                id,
                question: question.into(),
                status: status_tx,
            })
            .await
            .map_err(|_| KvasirError::QueueClosed)?;

        debug!(task_id = %id, "task submitted");
        Ok(TaskHandle {
            id,
            status: status_rx,
        })
    }

    /// Stop accepting work and wait for queued tasks to finish.
    pub async fn shutdown(self) {
        drop(self.tx);
        for worker in self.workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "worker exited abnormally");
            }
        }
        info!("task queue stopped");
    }
}

struct Worker {
    processor: Arc<dyn QuestionProcessor>,
    rx: Arc<Mutex<mpsc::Receiver<Job>>>,
    retry: RetryPolicy,
}

impl Worker {
    async fn run(self) {
        loop {
            let job = { self.rx.lock().await.recv().await };
            let Some(job) = job else { break };
            self.execute(job).await;
        }
    }

    async fn execute(&self, job: Job) {
        let max_attempts = self.retry.max_attempts();
        let mut attempt = 1;

        loop {
            job.status.send_replace(TaskStatus::Running { attempt });
            let started = Instant::now();

            match self.attempt(&job.question).await {
                Ok(result) => {
                    let elapsed = started.elapsed();
                    metrics::histogram!(telemetry::TASK_DURATION_SECONDS)
                        .record(elapsed.as_secs_f64());
                    info!(
                        task_id = %job.id,
                        attempt,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "task succeeded"
                    );
                    job.status.send_replace(TaskStatus::Succeeded(result));
                    return;
                }
                Err(failure) if failure.retryable && attempt < max_attempts => {
                    let delay = self.retry.effective_delay(failure.retry_after);
                    metrics::counter!(telemetry::TASK_RETRIES_TOTAL).increment(1);
                    warn!(
                        task_id = %job.id,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %failure.message,
                        "task attempt failed, retrying"
                    );
                    job.status.send_replace(TaskStatus::Retrying { attempt });
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(failure) => {
                    metrics::counter!(telemetry::TASK_FAILURES_TOTAL).increment(1);
                    if failure.retryable {
                        error!(
                            task_id = %job.id,
                            attempts = attempt,
                            error = %failure.message,
                            "task failed, retries exhausted"
                        );
                    } else {
                        error!(
                            task_id = %job.id,
                            attempts = attempt,
                            error = %failure.message,
                            "task failed with a permanent error, not retrying"
                        );
                    }
                    job.status.send_replace(TaskStatus::Failed {
                        attempts: attempt,
                        message: failure.message,
                    });
                    return;
                }
            }
        }
    }

    /// One attempt on its own task so a panic surfaces as a failed attempt.
    async fn attempt(&self, question: &str) -> std::result::Result<TaskResult, AttemptFailure> {
        let processor = self.processor.clone();
        let question = question.to_string();
        let attempt = tokio::spawn(async move { processor.process(&question).await });

        match attempt.await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => Err(AttemptFailure::from(e)),
            Err(join_err) if join_err.is_panic() => {
                Err(AttemptFailure::retryable("processor panicked".to_string()))
            }
            Err(join_err) => Err(AttemptFailure::retryable(join_err.to_string())),
        }
    }
}

/// Why one attempt failed, and whether another could succeed.
struct AttemptFailure {
    message: String,
    retryable: bool,
    retry_after: Option<Duration>,
}

impl AttemptFailure {
    fn retryable(message: String) -> Self {
        Self {
            message,
            retryable: true,
            retry_after: None,
        }
    }
}

impl From<KvasirError> for AttemptFailure {
    fn from(err: KvasirError) -> Self {
        Self {
            retryable: err.is_transient(),
            retry_after: err.retry_after(),
            message: err.to_string(),
        }
    }
}
