//! Transport-agnostic request layer.
//!
//! [`AskService`] is what the HTTP and push-channel handlers call. `ask`
//! always produces an answer: a cached one, a freshly processed one, a
//! stale cached one, or the canned fallback, in that order of preference.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::cache::{Cache, CacheKey, Cached, Lookup};
use crate::market::MarketGateway;
use crate::sentiment::SentimentService;
use crate::task::{TaskHandle, TaskQueue};
use crate::types::{MarketSnapshot, SentimentResult, TaskResult};
use crate::{KvasirError, Result, telemetry};

/// Timing for awaiting task results.
#[derive(Debug, Clone, PartialEq)]
pub struct AskConfig {
    /// How long `ask` waits for a task. Default: 30s.
    pub timeout: Duration,
    /// Status polling interval for push-channel callers. Default: 1s.
    pub poll_interval: Duration,
}

impl Default for AskConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl AskConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Why the canned fallback was returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// The task did not settle within [`AskConfig::timeout`].
    TimedOut,
    /// The task failed, or could not be submitted.
    Failed,
}

/// Where an answer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerSource {
    /// Fresh `full_response` entry.
    Cached,
    /// Processed by a task just now.
    Processed,
    /// Expired `full_response` entry served after the task failed or timed out.
    Stale,
    Fallback(FallbackReason),
}

impl AnswerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerSource::Cached => "cached",
            AnswerSource::Processed => "processed",
            AnswerSource::Stale => "stale",
            AnswerSource::Fallback(FallbackReason::TimedOut) => "fallback_timeout",
            AnswerSource::Fallback(FallbackReason::Failed) => "fallback",
        }
    }
}

impl fmt::Display for AnswerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An answer and its provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub result: TaskResult,
    pub source: AnswerSource,
}

impl Answer {
    fn new(result: TaskResult, source: AnswerSource) -> Self {
        metrics::counter!(telemetry::ANSWERS_TOTAL, "source" => source.as_str()).increment(1);
        Self { result, source }
    }
}

/// Question answering over the task queue with full-response caching.
#[derive(Clone)]
pub struct AskService {
    queue: Arc<TaskQueue>,
    cache: Cache,
    sentiment: SentimentService,
    gateway: Arc<MarketGateway>,
    config: AskConfig,
}

impl AskService {
    pub fn new(
        queue: Arc<TaskQueue>,
        cache: Cache,
        sentiment: SentimentService,
        gateway: Arc<MarketGateway>,
        config: AskConfig,
    ) -> Self {
        Self {
            queue,
            cache,
            sentiment,
            gateway,
            config,
        }
    }

    pub fn config(&self) -> &AskConfig {
        &self.config
    }

    /// Answer a question. Never fails.
    #[instrument(skip(self))]
    pub async fn ask(&self, question: &str) -> Answer {
        let key = CacheKey::full_response(question);

        if let Lookup::Fresh(Cached::Present(result)) = self.cache.lookup(&key).await {
            return Answer::new(result, AnswerSource::Cached);
        }

        let handle = match self.queue.submit(question).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(error = %e, "could not submit question");
                return self.degrade(&key, FallbackReason::Failed).await;
            }
        };

        match handle.wait_timeout(self.config.timeout).await {
            Ok(result) => {
                self.cache.store(&key, &result).await;
                Answer::new(result, AnswerSource::Processed)
            }
            Err(KvasirError::TimedOut(after)) => {
                warn!(
                    task_id = %handle.id(),
                    timeout_ms = after.as_millis() as u64,
                    "task timed out, result will be cached when it settles"
                );
                self.cache_when_settled(handle, key.clone());
                self.degrade(&key, FallbackReason::TimedOut).await
            }
            Err(e) => {
                warn!(task_id = %handle.id(), error = %e, "task failed");
                self.degrade(&key, FallbackReason::Failed).await
            }
        }
    }

    /// Enqueue a question without waiting, for callers that poll.
    pub async fn submit(&self, question: &str) -> Result<TaskHandle> {
        self.queue.submit(question).await
    }

    /// Cache a result obtained through [`submit`](Self::submit).
    pub async fn remember(&self, question: &str, result: &TaskResult) {
        self.cache
            .store(&CacheKey::full_response(question), result)
            .await;
    }

    /// Sentiment of a question, without price context.
    pub async fn analyze_sentiment(&self, question: &str) -> Result<SentimentResult> {
        self.sentiment.analyze(question, None).await
    }

    /// The default market listing. Empty when no data is available.
    pub async fn market_data(&self) -> Vec<MarketSnapshot> {
        self.gateway.default_market_data().await
    }

    /// Reachability of the cache store.
    pub async fn cache_health(&self) -> Result<()> {
        self.cache.ping().await
    }

    async fn degrade(&self, key: &CacheKey, reason: FallbackReason) -> Answer {
        match self.cache.lookup(key).await {
            Lookup::Fresh(Cached::Present(result)) => {
                debug!(key = %key, "answer cached concurrently");
                Answer::new(result, AnswerSource::Cached)
            }
            Lookup::Stale(Cached::Present(result)) => {
                self.cache.note_stale_served(key);
                Answer::new(result, AnswerSource::Stale)
            }
            _ => Answer::new(TaskResult::fallback(), AnswerSource::Fallback(reason)),
        }
    }

    fn cache_when_settled(&self, handle: TaskHandle, key: CacheKey) {
        let cache = self.cache.clone();
        tokio::spawn(async move {
            match handle.wait().await {
                Ok(result) => {
                    cache.store(&key, &result).await;
                    info!(task_id = %handle.id(), "late task result cached");
                }
                Err(e) => debug!(task_id = %handle.id(), error = %e, "late task did not succeed"),
            }
        });
    }
}
