//! Question processing and the background task queue.

mod keywords;
mod pipeline;
mod queue;

pub use keywords::{CryptoContext, DEFAULT_KEYWORDS, KeywordTable};
pub use pipeline::{OVERVIEW_SAMPLE_SIZE, Pipeline};
pub use queue::{QueueConfig, RetryPolicy, TaskHandle, TaskId, TaskQueue, TaskStatus};

use async_trait::async_trait;

use crate::Result;
use crate::types::TaskResult;

/// Turns a question into a structured answer.
///
/// Implementations may fail; the task queue retries transient errors.
#[async_trait]
pub trait QuestionProcessor: Send + Sync {
    async fn process(&self, question: &str) -> Result<TaskResult>;
}
