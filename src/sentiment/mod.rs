//! Sentiment classifier service.
//!
//! [`SentimentService`] wraps a black-box [`SentimentClassifier`] with the
//! `sentiment` cache namespace and the context adjustments in [`adjust`].
//! What gets cached is the adjusted result, so a repeated question is
//! answered from cache exactly as it was first answered.

pub mod adjust;
#[cfg(feature = "huggingface")]
mod huggingface;

#[cfg(feature = "huggingface")]
pub use huggingface::{DEFAULT_BASE_URL, DEFAULT_MODEL, HuggingFaceClient};

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::Result;
use crate::cache::{Cache, CacheKey, Cached, Lookup};
use crate::types::{PriceContext, RawSentiment, SentimentResult};

/// Text in, label and confidence out.
#[async_trait]
pub trait SentimentClassifier: Send + Sync {
    /// Classifier name for logging/debugging.
    fn name(&self) -> &str;

    /// Classify `text`. The label is whatever the model emits.
    async fn classify(&self, text: &str) -> Result<RawSentiment>;
}

/// Cached, context-adjusted sentiment analysis.
#[derive(Clone)]
pub struct SentimentService {
    classifier: Arc<dyn SentimentClassifier>,
    cache: Cache,
}

impl SentimentService {
    pub fn new(classifier: Arc<dyn SentimentClassifier>, cache: Cache) -> Self {
        Self { classifier, cache }
    }

    /// Sentiment of `question`, optionally reconciled with a price move.
    ///
    /// A fresh cached result is returned verbatim and `context` is ignored.
    /// Classifier failures propagate so the calling task can retry.
    #[instrument(skip(self), fields(classifier = self.classifier.name()))]
    pub async fn analyze(
        &self,
        question: &str,
        context: Option<PriceContext>,
    ) -> Result<SentimentResult> {
        let key = CacheKey::sentiment(question);

        if let Lookup::Fresh(Cached::Present(result)) = self.cache.lookup(&key).await {
            return Ok(result);
        }

        let raw = self.classifier.classify(question).await?;
        let result = adjust::adjust(question, &raw, context);
        debug!(
            raw_label = %raw.label,
            raw_score = raw.score,
            label = %result.label,
            score = result.score,
            "classified question"
        );

        self.cache.store(&key, &result).await;
        Ok(result)
    }
}
