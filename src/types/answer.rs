//! Question-answering result types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::SentimentLabel;

/// Text returned when every processing path has failed.
pub const FALLBACK_TEXT: &str =
    "I apologize, but I'm having trouble processing your request at this time. Please try again.";

/// Structured answer produced by a question-processing task.
///
/// `metrics` is ordered so that serialising the same result twice yields
/// identical bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub text: String,
    pub sentiment: SentimentLabel,
    pub confidence: f32,
    #[serde(default)]
    pub metrics: BTreeMap<String, String>,
}

impl TaskResult {
    /// The canned degrade-gracefully answer.
    pub fn fallback() -> Self {
        Self {
            text: FALLBACK_TEXT.to_string(),
            sentiment: SentimentLabel::Neutral,
            confidence: 0.5,
            metrics: BTreeMap::new(),
        }
    }
}
