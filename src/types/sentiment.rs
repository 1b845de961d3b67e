//! Sentiment classification types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Highest confidence ever reported for a sentiment.
pub const MAX_CONFIDENCE: f32 = 0.95;

/// The standardised sentiment label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl SentimentLabel {
    /// Map a classifier label onto one of the three standard labels.
    ///
    /// Matching ignores case. Anything that is not recognisably positive or
    /// negative (including `LABEL_n` style names) becomes `Neutral`.
    pub fn standardize(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "positive" | "pos" | "bullish" => SentimentLabel::Positive,
            "negative" | "neg" | "bearish" => SentimentLabel::Negative,
            _ => SentimentLabel::Neutral,
        }
    }

    /// Uppercase wire token, e.g. `"POSITIVE"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "POSITIVE",
            SentimentLabel::Negative => "NEGATIVE",
            SentimentLabel::Neutral => "NEUTRAL",
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unprocessed classifier output: whatever label the model emitted and its score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSentiment {
    pub label: String,
    pub score: f32,
}

/// Final sentiment for a question, after standardisation and context adjustment.
///
/// `score` is always within `[0, MAX_CONFIDENCE]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentResult {
    pub label: SentimentLabel,
    pub score: f32,
}
