//! Context-aware confidence adjustment.
//!
//! Turns raw classifier output into a [`SentimentResult`]: standardise the
//! label, cap the score, reconcile it with the observed price move, then
//! apply the forecast ceiling last.

use crate::types::{MAX_CONFIDENCE, PriceContext, RawSentiment, SentimentLabel, SentimentResult};

/// Multiplier applied when label and price direction agree.
pub const AGREEMENT_BOOST: f32 = 1.1;

/// 24h move (in percent) beyond which a contradicting label is overridden.
pub const OVERRIDE_THRESHOLD_PCT: f64 = 5.0;

/// Confidence ceiling for an overridden label.
pub const OVERRIDE_CEILING: f32 = 0.8;

/// Confidence ceiling for questions about the future.
pub const FORECAST_CEILING: f32 = 0.7;

const PRICE_TERMS: &[&str] = &["price", "trend"];
const FORECAST_TERMS: &[&str] = &["predict", "forecast", "future"];

/// Produce the final sentiment for `question`.
pub fn adjust(question: &str, raw: &RawSentiment, context: Option<PriceContext>) -> SentimentResult {
    let question = question.to_lowercase();
    let mut label = SentimentLabel::standardize(&raw.label);
    let mut score = cap_confidence(raw.score);

    if let Some(ctx) = context {
        let change = ctx.price_change_24h;
        if agrees(label, change) {
            score = cap_confidence(score * AGREEMENT_BOOST);
        } else if let Some(implied) = contradicted_by(label, change) {
            if mentions_any(&question, PRICE_TERMS) {
                label = implied;
                score = score.min(OVERRIDE_CEILING);
            }
        }
    }

    if is_forecast(&question) {
        score = score.min(FORECAST_CEILING);
    }

    SentimentResult { label, score }
}

/// Clamp a score into `[0, MAX_CONFIDENCE]`. Non-numbers become 0.
pub fn cap_confidence(score: f32) -> f32 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, MAX_CONFIDENCE)
    }
}

/// Whether the question asks about what will happen rather than what has.
///
/// Expects a lower-cased question.
pub fn is_forecast(question: &str) -> bool {
    mentions_any(question, FORECAST_TERMS)
        || question
            .split(|c: char| !c.is_alphanumeric())
            .any(|word| word == "will")
}

fn agrees(label: SentimentLabel, change: f64) -> bool {
    match label {
        SentimentLabel::Positive => change > 0.0,
        SentimentLabel::Negative => change < 0.0,
        SentimentLabel::Neutral => false,
    }
}

/// The label implied by a sharp move against a directional label.
fn contradicted_by(label: SentimentLabel, change: f64) -> Option<SentimentLabel> {
    match label {
        SentimentLabel::Positive if change < -OVERRIDE_THRESHOLD_PCT => {
            Some(SentimentLabel::Negative)
        }
        SentimentLabel::Negative if change > OVERRIDE_THRESHOLD_PCT => {
            Some(SentimentLabel::Positive)
        }
        _ => None,
    }
}

fn mentions_any(question: &str, terms: &[&str]) -> bool {
    terms.iter().any(|term| question.contains(term))
}
