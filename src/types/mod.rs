//! Public types for the Kvasir API.

mod answer;
mod market;
mod sentiment;

pub use answer::{FALLBACK_TEXT, TaskResult};
pub use market::{MarketSnapshot, PriceContext};
pub use sentiment::{MAX_CONFIDENCE, RawSentiment, SentimentLabel, SentimentResult};
