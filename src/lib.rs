//! Kvasir - cached, rate-limited crypto market Q&A
//!
//! This crate answers natural-language questions about cryptocurrencies by
//! combining live market data from a rate-limited upstream API, a text
//! sentiment classifier, and composed answer text. The interesting part is
//! the caching layer between them: namespaced TTL entries, negative caching,
//! stale-on-failure serving, and a bounded-retry task queue that keeps slow
//! work off the request path.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use kvasir::cache::Cache;
//! use kvasir::market::{CoinGeckoClient, MarketGateway, MarketGatewayConfig};
//! use kvasir::sentiment::{HuggingFaceClient, SentimentService};
//! use kvasir::task::{KeywordTable, Pipeline, QueueConfig, TaskQueue};
//! use kvasir::{AskConfig, AskService};
//!
//! #[tokio::main]
//! async fn main() -> kvasir::Result<()> {
//!     let cache = Cache::in_memory();
//!     let gateway = Arc::new(MarketGateway::new(
//!         Arc::new(CoinGeckoClient::new()?),
//!         cache.clone(),
//!         MarketGatewayConfig::default(),
//!     ));
//!     let sentiment = SentimentService::new(
//!         Arc::new(HuggingFaceClient::new(Some("hf_your_key".into()))?),
//!         cache.clone(),
//!     );
//!     let pipeline = Pipeline::new(KeywordTable::default(), gateway.clone(), sentiment.clone());
//!     let queue = Arc::new(TaskQueue::start(Arc::new(pipeline), QueueConfig::default()));
//!
//!     let service = AskService::new(queue, cache, sentiment, gateway, AskConfig::default());
//!     let answer = service.ask("What is the price trend for bitcoin?").await;
//!     println!("[{}] {}", answer.source, answer.result.text);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod compose;
pub mod error;
pub mod market;
pub mod sentiment;
#[cfg(feature = "server")]
pub mod server;
pub mod service;
pub mod task;
pub mod telemetry;
pub mod types;
pub mod version;

pub use error::{KvasirError, Result};
pub use service::{Answer, AnswerSource, AskConfig, AskService, FallbackReason};
pub use types::{
    FALLBACK_TEXT, MAX_CONFIDENCE, MarketSnapshot, PriceContext, RawSentiment, SentimentLabel,
    SentimentResult, TaskResult,
};
pub use version::{PKG_VERSION, version_string};
