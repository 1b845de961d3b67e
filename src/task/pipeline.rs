//! The question-processing pipeline.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, instrument};

use super::{CryptoContext, KeywordTable, QuestionProcessor};
use crate::Result;
use crate::compose::{self, ResponseComposer};
use crate::market::MarketGateway;
use crate::sentiment::SentimentService;
use crate::types::{MarketSnapshot, TaskResult};

/// Snapshot size for market-wide aggregate metrics.
pub const OVERVIEW_SAMPLE_SIZE: usize = 10;

/// Context extraction -> market data -> sentiment -> composed answer.
pub struct Pipeline {
    keywords: KeywordTable,
    gateway: Arc<MarketGateway>,
    sentiment: SentimentService,
    composer: ResponseComposer,
}

impl Pipeline {
    pub fn new(keywords: KeywordTable, gateway: Arc<MarketGateway>, sentiment: SentimentService) -> Self {
        Self {
            keywords,
            composer: ResponseComposer::new(gateway.clone()),
            gateway,
            sentiment,
        }
    }

    /// Run every step for one question.
    ///
    /// Market data never fails (it degrades to empty/absent); classifier
    /// failures propagate so the task can be retried.
    #[instrument(skip(self))]
    pub async fn run(&self, question: &str) -> Result<TaskResult> {
        let mut timer = StepTimer::start();

        let context = self.keywords.extract(question);
        timer.lap("extract_context");

        let coin = self.resolve_coin(&context).await;
        timer.lap("market_data");

        let metrics = self.metrics(coin.as_ref()).await;
        timer.lap("metrics");

        let sentiment = self
            .sentiment
            .analyze(question, coin.as_ref().map(MarketSnapshot::price_context))
            .await?;
        timer.lap("sentiment");

        let text = self.composer.compose(question, &sentiment, coin.as_ref()).await;
        timer.lap("compose");

        timer.log_summary(&context);

        Ok(TaskResult {
            text,
            sentiment: sentiment.label,
            confidence: sentiment.score,
            metrics,
        })
    }

    async fn resolve_coin(&self, context: &CryptoContext) -> Option<MarketSnapshot> {
        let id = context.coin_id()?;
        let coin = self.gateway.get_coin_by_name(id).await;
        if coin.is_none() {
            debug!(coin = id, "named coin unavailable, using market overview");
        }
        coin
    }

    async fn metrics(&self, coin: Option<&MarketSnapshot>) -> BTreeMap<String, String> {
        match coin {
            Some(coin) => compose::coin_metrics(coin),
            None => {
                let currency = &self.gateway.config().currency;
                let overview = self
                    .gateway
                    .get_market_data(currency, OVERVIEW_SAMPLE_SIZE)
                    .await;
                compose::market_overview_metrics(&overview)
            }
        }
    }
}

#[async_trait]
impl QuestionProcessor for Pipeline {
    async fn process(&self, question: &str) -> Result<TaskResult> {
        self.run(question).await
    }
}

/// Per-step wall time for one pipeline run.
struct StepTimer {
    started: Instant,
    last: Instant,
    steps: Vec<(&'static str, Duration)>,
}

impl StepTimer {
    fn start() -> Self {
        let now = Instant::now();
        Self {
            started: now,
            last: now,
            steps: Vec::new(),
        }
    }

    fn lap(&mut self, name: &'static str) {
        let now = Instant::now();
        self.steps.push((name, now - self.last));
        self.last = now;
    }

    fn log_summary(&self, context: &CryptoContext) {
        let total = self.started.elapsed();
        let breakdown = self
            .steps
            .iter()
            .map(|(name, d)| format!("{name}={}ms", d.as_millis()))
            .collect::<Vec<_>>()
            .join(" ");
        debug!(
            context = %context,
            total_ms = total.as_millis() as u64,
            steps = %breakdown,
            "question processed"
        );
    }
}
