//! Response composer.
//!
//! Renders the answer text for a question from its sentiment and, when a
//! coin was identified, that coin's snapshot. Branch selection is an
//! ordered decision list over keywords in the lower-cased question; the
//! first branch that applies wins.
//!
//! Only the "top N" and "market sentiment" branches touch the market
//! gateway. Everything else is pure.

mod format;

pub use format::{coin_metrics, format_large_number, market_overview_metrics};

use std::sync::Arc;

use crate::market::MarketGateway;
use crate::types::{MarketSnapshot, SentimentLabel, SentimentResult};

/// Snapshot size for the "top N" listing.
pub const TOP_LIST_SIZE: usize = 5;

/// Snapshot size for the market mood summary.
pub const MOOD_SAMPLE_SIZE: usize = 10;

/// Answer for questions that match no branch.
pub const GENERIC_ANSWER: &str = "Based on current market data, cryptocurrencies are showing mixed performance. For specific insights, try asking about a particular coin or market metric.";

/// Qualitative band for a 24h percent change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceBand {
    /// Above +5%.
    StrongBullish,
    /// +2% to +5%.
    Positive,
    /// -2% to +2%.
    Stable,
    /// -5% to -2%.
    Negative,
    /// Below -5%.
    StrongBearish,
}

impl PriceBand {
    pub fn from_change(change: f64) -> Self {
        if change > 5.0 {
            PriceBand::StrongBullish
        } else if change > 2.0 {
            PriceBand::Positive
        } else if change < -5.0 {
            PriceBand::StrongBearish
        } else if change < -2.0 {
            PriceBand::Negative
        } else {
            PriceBand::Stable
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            PriceBand::StrongBullish => "showing strong bullish momentum",
            PriceBand::Positive => "trending positively",
            PriceBand::Stable => "relatively stable",
            PriceBand::Negative => "trending negatively",
            PriceBand::StrongBearish => "showing significant bearish pressure",
        }
    }
}

/// Wording for how sure the classifier was.
fn confidence_word(confidence: f32) -> &'static str {
    if confidence > 0.8 {
        "strongly"
    } else if confidence > 0.6 {
        "moderately"
    } else {
        "slightly"
    }
}

fn direction(change: f64) -> &'static str {
    if change > 0.0 { "up" } else { "down" }
}

fn percent(confidence: f32) -> String {
    format!("{:.1}%", confidence * 100.0)
}

/// One-sentence explanation of a sentiment result.
pub fn explain_sentiment(sentiment: &SentimentResult, coin: Option<&MarketSnapshot>) -> String {
    let conf = percent(sentiment.score);
    let word = confidence_word(sentiment.score);

    let Some(coin) = coin else {
        return match sentiment.label {
            SentimentLabel::Positive => format!(
                "The sentiment appears {word} positive ({conf} confidence) based on the optimistic language in your question."
            ),
            SentimentLabel::Negative => format!(
                "The sentiment appears {word} negative ({conf} confidence) based on the cautious language in your question."
            ),
            SentimentLabel::Neutral => format!(
                "The sentiment appears neutral ({conf} confidence) based on the balanced language in your question."
            ),
        };
    };

    let change = coin.price_change_percentage_24h;
    match sentiment.label {
        SentimentLabel::Positive if change > 0.0 => format!(
            "The sentiment is {word} positive ({conf} confidence), supported by the {change:.2}% price increase in the last 24 hours."
        ),
        SentimentLabel::Positive => format!(
            "Despite the {:.2}% price decrease, the sentiment remains {word} positive ({conf} confidence) based on market indicators.",
            change.abs()
        ),
        SentimentLabel::Negative if change < 0.0 => format!(
            "The sentiment is {word} negative ({conf} confidence), reflecting the {:.2}% price decrease in the last 24 hours.",
            change.abs()
        ),
        SentimentLabel::Negative => format!(
            "Despite the {change:.2}% price increase, the sentiment is {word} negative ({conf} confidence) based on market concerns."
        ),
        SentimentLabel::Neutral if change.abs() < 2.0 => format!(
            "The market sentiment appears neutral ({conf} confidence), with relatively stable price movement ({change:.2}%)."
        ),
        SentimentLabel::Neutral => format!(
            "Despite {:.2}% price {}, the overall sentiment remains neutral ({conf} confidence).",
            change.abs(),
            if change > 0.0 { "increase" } else { "decrease" }
        ),
    }
}

/// Answer for a question about one identified coin.
pub fn coin_answer(question: &str, coin: &MarketSnapshot) -> String {
    let q = question.to_lowercase();
    let change = coin.price_change_percentage_24h;
    let dir = direction(change);

    if q.contains("price") || q.contains("trend") {
        format!(
            "{} is {}, moving {dir} {:.2}% in the last 24 hours. The current price is ${}.",
            coin.name,
            PriceBand::from_change(change).description(),
            change.abs(),
            coin.current_price
        )
    } else if q.contains("predict") || q.contains("forecast") {
        format!(
            "While I can't predict prices with certainty, {} has moved {dir} {:.2}% in the last 24 hours with a trading volume of ${}.",
            coin.name,
            change.abs(),
            format_large_number(coin.total_volume)
        )
    } else {
        format!(
            "{} currently has a market cap of ${} and is trading at ${}. In the last 24 hours, the price has changed by {change:.2}%.",
            coin.name,
            format_large_number(coin.market_cap),
            coin.current_price
        )
    }
}

/// Numbered "top N" listing.
pub fn top_list_answer(coins: &[MarketSnapshot]) -> String {
    let lines: Vec<String> = coins
        .iter()
        .take(TOP_LIST_SIZE)
        .enumerate()
        .map(|(i, c)| format!("{}. {} (${})", i + 1, c.name, c.current_price))
        .collect();
    format!(
        "The top {TOP_LIST_SIZE} cryptos by market cap are: \n{}",
        lines.join("\n")
    )
}

/// Bullish/bearish summary over a market sample.
///
/// Bullish when more than half of [`MOOD_SAMPLE_SIZE`] coins are up.
pub fn market_mood_answer(coins: &[MarketSnapshot]) -> String {
    let positive = coins
        .iter()
        .filter(|c| c.price_change_percentage_24h > 0.0)
        .count();
    let mood = if positive > MOOD_SAMPLE_SIZE / 2 {
        "bullish"
    } else {
        "bearish"
    };
    format!(
        "The overall market sentiment appears to be {mood}. {positive} of the top {MOOD_SAMPLE_SIZE} cryptocurrencies are showing positive price movement in the last 24 hours."
    )
}

fn asks_for_top_list(q: &str) -> bool {
    q.contains("top") && ["5", "10", "five", "ten"].iter().any(|n| q.contains(n))
}

/// Composes final answer text.
#[derive(Clone)]
pub struct ResponseComposer {
    gateway: Arc<MarketGateway>,
}

impl ResponseComposer {
    pub fn new(gateway: Arc<MarketGateway>) -> Self {
        Self { gateway }
    }

    /// Answer text followed by a blank line and the sentiment explanation.
    pub async fn compose(
        &self,
        question: &str,
        sentiment: &SentimentResult,
        coin: Option<&MarketSnapshot>,
    ) -> String {
        let answer = self.answer(question, coin).await;
        format!("{answer}\n\n{}", explain_sentiment(sentiment, coin))
    }

    async fn answer(&self, question: &str, coin: Option<&MarketSnapshot>) -> String {
        if let Some(coin) = coin {
            return coin_answer(question, coin);
        }

        let q = question.to_lowercase();
        let currency = &self.gateway.config().currency;
        if asks_for_top_list(&q) {
            let coins = self.gateway.get_market_data(currency, TOP_LIST_SIZE).await;
            top_list_answer(&coins)
        } else if q.contains("sentiment") || q.contains("market") {
            let coins = self.gateway.get_market_data(currency, MOOD_SAMPLE_SIZE).await;
            market_mood_answer(&coins)
        } else {
            GENERIC_ANSWER.to_string()
        }
    }
}
