//! Integration tests for HTTP service mode.
//!
//! Starts the router on an ephemeral port and talks to it with reqwest and,
//! for the push channel, a websocket client.

#![cfg(feature = "server")]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use kvasir::cache::Cache;
use kvasir::market::{MarketGateway, MarketGatewayConfig, MarketProvider};
use kvasir::sentiment::{SentimentClassifier, SentimentService};
use kvasir::server::PushMessage;
use kvasir::server::http::{ANSWER_SOURCE_HEADER, PROCESS_TIME_HEADER};
use kvasir::task::{QuestionProcessor, QueueConfig, RetryPolicy, TaskQueue};
use kvasir::types::{MarketSnapshot, RawSentiment, SentimentLabel, TaskResult};
use kvasir::{AskConfig, AskService, KvasirError, Result};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type PushClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Market(Vec<MarketSnapshot>);

#[async_trait]
impl MarketProvider for Market {
    fn name(&self) -> &str {
        "test"
    }

    async fn fetch_markets(&self, _currency: &str, limit: usize) -> Result<Vec<MarketSnapshot>> {
        Ok(self.0.iter().take(limit).cloned().collect())
    }

    async fn fetch_coin(&self, _currency: &str, id: &str) -> Result<Option<MarketSnapshot>> {
        Ok(self.0.iter().find(|c| c.id == id).cloned())
    }
}

struct Negative;

#[async_trait]
impl SentimentClassifier for Negative {
    fn name(&self) -> &str {
        "negative"
    }

    async fn classify(&self, _text: &str) -> Result<RawSentiment> {
        Ok(RawSentiment {
            label: "Negative".into(),
            score: 0.6,
        })
    }
}

/// Upper-cases the question. Questions mentioning "fail" fail.
struct Echo;

#[async_trait]
impl QuestionProcessor for Echo {
    async fn process(&self, question: &str) -> Result<TaskResult> {
        if question.contains("fail") {
            return Err(KvasirError::Http("upstream unreachable".into()));
        }
        Ok(TaskResult {
            text: question.to_uppercase(),
            sentiment: SentimentLabel::Negative,
            confidence: 0.6,
            metrics: Default::default(),
        })
    }
}

fn ether() -> MarketSnapshot {
    MarketSnapshot {
        id: "ethereum".into(),
        symbol: "eth".into(),
        name: "Ethereum".into(),
        current_price: 3000.0,
        market_cap: 3.6e11,
        total_volume: 1.5e10,
        price_change_percentage_24h: -1.2,
    }
}

/// Start a server over `coins` and return its address.
async fn start_server(coins: Vec<MarketSnapshot>) -> SocketAddr {
    let cache = Cache::in_memory();
    let gateway = Arc::new(MarketGateway::new(
        Arc::new(Market(coins)),
        cache.clone(),
        MarketGatewayConfig::new().politeness_interval(Duration::from_millis(1)),
    ));
    let sentiment = SentimentService::new(Arc::new(Negative), cache.clone());
    let queue = Arc::new(TaskQueue::start(
        Arc::new(Echo),
        QueueConfig::new().retry(RetryPolicy::disabled()),
    ));
    let config = AskConfig::new().poll_interval(Duration::from_millis(20));
    let service = AskService::new(queue, cache, sentiment, gateway, config);

    let app = kvasir::server::router(service, &["http://localhost:3000".to_string()]);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn root_and_liveness() {
    let addr = start_server(vec![]).await;
    let client = reqwest::Client::new();

    let response = client.get(format!("http://{addr}/")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert!(response.headers().contains_key(PROCESS_TIME_HEADER));
    let body: Value = response.json().await.unwrap();
    assert!(body["message"].as_str().unwrap().starts_with("Welcome"));

    let head = client.head(format!("http://{addr}/")).send().await.unwrap();
    assert_eq!(head.status(), 200);

    let health: Value = client
        .get(format!("http://{addr}/healthz"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health, json!({ "status": "ok" }));

    let cache_health = client
        .get(format!("http://{addr}/healthz/cache"))
        .send()
        .await
        .unwrap();
    assert_eq!(cache_health.status(), 200);
}

#[tokio::test]
async fn crypto_listing_unavailable_when_empty() {
    let addr = start_server(vec![]).await;

    let response = reqwest::get(format!("http://{addr}/api/crypto")).await.unwrap();
    assert_eq!(response.status(), 503);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["detail"], "Unable to fetch crypto data");
}

#[tokio::test]
async fn crypto_listing_returns_snapshots() {
    let addr = start_server(vec![ether()]).await;

    let response = reqwest::get(format!("http://{addr}/api/crypto")).await.unwrap();
    assert_eq!(response.status(), 200);
    let coins: Vec<MarketSnapshot> = response.json().await.unwrap();
    assert_eq!(coins, vec![ether()]);
}

#[tokio::test]
async fn sentiment_endpoint_with_and_without_slash() {
    let addr = start_server(vec![]).await;
    let client = reqwest::Client::new();

    for path in ["/analyze-sentiment", "/analyze-sentiment/"] {
        let body: Value = client
            .post(format!("http://{addr}{path}"))
            .json(&json!({ "question": "Is the dip over?" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["sentiment"], "NEGATIVE");
        assert!((body["score"].as_f64().unwrap() - 0.6).abs() < 1e-6);
    }
}

#[tokio::test]
async fn ask_reports_answer_source() {
    let addr = start_server(vec![]).await;
    let client = reqwest::Client::new();

    let ask = || {
        client
            .post(format!("http://{addr}/ask"))
            .json(&json!({ "question": "eth outlook" }))
            .send()
    };

    let first = ask().await.unwrap();
    assert_eq!(first.headers()[ANSWER_SOURCE_HEADER], "processed");
    let first: TaskResult = first.json().await.unwrap();
    assert_eq!(first.text, "ETH OUTLOOK");

    let second = ask().await.unwrap();
    assert_eq!(second.headers()[ANSWER_SOURCE_HEADER], "cached");
    let second: TaskResult = second.json().await.unwrap();
    assert_eq!(second, first);
}

#[tokio::test]
async fn cors_allows_configured_origin() {
    let addr = start_server(vec![]).await;
    let client = reqwest::Client::new();

    let response = client
        .request(reqwest::Method::OPTIONS, format!("http://{addr}/ask"))
        .header("Origin", "http://localhost:3000")
        .header("Access-Control-Request-Method", "POST")
        .send()
        .await
        .unwrap();
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "http://localhost:3000"
    );

    let other = client
        .request(reqwest::Method::OPTIONS, format!("http://{addr}/ask"))
        .header("Origin", "http://evil.example")
        .header("Access-Control-Request-Method", "POST")
        .send()
        .await
        .unwrap();
    assert!(!other.headers().contains_key("access-control-allow-origin"));
}

#[test]
fn push_messages_are_tagged_by_status() {
    let processing = PushMessage::Processing {
        message: "Processing your questions...".into(),
    };
    assert_eq!(
        serde_json::to_value(&processing).unwrap(),
        json!({ "status": "processing", "message": "Processing your questions..." })
    );

    let complete = PushMessage::Complete {
        response: TaskResult::fallback(),
    };
    let value = serde_json::to_value(&complete).unwrap();
    assert_eq!(value["status"], "complete");
    assert_eq!(value["response"]["sentiment"], "NEUTRAL");
}

// ============================================================================
// Push channel
// ============================================================================

async fn next_push(client: &mut PushClient) -> Value {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("no push message within 5s")
            .expect("push channel closed")
            .unwrap();
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn send_question(client: &mut PushClient, question: &str) {
    let payload = json!({ "question": question }).to_string();
    client.send(Message::Text(payload)).await.unwrap();
}

#[tokio::test]
async fn push_channel_reports_processing_then_outcome() {
    let addr = start_server(vec![]).await;
    let (mut client, _) = connect_async(format!("ws://{addr}/ws/client-1"))
        .await
        .unwrap();

    send_question(&mut client, "eth outlook").await;
    assert_eq!(
        next_push(&mut client).await,
        json!({ "status": "processing", "message": "Processing your questions..." })
    );
    let complete = next_push(&mut client).await;
    assert_eq!(complete["status"], "complete");
    assert_eq!(complete["response"]["text"], "ETH OUTLOOK");
    assert_eq!(complete["response"]["sentiment"], "NEGATIVE");

    send_question(&mut client, "please fail").await;
    assert_eq!(next_push(&mut client).await["status"], "processing");
    assert_eq!(
        next_push(&mut client).await,
        json!({ "status": "error", "message": "Failed to process your question." })
    );

    // A payload that is not a question gets a single error and no processing.
    client
        .send(Message::Text("not json".to_string()))
        .await
        .unwrap();
    let error = next_push(&mut client).await;
    assert_eq!(error["status"], "error");
    assert!(error["message"].is_string());

    // The connection survives all of the above.
    send_question(&mut client, "sol outlook").await;
    assert_eq!(next_push(&mut client).await["status"], "processing");
    assert_eq!(next_push(&mut client).await["response"]["text"], "SOL OUTLOOK");

    client.close(None).await.unwrap();
}

#[tokio::test]
async fn push_channel_answer_is_cached_for_ask() {
    let addr = start_server(vec![]).await;
    let (mut client, _) = connect_async(format!("ws://{addr}/ws/client-2"))
        .await
        .unwrap();

    send_question(&mut client, "eth outlook").await;
    assert_eq!(next_push(&mut client).await["status"], "processing");
    assert_eq!(next_push(&mut client).await["status"], "complete");

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/ask"))
        .json(&json!({ "question": "eth outlook" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.headers()[ANSWER_SOURCE_HEADER], "cached");
    let body: TaskResult = response.json().await.unwrap();
    assert_eq!(body.text, "ETH OUTLOOK");
}
