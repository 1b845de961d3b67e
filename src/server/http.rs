//! HTTP and push-channel surface.
//!
//! | route | purpose |
//! |---|---|
//! | `GET\|HEAD /` | banner |
//! | `GET /healthz` | liveness |
//! | `GET /healthz/cache` | cache store reachability (503 on failure) |
//! | `GET /api/crypto` | market listing (503 when empty) |
//! | `POST /analyze-sentiment` | sentiment of a question |
//! | `POST /ask` | full answer |
//! | `GET /ws/:client_id` | push channel: `processing` then `complete` or `error` |

use std::net::SocketAddr;
use std::time::Instant;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Request, State};
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{debug, error, info, warn};

use crate::service::AskService;
use crate::task::TaskStatus;
use crate::types::TaskResult;
use crate::{KvasirError, Result};

/// Response header carrying handler wall time in seconds.
pub const PROCESS_TIME_HEADER: &str = "x-process-time";

/// Response header naming where an `/ask` answer came from.
pub const ANSWER_SOURCE_HEADER: &str = "x-answer-source";

/// Body of `/ask`, `/analyze-sentiment` and push-channel messages.
#[derive(Debug, Deserialize)]
pub struct QuestionRequest {
    #[serde(alias = "text")]
    pub question: String,
}

/// Status message sent over the push channel.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PushMessage {
    Processing { message: String },
    Complete { response: TaskResult },
    Error { message: String },
}

/// Build the router with CORS for `cors_origins` and timing headers.
pub fn router(service: AskService, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/healthz", get(healthz))
        .route("/healthz/cache", get(healthz_cache))
        .route("/api/crypto", get(api_crypto))
        .route("/analyze-sentiment", post(analyze_sentiment))
        .route("/analyze-sentiment/", post(analyze_sentiment))
        .route("/ask", post(ask))
        .route("/ws/:client_id", get(ws_handler))
        .layer(cors(cors_origins))
        .layer(middleware::from_fn(process_time))
        .with_state(service)
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(addr: SocketAddr, app: Router) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| KvasirError::Configuration(format!("Failed to bind {addr}: {e}")))?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| KvasirError::Http(e.to_string()))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

fn cors(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(origin = %o, error = %e, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::HEAD, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .expose_headers([
            HeaderName::from_static(PROCESS_TIME_HEADER),
            HeaderName::from_static(ANSWER_SOURCE_HEADER),
        ])
}

async fn process_time(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let mut response = next.run(request).await;
    let elapsed = started.elapsed().as_secs_f64().to_string();
    if let Ok(value) = HeaderValue::from_str(&elapsed) {
        response.headers_mut().insert(PROCESS_TIME_HEADER, value);
    }
    response
}

fn unavailable(detail: impl Into<String>) -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "detail": detail.into() })),
    )
        .into_response()
}

// ===== Handlers =====

async fn root() -> Json<serde_json::Value> {
    Json(json!({ "message": "Welcome to the Kvasir crypto Q&A service!" }))
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn healthz_cache(State(service): State<AskService>) -> Response {
    match service.cache_health().await {
        Ok(()) => Json(json!({ "status": "ok", "message": "Cache store is healthy" })).into_response(),
        Err(e) => {
            warn!(error = %e, "cache health check failed");
            unavailable(format!("Cache store unreachable: {e}"))
        }
    }
}

async fn api_crypto(State(service): State<AskService>) -> Response {
    let data = service.market_data().await;
    if data.is_empty() {
        return unavailable("Unable to fetch crypto data");
    }
    Json(data).into_response()
}

async fn analyze_sentiment(
    State(service): State<AskService>,
    Json(request): Json<QuestionRequest>,
) -> Response {
    match service.analyze_sentiment(&request.question).await {
        Ok(result) => Json(json!({ "sentiment": result.label, "score": result.score })).into_response(),
        Err(e) => {
            error!(error = %e, "sentiment analysis failed");
            unavailable("Sentiment analysis is unavailable")
        }
    }
}

async fn ask(State(service): State<AskService>, Json(request): Json<QuestionRequest>) -> Response {
    let answer = service.ask(&request.question).await;
    let mut response = Json(answer.result).into_response();
    response.headers_mut().insert(
        ANSWER_SOURCE_HEADER,
        HeaderValue::from_static(answer.source.as_str()),
    );
    response
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(client_id): Path<String>,
    State(service): State<AskService>,
) -> Response {
    ws.on_upgrade(move |socket| push_channel(socket, client_id, service))
}

// ===== Push channel =====

/// One question at a time per connection; the next message is read once
/// the current question has settled.
async fn push_channel(mut socket: WebSocket, client_id: String, service: AskService) {
    info!(client_id, "push client connected");

    while let Some(message) = socket.recv().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!(client_id, error = %e, "push channel receive failed");
                break;
            }
        };

        let reply = match serde_json::from_str::<QuestionRequest>(&text) {
            Ok(request) => answer_over_channel(&mut socket, &service, &request.question).await,
            Err(e) => PushMessage::Error {
                message: e.to_string(),
            },
        };

        if !push(&mut socket, &reply).await {
            break;
        }
    }

    info!(client_id, "push client disconnected");
}

/// Send `processing`, then poll the task until it settles.
async fn answer_over_channel(
    socket: &mut WebSocket,
    service: &AskService,
    question: &str,
) -> PushMessage {
    let processing = PushMessage::Processing {
        message: "Processing your questions...".to_string(),
    };
    if !push(socket, &processing).await {
        return PushMessage::Error {
            message: "Connection closed".to_string(),
        };
    }

    let handle = match service.submit(question).await {
        Ok(handle) => handle,
        Err(e) => {
            return PushMessage::Error {
                message: e.to_string(),
            };
        }
    };

    let poll = service.config().poll_interval;
    loop {
        match handle.status() {
            TaskStatus::Succeeded(result) => {
                service.remember(question, &result).await;
                return PushMessage::Complete { response: result };
            }
            TaskStatus::Failed { .. } => {
                return PushMessage::Error {
                    message: "Failed to process your question.".to_string(),
                };
            }
            _ => tokio::time::sleep(poll).await,
        }
    }
}

async fn push(socket: &mut WebSocket, message: &PushMessage) -> bool {
    let payload = match serde_json::to_string(message) {
        Ok(payload) => payload,
        Err(e) => {
            error!(error = %e, "failed to encode push message");
            return false;
        }
    };
    socket.send(Message::Text(payload)).await.is_ok()
}
