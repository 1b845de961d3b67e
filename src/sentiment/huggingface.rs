//! HuggingFace Inference API client for text classification.
//!
//! This client uses HuggingFace's serverless inference endpoints.
//! See: <https://huggingface.co/docs/api-inference/index>

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::SentimentClassifier;
use crate::types::RawSentiment;
use crate::{KvasirError, Result, telemetry};

/// Default base URL for HuggingFace Inference API
pub const DEFAULT_BASE_URL: &str = "https://api-inference.huggingface.co";

/// Financial-tone classifier used unless configured otherwise.
pub const DEFAULT_MODEL: &str = "yiyanghkust/finbert-tone";

/// Client for a HuggingFace text-classification model.
#[derive(Clone)]
pub struct HuggingFaceClient {
    api_key: Option<String>,
    http: Client,
    base_url: String,
    model: String,
}

impl HuggingFaceClient {
    /// Create a client for the default model against the public API.
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Create a client with a custom base URL (for testing with wiremock).
    pub fn with_base_url(api_key: Option<String>, base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| KvasirError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_key,
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: DEFAULT_MODEL.to_string(),
        })
    }

    /// Use a different model ID (e.g., `ProsusAI/finbert`).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Classify `text` and return the highest-scoring label.
    pub async fn classify(&self, text: &str) -> Result<RawSentiment> {
        let result = self.request(text).await;
        let status = match &result {
            Ok(_) => "ok",
            Err(KvasirError::RateLimited { .. }) => "throttled",
            Err(_) => "error",
        };
        metrics::counter!(telemetry::UPSTREAM_REQUESTS_TOTAL,
            "operation" => "classify",
            "status" => status,
        )
        .increment(1);
        result
    }

    async fn request(&self, text: &str) -> Result<RawSentiment> {
        let url = format!("{}/models/{}", self.base_url, self.model);

        let mut request = self.http.post(&url).json(&ClassifyRequest { inputs: text });
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| KvasirError::Classifier(e.to_string()))?;

        self.handle_response_errors(&response)?;

        let body: ClassifyResponse = response
            .json()
            .await
            .map_err(|e| KvasirError::Classifier(format!("malformed classifier payload: {e}")))?;

        body.into_scores()
            .into_iter()
            .max_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal))
            .map(|s| RawSentiment {
                label: s.label,
                score: s.score,
            })
            .ok_or(KvasirError::EmptyResponse)
    }

    /// Check response status and map to appropriate error.
    fn handle_response_errors(&self, response: &reqwest::Response) -> Result<()> {
        let status = response.status();

        if status.is_success() {
            return Ok(());
        }

        match status.as_u16() {
            401 | 403 => Err(KvasirError::AuthenticationFailed),
            404 => Err(KvasirError::ModelNotFound(self.model.clone())),
            429 => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(Duration::from_secs);
                Err(KvasirError::RateLimited { retry_after })
            }
            503 => Err(KvasirError::Api {
                status: 503,
                message: "Model is loading, please retry".to_string(),
            }),
            code => Err(KvasirError::Api {
                status: code,
                message: format!("HuggingFace API error: {status}"),
            }),
        }
    }
}

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    inputs: &'a str,
}

#[derive(Deserialize)]
struct LabelScore {
    label: String,
    score: f32,
}

/// Single-input responses come back either nested (`[[..]]`) or flat (`[..]`)
/// depending on the model's pipeline version.
#[derive(Deserialize)]
#[serde(untagged)]
enum ClassifyResponse {
    Nested(Vec<Vec<LabelScore>>),
    Flat(Vec<LabelScore>),
}

impl ClassifyResponse {
    fn into_scores(self) -> Vec<LabelScore> {
        match self {
            ClassifyResponse::Nested(outer) => outer.into_iter().next().unwrap_or_default(),
            ClassifyResponse::Flat(scores) => scores,
        }
    }
}

#[async_trait]
impl SentimentClassifier for HuggingFaceClient {
    fn name(&self) -> &str {
        "huggingface"
    }

    async fn classify(&self, text: &str) -> Result<RawSentiment> {
        HuggingFaceClient::classify(self, text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_and_flat_payloads_decode() {
        let nested: ClassifyResponse =
            serde_json::from_str(r#"[[{"label":"Positive","score":0.9},{"label":"Neutral","score":0.1}]]"#)
                .unwrap();
        assert_eq!(nested.into_scores().len(), 2);

        let flat: ClassifyResponse =
            serde_json::from_str(r#"[{"label":"Negative","score":0.7}]"#).unwrap();
        assert_eq!(flat.into_scores()[0].label, "Negative");
    }

    #[test]
    fn default_model_is_finbert_tone() {
        let client = HuggingFaceClient::with_base_url(None, "http://localhost:9/").unwrap();
        assert_eq!(client.model(), DEFAULT_MODEL);
        assert_eq!(client.base_url, "http://localhost:9");
    }
}
