//! CoinGecko `/coins/markets` client.
//!
//! See: <https://docs.coingecko.com/reference/coins-markets>

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::MarketProvider;
use crate::types::MarketSnapshot;
use crate::{KvasirError, Result, telemetry};

/// Default base URL for the public CoinGecko API
pub const DEFAULT_BASE_URL: &str = "https://api.coingecko.com/api/v3";

/// Client for the CoinGecko markets endpoint.
#[derive(Clone)]
pub struct CoinGeckoClient {
    http: Client,
    base_url: String,
}

impl CoinGeckoClient {
    /// Create a client against the public API.
    pub fn new() -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Create a client with a custom base URL (for testing with wiremock).
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| KvasirError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Fetch the top `limit` coins by market cap, priced in `currency`.
    pub async fn markets(&self, currency: &str, limit: usize) -> Result<Vec<MarketSnapshot>> {
        let per_page = limit.to_string();
        let query = [
            ("vs_currency", currency),
            ("order", "market_cap_desc"),
            ("per_page", per_page.as_str()),
            ("page", "1"),
            ("sparkline", "false"),
            ("price_change_percentage", "24h"),
        ];
        self.get_markets(&query, "markets").await
    }

    /// Fetch a single coin by its CoinGecko id, priced in `currency`.
    ///
    /// Returns `Ok(None)` when the upstream knows no such id.
    pub async fn coin(&self, currency: &str, id: &str) -> Result<Option<MarketSnapshot>> {
        let query = [("vs_currency", currency), ("ids", id)];
        let coins = self.get_markets(&query, "coin").await?;
        Ok(coins.into_iter().next())
    }

    async fn get_markets(
        &self,
        query: &[(&str, &str)],
        operation: &'static str,
    ) -> Result<Vec<MarketSnapshot>> {
        let url = format!("{}/coins/markets", self.base_url);

        let response = match self.http.get(&url).query(query).send().await {
            Ok(response) => response,
            Err(e) => {
                record(operation, "error");
                return Err(KvasirError::Http(e.to_string()));
            }
        };

        if let Err(e) = Self::handle_response_errors(&response) {
            let status = match e {
                KvasirError::RateLimited { .. } => "throttled",
                _ => "error",
            };
            record(operation, status);
            return Err(e);
        }

        let coins = match Self::read_body(response).await {
            Ok(coins) => coins,
            Err(e) => {
                record(operation, "error");
                return Err(e);
            }
        };

        record(operation, "ok");
        Ok(coins.into_iter().map(MarketSnapshot::from).collect())
    }

    /// A body cut off in transit is `Http`; one that is not a coin array is `Json`.
    async fn read_body(response: reqwest::Response) -> Result<Vec<CoinMarket>> {
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Check response status and map to appropriate error.
    fn handle_response_errors(response: &reqwest::Response) -> Result<()> {
        let status = response.status();

        if status.is_success() {
            return Ok(());
        }

        match status.as_u16() {
            401 | 403 => Err(KvasirError::AuthenticationFailed),
            429 => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(Duration::from_secs);
                Err(KvasirError::RateLimited { retry_after })
            }
            code => Err(KvasirError::Api {
                status: code,
                message: format!("CoinGecko API error: {status}"),
            }),
        }
    }
}

fn record(operation: &'static str, status: &'static str) {
    metrics::counter!(telemetry::UPSTREAM_REQUESTS_TOTAL,
        "operation" => operation,
        "status" => status,
    )
    .increment(1);
}

/// Wire shape of one `/coins/markets` element. Numeric fields are nullable
/// upstream (new listings often lack a market cap or 24h change).
#[derive(Deserialize)]
struct CoinMarket {
    id: String,
    symbol: String,
    name: String,
    current_price: Option<f64>,
    market_cap: Option<f64>,
    total_volume: Option<f64>,
    price_change_percentage_24h: Option<f64>,
}

impl From<CoinMarket> for MarketSnapshot {
    fn from(c: CoinMarket) -> Self {
        MarketSnapshot {
            id: c.id,
            symbol: c.symbol,
            name: c.name,
            current_price: c.current_price.unwrap_or_default(),
            market_cap: c.market_cap.unwrap_or_default(),
            total_volume: c.total_volume.unwrap_or_default(),
            price_change_percentage_24h: c.price_change_percentage_24h.unwrap_or_default(),
        }
    }
}

#[async_trait]
impl MarketProvider for CoinGeckoClient {
    fn name(&self) -> &str {
        "coingecko"
    }

    async fn fetch_markets(&self, currency: &str, limit: usize) -> Result<Vec<MarketSnapshot>> {
        CoinGeckoClient::markets(self, currency, limit).await
    }

    async fn fetch_coin(&self, currency: &str, id: &str) -> Result<Option<MarketSnapshot>> {
        CoinGeckoClient::coin(self, currency, id).await
    }
}
