//! Configuration loading for kvasird.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. `--config <path>` (CLI flag)
//! 2. `~/.kvasir/config.toml` (user)
//! 3. `/etc/kvasir/config.toml` (system)
//!
//! With no file at 2 or 3, built-in defaults are used. An explicit path
//! that does not exist is an error.
//!
//! Secrets are loaded separately with mandatory permission checks:
//! 1. `~/.kvasir/secrets.toml` (user, must be 0600)
//! 2. `/etc/kvasir/secrets.toml` (system, must be 0600)

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::info;

use crate::cache::{CacheTtls, DEFAULT_MAX_ENTRIES};
use crate::market::MarketGatewayConfig;
use crate::service::AskConfig;
use crate::task::{QueueConfig, RetryPolicy};
use crate::{KvasirError, Result};

/// Daemon configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub market: MarketConfig,
    #[serde(default)]
    pub sentiment: SentimentConfig,
    #[serde(default)]
    pub queue: QueueSection,
}

/// Server network configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to (default: 127.0.0.1:8000).
    #[serde(default = "default_address")]
    pub address: String,
    /// Origins allowed by CORS (default: http://localhost:3000).
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
    #[serde(default)]
    pub limits: LimitsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            cors_origins: default_cors_origins(),
            limits: LimitsConfig::default(),
        }
    }
}

fn default_address() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

/// Request timing limits.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// How long `/ask` waits for a task, in seconds (default: 30).
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
    /// Push-channel status polling interval in milliseconds (default: 1000).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_timeout(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_poll_interval() -> u64 {
    1000
}

/// Cache store and TTLs.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Redis URL. When unset (or the `redis` feature is off) an in-process
    /// store is used.
    #[serde(default)]
    pub redis_url: Option<String>,
    /// Capacity of the in-process store (default: 10000).
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
    #[serde(default)]
    pub market_data_ttl_secs: Option<u64>,
    #[serde(default)]
    pub coin_data_ttl_secs: Option<u64>,
    #[serde(default)]
    pub sentiment_ttl_secs: Option<u64>,
    #[serde(default)]
    pub full_response_ttl_secs: Option<u64>,
    #[serde(default)]
    pub stale_grace_secs: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            max_entries: default_max_entries(),
            market_data_ttl_secs: None,
            coin_data_ttl_secs: None,
            sentiment_ttl_secs: None,
            full_response_ttl_secs: None,
            stale_grace_secs: None,
        }
    }
}

fn default_max_entries() -> u64 {
    DEFAULT_MAX_ENTRIES
}

/// Market data upstream.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarketConfig {
    /// API base URL (default: public CoinGecko).
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub politeness_interval_ms: Option<u64>,
    #[serde(default)]
    pub coin_lookup_depth: Option<usize>,
}

/// Sentiment classifier.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SentimentConfig {
    /// Inference API base URL (default: public HuggingFace).
    #[serde(default)]
    pub base_url: Option<String>,
    /// Model ID (default: yiyanghkust/finbert-tone).
    #[serde(default)]
    pub model: Option<String>,
}

/// Task queue sizing and retries.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueueSection {
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub capacity: Option<usize>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub retry_delay_secs: Option<u64>,
}

/// Secrets configuration (API keys).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Secrets {
    #[serde(default)]
    pub huggingface: Option<ApiKeySecret>,
}

/// A single API key secret.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeySecret {
    pub api_key: String,
}

/// Service name → environment variable name mapping.
const SERVICE_ENV_VARS: &[(&str, &str)] = &[("huggingface", "HF_API_KEY")];

impl Config {
    /// Load configuration from the standard locations.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let Some(path) = Self::resolve_config_path(explicit_path)? else {
            info!("no config file found, using defaults");
            return Ok(Self::default());
        };
        Self::load_from_file(&path)
    }

    /// Parse a specific config file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            KvasirError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            KvasirError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })
    }

    /// Resolve the config file path.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(KvasirError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".kvasir").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/kvasir/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }

    /// Cache TTLs: defaults, then file values, then environment overrides.
    pub fn cache_ttls(&self) -> CacheTtls {
        let c = &self.cache;
        let mut ttls = CacheTtls::default();
        if let Some(s) = c.market_data_ttl_secs {
            ttls = ttls.market_data(Duration::from_secs(s));
        }
        if let Some(s) = c.coin_data_ttl_secs {
            ttls = ttls.coin_data(Duration::from_secs(s));
        }
        if let Some(s) = c.sentiment_ttl_secs {
            ttls = ttls.sentiment(Duration::from_secs(s));
        }
        if let Some(s) = c.full_response_ttl_secs {
            ttls = ttls.full_response(Duration::from_secs(s));
        }
        if let Some(s) = c.stale_grace_secs {
            ttls = ttls.stale_grace(Duration::from_secs(s));
        }
        ttls.with_env_overrides()
    }

    pub fn market_gateway(&self) -> MarketGatewayConfig {
        let m = &self.market;
        let mut config = MarketGatewayConfig::default();
        if let Some(currency) = &m.currency {
            config = config.currency(currency.to_lowercase());
        }
        if let Some(ms) = m.politeness_interval_ms {
            config = config.politeness_interval(Duration::from_millis(ms));
        }
        if let Some(depth) = m.coin_lookup_depth {
            config = config.coin_lookup_depth(depth);
        }
        config
    }

    pub fn queue(&self) -> QueueConfig {
        let q = &self.queue;
        let defaults = QueueConfig::default();
        let mut retry = RetryPolicy::default();
        if let Some(n) = q.max_retries {
            retry = retry.max_retries(n);
        }
        if let Some(s) = q.retry_delay_secs {
            retry = retry.delay(Duration::from_secs(s));
        }
        QueueConfig::new()
            .workers(q.workers.unwrap_or(defaults.workers))
            .capacity(q.capacity.unwrap_or(defaults.capacity))
            .retry(retry)
    }

    pub fn ask(&self) -> AskConfig {
        AskConfig::new()
            .timeout(Duration::from_secs(self.server.limits.request_timeout_secs))
            .poll_interval(Duration::from_millis(self.server.limits.poll_interval_ms))
    }
}

impl Secrets {
    /// Load secrets from the standard locations with permission checks.
    ///
    /// Resolution order:
    /// 1. `~/.kvasir/secrets.toml` (if exists, must be 0600)
    /// 2. `/etc/kvasir/secrets.toml` (if exists, must be 0600)
    ///
    /// Returns empty secrets if no file exists (keys may come from env vars).
    pub fn load() -> Result<Self> {
        if let Some(home) = dirs::home_dir() {
            let user_secrets = home.join(".kvasir").join("secrets.toml");
            if user_secrets.exists() {
                return Self::load_checked(&user_secrets);
            }
        }

        let system_secrets = PathBuf::from("/etc/kvasir/secrets.toml");
        if system_secrets.exists() {
            return Self::load_checked(&system_secrets);
        }

        Ok(Secrets::default())
    }

    /// Load a specific secrets file after checking its permissions.
    pub fn load_checked(path: &Path) -> Result<Self> {
        Self::check_permissions(path)?;
        let content = fs::read_to_string(path).map_err(|e| {
            KvasirError::Configuration(format!("Failed to read secrets file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            KvasirError::Configuration(format!("Failed to parse secrets file {path:?}: {e}"))
        })
    }

    /// Check that the secrets file has secure permissions (0600 or 0400).
    #[cfg(unix)]
    fn check_permissions(path: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let metadata = fs::metadata(path).map_err(|e| {
            KvasirError::Configuration(format!("Failed to stat secrets file {path:?}: {e}"))
        })?;

        let mode = metadata.permissions().mode();
        // Reject if group or other bits are set
        if mode & 0o077 != 0 {
            return Err(KvasirError::Configuration(format!(
                "Secrets file {path:?} has insecure permissions {:o}. Must be 0600 or 0400.",
                mode & 0o777
            )));
        }

        Ok(())
    }

    #[cfg(not(unix))]
    fn check_permissions(_path: &Path) -> Result<()> {
        Ok(())
    }

    /// API key for a service, falling back to the corresponding environment variable.
    pub fn api_key(&self, service: &str) -> Option<String> {
        self.api_key_with(service, |var| std::env::var(var).ok())
    }

    fn api_key_with(&self, service: &str, env: impl Fn(&str) -> Option<String>) -> Option<String> {
        let from_file = match service {
            "huggingface" => self.huggingface.as_ref(),
            _ => None,
        }
        .map(|s| s.api_key.clone());

        from_file.or_else(|| {
            SERVICE_ENV_VARS
                .iter()
                .find(|(name, _)| *name == service)
                .and_then(|(_, var)| env(var))
        })
    }
}
