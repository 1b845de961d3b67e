//! kvasird: Kvasir daemon.
//!
//! Serves the crypto Q&A service over HTTP and a websocket push channel.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use kvasir::cache::{Cache, CacheStore, MemoryStore};
use kvasir::market::{CoinGeckoClient, MarketGateway};
use kvasir::sentiment::{HuggingFaceClient, SentimentService};
use kvasir::server::config::{Config, Secrets};
use kvasir::task::{KeywordTable, Pipeline, TaskQueue};
use kvasir::{AskService, KvasirError};

/// Kvasir daemon: cached crypto market Q&A.
#[derive(Parser)]
#[command(name = "kvasird")]
#[command(version = kvasir::PKG_VERSION)]
#[command(about = "Kvasir crypto Q&A daemon")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind, overriding the config file.
    #[arg(short, long)]
    address: Option<String>,

    /// Redis URL for the shared cache store.
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Extra CORS origin for the dashboard frontend.
    #[arg(long, env = "FRONTEND_URL")]
    frontend_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref())?;
    let secrets = Secrets::load()?;

    if let Some(address) = args.address {
        config.server.address = address;
    }
    if args.redis_url.is_some() {
        config.cache.redis_url = args.redis_url;
    }
    if let Some(origin) = args.frontend_url
        && !config.server.cors_origins.contains(&origin)
    {
        config.server.cors_origins.push(origin);
    }

    let addr: SocketAddr = config
        .server
        .address
        .parse()
        .map_err(|e| KvasirError::Configuration(format!("Invalid address: {e}")))?;

    info!(version = kvasir::version_string(), %addr, "kvasird starting");

    let service = build_service(&config, &secrets).await?;
    let app = kvasir::server::router(service, &config.server.cors_origins);
    kvasir::server::serve(addr, app).await?;

    Ok(())
}

/// Wire cache, upstream clients, pipeline and queue from configuration.
async fn build_service(config: &Config, secrets: &Secrets) -> kvasir::Result<AskService> {
    let store = open_store(config).await?;
    let cache = Cache::new(store, config.cache_ttls());

    let market_client = match config.market.base_url {
        Some(ref url) => CoinGeckoClient::with_base_url(url.as_str())?,
        None => CoinGeckoClient::new()?,
    };
    let gateway = Arc::new(MarketGateway::new(
        Arc::new(market_client),
        cache.clone(),
        config.market_gateway(),
    ));

    let api_key = secrets.api_key("huggingface");
    if api_key.is_none() {
        warn!("no HuggingFace API key configured, requests will be anonymous");
    }
    let mut classifier = match config.sentiment.base_url {
        Some(ref url) => HuggingFaceClient::with_base_url(api_key, url.as_str())?,
        None => HuggingFaceClient::new(api_key)?,
    };
    if let Some(ref model) = config.sentiment.model {
        classifier = classifier.with_model(model.as_str());
    }
    info!(model = classifier.model(), "sentiment classifier configured");
    let sentiment = SentimentService::new(Arc::new(classifier), cache.clone());

    let pipeline = Pipeline::new(KeywordTable::default(), gateway.clone(), sentiment.clone());
    let queue = Arc::new(TaskQueue::start(Arc::new(pipeline), config.queue()));

    Ok(AskService::new(queue, cache, sentiment, gateway, config.ask()))
}

async fn open_store(config: &Config) -> kvasir::Result<Arc<dyn CacheStore>> {
    match config.cache.redis_url {
        #[cfg(feature = "redis")]
        Some(ref url) => {
            let store = kvasir::cache::RedisStore::connect(url).await?;
            store.ping().await?;
            info!("using redis cache store");
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "redis"))]
        Some(_) => {
            warn!("redis_url is set but the redis feature is disabled, using in-process cache");
            Ok(Arc::new(MemoryStore::with_max_entries(config.cache.max_entries)))
        }
        None => {
            info!(max_entries = config.cache.max_entries, "using in-process cache store");
            Ok(Arc::new(MemoryStore::with_max_entries(config.cache.max_entries)))
        }
    }
}
