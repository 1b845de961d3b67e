//! Configuration and secrets loading from files on disk.

#![cfg(feature = "server")]

use std::io::Write;
use std::time::Duration;

use kvasir::server::config::{Config, Secrets};
use tempfile::NamedTempFile;

fn write_temp(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn full_config_file() {
    let file = write_temp(
        r#"
        [server]
        address = "0.0.0.0:9000"
        cors_origins = ["https://dash.example.com"]

        [server.limits]
        request_timeout_secs = 10
        poll_interval_ms = 250

        [cache]
        redis_url = "redis://localhost:6379"
        max_entries = 500
        coin_data_ttl_secs = 120
        stale_grace_secs = 900

        [market]
        currency = "EUR"
        politeness_interval_ms = 2000
        coin_lookup_depth = 250

        [sentiment]
        model = "ProsusAI/finbert"

        [queue]
        workers = 8
        max_retries = 5
        retry_delay_secs = 30
        "#,
    );

    let config = Config::load(Some(file.path())).unwrap();

    assert_eq!(config.server.address, "0.0.0.0:9000");
    assert_eq!(config.server.cors_origins, vec!["https://dash.example.com"]);
    assert_eq!(config.cache.redis_url.as_deref(), Some("redis://localhost:6379"));
    assert_eq!(config.cache.max_entries, 500);
    assert_eq!(config.sentiment.model.as_deref(), Some("ProsusAI/finbert"));

    let ttls = config.cache_ttls();
    assert_eq!(ttls.stale_grace, Duration::from_secs(900));

    let market = config.market_gateway();
    assert_eq!(market.currency, "eur");
    assert_eq!(market.politeness_interval, Duration::from_millis(2000));
    assert_eq!(market.coin_lookup_depth, 250);

    let queue = config.queue();
    assert_eq!(queue.workers, 8);
    assert_eq!(queue.retry.max_retries, 5);
    assert_eq!(queue.retry.delay, Duration::from_secs(30));

    let ask = config.ask();
    assert_eq!(ask.timeout, Duration::from_secs(10));
    assert_eq!(ask.poll_interval, Duration::from_millis(250));
}

#[test]
fn empty_file_yields_defaults() {
    let file = write_temp("");
    let config = Config::load(Some(file.path())).unwrap();

    assert_eq!(config.server.address, "127.0.0.1:8000");
    assert_eq!(config.queue().workers, 4);
    assert_eq!(config.queue().retry.max_retries, 3);
    assert_eq!(config.ask().timeout, Duration::from_secs(30));
    assert_eq!(config.market_gateway().currency, "usd");
}

#[test]
fn malformed_file_is_an_error() {
    let file = write_temp("[server\naddress = ");
    let err = Config::load(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config file"));
}

#[cfg(unix)]
#[test]
fn secrets_require_private_permissions() {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    let file = write_temp(
        r#"
        [huggingface]
        api_key = "hf_secret"
        "#,
    );

    fs::set_permissions(file.path(), fs::Permissions::from_mode(0o644)).unwrap();
    let err = Secrets::load_checked(file.path()).unwrap_err();
    assert!(err.to_string().contains("insecure permissions"));

    fs::set_permissions(file.path(), fs::Permissions::from_mode(0o600)).unwrap();
    let secrets = Secrets::load_checked(file.path()).unwrap();
    assert_eq!(secrets.api_key("huggingface").as_deref(), Some("hf_secret"));
}
