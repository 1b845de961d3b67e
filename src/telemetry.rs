//! Telemetry metric name constants.
//!
//! Centralised metric names for kvasir operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `kvasir_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `namespace`: cache keyspace ("market_data", "coin", "sentiment", "full_response")
//! - `operation`: upstream call ("markets", "coin", "classify")
//! - `status`: outcome: "ok", "throttled" or "error"
//! - `source`: where an answer came from ("cached", "processed", "stale", "fallback")

/// Fresh cache hits.
///
/// Labels: `namespace`.
pub const CACHE_HITS_TOTAL: &str = "kvasir_cache_hits_total";

/// Cache misses (absent entries, and stale entries the caller will refresh).
///
/// Labels: `namespace`.
pub const CACHE_MISSES_TOTAL: &str = "kvasir_cache_misses_total";

/// Expired entries served because a fresh fetch failed.
///
/// Labels: `namespace`.
pub const CACHE_STALE_SERVED_TOTAL: &str = "kvasir_cache_stale_served_total";

/// Cache store failures that were degraded to a miss or a dropped write.
///
/// Labels: `operation` ("get" | "set").
pub const CACHE_ERRORS_TOTAL: &str = "kvasir_cache_errors_total";

/// Outbound calls to the market data API and the classifier.
///
/// Labels: `operation`, `status`.
pub const UPSTREAM_REQUESTS_TOTAL: &str = "kvasir_upstream_requests_total";

/// Total task retries (not counting the first attempt).
pub const TASK_RETRIES_TOTAL: &str = "kvasir_task_retries_total";

/// Tasks that failed for good: retries exhausted or a permanent error.
pub const TASK_FAILURES_TOTAL: &str = "kvasir_task_failures_total";

/// Wall time of one successful question-processing attempt, in seconds.
pub const TASK_DURATION_SECONDS: &str = "kvasir_task_duration_seconds";

/// Answers returned by the ask service.
///
/// Labels: `source`.
pub const ANSWERS_TOTAL: &str = "kvasir_answers_total";
