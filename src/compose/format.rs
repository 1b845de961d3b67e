//! Display formatting for numbers and metrics maps.

use std::collections::BTreeMap;

use crate::types::MarketSnapshot;

const SUFFIXES: &[(f64, &str)] = &[(1e12, "T"), (1e9, "B"), (1e6, "M"), (1e3, "K")];

/// Format with a K/M/B/T suffix and two decimals.
///
/// ```rust
/// # use kvasir::compose::format_large_number;
/// assert_eq!(format_large_number(999.0), "999.00");
/// assert_eq!(format_large_number(2_500_000.0), "2.50M");
/// ```
pub fn format_large_number(num: f64) -> String {
    for &(threshold, suffix) in SUFFIXES {
        if num >= threshold {
            return format!("{:.2}{suffix}", num / threshold);
        }
    }
    format!("{num:.2}")
}

/// Per-coin metrics: price, market cap, 24h volume and 24h change.
pub fn coin_metrics(coin: &MarketSnapshot) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("price".to_string(), format!("${}", coin.current_price)),
        (
            "marketCap".to_string(),
            format!("${}", format_large_number(coin.market_cap)),
        ),
        (
            "volume24h".to_string(),
            format!("${}", format_large_number(coin.total_volume)),
        ),
        (
            "change24h".to_string(),
            format!("{}%", coin.price_change_percentage_24h),
        ),
    ])
}

/// Aggregate metrics over a market snapshot. Empty for an empty snapshot.
pub fn market_overview_metrics(coins: &[MarketSnapshot]) -> BTreeMap<String, String> {
    if coins.is_empty() {
        return BTreeMap::new();
    }

    let total_market_cap: f64 = coins.iter().map(|c| c.market_cap).sum();
    let total_volume: f64 = coins.iter().map(|c| c.total_volume).sum();
    let avg_change =
        coins.iter().map(|c| c.price_change_percentage_24h).sum::<f64>() / coins.len() as f64;

    BTreeMap::from([
        (
            "totalMarketCap".to_string(),
            format!("${}", format_large_number(total_market_cap)),
        ),
        (
            "totalVolume".to_string(),
            format!("${}", format_large_number(total_volume)),
        ),
        ("avgChange24h".to_string(), format!("{avg_change:.2}%")),
        ("coinsAnalyzed".to_string(), coins.len().to_string()),
    ])
}
