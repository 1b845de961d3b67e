//! Cache key namespaces.
//!
//! Every key is `{namespace}:{identifier}` with the identifier lower-cased,
//! so two requests that differ only in case share an entry. Namespaces are
//! independent keyspaces: the same identifier in two namespaces never
//! produces the same key.

use std::fmt;

/// A keyspace in the shared store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    MarketData,
    Coin,
    Sentiment,
    FullResponse,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::MarketData => "market_data",
            Namespace::Coin => "coin",
            Namespace::Sentiment => "sentiment",
            Namespace::FullResponse => "full_response",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Ranked snapshot of the top `limit` coins priced in `currency`.
    MarketData { currency: String, limit: usize },
    /// Single coin snapshot (or negative entry) priced in `currency`.
    Coin { currency: String, id: String },
    /// Classifier result for an exact question string.
    Sentiment(String),
    /// Fully composed answer for an exact question string.
    FullResponse(String),
}

impl CacheKey {
    pub fn market_data(currency: &str, limit: usize) -> Self {
        Self::MarketData {
            currency: currency.to_string(),
            limit,
        }
    }

    pub fn coin(currency: &str, id: &str) -> Self {
        Self::Coin {
            currency: currency.to_string(),
            id: id.to_string(),
        }
    }

    pub fn sentiment(question: &str) -> Self {
        Self::Sentiment(question.to_string())
    }

    pub fn full_response(question: &str) -> Self {
        Self::FullResponse(question.to_string())
    }

    pub fn namespace(&self) -> Namespace {
        match self {
            Self::MarketData { .. } => Namespace::MarketData,
            Self::Coin { .. } => Namespace::Coin,
            Self::Sentiment(_) => Namespace::Sentiment,
            Self::FullResponse(_) => Namespace::FullResponse,
        }
    }

    /// The identifier part, before case folding.
    fn identifier(&self) -> String {
        match self {
            Self::MarketData { currency, limit } => format!("{currency}_{limit}"),
            Self::Coin { currency, id } => format!("{currency}_{id}"),
            Self::Sentiment(question) | Self::FullResponse(question) => question.clone(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace(), self.identifier().to_lowercase())
    }
}
