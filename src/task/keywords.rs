//! Crypto-name keyword table and context extraction.

use std::fmt;

/// Default `(keyword, coin id)` pairs, in match order.
///
/// Order matters: the first keyword found anywhere in the question wins,
/// even if a longer keyword further down would also match. "bitcoin cash"
/// therefore resolves to `bitcoin`, and short tickers such as "om" or "eth"
/// match inside ordinary words.
pub const DEFAULT_KEYWORDS: &[(&str, &str)] = &[
    // Bitcoin and variations
    ("bitcoin", "bitcoin"),
    ("btc", "bitcoin"),
    ("wrapped bitcoin", "bitcoin"),
    ("bitcoin cash", "bitcoin-cash"),
    ("bch", "bitcoin-cash"),
    // Ethereum and variations
    ("ethereum", "ethereum"),
    ("eth", "ethereum"),
    ("lido staked ether", "ethereum"),
    ("steth", "ethereum"),
    // Stablecoins
    ("tether", "tether"),
    ("usdt", "tether"),
    ("usdc", "usd-coin"),
    ("usd coin", "usd-coin"),
    ("dai", "dai"),
    ("ethena usde", "ethena-usd"),
    // Major altcoins
    ("cardano", "cardano"),
    ("ada", "cardano"),
    ("dogecoin", "dogecoin"),
    ("doge", "dogecoin"),
    ("ripple", "ripple"),
    ("xrp", "ripple"),
    ("solana", "solana"),
    ("sol", "solana"),
    ("polkadot", "polkadot"),
    ("dot", "polkadot"),
    ("chainlink", "chainlink"),
    ("link", "chainlink"),
    ("avalanche", "avalanche-2"),
    ("avax", "avalanche-2"),
    ("litecoin", "litecoin"),
    ("ltc", "litecoin"),
    // Other notable coins
    ("tron", "tron"),
    ("trx", "tron"),
    ("stellar", "stellar"),
    ("xlm", "stellar"),
    ("hedera", "hedera"),
    ("hbar", "hedera"),
    ("shiba inu", "shiba-inu"),
    ("shib", "shiba-inu"),
    ("leo", "leo-token"),
    ("mantra", "mantra-dao"),
    ("om", "mantra-dao"),
    ("sui", "sui"),
    ("toncoin", "the-open-network"),
    ("ton", "the-open-network"),
    ("pi network", "pi-network"),
    ("pi", "pi-network"),
];

/// What a question is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CryptoContext {
    /// A specific coin, by upstream id.
    Coin(String),
    /// No coin named; the market as a whole.
    Market,
}

impl CryptoContext {
    pub fn coin_id(&self) -> Option<&str> {
        match self {
            CryptoContext::Coin(id) => Some(id),
            CryptoContext::Market => None,
        }
    }
}

impl fmt::Display for CryptoContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CryptoContext::Coin(id) => f.write_str(id),
            CryptoContext::Market => f.write_str("the cryptocurrency market"),
        }
    }
}

/// Ordered, immutable keyword-to-coin lookup.
#[derive(Debug, Clone)]
pub struct KeywordTable {
    entries: Vec<(String, String)>,
}

impl KeywordTable {
    /// Build a table. Keywords are matched lower-cased, in the given order.
    pub fn new<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.into().to_lowercase(), v.into()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The coin named by the first keyword found in `question`.
    pub fn extract(&self, question: &str) -> CryptoContext {
        let question = question.to_lowercase();
        self.entries
            .iter()
            .find(|(keyword, _)| question.contains(keyword.as_str()))
            .map(|(_, id)| CryptoContext::Coin(id.clone()))
            .unwrap_or(CryptoContext::Market)
    }
}

impl Default for KeywordTable {
    fn default() -> Self {
        Self::new(DEFAULT_KEYWORDS.iter().copied())
    }
}
