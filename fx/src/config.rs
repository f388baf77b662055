//! Rate engine configuration.

use std::collections::BTreeSet;
use std::time::Duration;

use ratebridge_common::Currency;

/// Crypto assets priced by default.
const DEFAULT_ASSETS: &[&str] = &[
    "BTC", "ETH", "USDT", "BNB", "ADA", "SOL", "XRP", "DOT", "DOGE", "AVAX", "LTC", "LINK", "BCH",
    "XLM", "XMR", "TON",
];

/// Reference currencies assets are priced against by default.
const DEFAULT_QUOTE_CURRENCIES: &[&str] = &["USD", "EUR", "RUB", "GBP", "UAH", "KZT"];

/// Configuration for the rate cache and derivation engine.
#[derive(Debug, Clone)]
pub struct RatesConfig {
    /// Maximum age of the published matrix before it is stale.
    pub ttl: Duration,
    /// Upper bound on a single upstream fetch.
    pub fetch_timeout: Duration,
    /// Quote currency used to bridge asset-to-asset rates (q0).
    pub anchor_quote: Currency,
    /// Asset used to bridge quote-to-quote rates (p0).
    pub anchor_asset: Currency,
    /// Priced assets (P).
    pub assets: Vec<Currency>,
    /// Quote currencies (Q).
    pub quote_currencies: Vec<Currency>,
}

impl Default for RatesConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60),
            fetch_timeout: Duration::from_secs(10),
            anchor_quote: Currency::usd(),
            anchor_asset: Currency::btc(),
            assets: DEFAULT_ASSETS.iter().map(|c| Currency::new(*c)).collect(),
            quote_currencies: DEFAULT_QUOTE_CURRENCIES
                .iter()
                .map(|c| Currency::new(*c))
                .collect(),
        }
    }
}

impl RatesConfig {
    /// Create a configuration for the given sets with default timings.
    pub fn new(
        assets: Vec<Currency>,
        quote_currencies: Vec<Currency>,
        anchor_asset: Currency,
        anchor_quote: Currency,
    ) -> Self {
        Self {
            anchor_quote,
            anchor_asset,
            assets,
            quote_currencies,
            ..Default::default()
        }
    }

    /// Set the time-to-live.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the upstream fetch timeout.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.ttl.is_zero() {
            return Err("TTL cannot be zero".to_string());
        }

        if self.fetch_timeout.is_zero() {
            return Err("Fetch timeout cannot be zero".to_string());
        }

        if self.assets.is_empty() {
            return Err("Asset set cannot be empty".to_string());
        }

        if self.quote_currencies.is_empty() {
            return Err("Quote currency set cannot be empty".to_string());
        }

        let mut seen = BTreeSet::new();
        for currency in self.assets.iter().chain(&self.quote_currencies) {
            if !currency.is_valid() {
                return Err(format!("Invalid identifier {:?}", currency.code()));
            }
            if !seen.insert(currency) {
                return Err(format!(
                    "{} is listed more than once across assets and quote currencies",
                    currency
                ));
            }
        }

        if !self.assets.contains(&self.anchor_asset) {
            return Err(format!("Anchor asset {} is not a priced asset", self.anchor_asset));
        }

        if !self.quote_currencies.contains(&self.anchor_quote) {
            return Err(format!(
                "Anchor quote currency {} is not a quote currency",
                self.anchor_quote
            ));
        }

        Ok(())
    }

    /// The identifier universe the derivation engine works over.
    pub fn universe(&self) -> Universe {
        Universe {
            assets: self.assets.iter().cloned().collect(),
            quote_currencies: self.quote_currencies.iter().cloned().collect(),
            anchor_quote: self.anchor_quote.clone(),
            anchor_asset: self.anchor_asset.clone(),
        }
    }
}

/// The fixed sets P and Q plus their bridge points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Universe {
    pub assets: BTreeSet<Currency>,
    pub quote_currencies: BTreeSet<Currency>,
    pub anchor_quote: Currency,
    pub anchor_asset: Currency,
}

impl Universe {
    pub fn is_asset(&self, id: &Currency) -> bool {
        self.assets.contains(id)
    }

    pub fn is_quote_currency(&self, id: &Currency) -> bool {
        self.quote_currencies.contains(id)
    }

    /// Whether `id` belongs to P or Q.
    pub fn contains(&self, id: &Currency) -> bool {
        self.is_asset(id) || self.is_quote_currency(id)
    }

    /// Every identifier in P and Q.
    pub fn identifiers(&self) -> impl Iterator<Item = &Currency> {
        self.assets.iter().chain(self.quote_currencies.iter())
    }
}
