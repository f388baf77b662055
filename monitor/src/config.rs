//! Monitor configuration.

use std::time::Duration;

use ratebridge_common::Currency;
use ratebridge_fx::RatesConfig;

/// Main monitor configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Rate engine configuration.
    pub rates: RatesConfig,
    /// CoinGecko API base URL.
    pub coingecko_base_url: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            rates: RatesConfig::default(),
            coingecko_base_url: "https://api.coingecko.com/api/v3".to_string(),
        }
    }
}

impl MonitorConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(secs) = lookup("RATES_TTL_SECS").and_then(|v| v.parse().ok()) {
            config.rates.ttl = Duration::from_secs(secs);
        }

        if let Some(secs) = lookup("RATES_FETCH_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            config.rates.fetch_timeout = Duration::from_secs(secs);
        }

        if let Some(code) = lookup("RATES_ANCHOR_QUOTE") {
            config.rates.anchor_quote = Currency::new(code);
        }

        if let Some(code) = lookup("RATES_ANCHOR_ASSET") {
            config.rates.anchor_asset = Currency::new(code);
        }

        if let Some(list) = lookup("RATES_ASSETS") {
            config.rates.assets = parse_list(&list);
        }

        if let Some(list) = lookup("RATES_QUOTE_CURRENCIES") {
            config.rates.quote_currencies = parse_list(&list);
        }

        if let Some(url) = lookup("COINGECKO_BASE_URL") {
            config.coingecko_base_url = url;
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.coingecko_base_url.is_empty() {
            return Err("CoinGecko base URL cannot be empty".to_string());
        }

        self.rates.validate()
    }
}

fn parse_list(list: &str) -> Vec<Currency> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(Currency::new)
        .collect()
}
