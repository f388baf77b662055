//! CoinGecko `/simple/price` quote source.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use ratebridge_common::{Currency, Quote};
use ratebridge_fx::{FxError, FxResult, QuoteSource};
use reqwest::{Client, Url};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tracing::debug;

/// Response shape: `{ "bitcoin": { "usd": 43000.0, ... }, ... }`.
type SimplePriceResponse = HashMap<String, HashMap<String, f64>>;

/// Quote source backed by CoinGecko's public price API.
pub struct CoinGeckoQuoteSource {
    client: Client,
    base: Url,
}

impl CoinGeckoQuoteSource {
    /// Create a source against `base_url` (e.g. `https://api.coingecko.com/api/v3`).
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let base = Url::parse(&format!("{}/simple/price", base_url.trim_end_matches('/')))?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base })
    }

    /// Map a ticker code to CoinGecko's coin id.
    pub fn provider_id(asset: &Currency) -> Option<&'static str> {
        match asset.code() {
            "BTC" => Some("bitcoin"),
            "ETH" => Some("ethereum"),
            "USDT" => Some("tether"),
            "BNB" => Some("binancecoin"),
            "ADA" => Some("cardano"),
            "SOL" => Some("solana"),
            "XRP" => Some("ripple"),
            "DOT" => Some("polkadot"),
            "DOGE" => Some("dogecoin"),
            "AVAX" => Some("avalanche-2"),
            "LTC" => Some("litecoin"),
            "LINK" => Some("chainlink"),
            "BCH" => Some("bitcoin-cash"),
            "XLM" => Some("stellar"),
            "XMR" => Some("monero"),
            "TON" => Some("the-open-network"),
            _ => None,
        }
    }

    fn request_url(&self, ids: &[&str], quote_currencies: &[Currency]) -> Url {
        let vs: Vec<String> = quote_currencies
            .iter()
            .map(|c| c.code().to_ascii_lowercase())
            .collect();

        let mut url = self.base.clone();
        url.query_pairs_mut()
            .append_pair("ids", &ids.join(","))
            .append_pair("vs_currencies", &vs.join(","));
        url
    }

    /// Turn a response body into quotes for the requested assets.
    ///
    /// Missing coins, missing currencies and prices that do not fit a decimal
    /// are omitted.
    pub fn parse_quotes(
        body: &[u8],
        requested: &[(Currency, &'static str)],
        quote_currencies: &[Currency],
    ) -> FxResult<Vec<Quote>> {
        let parsed: SimplePriceResponse = serde_json::from_slice(body)
            .map_err(|e| FxError::QuoteSourceUnavailable(format!("coingecko: parse JSON failed: {}", e)))?;

        let mut quotes = Vec::new();
        for (asset, id) in requested {
            let Some(prices) = parsed.get(*id) else {
                debug!(asset = %asset, id, "coingecko: id missing in response");
                continue;
            };
            for currency in quote_currencies {
                let key = currency.code().to_ascii_lowercase();
                if let Some(price) = prices.get(&key).copied().and_then(Decimal::from_f64) {
                    quotes.push(Quote::new(asset.clone(), currency.clone(), price));
                }
            }
        }

        Ok(quotes)
    }
}

#[async_trait]
impl QuoteSource for CoinGeckoQuoteSource {
    fn name(&self) -> &str {
        "coingecko"
    }

    async fn fetch_quotes(
        &self,
        assets: &[Currency],
        quote_currencies: &[Currency],
    ) -> FxResult<Vec<Quote>> {
        let requested: Vec<(Currency, &'static str)> = assets
            .iter()
            .filter_map(|a| match Self::provider_id(a) {
                Some(id) => Some((a.clone(), id)),
                None => {
                    debug!(asset = %a, "coingecko: no provider id, skipping");
                    None
                }
            })
            .collect();

        if requested.is_empty() || quote_currencies.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<&str> = requested.iter().map(|(_, id)| *id).collect();
        let url = self.request_url(&ids, quote_currencies);

        let unavailable = |context: &str, e: reqwest::Error| {
            FxError::QuoteSourceUnavailable(format!("coingecko: {}: {}", context, e))
        };

        let body = self
            .client
            .get(url)
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|e| unavailable("request failed", e))?
            .error_for_status()
            .map_err(|e| unavailable("non-success status", e))?
            .bytes()
            .await
            .map_err(|e| unavailable("read body failed", e))?;

        Self::parse_quotes(&body, &requested, quote_currencies)
    }
}
