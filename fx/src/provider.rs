//! Quote source trait and test implementation.

use async_trait::async_trait;
use ratebridge_common::{Currency, Quote};

use crate::error::FxResult;

/// Upstream supplier of sparse asset prices.
///
/// A source is asked for a grid of assets against quote currencies and may
/// return any subset of that grid. Implementations must be read-only against
/// the upstream system.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Get the source name.
    fn name(&self) -> &str;

    /// Fetch whatever prices are available for the requested grid.
    async fn fetch_quotes(
        &self,
        assets: &[Currency],
        quote_currencies: &[Currency],
    ) -> FxResult<Vec<Quote>>;
}

/// Mock quote source for testing.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockQuoteSource {
    name: String,
    quotes: parking_lot::RwLock<Vec<Quote>>,
    failure: parking_lot::RwLock<Option<String>>,
    latency: parking_lot::RwLock<std::time::Duration>,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockQuoteSource {
    /// Create a new mock source with no quotes.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            quotes: parking_lot::RwLock::new(Vec::new()),
            failure: parking_lot::RwLock::new(None),
            latency: parking_lot::RwLock::new(std::time::Duration::ZERO),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Add or replace the quote for an (asset, quote currency) pair.
    pub fn set_quote(&self, asset: &str, quote_currency: &str, price: rust_decimal::Decimal) {
        let quote = Quote::new(Currency::new(asset), Currency::new(quote_currency), price);
        let mut quotes = self.quotes.write();
        quotes.retain(|q| q.pair() != quote.pair());
        quotes.push(quote);
    }

    /// Drop every quote for an (asset, quote currency) pair.
    pub fn remove_quote(&self, asset: &str, quote_currency: &str) {
        let asset = Currency::new(asset);
        let quote_currency = Currency::new(quote_currency);
        self.quotes
            .write()
            .retain(|q| q.asset != asset || q.quote_currency != quote_currency);
    }

    /// Push a quote verbatim, duplicates included.
    pub fn push_raw(&self, quote: Quote) {
        self.quotes.write().push(quote);
    }

    /// Make every subsequent fetch fail with `reason`.
    pub fn fail_with(&self, reason: impl Into<String>) {
        *self.failure.write() = Some(reason.into());
    }

    /// Stop failing.
    pub fn recover(&self) {
        *self.failure.write() = None;
    }

    /// Delay every fetch by `latency`.
    pub fn set_latency(&self, latency: std::time::Duration) {
        *self.latency.write() = latency;
    }

    /// Number of upstream calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl QuoteSource for MockQuoteSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_quotes(
        &self,
        assets: &[Currency],
        quote_currencies: &[Currency],
    ) -> FxResult<Vec<Quote>> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        let latency = *self.latency.read();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if let Some(reason) = self.failure.read().clone() {
            return Err(crate::error::FxError::QuoteSourceUnavailable(reason));
        }

        Ok(self
            .quotes
            .read()
            .iter()
            .filter(|q| assets.contains(&q.asset) && quote_currencies.contains(&q.quote_currency))
            .cloned()
            .collect())
    }
}
