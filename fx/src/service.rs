//! Public rate query surface.

use std::collections::BTreeMap;
use std::sync::Arc;

use ratebridge_common::{Currency, CurrencyPair, Timestamp};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::cache::{CacheState, CacheStats, RateCache, RefreshReport};
use crate::config::RatesConfig;
use crate::error::{FxError, FxResult};
use crate::matrix::RateMatrix;
use crate::provider::QuoteSource;

/// A rate together with how current it is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateReading {
    pub pair: CurrencyPair,
    pub rate: Decimal,
    /// `Stale` when the last refresh failed and older data was served.
    pub state: CacheState,
    /// When the matrix the rate came from was refreshed.
    pub as_of: Option<Timestamp>,
}

/// Answers pairwise rate and conversion queries over a [`RateCache`].
#[derive(Clone, Debug)]
pub struct RateQueryService {
    cache: RateCache,
}

impl RateQueryService {
    /// Create a service with its own cache over `source`.
    pub fn new(source: Arc<dyn QuoteSource>, config: RatesConfig) -> FxResult<Self> {
        Ok(Self::with_cache(RateCache::new(source, config)?))
    }

    /// Create a service over an existing cache.
    pub fn with_cache(cache: RateCache) -> Self {
        Self { cache }
    }

    /// Rate for one unit of `from` in `to`.
    ///
    /// Identical identifiers always yield 1 without touching the cache.
    #[instrument(skip_all, fields(from = %from, to = %to))]
    pub async fn get_rate(&self, from: &Currency, to: &Currency) -> FxResult<Decimal> {
        if from == to {
            return Ok(Decimal::ONE);
        }
        let matrix = self.current_matrix().await?;
        Self::lookup_in(&matrix, from, to)
    }

    /// Like [`get_rate`](Self::get_rate), also reporting freshness.
    pub async fn lookup(&self, from: &Currency, to: &Currency) -> FxResult<RateReading> {
        let pair = CurrencyPair::new(from.clone(), to.clone());
        let rate = if from == to {
            Decimal::ONE
        } else {
            let matrix = self.current_matrix().await?;
            Self::lookup_in(&matrix, from, to)?
        };

        Ok(RateReading {
            pair,
            rate,
            state: self.cache.state(),
            as_of: self.cache.last_refreshed_at(),
        })
    }

    /// Convert `amount` of `from` into `to`.
    ///
    /// Zero, fractional and negative amounts all go through the same arithmetic.
    #[instrument(skip_all, fields(amount = %amount, from = %from, to = %to))]
    pub async fn convert(&self, amount: Decimal, from: &Currency, to: &Currency) -> FxResult<Decimal> {
        let rate = self.get_rate(from, to).await?;
        amount
            .checked_mul(rate)
            .ok_or_else(|| FxError::ArithmeticOverflow(CurrencyPair::new(from.clone(), to.clone())))
    }

    /// Convert `amount` of `from` into each of `targets`.
    ///
    /// Pairs without a rate, or whose product overflows, are omitted; if no
    /// data is available at all the error is returned instead.
    pub async fn convert_many(
        &self,
        amount: Decimal,
        from: &Currency,
        targets: &[Currency],
    ) -> FxResult<BTreeMap<Currency, Decimal>> {
        let matrix = self.current_matrix().await?;
        let mut out = BTreeMap::new();

        for to in targets {
            let converted = Self::lookup_in(&matrix, from, to).and_then(|rate| {
                amount.checked_mul(rate).ok_or_else(|| {
                    FxError::ArithmeticOverflow(CurrencyPair::new(from.clone(), to.clone()))
                })
            });
            match converted {
                Ok(value) => {
                    out.insert(to.clone(), value);
                }
                Err(e) => debug!(to = %to, error = %e, "Skipping target"),
            }
        }

        Ok(out)
    }

    /// Every known rate from `id` to a counterpart.
    ///
    /// The identity entry `id -> 1` is not listed; [`get_rate`](Self::get_rate)
    /// answers it for any identifier. A configured identifier without
    /// completed pairs yields an empty map.
    #[instrument(skip_all, fields(id = %id))]
    pub async fn get_all_rates_for(&self, id: &Currency) -> FxResult<BTreeMap<Currency, Decimal>> {
        let matrix = self.current_matrix().await?;
        if !matrix.contains(id) {
            return Err(FxError::UnknownIdentifier(id.clone()));
        }
        Ok(matrix.rates_for(id))
    }

    /// Force a refresh.
    pub async fn refresh(&self) -> FxResult<RefreshReport> {
        self.cache.refresh().await
    }

    /// Mark cached data stale; the next query triggers a refresh.
    pub fn clear(&self) {
        self.cache.clear();
    }

    /// Time of the last successful refresh.
    pub fn last_update_time(&self) -> Option<Timestamp> {
        self.cache.last_refreshed_at()
    }

    pub fn state(&self) -> CacheState {
        self.cache.state()
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn cache(&self) -> &RateCache {
        &self.cache
    }

    /// The matrix to answer from: fresh if possible, otherwise the last good one.
    async fn current_matrix(&self) -> FxResult<Arc<RateMatrix>> {
        match self.cache.ensure_fresh().await {
            Ok(()) => self
                .cache
                .matrix()
                .ok_or_else(|| FxError::RatesUnavailable("no rates published".to_string())),
            Err(e) => match self.cache.matrix() {
                Some(matrix) => {
                    warn!(
                        error = %e,
                        last_refresh = ?self.cache.last_refreshed_at(),
                        "Serving stale rates"
                    );
                    Ok(matrix)
                }
                None => Err(FxError::RatesUnavailable(e.to_string())),
            },
        }
    }

    fn lookup_in(matrix: &RateMatrix, from: &Currency, to: &Currency) -> FxResult<Decimal> {
        if let Some(rate) = matrix.get(from, to) {
            return Ok(rate);
        }

        if let Some(reverse) = matrix.get(to, from) {
            if let Some(rate) = Decimal::ONE.checked_div(reverse) {
                return Ok(rate);
            }
        }

        debug!(from = %from, to = %to, "Rate not found");
        Err(FxError::PairNotFound(CurrencyPair::new(from.clone(), to.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockQuoteSource;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn c(code: &str) -> Currency {
        Currency::new(code)
    }

    fn setup() -> (Arc<MockQuoteSource>, RateQueryService) {
        let source = Arc::new(MockQuoteSource::new("test"));
        source.set_quote("BTC", "USD", dec!(43000));
        source.set_quote("ETH", "USD", dec!(2500));
        source.set_quote("BTC", "EUR", dec!(39000));

        let service = RateQueryService::new(source.clone(), RatesConfig::default()).unwrap();
        (source, service)
    }

    fn close(a: Decimal, b: Decimal) -> bool {
        (a - b).abs() < dec!(0.0000001)
    }

    #[tokio::test]
    async fn test_identity_without_fetch() {
        let (source, service) = setup();
        source.fail_with("offline");

        assert_eq!(service.get_rate(&c("XRP"), &c("XRP")).await, Ok(Decimal::ONE));
        assert_eq!(service.get_rate(&c("NOPE"), &c("NOPE")).await, Ok(Decimal::ONE));
        assert_eq!(source.calls(), 0);
        assert_eq!(service.state(), CacheState::Uninitialized);
    }

    #[tokio::test]
    async fn test_bridged_asset_rate() {
        let (_, service) = setup();

        let btc_eth = service.get_rate(&c("BTC"), &c("ETH")).await.unwrap();
        let eth_btc = service.get_rate(&c("ETH"), &c("BTC")).await.unwrap();

        assert_eq!(btc_eth, dec!(17.2));
        assert!(close(eth_btc, Decimal::ONE / dec!(17.2)));
    }

    #[tokio::test]
    async fn test_bridged_quote_rate() {
        let (_, service) = setup();

        let eur_usd = service.get_rate(&c("EUR"), &c("USD")).await.unwrap();

        assert!((eur_usd - dec!(1.1026)).abs() < dec!(0.0001));
    }

    #[tokio::test]
    async fn test_convert() {
        let (_, service) = setup();

        assert_eq!(service.convert(dec!(2), &c("BTC"), &c("ETH")).await, Ok(dec!(34.4)));
        assert_eq!(service.convert(Decimal::ZERO, &c("BTC"), &c("ETH")).await, Ok(Decimal::ZERO));
        assert_eq!(service.convert(dec!(-1), &c("BTC"), &c("USD")).await, Ok(dec!(-43000)));
        assert_eq!(service.convert(dec!(0.5), &c("USD"), &c("USD")).await, Ok(dec!(0.5)));
    }

    #[tokio::test]
    async fn test_unquoted_asset_not_found() {
        let (_, service) = setup();

        let rate = service.get_rate(&c("XRP"), &c("USD")).await;
        let converted = service.convert(dec!(1), &c("XRP"), &c("USD")).await;

        assert!(matches!(rate, Err(FxError::PairNotFound(_))));
        assert!(matches!(converted, Err(FxError::PairNotFound(_))));
    }

    #[tokio::test]
    async fn test_all_rates_for() {
        let (_, service) = setup();

        let btc = service.get_all_rates_for(&c("BTC")).await.unwrap();
        assert_eq!(btc[&c("USD")], dec!(43000));
        assert_eq!(btc[&c("ETH")], dec!(17.2));
        assert!(!btc.contains_key(&c("BTC")));

        let xrp = service.get_all_rates_for(&c("XRP")).await.unwrap();
        assert!(xrp.is_empty());

        let unknown = service.get_all_rates_for(&c("PAYPAL")).await;
        assert_eq!(unknown, Err(FxError::UnknownIdentifier(c("PAYPAL"))));
    }

    #[tokio::test]
    async fn test_empty_reply_is_not_found_without_refetching() {
        let source = Arc::new(MockQuoteSource::new("empty"));
        let service = RateQueryService::new(source.clone(), RatesConfig::default()).unwrap();

        for _ in 0..3 {
            let result = service.get_rate(&c("XRP"), &c("USD")).await;
            assert!(matches!(result, Err(FxError::PairNotFound(_))));
        }

        assert_eq!(service.state(), CacheState::Fresh);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_first_fetch_failure_is_unavailable() {
        let (source, service) = setup();
        source.fail_with("dns");

        let result = service.get_rate(&c("BTC"), &c("USD")).await;
        assert!(matches!(result, Err(FxError::RatesUnavailable(_))));

        let all = service.get_all_rates_for(&c("BTC")).await;
        assert!(all.unwrap_err().is_unavailable());
    }

    #[tokio::test]
    async fn test_clear_then_failed_refresh_serves_stale() {
        let (source, service) = setup();
        assert_eq!(service.get_rate(&c("BTC"), &c("USD")).await, Ok(dec!(43000)));

        service.clear();
        source.fail_with("timeout");

        let reading = service.lookup(&c("BTC"), &c("USD")).await.unwrap();

        assert_eq!(reading.rate, dec!(43000));
        assert_eq!(reading.state, CacheState::Stale);
        assert!(reading.as_of.is_none());
        assert_eq!(source.calls(), 2);
        assert_eq!(service.stats().failed_refreshes, 1);
    }

    #[tokio::test]
    async fn test_refresh_and_last_update_time() {
        let (source, service) = setup();
        assert!(service.last_update_time().is_none());

        let report = service.refresh().await.unwrap();

        assert_eq!(report.quotes_received, 3);
        assert_eq!(service.last_update_time(), Some(report.refreshed_at));
        assert_eq!(source.calls(), 1);

        source.set_quote("BTC", "USD", dec!(50000));
        service.refresh().await.unwrap();
        assert_eq!(service.get_rate(&c("BTC"), &c("USD")).await, Ok(dec!(50000)));
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_convert_many() {
        let (_, service) = setup();

        let out = service
            .convert_many(dec!(2), &c("BTC"), &[c("USD"), c("EUR"), c("RUB")])
            .await
            .unwrap();

        assert_eq!(out.len(), 2);
        assert_eq!(out[&c("USD")], dec!(86000));
        assert_eq!(out[&c("EUR")], dec!(78000));
    }

    #[tokio::test]
    async fn test_overflow() {
        let (_, service) = setup();

        let converted = service.convert(Decimal::MAX, &c("BTC"), &c("USD")).await;
        assert!(matches!(converted, Err(FxError::ArithmeticOverflow(_))));

        let out = service
            .convert_many(Decimal::MAX, &c("BTC"), &[c("USD"), c("BTC")])
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[&c("BTC")], Decimal::MAX);
    }

    #[test]
    fn test_reverse_lookup_fallback() {
        let universe = RatesConfig::default().universe();
        let mut builder = crate::matrix::RateMatrixBuilder::new(universe);
        builder.insert(&c("SOL"), &c("USD"), dec!(20), crate::matrix::RateOrigin::Direct);
        let matrix = builder.build();

        let rate = RateQueryService::lookup_in(&matrix, &c("USD"), &c("SOL")).unwrap();
        assert_eq!(rate, dec!(0.05));
    }

    #[tokio::test]
    async fn test_stale_after_ttl_triggers_refresh() {
        let source = Arc::new(MockQuoteSource::new("test"));
        source.set_quote("BTC", "USD", dec!(43000));
        let config = RatesConfig::default().with_ttl(Duration::from_millis(30));
        let service = RateQueryService::new(source.clone(), config).unwrap();

        service.get_rate(&c("BTC"), &c("USD")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        service.get_rate(&c("USD"), &c("BTC")).await.unwrap();

        assert_eq!(source.calls(), 2);
    }
}
