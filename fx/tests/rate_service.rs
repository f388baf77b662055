//! End-to-end behaviour of the rate query service over a scripted source.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ratebridge_common::{Currency, Quote};
use ratebridge_fx::{CacheState, FxError, FxResult, QuoteSource, RateQueryService, RatesConfig};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Serves a fixed quote set, optionally failing, and counts calls.
struct ScriptedSource {
    quotes: Vec<Quote>,
    failing: AtomicBool,
    calls: AtomicUsize,
    latency: Duration,
}

impl ScriptedSource {
    fn new(latency: Duration) -> Self {
        let q = |a: &str, c: &str, p: Decimal| Quote::new(Currency::new(a), Currency::new(c), p);
        Self {
            quotes: vec![
                q("BTC", "USD", dec!(43000)),
                q("BTC", "EUR", dec!(39000)),
                q("ETH", "USD", dec!(2500)),
                q("SOL", "EUR", dec!(18)),
            ],
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            latency,
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuoteSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch_quotes(&self, _assets: &[Currency], _quotes: &[Currency]) -> FxResult<Vec<Quote>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;
        if self.failing.load(Ordering::SeqCst) {
            return Err(FxError::QuoteSourceUnavailable("scripted outage".into()));
        }
        Ok(self.quotes.clone())
    }
}

fn c(code: &str) -> Currency {
    Currency::new(code)
}

fn service(source: &Arc<ScriptedSource>, ttl: Duration) -> RateQueryService {
    let config = RatesConfig::default().with_ttl(ttl);
    RateQueryService::new(source.clone(), config).unwrap()
}

#[tokio::test]
async fn identity_rate_before_any_fetch() {
    let source = Arc::new(ScriptedSource::new(Duration::ZERO));
    source.failing.store(true, Ordering::SeqCst);
    let service = service(&source, Duration::from_secs(60));

    for code in ["BTC", "USD", "XRP", "ANYTHING"] {
        assert_eq!(service.get_rate(&c(code), &c(code)).await, Ok(Decimal::ONE));
    }
    assert_eq!(source.calls(), 0);
}

#[tokio::test]
async fn documented_cross_rates() {
    let source = Arc::new(ScriptedSource::new(Duration::ZERO));
    let service = service(&source, Duration::from_secs(60));

    assert_eq!(service.get_rate(&c("BTC"), &c("ETH")).await, Ok(dec!(17.2)));
    assert_eq!(service.convert(dec!(2), &c("BTC"), &c("ETH")).await, Ok(dec!(34.4)));

    let eur_usd = service.get_rate(&c("EUR"), &c("USD")).await.unwrap();
    assert!((eur_usd - dec!(1.1026)).abs() < dec!(0.0001));

    // SOL is only quoted in EUR, so it has no bridge to other assets.
    assert!(service.get_rate(&c("SOL"), &c("ETH")).await.unwrap_err().is_not_found());
    let eur_sol = service.get_rate(&c("EUR"), &c("SOL")).await.unwrap();
    assert!((eur_sol * dec!(18) - Decimal::ONE).abs() < dec!(0.000000001));
}

#[tokio::test]
async fn unquoted_asset_is_not_found() {
    let source = Arc::new(ScriptedSource::new(Duration::ZERO));
    let service = service(&source, Duration::from_secs(60));

    let rate = service.get_rate(&c("XRP"), &c("USD")).await;
    let converted = service.convert(dec!(1), &c("XRP"), &c("USD")).await;

    assert!(matches!(rate, Err(FxError::PairNotFound(_))));
    assert!(matches!(converted, Err(FxError::PairNotFound(_))));
}

#[tokio::test]
async fn every_known_pair_round_trips() {
    let source = Arc::new(ScriptedSource::new(Duration::ZERO));
    let service = service(&source, Duration::from_secs(60));
    let ids = ["BTC", "ETH", "SOL", "USD", "EUR"];

    for a in ids {
        for b in ids {
            let (Ok(ab), Ok(ba)) = (
                service.get_rate(&c(a), &c(b)).await,
                service.get_rate(&c(b), &c(a)).await,
            ) else {
                continue;
            };
            assert!((ab * ba - Decimal::ONE).abs() < dec!(0.000000001), "{a}/{b}");
        }
    }
    assert_eq!(source.calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_queries_after_ttl_fetch_once() {
    let source = Arc::new(ScriptedSource::new(Duration::from_millis(80)));
    let service = service(&source, Duration::from_millis(50));

    service.get_rate(&c("BTC"), &c("USD")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(70)).await;
    assert_eq!(service.state(), CacheState::Stale);

    let handles: Vec<_> = (0..32)
        .map(|i| {
            let service = service.clone();
            tokio::spawn(async move {
                if i % 2 == 0 {
                    service.get_rate(&c("BTC"), &c("ETH")).await
                } else {
                    service.convert(dec!(1), &c("ETH"), &c("USD")).await
                }
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }

    assert_eq!(source.calls(), 2);
}

#[tokio::test]
async fn clear_then_outage_serves_previous_matrix() {
    let source = Arc::new(ScriptedSource::new(Duration::ZERO));
    let service = service(&source, Duration::from_secs(60));
    assert_eq!(service.get_rate(&c("BTC"), &c("USD")).await, Ok(dec!(43000)));

    service.clear();
    source.failing.store(true, Ordering::SeqCst);

    assert_eq!(service.get_rate(&c("BTC"), &c("USD")).await, Ok(dec!(43000)));
    assert_eq!(service.get_rate(&c("BTC"), &c("ETH")).await, Ok(dec!(17.2)));
    assert_eq!(service.state(), CacheState::Stale);
    assert!(source.calls() >= 2);

    assert!(matches!(
        service.refresh().await,
        Err(FxError::QuoteSourceUnavailable(_))
    ));

    source.failing.store(false, Ordering::SeqCst);
    service.get_rate(&c("BTC"), &c("USD")).await.unwrap();
    assert_eq!(service.state(), CacheState::Fresh);
}

#[tokio::test]
async fn first_outage_reports_unavailable() {
    let source = Arc::new(ScriptedSource::new(Duration::ZERO));
    source.failing.store(true, Ordering::SeqCst);
    let service = service(&source, Duration::from_secs(60));

    let err = service.get_rate(&c("BTC"), &c("USD")).await.unwrap_err();

    assert!(matches!(err, FxError::RatesUnavailable(_)));
    assert_eq!(service.state(), CacheState::Uninitialized);
    assert!(service.last_update_time().is_none());
}
