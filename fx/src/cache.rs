//! Rate matrix cache with TTL and single-flight refresh.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use ratebridge_common::{now, Timestamp};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{RatesConfig, Universe};
use crate::derivation::derive;
use crate::error::{FxError, FxResult};
use crate::matrix::RateMatrix;
use crate::provider::QuoteSource;

type SharedRefresh = Shared<BoxFuture<'static, FxResult<RefreshReport>>>;

/// Freshness of the cached data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheState {
    /// No refresh has ever succeeded.
    Uninitialized,
    /// The published matrix is within its TTL.
    Fresh,
    /// The published matrix is past its TTL or was cleared, but is still served.
    Stale,
}

impl CacheState {
    /// Whether queries can be answered from the cache.
    pub fn is_servable(&self) -> bool {
        !matches!(self, CacheState::Uninitialized)
    }
}

impl fmt::Display for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheState::Uninitialized => write!(f, "uninitialized"),
            CacheState::Fresh => write!(f, "fresh"),
            CacheState::Stale => write!(f, "stale"),
        }
    }
}

/// Summary of one successful refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    /// Refresh ID, for correlating log lines.
    pub id: Uuid,
    pub refreshed_at: Timestamp,
    pub quotes_received: usize,
    pub quotes_discarded: usize,
    /// Entries in the published matrix.
    pub pairs: usize,
}

/// Cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Calls made to the quote source.
    pub upstream_fetches: u64,
    pub successful_refreshes: u64,
    pub failed_refreshes: u64,
    /// Callers that attached to a refresh someone else started.
    pub coalesced_waiters: u64,
    /// Entries in the published matrix.
    pub pairs: usize,
}

/// One published matrix and the moment it was refreshed.
#[derive(Default)]
struct Generation {
    matrix: Option<Arc<RateMatrix>>,
    refreshed_at: Option<Timestamp>,
    refreshed_instant: Option<Instant>,
}

#[derive(Default)]
struct Counters {
    upstream_fetches: AtomicU64,
    successful_refreshes: AtomicU64,
    failed_refreshes: AtomicU64,
    coalesced_waiters: AtomicU64,
}

struct CacheInner {
    source: Arc<dyn QuoteSource>,
    config: RatesConfig,
    universe: Universe,
    generation: RwLock<Generation>,
    inflight: Mutex<Option<SharedRefresh>>,
    counters: Counters,
}

/// Vacates the single-flight slot when the refresh task finishes or is torn down.
struct ClearSlot<'a>(&'a Mutex<Option<SharedRefresh>>);

impl Drop for ClearSlot<'_> {
    fn drop(&mut self) {
        *self.0.lock() = None;
    }
}

impl CacheInner {
    fn is_stale(&self) -> bool {
        match self.generation.read().refreshed_instant {
            Some(at) => at.elapsed() > self.config.ttl,
            None => true,
        }
    }

    async fn run_refresh(&self) -> FxResult<RefreshReport> {
        let id = Uuid::now_v7();
        self.counters.upstream_fetches.fetch_add(1, Ordering::Relaxed);

        debug!(refresh_id = %id, source = self.source.name(), "Fetching quotes");

        let fetch = self
            .source
            .fetch_quotes(&self.config.assets, &self.config.quote_currencies);

        let quotes = match tokio::time::timeout(self.config.fetch_timeout, fetch).await {
            Ok(Ok(quotes)) => quotes,
            Ok(Err(FxError::QuoteSourceUnavailable(reason))) => {
                return Err(self.record_failure(id, reason));
            }
            Ok(Err(e)) => return Err(self.record_failure(id, e.to_string())),
            Err(_) => {
                let reason = format!("timed out after {:?}", self.config.fetch_timeout);
                return Err(self.record_failure(id, reason));
            }
        };

        let quotes_received = quotes.len();
        let derivation = derive(&quotes, &self.universe);

        let refreshed_at = now();
        let mut generation = self.generation.write();

        // An empty reply is still a successful fetch. It only replaces a
        // matrix that has nothing to lose.
        let keep_previous = derivation.direct == 0 && generation.matrix.is_some();
        let matrix = match generation.matrix.take() {
            Some(previous) if keep_previous => previous,
            _ => Arc::new(derivation.matrix),
        };

        let report = RefreshReport {
            id,
            refreshed_at,
            quotes_received,
            quotes_discarded: derivation.discarded.len(),
            pairs: matrix.len(),
        };

        *generation = Generation {
            matrix: Some(matrix),
            refreshed_at: Some(refreshed_at),
            refreshed_instant: Some(Instant::now()),
        };
        drop(generation);

        if keep_previous {
            warn!(
                refresh_id = %id,
                quotes = quotes_received,
                "No usable quotes received, keeping previous matrix"
            );
        }
        self.counters.successful_refreshes.fetch_add(1, Ordering::Relaxed);

        info!(
            refresh_id = %id,
            quotes = quotes_received,
            discarded = report.quotes_discarded,
            pairs = report.pairs,
            "Published rate matrix"
        );

        Ok(report)
    }

    fn record_failure(&self, id: Uuid, reason: String) -> FxError {
        self.counters.failed_refreshes.fetch_add(1, Ordering::Relaxed);
        warn!(
            refresh_id = %id,
            source = self.source.name(),
            error = %reason,
            "Rate refresh failed, keeping previous matrix"
        );
        FxError::QuoteSourceUnavailable(reason)
    }
}

/// Owns the published rate matrix and coordinates refreshes.
///
/// At most one upstream fetch is in flight at a time: callers that need a
/// refresh while one is running attach to it and all receive its outcome.
/// The refresh runs on its own task, so a caller giving up on the wait does
/// not cancel it for the others. Cloning yields another handle to the same
/// cache.
#[derive(Clone)]
pub struct RateCache {
    inner: Arc<CacheInner>,
}

impl RateCache {
    /// Create an empty cache over `source`.
    pub fn new(source: Arc<dyn QuoteSource>, config: RatesConfig) -> FxResult<Self> {
        config.validate().map_err(FxError::InvalidConfiguration)?;

        Ok(Self {
            inner: Arc::new(CacheInner {
                source,
                universe: config.universe(),
                config,
                generation: RwLock::new(Generation::default()),
                inflight: Mutex::new(None),
                counters: Counters::default(),
            }),
        })
    }

    /// True before the first successful refresh, after `clear`, or once the
    /// TTL has elapsed.
    pub fn is_stale(&self) -> bool {
        self.inner.is_stale()
    }

    pub fn state(&self) -> CacheState {
        if self.inner.generation.read().matrix.is_none() {
            CacheState::Uninitialized
        } else if self.is_stale() {
            CacheState::Stale
        } else {
            CacheState::Fresh
        }
    }

    /// Refresh if stale, joining an in-flight refresh rather than starting a
    /// second one.
    pub async fn ensure_fresh(&self) -> FxResult<()> {
        if !self.is_stale() {
            debug!("Rate cache hit");
            return Ok(());
        }

        let refresh = {
            let mut inflight = self.inner.inflight.lock();
            // A refresh may have completed between the check above and taking the slot.
            if inflight.is_none() && !self.is_stale() {
                return Ok(());
            }
            self.join_or_spawn(&mut inflight)
        };

        refresh.await.map(|_| ())
    }

    /// Fetch, derive and publish a new matrix regardless of staleness.
    ///
    /// On failure the previous matrix and timestamp are left untouched.
    pub async fn refresh(&self) -> FxResult<RefreshReport> {
        let refresh = {
            let mut inflight = self.inner.inflight.lock();
            self.join_or_spawn(&mut inflight)
        };

        refresh.await
    }

    /// Mark the cache stale. The current matrix keeps being served until a
    /// refresh replaces it.
    pub fn clear(&self) {
        let mut generation = self.inner.generation.write();
        generation.refreshed_at = None;
        generation.refreshed_instant = None;
        info!("Rate cache cleared");
    }

    /// The currently published matrix, if any refresh ever succeeded.
    pub fn matrix(&self) -> Option<Arc<RateMatrix>> {
        self.inner.generation.read().matrix.clone()
    }

    /// Wall-clock time of the last successful refresh; `None` after `clear`.
    pub fn last_refreshed_at(&self) -> Option<Timestamp> {
        self.inner.generation.read().refreshed_at
    }

    pub fn universe(&self) -> &Universe {
        &self.inner.universe
    }

    pub fn config(&self) -> &RatesConfig {
        &self.inner.config
    }

    /// Name of the underlying quote source.
    pub fn source_name(&self) -> &str {
        self.inner.source.name()
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        let c = &self.inner.counters;
        CacheStats {
            upstream_fetches: c.upstream_fetches.load(Ordering::Relaxed),
            successful_refreshes: c.successful_refreshes.load(Ordering::Relaxed),
            failed_refreshes: c.failed_refreshes.load(Ordering::Relaxed),
            coalesced_waiters: c.coalesced_waiters.load(Ordering::Relaxed),
            pairs: self.matrix().map(|m| m.len()).unwrap_or(0),
        }
    }

    fn join_or_spawn(&self, inflight: &mut Option<SharedRefresh>) -> SharedRefresh {
        if let Some(existing) = inflight.as_ref() {
            self.inner.counters.coalesced_waiters.fetch_add(1, Ordering::Relaxed);
            debug!("Joining in-flight rate refresh");
            return existing.clone();
        }

        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            let _slot = ClearSlot(&inner.inflight);
            inner.run_refresh().await
        });

        let refresh = async move {
            handle
                .await
                .unwrap_or_else(|e| Err(FxError::RefreshAborted(e.to_string())))
        }
        .boxed()
        .shared();

        *inflight = Some(refresh.clone());
        refresh
    }
}

impl fmt::Debug for RateCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateCache")
            .field("source", &self.source_name())
            .field("state", &self.state())
            .field("ttl", &self.inner.config.ttl)
            .finish()
    }
}
