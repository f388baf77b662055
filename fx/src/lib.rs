//! RateBridge FX Engine
//!
//! Aggregates a sparse grid of upstream asset prices into a pairwise rate
//! matrix and answers conversion queries from it.
//!
//! # Features
//!
//! - Pluggable quote sources
//! - Cross-rate derivation through an anchor quote currency and an anchor asset
//! - TTL-based staleness with single-flight refresh
//! - Serve-stale-on-error with an explicit unavailable state
//!
//! # Example
//!
//! ```rust,ignore
//! use ratebridge_fx::{RateQueryService, RatesConfig};
//! use ratebridge_common::Currency;
//!
//! let service = RateQueryService::new(source, RatesConfig::default())?;
//!
//! // Bridged through USD
//! let rate = service.get_rate(&Currency::btc(), &Currency::eth()).await?;
//!
//! // Convert an amount
//! let eth = service.convert(dec!(2), &Currency::btc(), &Currency::eth()).await?;
//! ```

pub mod cache;
pub mod config;
pub mod derivation;
pub mod error;
pub mod matrix;
pub mod provider;
pub mod service;

pub use cache::{CacheState, CacheStats, RateCache, RefreshReport};
pub use config::{RatesConfig, Universe};
pub use derivation::{derive, Derivation, DiscardReason, DiscardedQuote};
pub use error::{FxError, FxResult};
pub use matrix::{RateMatrix, RateOrigin};
pub use provider::QuoteSource;
pub use service::{RateQueryService, RateReading};

#[cfg(any(test, feature = "test-utils"))]
pub use provider::MockQuoteSource;
