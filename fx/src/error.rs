//! Rate engine error types.

use ratebridge_common::{Currency, CurrencyPair};
use thiserror::Error;

/// Errors that can occur in the rate engine.
///
/// `Clone` so that one refresh outcome can be handed to every caller waiting
/// on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FxError {
    /// The quote source failed or timed out.
    #[error("Quote source unavailable: {0}")]
    QuoteSourceUnavailable(String),

    /// No matrix has ever been published and the refresh failed.
    #[error("Rates unavailable: {0}")]
    RatesUnavailable(String),

    /// No direct, inverse or derived rate exists for the pair.
    #[error("Rate not found for {0}")]
    PairNotFound(CurrencyPair),

    /// The identifier is neither a configured asset nor a quote currency.
    #[error("Unknown identifier: {0}")]
    UnknownIdentifier(Currency),

    /// A conversion fell outside the representable decimal range.
    #[error("Arithmetic overflow converting {0}")]
    ArithmeticOverflow(CurrencyPair),

    /// The refresh task died before reporting an outcome.
    #[error("Refresh aborted: {0}")]
    RefreshAborted(String),

    /// Configuration was rejected by validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl FxError {
    /// A lookup that completed normally but found nothing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, FxError::PairNotFound(_) | FxError::UnknownIdentifier(_))
    }

    /// No data could be served at all.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            FxError::RatesUnavailable(_)
                | FxError::QuoteSourceUnavailable(_)
                | FxError::RefreshAborted(_)
        )
    }
}

/// Result type for rate operations.
pub type FxResult<T> = Result<T, FxError>;
