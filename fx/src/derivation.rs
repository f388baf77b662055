//! Completion of a sparse quote set into a pairwise rate matrix.
//!
//! Rules, in precedence order (an earlier rule always wins for a pair it can
//! produce):
//!
//! 1. identity, `rate(X, X) = 1` (implicit in [`RateMatrix`]);
//! 2. direct quotes and their exact reciprocals;
//! 3. asset-to-asset rates bridged through the anchor quote currency;
//! 4. quote-to-quote rates bridged through the anchor asset.
//!
//! Pairs no rule can reach are left out of the matrix.

use std::collections::HashSet;

use ratebridge_common::{Currency, CurrencyPair, Quote};
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::config::Universe;
use crate::matrix::{RateMatrix, RateMatrixBuilder, RateOrigin};

/// Why a received quote did not make it into the matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Price was zero or negative.
    NonPositivePrice,
    /// The asset is not a configured priced asset.
    UnknownAsset,
    /// The quote currency is not a configured quote currency.
    UnknownQuoteCurrency,
    /// An earlier quote for the same pair was already accepted.
    Duplicate,
}

/// A quote dropped during derivation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscardedQuote {
    pub quote: Quote,
    pub reason: DiscardReason,
}

/// Output of a derivation pass.
#[derive(Debug)]
pub struct Derivation {
    pub matrix: RateMatrix,
    /// Quotes accepted under rule 2.
    pub direct: usize,
    /// Entries produced by rules 3 and 4.
    pub derived: usize,
    pub discarded: Vec<DiscardedQuote>,
}

/// Build a complete matrix from `quotes` over `universe`.
pub fn derive(quotes: &[Quote], universe: &Universe) -> Derivation {
    let mut builder = RateMatrixBuilder::new(universe.clone());
    let mut discarded = Vec::new();

    let direct = apply_direct_quotes(&mut builder, quotes, &mut discarded);
    let derived = bridge_assets(&mut builder) + bridge_quote_currencies(&mut builder);

    for d in &discarded {
        warn!(
            quote = %d.quote,
            reason = ?d.reason,
            "Discarded quote"
        );
    }

    debug!(direct, derived, discarded = discarded.len(), "Derived rate matrix");

    Derivation {
        matrix: builder.build(),
        direct,
        derived,
        discarded,
    }
}

/// Rule 2: every valid quote and its reciprocal.
fn apply_direct_quotes(
    builder: &mut RateMatrixBuilder,
    quotes: &[Quote],
    discarded: &mut Vec<DiscardedQuote>,
) -> usize {
    let mut seen: HashSet<CurrencyPair> = HashSet::new();
    let mut accepted = 0;

    for quote in quotes {
        let reason = if !quote.has_positive_price() {
            Some(DiscardReason::NonPositivePrice)
        } else if !builder.universe().is_asset(&quote.asset) {
            Some(DiscardReason::UnknownAsset)
        } else if !builder.universe().is_quote_currency(&quote.quote_currency) {
            Some(DiscardReason::UnknownQuoteCurrency)
        } else if !seen.insert(quote.pair()) {
            Some(DiscardReason::Duplicate)
        } else {
            None
        };

        if let Some(reason) = reason {
            discarded.push(DiscardedQuote {
                quote: quote.clone(),
                reason,
            });
            continue;
        }

        builder.insert_with_inverse(
            &quote.asset,
            &quote.quote_currency,
            quote.price,
            RateOrigin::Direct,
            RateOrigin::Inverse,
        );
        accepted += 1;
    }

    accepted
}

/// Rule 3: `rate(p1, p2) = rate(p1, q0) / rate(p2, q0)`.
fn bridge_assets(builder: &mut RateMatrixBuilder) -> usize {
    let anchor = builder.universe().anchor_quote.clone();
    let priced: Vec<(Currency, Decimal)> = builder
        .universe()
        .assets
        .iter()
        .filter_map(|p| builder.get(p, &anchor).map(|rate| (p.clone(), rate)))
        .collect();

    let mut stored = 0;
    for (i, (p1, r1)) in priced.iter().enumerate() {
        for (p2, r2) in &priced[i + 1..] {
            if let Some(rate) = r1.checked_div(*r2) {
                stored += builder.insert_with_inverse(
                    p1,
                    p2,
                    rate,
                    RateOrigin::AssetBridge,
                    RateOrigin::AssetBridge,
                );
            }
        }
    }
    stored
}

/// Rule 4: `rate(q1, q2) = rate(p0, q2) / rate(p0, q1)`.
fn bridge_quote_currencies(builder: &mut RateMatrixBuilder) -> usize {
    let anchor = builder.universe().anchor_asset.clone();
    let priced: Vec<(Currency, Decimal)> = builder
        .universe()
        .quote_currencies
        .iter()
        .filter_map(|q| builder.get(&anchor, q).map(|rate| (q.clone(), rate)))
        .collect();

    let mut stored = 0;
    for (i, (q1, r1)) in priced.iter().enumerate() {
        for (q2, r2) in &priced[i + 1..] {
            if let Some(rate) = r2.checked_div(*r1) {
                stored += builder.insert_with_inverse(
                    q1,
                    q2,
                    rate,
                    RateOrigin::QuoteBridge,
                    RateOrigin::QuoteBridge,
                );
            }
        }
    }
    stored
}
