//! Immutable pairwise rate matrix.

use std::collections::{BTreeMap, HashMap};

use ratebridge_common::{Currency, CurrencyPair};
use rust_decimal::Decimal;

use crate::config::Universe;

/// Where a matrix entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateOrigin {
    /// Quoted directly by the source.
    Direct,
    /// Reciprocal of a direct quote.
    Inverse,
    /// Bridged through the anchor quote currency.
    AssetBridge,
    /// Bridged through the anchor asset.
    QuoteBridge,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    rate: Decimal,
    origin: RateOrigin,
}

/// Sparse mapping from (X, Y) to "1 X = rate Y".
///
/// A matrix never changes once built. The identity rate is implicit: `get`
/// answers 1 for any `(X, X)` without storing it.
#[derive(Debug, Clone)]
pub struct RateMatrix {
    universe: Universe,
    entries: HashMap<CurrencyPair, Entry>,
}

impl RateMatrix {
    /// An empty matrix over `universe`.
    pub fn empty(universe: Universe) -> Self {
        Self {
            universe,
            entries: HashMap::new(),
        }
    }

    /// Stored rate for the ordered pair, or 1 for identical identifiers.
    pub fn get(&self, from: &Currency, to: &Currency) -> Option<Decimal> {
        if from == to {
            return Some(Decimal::ONE);
        }
        self.entries
            .get(&CurrencyPair::new(from.clone(), to.clone()))
            .map(|e| e.rate)
    }

    /// How a stored rate was obtained.
    pub fn origin(&self, from: &Currency, to: &Currency) -> Option<RateOrigin> {
        self.entries
            .get(&CurrencyPair::new(from.clone(), to.clone()))
            .map(|e| e.origin)
    }

    /// Every stored entry whose first component is `id`; the implicit identity
    /// entry is not included.
    pub fn rates_for(&self, id: &Currency) -> BTreeMap<Currency, Decimal> {
        self.entries
            .iter()
            .filter(|(pair, _)| &pair.base == id)
            .map(|(pair, entry)| (pair.quote.clone(), entry.rate))
            .collect()
    }

    /// Whether `id` is part of the universe this matrix was built for.
    pub fn contains(&self, id: &Currency) -> bool {
        self.universe.contains(id)
    }

    pub fn universe(&self) -> &Universe {
        &self.universe
    }

    /// Iterate over stored pairs and their rates.
    pub fn pairs(&self) -> impl Iterator<Item = (&CurrencyPair, Decimal)> {
        self.entries.iter().map(|(pair, e)| (pair, e.rate))
    }

    /// Number of stored (non-identity) entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Builds a [`RateMatrix`]; the first value inserted for a pair wins.
#[derive(Debug)]
pub struct RateMatrixBuilder {
    universe: Universe,
    entries: HashMap<CurrencyPair, Entry>,
}

impl RateMatrixBuilder {
    pub fn new(universe: Universe) -> Self {
        Self {
            universe,
            entries: HashMap::new(),
        }
    }

    /// Insert unless the pair is already known. Returns whether it was stored.
    ///
    /// Identity pairs and non-positive rates are never stored.
    pub fn insert(&mut self, from: &Currency, to: &Currency, rate: Decimal, origin: RateOrigin) -> bool {
        if from == to || rate <= Decimal::ZERO {
            return false;
        }
        let pair = CurrencyPair::new(from.clone(), to.clone());
        if self.entries.contains_key(&pair) {
            return false;
        }
        self.entries.insert(pair, Entry { rate, origin });
        true
    }

    /// Insert `rate` for (from, to) and its reciprocal for (to, from).
    ///
    /// Returns the number of entries stored.
    pub fn insert_with_inverse(
        &mut self,
        from: &Currency,
        to: &Currency,
        rate: Decimal,
        origin: RateOrigin,
        inverse_origin: RateOrigin,
    ) -> usize {
        let Some(inverse) = Decimal::ONE.checked_div(rate) else {
            return 0;
        };
        usize::from(self.insert(from, to, rate, origin))
            + usize::from(self.insert(to, from, inverse, inverse_origin))
    }

    /// Stored rate, identity excluded.
    pub fn get(&self, from: &Currency, to: &Currency) -> Option<Decimal> {
        self.entries
            .get(&CurrencyPair::new(from.clone(), to.clone()))
            .map(|e| e.rate)
    }

    pub fn universe(&self) -> &Universe {
        &self.universe
    }

    pub fn build(self) -> RateMatrix {
        RateMatrix {
            universe: self.universe,
            entries: self.entries,
        }
    }
}
