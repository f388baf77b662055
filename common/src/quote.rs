//! Upstream price quotes.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Currency, CurrencyPair};

/// One unit of `asset` costs `price` units of `quote_currency`.
///
/// Quotes only ever come from a quote source; derived cross-rates are never
/// represented as quotes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    /// The priced asset.
    pub asset: Currency,
    /// The reference currency the price is expressed in.
    pub quote_currency: Currency,
    /// Price of one unit of the asset.
    pub price: Decimal,
}

impl Quote {
    /// Create a new quote.
    pub fn new(asset: Currency, quote_currency: Currency, price: Decimal) -> Self {
        Self {
            asset,
            quote_currency,
            price,
        }
    }

    /// The pair this quote prices.
    pub fn pair(&self) -> CurrencyPair {
        CurrencyPair::new(self.asset.clone(), self.quote_currency.clone())
    }

    /// Zero and negative prices carry no usable information.
    pub fn has_positive_price(&self) -> bool {
        self.price > Decimal::ZERO
    }
}

impl fmt::Display for Quote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} @ {}", self.asset, self.quote_currency, self.price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_quote_pair() {
        let quote = Quote::new(Currency::btc(), Currency::usd(), dec!(43000));
        assert_eq!(quote.pair(), CurrencyPair::new(Currency::btc(), Currency::usd()));
        assert_eq!(quote.to_string(), "BTC/USD @ 43000");
    }

    #[test]
    fn test_non_positive_prices() {
        assert!(Quote::new(Currency::btc(), Currency::usd(), dec!(0.0001)).has_positive_price());
        assert!(!Quote::new(Currency::btc(), Currency::usd(), Decimal::ZERO).has_positive_price());
        assert!(!Quote::new(Currency::btc(), Currency::usd(), dec!(-1)).has_positive_price());
    }
}
