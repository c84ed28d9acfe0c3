//! Static price oracle backed by an operator-supplied price map.

use super::{DataSourceError, PriceOracle};
use crate::domain::{Currency, Decimal};
use async_trait::async_trait;
use std::collections::HashMap;

/// Stablecoins valued 1:1 against the quote currency.
pub const STABLECOINS: &[&str] = &["USDT", "USDC", "FDUSD", "TUSD", "USDD", "DAI"];

#[derive(Debug, Clone)]
pub struct StaticPriceOracle {
    quote: Currency,
    prices: HashMap<Currency, f64>,
}

impl StaticPriceOracle {
    pub fn new(quote: Currency, prices: HashMap<Currency, f64>) -> Self {
        Self { quote, prices }
    }

    /// Price of one unit of `currency` in the quote currency.
    pub fn price(&self, currency: &Currency) -> Option<f64> {
        if *currency == self.quote || STABLECOINS.contains(&currency.as_str()) {
            return Some(1.0);
        }
        self.prices
            .get(currency)
            .copied()
            .filter(|px| *px > 0.0 && px.is_finite())
    }
}

#[async_trait]
impl PriceOracle for StaticPriceOracle {
    async fn valuation(
        &self,
        currency: &Currency,
        amount: Decimal,
    ) -> Result<Option<f64>, DataSourceError> {
        Ok(self.price(currency).map(|px| px * amount.to_f64()))
    }
}
