//! Mock data source for testing without network calls.

use super::{DataSourceError, EventFeed, PriceOracle, ValuationSource};
use crate::domain::{AccountLabel, Currency, Decimal, FundingRecord};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct MockState {
    records: HashMap<AccountLabel, Vec<FundingRecord>>,
    totals: HashMap<AccountLabel, f64>,
    prices: HashMap<Currency, f64>,
    failing: bool,
    fetches: usize,
}

/// Mock feed, valuation source and price oracle in one.
///
/// Clones share state, so a test can keep a handle and change what the next
/// tick observes.
#[derive(Debug, Clone)]
pub struct MockDataSource {
    name: String,
    state: Arc<Mutex<MockState>>,
}

impl MockDataSource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add a record returned for `account` on every fetch.
    pub fn with_record(self, account: &AccountLabel, record: FundingRecord) -> Self {
        self.lock()
            .records
            .entry(account.clone())
            .or_default()
            .push(record);
        self
    }

    pub fn with_total(self, account: &AccountLabel, value: f64) -> Self {
        self.set_total(account, value);
        self
    }

    pub fn with_price(self, currency: &str, price: f64) -> Self {
        self.lock().prices.insert(Currency::new(currency), price);
        self
    }

    /// Replace every record for `account`.
    pub fn set_records(&self, account: &AccountLabel, records: Vec<FundingRecord>) {
        self.lock().records.insert(account.clone(), records);
    }

    pub fn set_total(&self, account: &AccountLabel, value: f64) {
        self.lock().totals.insert(account.clone(), value);
    }

    /// Make every call fail with a network error until reset.
    pub fn set_failing(&self, failing: bool) {
        self.lock().failing = failing;
    }

    /// Number of `fetch_events` calls served so far.
    pub fn fetch_count(&self) -> usize {
        self.lock().fetches
    }
}

impl Default for MockDataSource {
    fn default() -> Self {
        Self::new("mock")
    }
}

#[async_trait]
impl EventFeed for MockDataSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_events(
        &self,
        account: &AccountLabel,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<Vec<FundingRecord>, DataSourceError> {
        let mut state = self.lock();
        state.fetches += 1;
        if state.failing {
            return Err(DataSourceError::NetworkError(format!(
                "{} unavailable",
                self.name
            )));
        }
        Ok(state
            .records
            .get(account)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.timestamp.as_ms() >= from_ms && r.timestamp.as_ms() <= to_ms)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl ValuationSource for MockDataSource {
    async fn total_value(&self, account: &AccountLabel) -> Result<f64, DataSourceError> {
        let state = self.lock();
        if state.failing {
            return Err(DataSourceError::NetworkError(format!(
                "{} unavailable",
                self.name
            )));
        }
        state
            .totals
            .get(account)
            .copied()
            .ok_or_else(|| DataSourceError::NotConfigured(format!("total for {}", account)))
    }
}

#[async_trait]
impl PriceOracle for MockDataSource {
    async fn valuation(
        &self,
        currency: &Currency,
        amount: Decimal,
    ) -> Result<Option<f64>, DataSourceError> {
        let state = self.lock();
        if state.failing {
            return Err(DataSourceError::RateLimited);
        }
        Ok(state.prices.get(currency).map(|px| px * amount.to_f64()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Direction, TimeMs};

    fn record(id: &str, ts: i64) -> FundingRecord {
        FundingRecord::new(
            Some(id.to_string()),
            Some(Direction::Deposit),
            TimeMs::new(ts),
            Currency::new("BTC"),
            Decimal::from_str_canonical("1").unwrap(),
            Some("1".to_string()),
        )
    }

    #[tokio::test]
    async fn test_mock_fetch_events_filtered_by_window() {
        let account = AccountLabel::new("binance_01");
        let mock = MockDataSource::new("helper")
            .with_record(&account, record("a", 1000))
            .with_record(&account, record("b", 5000));
        let events = mock.fetch_events(&account, 0, 2000).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].native_id.as_deref(), Some("a"));
        assert_eq!(mock.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_failing_feed() {
        let account = AccountLabel::new("binance_01");
        let mock = MockDataSource::new("raw");
        mock.set_failing(true);
        assert!(mock.fetch_events(&account, 0, 1).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_valuation_and_total() {
        let account = AccountLabel::new("okx_1");
        let mock = MockDataSource::default()
            .with_total(&account, 1000.0)
            .with_price("btc", 20000.0);
        assert_eq!(mock.total_value(&account).await.unwrap(), 1000.0);
        let value = mock
            .valuation(&Currency::new("BTC"), Decimal::from_str_canonical("0.5").unwrap())
            .await
            .unwrap();
        assert_eq!(value, Some(10000.0));
        let unpriced = mock
            .valuation(&Currency::new("XRP"), Decimal::from_str_canonical("1").unwrap())
            .await
            .unwrap();
        assert_eq!(unpriced, None);
    }
}
