//! Data source abstractions: funding feeds, account valuations, and pricing.
//!
//! Venue-specific shapes are normalized by the adapters in this module so the
//! engine only ever sees [`FundingRecord`]s and quote-currency floats.

use crate::domain::{AccountLabel, Currency, Decimal, FundingRecord};
use async_trait::async_trait;
use std::fmt;

pub mod http;
pub mod mock;
pub mod pricing;

pub use http::{HttpEventFeed, HttpValuationSource};
pub use mock::MockDataSource;
pub use pricing::StaticPriceOracle;

/// A source of candidate funding records for an account.
///
/// Feeds may re-deliver their entire window on every call; callers must
/// tolerate full overlap.
#[async_trait]
pub trait EventFeed: Send + Sync + fmt::Debug {
    /// Short name used in logs (e.g. "helper", "raw").
    fn name(&self) -> &str;

    /// Fetch records with timestamps in `[from_ms, to_ms]`.
    async fn fetch_events(
        &self,
        account: &AccountLabel,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<Vec<FundingRecord>, DataSourceError>;
}

/// Current mark-to-market value of an account in the quote currency.
#[async_trait]
pub trait ValuationSource: Send + Sync + fmt::Debug {
    async fn total_value(&self, account: &AccountLabel) -> Result<f64, DataSourceError>;
}

/// Asset-to-quote pricing oracle.
#[async_trait]
pub trait PriceOracle: Send + Sync + fmt::Debug {
    /// Quote-currency value of `amount` units of `currency`, or `None` when unpriced.
    async fn valuation(
        &self,
        currency: &Currency,
        amount: Decimal,
    ) -> Result<Option<f64>, DataSourceError>;
}

/// Error type for data source operations.
#[derive(Debug, Clone)]
pub enum DataSourceError {
    /// Network error (e.g., connection timeout, DNS failure)
    NetworkError(String),
    /// HTTP error (e.g., 429 rate limit, 5xx server error)
    HttpError { status: u16, message: String },
    /// Parsing error (invalid JSON or malformed response)
    ParseError(String),
    /// Rate limit exceeded
    RateLimited,
    /// No source configured for the account
    NotConfigured(String),
}

impl fmt::Display for DataSourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSourceError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            DataSourceError::HttpError { status, message } => {
                write!(f, "HTTP error {}: {}", status, message)
            }
            DataSourceError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            DataSourceError::RateLimited => write!(f, "Rate limited"),
            DataSourceError::NotConfigured(what) => write!(f, "Not configured: {}", what),
        }
    }
}

impl std::error::Error for DataSourceError {}
