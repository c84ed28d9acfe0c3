//! Funding (deposit/withdrawal) events as delivered by feeds and as applied to the ledger.

use crate::domain::{Currency, Decimal, Direction, TimeMs};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Deduplication identity of a funding record.
///
/// Native venue ids are preferred; without one the composite
/// `(currency, timestamp)` substitutes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CanonicalKey {
    Native(String),
    Composite { currency: Currency, timestamp: TimeMs },
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CanonicalKey::Native(id) => f.write_str(id),
            CanonicalKey::Composite {
                currency,
                timestamp,
            } => write!(f, "{}:{}", currency, timestamp),
        }
    }
}

/// A candidate funding record, straight out of a feed.
///
/// Fields a venue omitted stay `None`; such records can be merged but never
/// win a conflict and are never applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub native_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    pub timestamp: TimeMs,
    pub currency: Currency,
    pub amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl FundingRecord {
    pub fn new(
        native_id: Option<String>,
        direction: Option<Direction>,
        timestamp: TimeMs,
        currency: Currency,
        amount: Decimal,
        status: Option<String>,
    ) -> Self {
        Self {
            native_id: native_id
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            direction,
            timestamp,
            currency,
            amount,
            status,
        }
    }

    pub fn canonical_key(&self) -> CanonicalKey {
        match &self.native_id {
            Some(id) => CanonicalKey::Native(id.clone()),
            None => CanonicalKey::Composite {
                currency: self.currency.clone(),
                timestamp: self.timestamp,
            },
        }
    }
}

/// Reasons a merged record cannot become a ledger event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidRecord {
    #[error("record {0} has no direction")]
    MissingDirection(String),
    #[error("record {0} has no status")]
    MissingStatus(String),
    #[error("record {id} has non-positive amount {amount}")]
    NonPositiveAmount { id: String, amount: Decimal },
}

/// A validated funding event ready for ledger application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingEvent {
    /// Canonical key rendered as a string; this is what lands in `seen_ids`.
    pub id: String,
    pub direction: Direction,
    pub timestamp: TimeMs,
    pub currency: Currency,
    pub amount: Decimal,
    pub status: String,
    /// Quote-currency value at application time, when the oracle had a price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valuation: Option<f64>,
}

impl TryFrom<FundingRecord> for FundingEvent {
    type Error = InvalidRecord;

    fn try_from(record: FundingRecord) -> Result<Self, Self::Error> {
        let id = record.canonical_key().to_string();
        let direction = record
            .direction
            .ok_or_else(|| InvalidRecord::MissingDirection(id.clone()))?;
        let status = record
            .status
            .ok_or_else(|| InvalidRecord::MissingStatus(id.clone()))?;
        if !record.amount.is_positive() {
            return Err(InvalidRecord::NonPositiveAmount {
                id,
                amount: record.amount,
            });
        }
        Ok(FundingEvent {
            id,
            direction,
            timestamp: record.timestamp,
            currency: record.currency,
            amount: record.amount,
            status,
            valuation: None,
        })
    }
}
