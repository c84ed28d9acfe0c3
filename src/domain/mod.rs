//! Domain types for funding reconciliation.
//!
//! This module provides:
//! - Lossless amount handling via the Decimal wrapper
//! - Domain primitives: TimeMs, AccountLabel, Currency, Venue, Direction
//! - Candidate records and validated funding events with canonical keys
//! - Stable event ordering for deterministic ledger folds

pub mod decimal;
pub mod event;
pub mod ordering;
pub mod primitives;

pub use decimal::Decimal;
pub use event::{CanonicalKey, FundingEvent, FundingRecord, InvalidRecord};
pub use ordering::{sort_events_deterministic, EventOrderingKey};
pub use primitives::{AccountLabel, Currency, Direction, TimeMs, UnknownVenue, Venue};
