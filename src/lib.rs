pub mod api;
pub mod config;
pub mod datasource;
pub mod domain;
pub mod engine;
pub mod error;
pub mod notify;
pub mod orchestration;
pub mod store;

pub use config::Config;
pub use datasource::{DataSourceError, EventFeed, MockDataSource, PriceOracle, ValuationSource};
pub use domain::{AccountLabel, Currency, Decimal, Direction, FundingEvent, FundingRecord, TimeMs, Venue};
pub use engine::{AccountLedgerState, FinalityRules, ReturnsReport};
pub use error::AppError;
pub use orchestration::{Monitor, TickError, TickOutcome};
pub use store::{LedgerSnapshot, SnapshotStore};
