//! Pure computation engine for funding reconciliation and returns.
//!
//! Leaves first: finality classification, feed deduplication, the per-account
//! ledger, and the return calculator it drives.

pub mod dedup;
pub mod finality;
pub mod ledger;
pub mod returns;

pub use dedup::deduplicate;
pub use finality::{FinalityError, FinalityRule, FinalityRules, Settlement};
pub use ledger::{AccountLedgerState, Application};
pub use returns::{close_segment, money_weighted_return, GuardViolation, ReturnsReport, SegmentClose};
