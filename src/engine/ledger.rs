//! Per-account funding ledger with flow-segmented TWR.
//!
//! State machine per account:
//! - open segment: valuation drifts, no flows yet
//! - flow event: close the segment at the pre-flow value, reopen at the post-flow value
//! - period boundary: final close, report, full reset
//!
//! Events must be folded in timestamp order; the segment chain cannot be
//! repaired after an out-of-order application.

use super::returns::{close_segment, ReturnsReport};
use crate::domain::{AccountLabel, Direction, FundingEvent};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Persistent ledger state for one account.
///
/// Missing fields deserialize to their defaults so older snapshots load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountLedgerState {
    /// Baseline valuation of the current period.
    pub start_value: Option<f64>,
    /// Signed flows since the period started (deposits positive).
    pub net_flows: f64,
    /// Every canonical id ever applied or acknowledged. Only grows.
    pub seen_ids: BTreeSet<String>,
    /// Cumulative product of segment growth factors for the period.
    pub twr_factor: f64,
    pub segment_start_value: Option<f64>,
    pub segment_net_flows: f64,
}

impl Default for AccountLedgerState {
    fn default() -> Self {
        Self {
            start_value: None,
            net_flows: 0.0,
            seen_ids: BTreeSet::new(),
            twr_factor: 1.0,
            segment_start_value: None,
            segment_net_flows: 0.0,
        }
    }
}

/// How an event affected the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct Application {
    pub applied: bool,
    /// Quote-currency value booked as flow (zero when not applied).
    pub flow_value: f64,
    /// True when no valuation was available and the raw amount was booked.
    pub approximated: bool,
}

impl Application {
    fn skipped() -> Self {
        Self {
            applied: false,
            flow_value: 0.0,
            approximated: false,
        }
    }
}

impl AccountLedgerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialize the period and segment baselines from the first valuation seen.
    pub fn observe_valuation(&mut self, value: f64) {
        if self.start_value.is_none() {
            self.start_value = Some(value);
        }
        if self.segment_start_value.is_none() {
            self.segment_start_value = Some(value);
        }
    }

    pub fn has_seen(&self, id: &str) -> bool {
        self.seen_ids.contains(id)
    }

    /// Record a terminal event that moved no funds, so it is not reconsidered.
    ///
    /// Returns false when the id was already known.
    pub fn acknowledge(&mut self, id: &str) -> bool {
        self.seen_ids.insert(id.to_string())
    }

    /// Apply a settled funding event at most once.
    ///
    /// `valuation` is the quote-currency value of the flow when priced; without
    /// it the raw amount is booked. That approximation is permanent: later
    /// price corrections never revisit an applied event.
    /// `current_total_value` is the post-flow mark-to-market of the account.
    pub fn apply_event(
        &mut self,
        event: &FundingEvent,
        valuation: Option<f64>,
        current_total_value: f64,
    ) -> Application {
        if self.seen_ids.contains(&event.id) {
            debug!(event_id = %event.id, "event already applied");
            return Application::skipped();
        }

        let approximated = valuation.is_none();
        let flow_value = match valuation {
            Some(v) => v,
            None => {
                let raw = event.amount.to_f64();
                warn!(
                    event_id = %event.id,
                    currency = %event.currency,
                    amount = raw,
                    "valuation missing, booking raw amount"
                );
                raw
            }
        };

        let pre_flow = match event.direction {
            Direction::Deposit => (current_total_value - flow_value).max(0.0),
            Direction::Withdrawal => current_total_value + flow_value,
        };
        close_segment(self, pre_flow, Some(current_total_value));
        self.net_flows += event.direction.sign() * flow_value;
        self.seen_ids.insert(event.id.clone());

        debug!(
            event_id = %event.id,
            direction = %event.direction,
            flow_value,
            pre_flow,
            twr_factor = self.twr_factor,
            "applied funding event"
        );

        Application {
            applied: true,
            flow_value,
            approximated,
        }
    }

    /// Report the current period without closing it.
    pub fn report(&self, account: AccountLabel, value: f64) -> ReturnsReport {
        ReturnsReport::from_state(account, self, value)
    }

    /// Scheduled period boundary.
    ///
    /// Forces a final segment close at `current_value`, reports the period,
    /// then resets baselines, flows and the TWR factor. `seen_ids` survives.
    pub fn close_period(&mut self, account: AccountLabel, current_value: f64) -> ReturnsReport {
        close_segment(self, current_value, Some(current_value));
        let report = ReturnsReport::from_state(account, self, current_value);

        self.start_value = Some(current_value);
        self.net_flows = 0.0;
        self.twr_factor = 1.0;
        self.segment_start_value = Some(current_value);
        self.segment_net_flows = 0.0;

        report
    }
}
