//! Time-weighted and money-weighted return calculations.

use super::ledger::AccountLedgerState;
use crate::domain::AccountLabel;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Why a segment close left `twr_factor` untouched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GuardViolation {
    /// `segment_start_value + segment_net_flows` was zero or negative.
    NonPositiveDenominator(f64),
    /// Pre-flow end valuation was negative or NaN.
    InvalidEndValue(f64),
    /// The growth factor came out non-positive or non-finite.
    InvalidFactor(f64),
}

/// Result of closing one TWR segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SegmentClose {
    Applied { factor: f64 },
    Skipped(GuardViolation),
}

/// Close the current TWR segment and open the next one.
///
/// The growth factor `end / (segment_start + segment_flows)` is compounded into
/// `twr_factor` only when the denominator is positive, the end value is
/// non-negative, and the factor itself is positive and finite. The next
/// segment starts from `next_start_value`, or from `end_value_preflow` when
/// none is given. `segment_net_flows` is always reset.
pub fn close_segment(
    state: &mut AccountLedgerState,
    end_value_preflow: f64,
    next_start_value: Option<f64>,
) -> SegmentClose {
    let denom = state.segment_start_value.unwrap_or(0.0) + state.segment_net_flows;

    let outcome = if !(denom > 0.0) {
        SegmentClose::Skipped(GuardViolation::NonPositiveDenominator(denom))
    } else if !(end_value_preflow >= 0.0) {
        SegmentClose::Skipped(GuardViolation::InvalidEndValue(end_value_preflow))
    } else {
        let factor = end_value_preflow / denom;
        if factor > 0.0 && factor.is_finite() {
            state.twr_factor *= factor;
            SegmentClose::Applied { factor }
        } else {
            SegmentClose::Skipped(GuardViolation::InvalidFactor(factor))
        }
    };

    if let SegmentClose::Skipped(violation) = outcome {
        warn!(
            ?violation,
            twr_factor = state.twr_factor,
            "segment close skipped factor update"
        );
    }

    state.segment_start_value = Some(next_start_value.unwrap_or(end_value_preflow));
    state.segment_net_flows = 0.0;
    outcome
}

/// Simple flow-adjusted return over the period.
///
/// `None` when the period has no baseline or the baseline is zero.
pub fn money_weighted_return(end_value: f64, start_value: Option<f64>, net_flows: f64) -> Option<f64> {
    match start_value {
        Some(start) if start != 0.0 => Some((end_value - start - net_flows) / start),
        _ => None,
    }
}

/// Periodic per-account returns snapshot for external reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnsReport {
    pub account: AccountLabel,
    pub value: f64,
    pub start_value: Option<f64>,
    pub net_flows: f64,
    pub twr_factor: f64,
    /// `twr_factor - 1`.
    pub twr: f64,
    pub money_weighted_return: Option<f64>,
    /// `value - start_value - net_flows`; zero without a baseline.
    pub pnl: f64,
}

impl ReturnsReport {
    pub fn from_state(account: AccountLabel, state: &AccountLedgerState, value: f64) -> Self {
        let pnl = state
            .start_value
            .map(|start| value - start - state.net_flows)
            .unwrap_or(0.0);
        Self {
            account,
            value,
            start_value: state.start_value,
            net_flows: state.net_flows,
            twr_factor: state.twr_factor,
            twr: state.twr_factor - 1.0,
            money_weighted_return: money_weighted_return(value, state.start_value, state.net_flows),
            pnl,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn state_with_segment(start: f64, flows: f64) -> AccountLedgerState {
        AccountLedgerState {
            segment_start_value: Some(start),
            segment_net_flows: flows,
            ..AccountLedgerState::default()
        }
    }

    #[test]
    fn close_compounds_factor() {
        let mut st = state_with_segment(1000.0, 0.0);
        let out = close_segment(&mut st, 1100.0, None);
        assert_eq!(out, SegmentClose::Applied { factor: 1.1 });
        assert_relative_eq!(st.twr_factor, 1.1);
        assert_eq!(st.segment_start_value, Some(1100.0));
        assert_eq!(st.segment_net_flows, 0.0);
    }

    #[test]
    fn close_uses_next_start_value() {
        let mut st = state_with_segment(1000.0, 50.0);
        close_segment(&mut st, 1050.0, Some(1200.0));
        assert_relative_eq!(st.twr_factor, 1.0);
        assert_eq!(st.segment_start_value, Some(1200.0));
        assert_eq!(st.segment_net_flows, 0.0);
    }

    #[test]
    fn negative_end_value_leaves_factor_unchanged() {
        let mut st = state_with_segment(1000.0, 0.0);
        st.twr_factor = 1.25;
        let out = close_segment(&mut st, -5.0, Some(10.0));
        assert_eq!(
            out,
            SegmentClose::Skipped(GuardViolation::InvalidEndValue(-5.0))
        );
        assert_eq!(st.twr_factor, 1.25);
        assert_eq!(st.segment_start_value, Some(10.0));
    }

    #[test]
    fn zero_denominator_is_skipped() {
        let mut st = state_with_segment(0.0, 0.0);
        let out = close_segment(&mut st, 100.0, None);
        assert!(matches!(
            out,
            SegmentClose::Skipped(GuardViolation::NonPositiveDenominator(_))
        ));
        assert_eq!(st.twr_factor, 1.0);
    }

    #[test]
    fn missing_segment_start_is_skipped() {
        let mut st = AccountLedgerState::default();
        close_segment(&mut st, 100.0, None);
        assert_eq!(st.twr_factor, 1.0);
        assert_eq!(st.segment_start_value, Some(100.0));
    }

    #[test]
    fn zero_end_value_is_skipped() {
        let mut st = state_with_segment(100.0, 0.0);
        let out = close_segment(&mut st, 0.0, None);
        assert_eq!(
            out,
            SegmentClose::Skipped(GuardViolation::InvalidFactor(0.0))
        );
        assert_eq!(st.twr_factor, 1.0);
    }

    #[test]
    fn nan_end_value_is_skipped() {
        let mut st = state_with_segment(100.0, 0.0);
        close_segment(&mut st, f64::NAN, Some(100.0));
        assert_eq!(st.twr_factor, 1.0);
    }

    #[test]
    fn money_weighted_return_basic() {
        let r = money_weighted_return(1200.0, Some(1000.0), 100.0).unwrap();
        assert_relative_eq!(r, 0.1);
    }

    #[test]
    fn money_weighted_return_undefined_without_baseline() {
        assert_eq!(money_weighted_return(1200.0, Some(0.0), 100.0), None);
        assert_eq!(money_weighted_return(1200.0, None, 0.0), None);
    }

    #[test]
    fn report_serializes_null_return() {
        let st = AccountLedgerState {
            start_value: Some(0.0),
            ..AccountLedgerState::default()
        };
        let report = ReturnsReport::from_state(AccountLabel::new("okx_1"), &st, 10.0);
        let json = serde_json::to_value(&report).unwrap();
        assert!(json["moneyWeightedReturn"].is_null());
        assert_eq!(json["account"], "OKX_1");
    }
}
