//! Settlement-status classification for venue transfer records.
//!
//! Each venue reports deposit/withdrawal state either as numeric codes or as
//! text, depending on the API revision. The tables below list every terminal
//! value seen per (venue, direction), split into settled outcomes (funds moved)
//! and failed outcomes (terminal, but nothing moved).

use crate::domain::{Direction, Venue};
use std::collections::BTreeSet;
use thiserror::Error;

/// Terminal status tokens for one (venue, direction) pair.
#[derive(Debug, Clone, Copy)]
pub struct FinalityRule {
    pub venue: Venue,
    pub direction: Direction,
    pub settled: &'static [&'static str],
    pub failed: &'static [&'static str],
}

const FINALITY_TABLE: &[FinalityRule] = &[
    // Binance deposit: 0 pending, 1 success, 6 credited but cannot withdraw.
    FinalityRule {
        venue: Venue::Binance,
        direction: Direction::Deposit,
        settled: &["1", "6", "success", "credited but cannot withdraw"],
        failed: &[],
    },
    // Binance withdraw: 0 email sent, 2 awaiting approval and 4 processing are in flight.
    FinalityRule {
        venue: Venue::Binance,
        direction: Direction::Withdrawal,
        settled: &["6", "completed"],
        failed: &["1", "3", "5", "cancelled", "canceled", "rejected", "failure"],
    },
    // Bybit deposit: 0 pending, 1 to be confirmed, 2 confirming.
    FinalityRule {
        venue: Venue::Bybit,
        direction: Direction::Deposit,
        settled: &["3", "success"],
        failed: &["4", "failed"],
    },
    // Bybit withdraw: 0-4 are pending stages.
    FinalityRule {
        venue: Venue::Bybit,
        direction: Direction::Withdrawal,
        settled: &["5", "completed"],
        failed: &["6", "7", "8", "cancelled", "rejected", "failed", "expired"],
    },
    // OKX deposit: 0 pending, 1 confirmation.
    FinalityRule {
        venue: Venue::Okx,
        direction: Direction::Deposit,
        settled: &["2", "8", "success", "credited"],
        failed: &["9", "failed"],
    },
    // OKX withdraw: 0-5 pending. 8 (awaiting confirmation) is final per OKX.
    FinalityRule {
        venue: Venue::Okx,
        direction: Direction::Withdrawal,
        settled: &["6", "8", "completed"],
        failed: &["7", "9", "10", "cancelled", "failed", "rejected"],
    },
];

/// Settlement classification of a single status token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// In flight, or a value this venue never documented.
    Pending,
    /// Terminal and funds moved.
    Settled,
    /// Terminal and nothing moved (cancelled, rejected, expired...).
    Failed,
}

impl Settlement {
    pub fn is_final(&self) -> bool {
        !matches!(self, Settlement::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FinalityError {
    #[error("no finality table for venue '{venue}' direction '{direction}'")]
    UnsupportedPair { venue: Venue, direction: Direction },
}

/// Finality rules plus operator overrides.
#[derive(Debug, Clone, Default)]
pub struct FinalityRules {
    extra_final: BTreeSet<String>,
    trust_nonfinal: bool,
}

impl FinalityRules {
    /// Build rules from operator override tokens.
    ///
    /// `extra_final` tokens are normalized and treated as settled for every venue.
    /// `trust_nonfinal` classifies every status as settled (debugging aid).
    pub fn new<I, S>(extra_final: I, trust_nonfinal: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extra_final = extra_final
            .into_iter()
            .map(|s| normalize_status(s.as_ref()))
            .filter(|s| !s.is_empty())
            .collect();
        Self {
            extra_final,
            trust_nonfinal,
        }
    }

    /// Startup check: every configured venue must have both direction tables.
    pub fn validate<'a, I>(&self, venues: I) -> Result<(), FinalityError>
    where
        I: IntoIterator<Item = &'a Venue>,
    {
        for venue in venues {
            for direction in Direction::ALL {
                if lookup(*venue, direction).is_none() {
                    return Err(FinalityError::UnsupportedPair {
                        venue: *venue,
                        direction,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn classify(&self, venue: Venue, direction: Direction, status: &str) -> Settlement {
        let token = normalize_status(status);
        if self.trust_nonfinal || self.extra_final.contains(&token) {
            return Settlement::Settled;
        }
        let Some(rule) = lookup(venue, direction) else {
            // Unreachable after validate(); never let a bad pair look final.
            tracing::error!(%venue, %direction, "finality lookup on unvalidated pair");
            return Settlement::Pending;
        };
        if rule.settled.contains(&token.as_str()) {
            Settlement::Settled
        } else if rule.failed.contains(&token.as_str()) {
            Settlement::Failed
        } else {
            Settlement::Pending
        }
    }

    /// Whether `status` is terminal for the venue and direction.
    pub fn is_final(&self, venue: Venue, direction: Direction, status: &str) -> bool {
        self.classify(venue, direction, status).is_final()
    }
}

fn lookup(venue: Venue, direction: Direction) -> Option<&'static FinalityRule> {
    FINALITY_TABLE
        .iter()
        .find(|rule| rule.venue == venue && rule.direction == direction)
}

fn normalize_status(status: &str) -> String {
    status.trim().to_lowercase()
}
