//! Merge overlapping funding feeds into one canonical record set.

use super::finality::FinalityRules;
use crate::domain::{CanonicalKey, FundingRecord, Venue};
use std::collections::HashMap;
use tracing::debug;

/// Merge candidate lists from several feeds for one venue.
///
/// `sources` must be in priority order (cheap helper feed first, raw protocol
/// feed after). Records sharing a canonical key collapse to one entry:
/// - a final record replaces a non-final one,
/// - a final record is never displaced,
/// - otherwise the earliest-seen record wins.
///
/// Output keeps first-seen order; callers sort before folding.
pub fn deduplicate<I>(sources: I, venue: Venue, rules: &FinalityRules) -> Vec<FundingRecord>
where
    I: IntoIterator<Item = Vec<FundingRecord>>,
{
    let mut index: HashMap<CanonicalKey, usize> = HashMap::new();
    let mut merged: Vec<FundingRecord> = Vec::new();
    let mut source_count = 0usize;
    let mut candidate_count = 0usize;

    for source in sources {
        source_count += 1;
        candidate_count += source.len();
        for record in source {
            let key = record.canonical_key();
            match index.get(&key) {
                None => {
                    index.insert(key, merged.len());
                    merged.push(record);
                }
                Some(&idx) => {
                    if record_is_final(&record, venue, rules)
                        && !record_is_final(&merged[idx], venue, rules)
                    {
                        merged[idx] = record;
                    }
                }
            }
        }
    }

    debug!(
        %venue,
        sources = source_count,
        candidates = candidate_count,
        merged = merged.len(),
        "deduplicated funding records"
    );
    merged
}

/// Incomplete records are never final, so they can never supersede anything.
fn record_is_final(record: &FundingRecord, venue: Venue, rules: &FinalityRules) -> bool {
    match (record.direction, record.status.as_deref()) {
        (Some(direction), Some(status)) => rules.is_final(venue, direction, status),
        _ => false,
    }
}
