//! Stable event ordering for deterministic ledger folds.

use crate::domain::FundingEvent;

/// Stable ordering key for funding events.
///
/// Ordering: timestamp -> canonical id. The id tie-break keeps two events
/// sharing a millisecond in the same order on every tick.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct EventOrderingKey {
    pub timestamp: i64,
    pub id: String,
}

impl EventOrderingKey {
    pub fn from_event(event: &FundingEvent) -> Self {
        EventOrderingKey {
            timestamp: event.timestamp.as_ms(),
            id: event.id.clone(),
        }
    }
}

/// Sort events into the only order the ledger may fold them in.
pub fn sort_events_deterministic(events: &mut [FundingEvent]) {
    events.sort_by_cached_key(EventOrderingKey::from_event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Currency, Decimal, Direction, TimeMs};

    fn make_event(id: &str, timestamp: i64) -> FundingEvent {
        FundingEvent {
            id: id.to_string(),
            direction: Direction::Deposit,
            timestamp: TimeMs::new(timestamp),
            currency: Currency::new("USDT"),
            amount: Decimal::from_str_canonical("10").unwrap(),
            status: "1".to_string(),
            valuation: None,
        }
    }

    #[test]
    fn test_sort_by_timestamp_then_id() {
        let mut events = vec![
            make_event("b", 2000),
            make_event("z", 1000),
            make_event("a", 1000),
        ];

        sort_events_deterministic(&mut events);

        let ids: Vec<&str> = events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "z", "b"]);
    }

    #[test]
    fn test_ordering_key_determinism() {
        let event = make_event("x", 1000);
        assert_eq!(
            EventOrderingKey::from_event(&event),
            EventOrderingKey::from_event(&event)
        );
    }
}
