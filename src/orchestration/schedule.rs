//! Daily period boundary in a venue-local timezone.

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodSchedule {
    pub tz: Tz,
    /// Local hour (0-23) at or after which the day's period may close.
    pub close_hour: u32,
}

impl Default for PeriodSchedule {
    fn default() -> Self {
        Self {
            tz: chrono_tz::America::New_York,
            close_hour: 16,
        }
    }
}

impl PeriodSchedule {
    pub fn new(tz: Tz, close_hour: u32) -> Self {
        Self { tz, close_hour }
    }

    /// Local calendar date of `now`, recorded as the last close.
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.tz).date_naive()
    }

    /// True once per local day, on the first check at or after `close_hour`.
    pub fn is_due(&self, now: DateTime<Utc>, last_close: Option<NaiveDate>) -> bool {
        let local = now.with_timezone(&self.tz);
        last_close != Some(local.date_naive()) && local.hour() >= self.close_hour
    }
}
