//! Date windows for time-range-sensitive variables.

use chrono::{Duration, Local, NaiveDate};
use serde::{Deserialize, Serialize};

/// An inclusive `[from, to]` date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateWindow {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateWindow {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Self {
        Self { from, to }
    }

    /// The `days` days ending at `to`.
    pub fn ending_at(to: NaiveDate, days: u32) -> Self {
        Self {
            from: to - Duration::days(i64::from(days)),
            to,
        }
    }

    /// The `days` days ending today (local time).
    pub fn last_days(days: u32) -> Self {
        Self::ending_at(Local::now().date_naive(), days)
    }

    /// Whole days between `from` and `to`.
    pub fn days(&self) -> i64 {
        (self.to - self.from).num_days()
    }

    /// `:from:to` suffix appended to cache keys.
    pub fn cache_suffix(&self) -> String {
        format!(":{}:{}", self.from, self.to)
    }
}
