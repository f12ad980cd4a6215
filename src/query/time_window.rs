//! Request time windows
//!
//! Requests carry optional millisecond bounds. A missing (or zero) bound is
//! replaced by an operation specific default: the upper bound defaults to
//! "now", the lower bound to "now minus lookback". Bounds are floored to whole
//! seconds, and to calendar days for the day-partitioned index tables.

use chrono::{DateTime, NaiveDate};
use std::time::Duration;

use crate::query::error::{QueryError, QueryResult};

/// Default lookback for label and type discovery
pub const DISCOVERY_LOOKBACK: Duration = Duration::from_secs(7 * 24 * 3600);

/// Default lookback for stacktrace merges and series selection
pub const SAMPLE_LOOKBACK: Duration = Duration::from_secs(48 * 3600);

/// Inclusive window in whole seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    /// Lower bound, epoch seconds
    pub from_secs: i64,
    /// Upper bound, epoch seconds
    pub to_secs: i64,
}

impl TimeWindow {
    /// Build from explicit second bounds
    pub fn new(from_secs: i64, to_secs: i64) -> QueryResult<Self> {
        if from_secs > to_secs {
            return Err(QueryError::invalid_request(format!(
                "invalid time window: start {} is after end {}",
                from_secs, to_secs
            )));
        }
        Ok(Self { from_secs, to_secs })
    }

    /// Resolve optional request bounds against `now_ms`
    pub fn resolve(
        start_ms: Option<i64>,
        end_ms: Option<i64>,
        lookback: Duration,
        now_ms: i64,
    ) -> QueryResult<Self> {
        let lookback_ms = i64::try_from(lookback.as_millis()).unwrap_or(i64::MAX);
        let start_ms = start_ms
            .filter(|v| *v != 0)
            .unwrap_or_else(|| now_ms.saturating_sub(lookback_ms));
        let end_ms = end_ms.filter(|v| *v != 0).unwrap_or(now_ms);

        Self::new(start_ms.div_euclid(1000), end_ms.div_euclid(1000))
    }

    /// First day touched by the window (UTC)
    pub fn from_day(&self) -> NaiveDate {
        day_of(self.from_secs)
    }

    /// Last day touched by the window (UTC)
    pub fn to_day(&self) -> NaiveDate {
        day_of(self.to_secs)
    }

    /// True if `date` is within the day bounds
    pub fn contains_day(&self, date: NaiveDate) -> bool {
        date >= self.from_day() && date <= self.to_day()
    }

    /// Lower bound in nanoseconds
    pub fn from_ns(&self) -> i64 {
        self.from_secs.saturating_mul(1_000_000_000)
    }

    /// Upper bound in nanoseconds
    pub fn to_ns(&self) -> i64 {
        self.to_secs.saturating_mul(1_000_000_000)
    }

    /// True if a sample timestamp is within the window, both ends inclusive
    pub fn contains_ns(&self, timestamp_ns: i64) -> bool {
        timestamp_ns >= self.from_ns() && timestamp_ns <= self.to_ns()
    }

    /// Day bound conditions on a `date` column
    pub fn date_conditions(&self, column: &str) -> [String; 2] {
        [
            format!("{} >= toDate(FROM_UNIXTIME({}))", column, self.from_secs),
            format!("{} <= toDate(FROM_UNIXTIME({}))", column, self.to_secs),
        ]
    }

    /// Inclusive nanosecond bound conditions on a timestamp column
    pub fn timestamp_conditions(&self, column: &str) -> [String; 2] {
        [
            format!("{} >= {}", column, self.from_ns()),
            format!("{} <= {}", column, self.to_ns()),
        ]
    }
}

fn day_of(secs: i64) -> NaiveDate {
    DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.date_naive())
        .unwrap_or_default()
}
