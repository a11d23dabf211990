//! Timestamp value object for immutable points in time.

use chrono::{DateTime, Duration, Months, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::{BillingInterval, ValidationError};

/// Seconds in one calendar day (UTC has no DST).
pub const SECONDS_PER_DAY: i64 = 86_400;

/// Immutable point in time, always UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a timestamp for the current moment.
    ///
    /// Domain code never calls this directly; entry points read the
    /// injected `Clock` instead.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a timestamp from a DateTime<Utc>.
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the inner DateTime.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Creates a timestamp from Unix seconds.
    pub fn from_unix_secs(secs: i64) -> Result<Self, ValidationError> {
        Utc.timestamp_opt(secs, 0)
            .single()
            .map(Self)
            .ok_or_else(|| ValidationError::invalid_format("timestamp", "out of range"))
    }

    /// Returns the timestamp as Unix seconds.
    pub fn as_unix_secs(&self) -> i64 {
        self.0.timestamp()
    }

    /// Checks if this timestamp is before another.
    pub fn is_before(&self, other: &Timestamp) -> bool {
        self.0 < other.0
    }

    /// Checks if this timestamp is after another.
    pub fn is_after(&self, other: &Timestamp) -> bool {
        self.0 > other.0
    }

    /// Returns the duration from another timestamp to this one.
    ///
    /// Returns negative duration if other is after self.
    pub fn duration_since(&self, other: &Timestamp) -> Duration {
        self.0.signed_duration_since(other.0)
    }

    /// Number of days from `other` to `self`, rounded up.
    ///
    /// A partial day counts as a whole day. Negative spans round toward zero
    /// (ceil), so `-0.5` days yields `0`.
    pub fn ceil_days_since(&self, other: &Timestamp) -> i64 {
        let secs = self.duration_since(other).num_seconds();
        secs.div_euclid(SECONDS_PER_DAY) + i64::from(secs.rem_euclid(SECONDS_PER_DAY) != 0)
    }

    /// Creates a new timestamp by adding the specified number of days.
    ///
    /// Negative values subtract days.
    pub fn add_days(&self, days: i64) -> Self {
        Self(self.0 + Duration::days(days))
    }

    /// Creates a new timestamp by subtracting the specified number of days.
    pub fn minus_days(&self, days: i64) -> Self {
        Self(self.0 - Duration::days(days))
    }

    /// Creates a new timestamp by adding seconds.
    pub fn plus_secs(&self, secs: i64) -> Self {
        Self(self.0 + Duration::seconds(secs))
    }

    /// Advances by `count` billing intervals using calendar arithmetic.
    ///
    /// Month and year intervals add calendar months, clamping the day to the
    /// end of shorter months (Jan 31 + 1 month = Feb 28/29).
    pub fn add_interval(
        &self,
        interval: BillingInterval,
        count: u32,
    ) -> Result<Self, ValidationError> {
        let overflow = || ValidationError::invalid_format("billing_interval", "date overflow");
        let next = match interval {
            BillingInterval::Day => self.0.checked_add_signed(Duration::days(i64::from(count))),
            BillingInterval::Week => self.0.checked_add_signed(Duration::weeks(i64::from(count))),
            BillingInterval::Month => self.0.checked_add_months(Months::new(count)),
            BillingInterval::Year => {
                let months = count.checked_mul(12).ok_or_else(overflow)?;
                self.0.checked_add_months(Months::new(months))
            }
        };
        next.map(Self).ok_or_else(overflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    fn at(rfc3339: &str) -> Timestamp {
        Timestamp::from_datetime(
            DateTime::parse_from_rfc3339(rfc3339)
                .unwrap()
                .with_timezone(&Utc),
        )
    }

    #[test]
    fn timestamp_serializes_to_json() {
        let ts = at("2024-01-15T10:30:00Z");
        let json = serde_json::to_string(&ts).unwrap();
        assert!(json.contains("2024-01-15"));
    }

    #[test]
    fn timestamp_deserializes_from_json() {
        let ts: Timestamp = serde_json::from_str("\"2024-01-15T10:30:00Z\"").unwrap();
        assert_eq!(ts.as_datetime().year(), 2024);
    }

    #[test]
    fn unix_secs_roundtrip() {
        let ts = Timestamp::from_unix_secs(1_705_276_800).unwrap();
        assert_eq!(ts.as_unix_secs(), 1_705_276_800);
        assert_eq!(ts.as_datetime().day(), 15);
    }

    #[test]
    fn ceil_days_counts_partial_day_as_whole() {
        let start = at("2024-01-01T00:00:00Z");
        assert_eq!(start.plus_secs(1).ceil_days_since(&start), 1);
        assert_eq!(start.add_days(15).ceil_days_since(&start), 15);
        assert_eq!(start.add_days(15).plus_secs(60).ceil_days_since(&start), 16);
    }

    #[test]
    fn ceil_days_of_negative_span_rounds_toward_zero() {
        let start = at("2024-01-01T12:00:00Z");
        let earlier = at("2024-01-01T00:00:00Z");
        assert_eq!(earlier.ceil_days_since(&start), 0);
        assert_eq!(earlier.minus_days(1).ceil_days_since(&start), -1);
    }

    #[test]
    fn month_interval_clamps_to_month_end() {
        let jan31 = at("2024-01-31T00:00:00Z");
        let next = jan31.add_interval(BillingInterval::Month, 1).unwrap();
        assert_eq!(next, at("2024-02-29T00:00:00Z"));
    }

    #[test]
    fn year_interval_adds_twelve_months() {
        let start = at("2024-03-10T08:00:00Z");
        let next = start.add_interval(BillingInterval::Year, 2).unwrap();
        assert_eq!(next, at("2026-03-10T08:00:00Z"));
    }

    #[test]
    fn week_interval_adds_days() {
        let start = at("2024-03-10T08:00:00Z");
        let next = start.add_interval(BillingInterval::Week, 2).unwrap();
        assert_eq!(next, start.add_days(14));
    }
}
