use chrono::{DateTime, FixedOffset, TimeDelta, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Persisted freshness record.
///
/// A record only exists once a capture succeeded, so `stale_applied` can
/// never be set without `last_successful_run`. A file lacking the timestamp
/// does not deserialize and is treated as "no prior success".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub last_successful_run: DateTime<FixedOffset>,
    pub timezone: String,
    #[serde(default)]
    pub stale_applied: bool,
}

impl StatusRecord {
    /// Fresh record for a capture that completed at `now`, stamped in `timezone`.
    pub fn success_at(now: DateTime<Utc>, timezone: Tz) -> Self {
        Self {
            last_successful_run: now.with_timezone(&timezone).fixed_offset(),
            timezone: timezone.name().to_string(),
            stale_applied: false,
        }
    }

    /// Time since the last success, measured in the record's own offset.
    pub fn elapsed_since_success(&self, now: DateTime<Utc>) -> TimeDelta {
        now.with_timezone(self.last_successful_run.offset()) - self.last_successful_run
    }

    pub fn is_stale(&self, now: DateTime<Utc>, threshold: TimeDelta) -> bool {
        self.elapsed_since_success(now) > threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn montreal() -> Tz {
        "America/Montreal".parse().unwrap()
    }

    #[test]
    fn test_success_record_uses_local_offset() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 17, 0, 0).unwrap();
        let record = StatusRecord::success_at(now, montreal());

        assert_eq!(record.timezone, "America/Montreal");
        assert_eq!(record.last_successful_run.offset().local_minus_utc(), -5 * 3600);
        assert_eq!(record.last_successful_run, now);
        assert!(!record.stale_applied);
    }

    #[test]
    fn test_serializes_iso_timestamp_with_offset() {
        let now = Utc.with_ymd_and_hms(2024, 7, 1, 12, 30, 0).unwrap();
        let record = StatusRecord::success_at(now, montreal());
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["last_successful_run"], "2024-07-01T08:30:00-04:00");
        assert_eq!(json["timezone"], "America/Montreal");
        assert_eq!(json["stale_applied"], false);
    }

    #[test]
    fn test_parses_record_with_fractional_seconds() {
        let json = r#"{"last_successful_run": "2024-07-01T08:30:00.123456-04:00", "timezone": "America/Montreal", "stale_applied": true}"#;
        let record: StatusRecord = serde_json::from_str(json).unwrap();
        assert!(record.stale_applied);
    }

    #[test]
    fn test_record_without_timestamp_is_rejected() {
        let json = r#"{"timezone": "America/Montreal", "stale_applied": true}"#;
        assert!(serde_json::from_str::<StatusRecord>(json).is_err());
    }

    #[test]
    fn test_is_stale_is_strictly_greater_than_threshold() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 17, 0, 0).unwrap();
        let record = StatusRecord::success_at(now, montreal());
        let threshold = TimeDelta::hours(12);

        assert!(!record.is_stale(now + threshold, threshold));
        assert!(record.is_stale(now + threshold + TimeDelta::seconds(1), threshold));
    }
}
