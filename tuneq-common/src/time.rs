//! Timestamp utilities
//!
//! Persisted timestamps are RFC 3339 UTC strings with a fixed millisecond
//! precision and a `Z` suffix, so that string comparison in SQL orders them
//! chronologically.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::{Error, Result};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Format a timestamp for storage
pub fn to_db_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored timestamp
pub fn parse_db_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse timestamp '{}': {}", s, e)))
}

/// Timestamp `age` before now, formatted for storage
///
/// Durations too large for chrono saturate to the Unix epoch.
pub fn db_cutoff(age: std::time::Duration) -> String {
    let cutoff = chrono::Duration::from_std(age)
        .ok()
        .and_then(|age| now().checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    to_db_timestamp(cutoff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_db_timestamp_roundtrip_preserves_millis() {
        let ts = DateTime::parse_from_rfc3339("2025-03-01T12:34:56.789Z")
            .unwrap()
            .with_timezone(&Utc);
        let stored = to_db_timestamp(ts);
        assert_eq!(stored, "2025-03-01T12:34:56.789Z");
        assert_eq!(parse_db_timestamp(&stored).unwrap(), ts);
    }

    #[test]
    fn test_db_timestamps_order_lexicographically() {
        let earlier = to_db_timestamp(now());
        let later = to_db_timestamp(now() + chrono::Duration::milliseconds(5));
        assert!(earlier < later);
    }

    #[test]
    fn test_cutoff_is_in_the_past() {
        let cutoff = db_cutoff(Duration::from_secs(60));
        assert!(cutoff < to_db_timestamp(now()));
    }

    #[test]
    fn test_cutoff_saturates_for_huge_durations() {
        let cutoff = db_cutoff(Duration::from_secs(u64::MAX));
        assert_eq!(cutoff, "1970-01-01T00:00:00.000Z");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_db_timestamp("yesterday").is_err());
    }
}
