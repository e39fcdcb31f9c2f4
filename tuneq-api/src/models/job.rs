//! Job record state machine
//!
//! Per key: `absent → processing → {ready | error}`, with `error → processing`
//! when a later request starts a new attempt. A `processing` record older
//! than the maximum processing age is treated as abandoned and may also be
//! re-claimed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Job status as persisted in the `jobs.status` column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// An attempt owns the key and is running
    Processing,
    /// Audio stored, `result_url` set
    Ready,
    /// Last attempt failed, `error_detail` set
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Processing => "processing",
            JobStatus::Ready => "ready",
            JobStatus::Error => "error",
        }
    }

}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(JobStatus::Processing),
            "ready" => Ok(JobStatus::Ready),
            "error" => Ok(JobStatus::Error),
            other => Err(format!("Unknown job status: {}", other)),
        }
    }
}

/// One job per normalized query key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Normalized query; sole identity of the job
    pub key: String,

    /// Original input of the request that created the record
    pub raw_query: String,

    /// Search term produced by the translator for the current attempt
    pub resolved_term: String,

    pub status: JobStatus,

    /// Present iff `status == Ready`
    pub result_url: Option<String>,

    /// Present iff `status == Error`
    pub error_detail: Option<String>,

    /// Attempt currently owning (or last owning) the key
    pub attempt_id: Uuid,

    /// Number of attempts started for this key
    pub attempts: u32,

    pub created_at: DateTime<Utc>,
    pub claimed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Whether this record is an abandoned `processing` attempt
    pub fn is_stale_processing(&self, max_age: std::time::Duration, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Processing && older_than(self.claimed_at, max_age, now)
    }

    /// Whether this `error` record's cooldown has elapsed
    pub fn is_retryable_error(&self, retry_after: std::time::Duration, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Error && older_than(self.updated_at, retry_after, now)
    }
}

fn older_than(ts: DateTime<Utc>, age: std::time::Duration, now: DateTime<Utc>) -> bool {
    match chrono::Duration::from_std(age) {
        Ok(age) => now.signed_duration_since(ts) >= age,
        Err(_) => false,
    }
}

/// Exclusive ownership of one attempt for one key
///
/// Returned by a successful claim. Terminal writes are only accepted for the
/// attempt named here, so a superseded attempt cannot overwrite a newer one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub key: String,
    pub attempt_id: Uuid,
    pub resolved_term: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn record(status: JobStatus, age_secs: i64, now: DateTime<Utc>) -> JobRecord {
        let then = now - chrono::Duration::seconds(age_secs);
        JobRecord {
            key: "shape of you".to_string(),
            raw_query: "Shape Of You".to_string(),
            resolved_term: "ed sheeran shape of you".to_string(),
            status,
            result_url: None,
            error_detail: None,
            attempt_id: Uuid::new_v4(),
            attempts: 1,
            created_at: then,
            claimed_at: then,
            updated_at: then,
            completed_at: None,
        }
    }

    #[test]
    fn test_status_roundtrips_through_str() {
        for status in [JobStatus::Processing, JobStatus::Ready, JobStatus::Error] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("done".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_staleness_only_applies_to_processing() {
        let now = Utc::now();
        assert!(record(JobStatus::Processing, 120, now).is_stale_processing(Duration::from_secs(60), now));
        assert!(!record(JobStatus::Processing, 10, now).is_stale_processing(Duration::from_secs(60), now));
        assert!(!record(JobStatus::Ready, 120, now).is_stale_processing(Duration::from_secs(60), now));
    }

    #[test]
    fn test_error_cooldown() {
        let now = Utc::now();
        assert!(record(JobStatus::Error, 31, now).is_retryable_error(Duration::from_secs(30), now));
        assert!(!record(JobStatus::Error, 5, now).is_retryable_error(Duration::from_secs(30), now));
        assert!(!record(JobStatus::Processing, 31, now).is_retryable_error(Duration::from_secs(30), now));
    }

    #[test]
    fn test_zero_cooldown_retryable_at_same_instant() {
        let now = Utc::now();
        assert!(record(JobStatus::Error, 0, now).is_retryable_error(Duration::ZERO, now));
        assert!(record(JobStatus::Processing, 0, now).is_stale_processing(Duration::ZERO, now));
    }

    #[test]
    fn test_record_from_the_future_is_not_old() {
        // A clock read before the record was stamped must not make it retryable
        let now = Utc::now();
        let later = record(JobStatus::Error, 0, now + chrono::Duration::milliseconds(5));
        assert!(!later.is_retryable_error(Duration::ZERO, now));
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&JobStatus::Ready).unwrap(), "\"ready\"");
    }
}
