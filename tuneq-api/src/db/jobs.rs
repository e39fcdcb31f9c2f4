//! Job store
//!
//! All mutation of job state goes through the conditional statements here.
//! A claim is a single `INSERT … ON CONFLICT … DO UPDATE … WHERE` so two
//! requests racing on an unseen key cannot both win. Terminal writes are
//! guarded on the owning attempt, so a superseded attempt finishing late is
//! rejected instead of clobbering newer state.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::time::Duration;
use tuneq_common::config::JobsConfig;
use tuneq_common::time::{db_cutoff, now, parse_db_timestamp, to_db_timestamp};
use tuneq_common::Error;
use uuid::Uuid;

use crate::error::JobError;
use crate::models::{Claim, JobRecord, JobStatus};
use crate::normalize::QueryKey;
use crate::utils::retry_on_lock;

/// Claim and write policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorePolicy {
    /// `processing` rows claimed longer ago than this may be re-claimed
    pub max_processing_age: Duration,
    /// `error` rows updated longer ago than this may be re-claimed
    pub error_retry_after: Duration,
    /// Upper bound on retrying writes while SQLite reports a lock
    pub max_lock_wait: Duration,
}

impl Default for StorePolicy {
    fn default() -> Self {
        Self::from(&JobsConfig::default())
    }
}

impl From<&JobsConfig> for StorePolicy {
    fn from(config: &JobsConfig) -> Self {
        Self {
            max_processing_age: Duration::from_secs(config.max_processing_age_secs),
            error_retry_after: Duration::from_secs(config.error_retry_after_secs),
            max_lock_wait: Duration::from_millis(config.max_lock_wait_ms),
        }
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT key, raw_query, resolved_term, status, result_url, error_detail,
           attempt_id, attempts, created_at, claimed_at, updated_at, completed_at
    FROM jobs
"#;

/// SQLite-backed job store
#[derive(Clone)]
pub struct JobStore {
    pool: SqlitePool,
    policy: StorePolicy,
}

impl JobStore {
    pub fn new(pool: SqlitePool, policy: StorePolicy) -> Self {
        Self { pool, policy }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn policy(&self) -> &StorePolicy {
        &self.policy
    }

    fn max_lock_wait_ms(&self) -> u64 {
        self.policy.max_lock_wait.as_millis() as u64
    }

    /// Current state of `key`, or `None` if no job exists
    pub async fn find(&self, key: &QueryKey) -> Result<Option<JobRecord>, JobError> {
        let sql = format!("{} WHERE key = ?", SELECT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    /// Most recently updated jobs, newest first
    pub async fn list_recent(&self, limit: u32) -> Result<Vec<JobRecord>, JobError> {
        let sql = format!("{} ORDER BY updated_at DESC LIMIT ?", SELECT_COLUMNS);
        let rows = sqlx::query(&sql)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(record_from_row).collect()
    }

    /// Atomically claim `key` for a new attempt
    ///
    /// Succeeds when no record exists, when the record is in `error` past its
    /// retry cooldown, or when a `processing` record has been abandoned past
    /// the maximum processing age. Returns `None` when the key is `ready` or
    /// owned by a live attempt. `raw_query` is only written on insert.
    pub async fn claim_and_set_processing(
        &self,
        key: &QueryKey,
        raw_query: &str,
        resolved_term: &str,
    ) -> Result<Option<Claim>, JobError> {
        let attempt_id = Uuid::new_v4();
        let attempt_str = attempt_id.to_string();
        let now_str = to_db_timestamp(now());
        let error_cutoff = db_cutoff(self.policy.error_retry_after);
        let stale_cutoff = db_cutoff(self.policy.max_processing_age);

        let key_str = key.as_str();
        let attempt_ref = attempt_str.as_str();
        let now_ref = now_str.as_str();
        let error_ref = error_cutoff.as_str();
        let stale_ref = stale_cutoff.as_str();
        let pool = &self.pool;

        let rows_affected = retry_on_lock("claim job", self.max_lock_wait_ms(), move || async move {
            sqlx::query(
                r#"
                INSERT INTO jobs (
                    key, raw_query, resolved_term, status, result_url, error_detail,
                    attempt_id, attempts, created_at, claimed_at, updated_at, completed_at
                ) VALUES (?1, ?2, ?3, 'processing', NULL, NULL, ?4, 1, ?5, ?5, ?5, NULL)
                ON CONFLICT(key) DO UPDATE SET
                    resolved_term = excluded.resolved_term,
                    status = 'processing',
                    result_url = NULL,
                    error_detail = NULL,
                    attempt_id = excluded.attempt_id,
                    attempts = jobs.attempts + 1,
                    claimed_at = excluded.claimed_at,
                    updated_at = excluded.updated_at,
                    completed_at = NULL
                WHERE (jobs.status = 'error' AND jobs.updated_at <= ?6)
                   OR (jobs.status = 'processing' AND jobs.claimed_at <= ?7)
                "#,
            )
            .bind(key_str)
            .bind(raw_query)
            .bind(resolved_term)
            .bind(attempt_ref)
            .bind(now_ref)
            .bind(error_ref)
            .bind(stale_ref)
            .execute(pool)
            .await
            .map(|result| result.rows_affected())
            .map_err(Error::Database)
        })
        .await?;

        if rows_affected == 0 {
            tracing::debug!(key = %key, "Claim rejected, key is ready or owned by a live attempt");
            return Ok(None);
        }

        tracing::info!(key = %key, attempt_id = %attempt_id, "Job claimed");

        Ok(Some(Claim {
            key: key.as_str().to_string(),
            attempt_id,
            resolved_term: resolved_term.to_string(),
        }))
    }

    /// Record success for the attempt named by `claim`
    ///
    /// Returns `false` and changes nothing if the attempt no longer owns a
    /// `processing` record.
    pub async fn mark_ready(&self, claim: &Claim, result_url: &str) -> Result<bool, JobError> {
        self.write_terminal(
            claim,
            JobStatus::Ready,
            r#"
            UPDATE jobs
            SET status = 'ready',
                result_url = ?1,
                error_detail = NULL,
                updated_at = ?2,
                completed_at = ?2
            WHERE key = ?3 AND status = 'processing' AND attempt_id = ?4
            "#,
            result_url,
        )
        .await
    }

    /// Record failure for the attempt named by `claim`
    ///
    /// Same ownership guard as [`JobStore::mark_ready`].
    pub async fn mark_error(&self, claim: &Claim, detail: &str) -> Result<bool, JobError> {
        self.write_terminal(
            claim,
            JobStatus::Error,
            r#"
            UPDATE jobs
            SET status = 'error',
                error_detail = ?1,
                result_url = NULL,
                updated_at = ?2,
                completed_at = ?2
            WHERE key = ?3 AND status = 'processing' AND attempt_id = ?4
            "#,
            detail,
        )
        .await
    }

    async fn write_terminal(
        &self,
        claim: &Claim,
        status: JobStatus,
        sql: &'static str,
        value: &str,
    ) -> Result<bool, JobError> {
        let now_str = to_db_timestamp(now());
        let attempt_str = claim.attempt_id.to_string();

        let now_ref = now_str.as_str();
        let attempt_ref = attempt_str.as_str();
        let key_ref = claim.key.as_str();
        let pool = &self.pool;

        let rows_affected = retry_on_lock("write job status", self.max_lock_wait_ms(), move || async move {
            sqlx::query(sql)
                .bind(value)
                .bind(now_ref)
                .bind(key_ref)
                .bind(attempt_ref)
                .execute(pool)
                .await
                .map(|result| result.rows_affected())
                .map_err(Error::Database)
        })
        .await?;

        if rows_affected == 0 {
            tracing::warn!(
                key = %claim.key,
                attempt_id = %claim.attempt_id,
                status = %status,
                "Rejected stale write from superseded attempt"
            );
            return Ok(false);
        }

        tracing::info!(
            key = %claim.key,
            attempt_id = %claim.attempt_id,
            status = %status,
            "Job status updated"
        );
        Ok(true)
    }

    /// Move every `processing` record to `error`
    ///
    /// Run once at startup: pipeline attempts live in this process, so any
    /// `processing` row found before the server accepts requests belongs to
    /// an attempt that died with the previous process.
    pub async fn recover_interrupted(&self, detail: &str) -> Result<usize, JobError> {
        let now_str = to_db_timestamp(now());

        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'error',
                error_detail = ?1,
                updated_at = ?2,
                completed_at = ?2
            WHERE status = 'processing'
            "#,
        )
        .bind(detail)
        .bind(&now_str)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() as usize)
    }
}

fn record_from_row(row: &SqliteRow) -> Result<JobRecord, JobError> {
    let status: String = row.try_get("status")?;
    let status = status
        .parse::<JobStatus>()
        .map_err(JobError::StoreUnavailable)?;

    let attempt_id: String = row.try_get("attempt_id")?;
    let attempt_id = Uuid::parse_str(&attempt_id)
        .map_err(|e| JobError::StoreUnavailable(format!("Failed to parse attempt_id: {}", e)))?;

    let attempts: i64 = row.try_get("attempts")?;

    let created_at: String = row.try_get("created_at")?;
    let claimed_at: String = row.try_get("claimed_at")?;
    let updated_at: String = row.try_get("updated_at")?;
    let completed_at: Option<String> = row.try_get("completed_at")?;

    Ok(JobRecord {
        key: row.try_get("key")?,
        raw_query: row.try_get("raw_query")?,
        resolved_term: row.try_get("resolved_term")?,
        status,
        result_url: row.try_get("result_url")?,
        error_detail: row.try_get("error_detail")?,
        attempt_id,
        attempts: u32::try_from(attempts).unwrap_or(u32::MAX),
        created_at: parse_db_timestamp(&created_at)?,
        claimed_at: parse_db_timestamp(&claimed_at)?,
        updated_at: parse_db_timestamp(&updated_at)?,
        completed_at: completed_at
            .as_deref()
            .map(parse_db_timestamp)
            .transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_store(policy: StorePolicy) -> JobStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::init_tables(&pool).await.unwrap();
        JobStore::new(pool, policy)
    }

    fn immediate_retry() -> StorePolicy {
        StorePolicy {
            error_retry_after: Duration::ZERO,
            ..StorePolicy::default()
        }
    }

    #[tokio::test]
    async fn test_find_absent_returns_none() {
        let store = memory_store(StorePolicy::default()).await;
        assert!(store.find(&normalize("nothing").unwrap()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_first_claim_creates_processing_record() {
        let store = memory_store(StorePolicy::default()).await;
        let key = normalize(" Shape Of You ").unwrap();

        let claim = store
            .claim_and_set_processing(&key, " Shape Of You ", "ed sheeran shape of you")
            .await
            .unwrap()
            .expect("first claim wins");

        let record = store.find(&key).await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Processing);
        assert_eq!(record.raw_query, " Shape Of You ");
        assert_eq!(record.resolved_term, "ed sheeran shape of you");
        assert_eq!(record.attempt_id, claim.attempt_id);
        assert_eq!(record.attempts, 1);
        assert!(record.result_url.is_none());
        assert!(record.error_detail.is_none());
    }

    #[tokio::test]
    async fn test_second_claim_rejected_while_processing_or_ready() {
        let store = memory_store(StorePolicy::default()).await;
        let key = normalize("shape of you").unwrap();

        let claim = store
            .claim_and_set_processing(&key, "shape of you", "term")
            .await
            .unwrap()
            .unwrap();
        assert!(store
            .claim_and_set_processing(&key, "shape of you", "term")
            .await
            .unwrap()
            .is_none());

        assert!(store.mark_ready(&claim, "tg://audio/1").await.unwrap());
        assert!(store
            .claim_and_set_processing(&key, "shape of you", "term")
            .await
            .unwrap()
            .is_none());

        let record = store.find(&key).await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Ready);
        assert_eq!(record.result_url.as_deref(), Some("tg://audio/1"));
        assert!(record.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_error_reclaim_overwrites_attempt_fields() {
        let store = memory_store(immediate_retry()).await;
        let key = normalize("song").unwrap();

        let first = store
            .claim_and_set_processing(&key, "Song", "first term")
            .await
            .unwrap()
            .unwrap();
        assert!(store.mark_error(&first, "fetch failed: no results").await.unwrap());

        let failed = store.find(&key).await.unwrap().unwrap();
        assert_eq!(failed.status, JobStatus::Error);
        assert_eq!(failed.error_detail.as_deref(), Some("fetch failed: no results"));

        let second = store
            .claim_and_set_processing(&key, "SONG", "second term")
            .await
            .unwrap()
            .expect("error record is re-claimable");
        assert_ne!(first.attempt_id, second.attempt_id);

        let retried = store.find(&key).await.unwrap().unwrap();
        assert_eq!(retried.status, JobStatus::Processing);
        assert_eq!(retried.resolved_term, "second term");
        assert_eq!(retried.raw_query, "Song", "raw_query is immutable");
        assert!(retried.error_detail.is_none());
        assert_eq!(retried.attempts, 2);
        assert_eq!(retried.created_at, failed.created_at);
    }

    #[tokio::test]
    async fn test_error_not_reclaimable_during_cooldown() {
        let store = memory_store(StorePolicy {
            error_retry_after: Duration::from_secs(3600),
            ..StorePolicy::default()
        })
        .await;
        let key = normalize("song").unwrap();

        let claim = store
            .claim_and_set_processing(&key, "song", "term")
            .await
            .unwrap()
            .unwrap();
        store.mark_error(&claim, "boom").await.unwrap();

        assert!(store
            .claim_and_set_processing(&key, "song", "term")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_stale_processing_is_reclaimable() {
        let store = memory_store(StorePolicy {
            max_processing_age: Duration::ZERO,
            ..StorePolicy::default()
        })
        .await;
        let key = normalize("stuck").unwrap();

        let abandoned = store
            .claim_and_set_processing(&key, "stuck", "term")
            .await
            .unwrap()
            .unwrap();
        let fresh = store
            .claim_and_set_processing(&key, "stuck", "term")
            .await
            .unwrap()
            .expect("abandoned attempt can be superseded");

        // Abandoned attempt wakes up late: its write must not land
        assert!(!store.mark_ready(&abandoned, "tg://audio/old").await.unwrap());
        assert!(store.mark_ready(&fresh, "tg://audio/new").await.unwrap());

        let record = store.find(&key).await.unwrap().unwrap();
        assert_eq!(record.result_url.as_deref(), Some("tg://audio/new"));
        assert_eq!(record.attempt_id, fresh.attempt_id);
    }

    #[tokio::test]
    async fn test_stale_write_after_newer_ready_is_rejected() {
        let store = memory_store(immediate_retry()).await;
        let key = normalize("race").unwrap();

        let old = store
            .claim_and_set_processing(&key, "race", "term")
            .await
            .unwrap()
            .unwrap();
        store.mark_error(&old, "timed out").await.unwrap();

        let newer = store
            .claim_and_set_processing(&key, "race", "term")
            .await
            .unwrap()
            .unwrap();
        assert!(store.mark_ready(&newer, "tg://audio/newer").await.unwrap());

        // Old attempt reports both outcomes late
        assert!(!store.mark_ready(&old, "tg://audio/older").await.unwrap());
        assert!(!store.mark_error(&old, "late failure").await.unwrap());

        let record = store.find(&key).await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Ready);
        assert_eq!(record.result_url.as_deref(), Some("tg://audio/newer"));
        assert!(record.error_detail.is_none());
    }

    #[tokio::test]
    async fn test_recover_interrupted_marks_processing_as_error() {
        let store = memory_store(StorePolicy::default()).await;
        let running = normalize("running").unwrap();
        let done = normalize("done").unwrap();

        store.claim_and_set_processing(&running, "running", "t").await.unwrap();
        let claim = store
            .claim_and_set_processing(&done, "done", "t")
            .await
            .unwrap()
            .unwrap();
        store.mark_ready(&claim, "tg://audio/done").await.unwrap();

        let recovered = store.recover_interrupted("interrupted by restart").await.unwrap();
        assert_eq!(recovered, 1);

        let record = store.find(&running).await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Error);
        assert_eq!(record.error_detail.as_deref(), Some("interrupted by restart"));
        assert_eq!(store.find(&done).await.unwrap().unwrap().status, JobStatus::Ready);
    }

    #[tokio::test]
    async fn test_list_recent_orders_newest_first() {
        let store = memory_store(StorePolicy::default()).await;
        for name in ["a", "b", "c"] {
            store
                .claim_and_set_processing(&normalize(name).unwrap(), name, name)
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let recent = store.list_recent(2).await.unwrap();
        let keys: Vec<_> = recent.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["c", "b"]);
    }

    #[tokio::test]
    async fn test_closed_pool_is_store_unavailable() {
        let store = memory_store(StorePolicy::default()).await;
        store.pool().close().await;

        let err = store.find(&normalize("x").unwrap()).await.unwrap_err();
        assert!(matches!(err, JobError::StoreUnavailable(_)));
    }
}
