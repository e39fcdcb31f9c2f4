//! Pipeline runner
//!
//! Runs one claimed attempt: fetch audio for the resolved term, upload it,
//! record the outcome. Every failure, including timeouts and collaborator
//! panics, ends as a stored `error` status. Nothing is returned to the
//! caller because no request is waiting on the result.

use chrono::Utc;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tuneq_common::config::JobsConfig;
use tuneq_common::events::{EventBus, TuneqEvent};

use crate::db::JobStore;
use crate::error::JobError;
use crate::models::Claim;
use crate::services::{Fetcher, Storage};
use crate::workflow::executor::panic_message;

/// Upper bounds on collaborator calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineTimeouts {
    pub fetch: Duration,
    pub upload: Duration,
}

impl Default for PipelineTimeouts {
    fn default() -> Self {
        Self::from(&JobsConfig::default())
    }
}

impl From<&JobsConfig> for PipelineTimeouts {
    fn from(config: &JobsConfig) -> Self {
        Self {
            fetch: Duration::from_secs(config.fetch_timeout_secs),
            upload: Duration::from_secs(config.upload_timeout_secs),
        }
    }
}

/// Executes claimed attempts
pub struct PipelineRunner {
    store: JobStore,
    fetcher: Arc<dyn Fetcher>,
    storage: Arc<dyn Storage>,
    event_bus: EventBus,
    timeouts: PipelineTimeouts,
}

impl PipelineRunner {
    pub fn new(
        store: JobStore,
        fetcher: Arc<dyn Fetcher>,
        storage: Arc<dyn Storage>,
        event_bus: EventBus,
        timeouts: PipelineTimeouts,
    ) -> Self {
        Self {
            store,
            fetcher,
            storage,
            event_bus,
            timeouts,
        }
    }

    /// Run the attempt owned by `claim` to a terminal store write
    pub async fn run(&self, claim: Claim) {
        tracing::info!(
            key = %claim.key,
            attempt_id = %claim.attempt_id,
            term = %claim.resolved_term,
            "Pipeline attempt started"
        );

        let outcome = match AssertUnwindSafe(self.execute(&claim)).catch_unwind().await {
            Ok(outcome) => outcome.map_err(|e| e.to_string()),
            Err(panic) => Err(format!("pipeline panicked: {}", panic_message(panic.as_ref()))),
        };

        match outcome {
            Ok(file_url) => self.finish_ready(&claim, &file_url).await,
            Err(detail) => self.finish_error(&claim, &detail).await,
        }
    }

    /// Fetch then upload; the scratch artifact is dropped (deleted) before
    /// this returns, whatever the upload outcome
    async fn execute(&self, claim: &Claim) -> Result<String, JobError> {
        let artifact = timeout(self.timeouts.fetch, self.fetcher.fetch(&claim.resolved_term))
            .await
            .map_err(|_| {
                JobError::FetchFailed(format!("timed out after {}s", self.timeouts.fetch.as_secs()))
            })?
            .map_err(|e| JobError::FetchFailed(e.to_string()))?;

        tracing::debug!(
            key = %claim.key,
            path = %artifact.path().display(),
            "Fetched audio, uploading"
        );

        let uploaded = timeout(self.timeouts.upload, self.storage.upload(artifact.path())).await;
        drop(artifact);

        uploaded
            .map_err(|_| {
                JobError::StorageFailed(format!("timed out after {}s", self.timeouts.upload.as_secs()))
            })?
            .map_err(|e| JobError::StorageFailed(e.to_string()))
    }

    async fn finish_ready(&self, claim: &Claim, file_url: &str) {
        match self.store.mark_ready(claim, file_url).await {
            Ok(true) => {
                tracing::info!(key = %claim.key, attempt_id = %claim.attempt_id, file_url = %file_url, "Pipeline attempt ready");
                self.event_bus.emit_lossy(TuneqEvent::JobReady {
                    key: claim.key.clone(),
                    attempt_id: claim.attempt_id,
                    file_url: file_url.to_string(),
                    timestamp: Utc::now(),
                });
            }
            Ok(false) => self.stale(claim),
            Err(e) => tracing::error!(
                key = %claim.key,
                attempt_id = %claim.attempt_id,
                error = %e,
                "Failed to record ready status"
            ),
        }
    }

    async fn finish_error(&self, claim: &Claim, detail: &str) {
        tracing::warn!(key = %claim.key, attempt_id = %claim.attempt_id, error = %detail, "Pipeline attempt failed");

        match self.store.mark_error(claim, detail).await {
            Ok(true) => {
                self.event_bus.emit_lossy(TuneqEvent::JobFailed {
                    key: claim.key.clone(),
                    attempt_id: claim.attempt_id,
                    detail: detail.to_string(),
                    timestamp: Utc::now(),
                });
            }
            Ok(false) => self.stale(claim),
            Err(e) => tracing::error!(
                key = %claim.key,
                attempt_id = %claim.attempt_id,
                error = %e,
                "Failed to record error status"
            ),
        }
    }

    fn stale(&self, claim: &Claim) {
        self.event_bus.emit_lossy(TuneqEvent::StaleWriteRejected {
            key: claim.key.clone(),
            attempt_id: claim.attempt_id,
            timestamp: Utc::now(),
        });
    }
}
