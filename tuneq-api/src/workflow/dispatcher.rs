//! Request dispatcher
//!
//! Decides what a `POST /music` request gets back. A known key is answered
//! from the store. An unseen (or retryable) key is translated, claimed, and
//! handed to the executor; the request never waits for the pipeline.

use chrono::Utc;
use std::sync::Arc;
use tuneq_common::events::{EventBus, TuneqEvent};

use crate::db::JobStore;
use crate::error::JobError;
use crate::models::{Claim, JobRecord, JobStatus};
use crate::normalize::normalize;
use crate::services::Translator;
use crate::workflow::executor::JobExecutor;
use crate::workflow::pipeline::PipelineRunner;

/// What the caller is told about its query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Audio already stored
    Cached { file_url: String },
    /// Another attempt owns the key
    Processing,
    /// Last attempt failed and the retry cooldown has not elapsed
    Failed,
    /// This request claimed the key and started a new attempt
    Started,
}

pub struct Dispatcher {
    store: JobStore,
    translator: Arc<dyn Translator>,
    runner: Arc<PipelineRunner>,
    executor: JobExecutor,
    event_bus: EventBus,
}

impl Dispatcher {
    pub fn new(
        store: JobStore,
        translator: Arc<dyn Translator>,
        runner: Arc<PipelineRunner>,
        executor: JobExecutor,
        event_bus: EventBus,
    ) -> Self {
        Self {
            store,
            translator,
            runner,
            executor,
            event_bus,
        }
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub fn executor(&self) -> &JobExecutor {
        &self.executor
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Handle one incoming query
    ///
    /// Errors are limited to the request-time steps: an empty query, a
    /// translator failure, or an unreachable store. Pipeline failures are
    /// only ever visible through the stored status.
    pub async fn handle(&self, raw_query: &str) -> Result<DispatchOutcome, JobError> {
        let key = normalize(raw_query)?;

        if let Some(record) = self.store.find(&key).await? {
            if let Some(outcome) = self.answer_from_record(&record) {
                tracing::debug!(key = %key, status = %record.status, "Answered from store");
                return Ok(outcome);
            }
        }

        let resolved_term = self.translate(raw_query.trim()).await?;

        match self
            .store
            .claim_and_set_processing(&key, raw_query, &resolved_term)
            .await?
        {
            Some(claim) => {
                self.start(claim);
                Ok(DispatchOutcome::Started)
            }
            None => {
                tracing::debug!(key = %key, "Lost claim race, another attempt owns the key");
                Ok(DispatchOutcome::Processing)
            }
        }
    }

    /// `None` means the record does not block a new claim
    fn answer_from_record(&self, record: &JobRecord) -> Option<DispatchOutcome> {
        let policy = self.store.policy();
        let now = Utc::now();

        match record.status {
            JobStatus::Ready => record
                .result_url
                .clone()
                .map(|file_url| DispatchOutcome::Cached { file_url }),
            JobStatus::Processing if !record.is_stale_processing(policy.max_processing_age, now) => {
                Some(DispatchOutcome::Processing)
            }
            JobStatus::Error if !record.is_retryable_error(policy.error_retry_after, now) => {
                Some(DispatchOutcome::Failed)
            }
            _ => None,
        }
    }

    async fn translate(&self, text: &str) -> Result<String, JobError> {
        let term = self
            .translator
            .translate(text)
            .await
            .map_err(|e| JobError::TranslationFailed(e.to_string()))?;

        let term = term.trim();
        if term.is_empty() {
            return Err(JobError::TranslationFailed("empty search term".to_string()));
        }
        Ok(term.to_string())
    }

    fn start(&self, claim: Claim) {
        tracing::info!(
            key = %claim.key,
            attempt_id = %claim.attempt_id,
            term = %claim.resolved_term,
            "Claimed job, starting pipeline"
        );

        self.event_bus.emit_lossy(TuneqEvent::JobClaimed {
            key: claim.key.clone(),
            attempt_id: claim.attempt_id,
            resolved_term: claim.resolved_term.clone(),
            timestamp: Utc::now(),
        });

        let runner = Arc::clone(&self.runner);
        let label = format!("pipeline:{}", claim.key);
        self.executor.spawn(label, async move { runner.run(claim).await });
    }
}
