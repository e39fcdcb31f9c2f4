//! Service wiring for integration tests
//!
//! Builds the real store, runner, executor and dispatcher over a file-backed
//! SQLite database in a temp directory, with test doubles for the
//! collaborators.

use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tuneq_api::db::{init_database_pool, JobStore, StorePolicy};
use tuneq_api::workflow::{Dispatcher, JobExecutor, PipelineRunner, PipelineTimeouts};
use tuneq_api::{build_router, AppState};
use tuneq_common::events::EventBus;

use super::doubles::{FakeFetcher, FakeStorage, FakeTranslator};

/// Policy with no error cooldown, so a failed key is retryable at once
pub fn test_policy() -> StorePolicy {
    StorePolicy {
        max_processing_age: Duration::from_secs(1800),
        error_retry_after: Duration::ZERO,
        max_lock_wait: Duration::from_secs(5),
    }
}

pub struct TestService {
    pub temp_dir: TempDir,
    pub store: JobStore,
    pub dispatcher: Arc<Dispatcher>,
    pub translator: Arc<FakeTranslator>,
    pub fetcher: Arc<FakeFetcher>,
    pub storage: Arc<FakeStorage>,
    pub event_bus: EventBus,
}

impl TestService {
    pub async fn new() -> Self {
        Self::with(test_policy(), PipelineTimeouts::default()).await
    }

    pub async fn with(policy: StorePolicy, timeouts: PipelineTimeouts) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let scratch_dir = temp_dir.path().join("tmp");
        std::fs::create_dir_all(&scratch_dir).unwrap();

        let pool = init_database_pool(&temp_dir.path().join("tuneq.db"))
            .await
            .unwrap();
        let store = JobStore::new(pool, policy);

        let translator = Arc::new(FakeTranslator::default());
        let fetcher = Arc::new(FakeFetcher::new(scratch_dir));
        let storage = Arc::new(FakeStorage::default());
        let event_bus = EventBus::new(100);

        let runner = Arc::new(PipelineRunner::new(
            store.clone(),
            fetcher.clone(),
            storage.clone(),
            event_bus.clone(),
            timeouts,
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            translator.clone(),
            runner,
            JobExecutor::new(),
            event_bus.clone(),
        ));

        Self {
            temp_dir,
            store,
            dispatcher,
            translator,
            fetcher,
            storage,
            event_bus,
        }
    }

    pub fn router(&self) -> Router {
        build_router(AppState::new(Arc::clone(&self.dispatcher)))
    }

    /// Wait for every background attempt started so far
    pub async fn settle(&self) {
        tokio::time::timeout(Duration::from_secs(10), self.dispatcher.executor().wait_idle())
            .await
            .expect("background attempts did not finish");
    }
}
