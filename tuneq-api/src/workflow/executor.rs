//! Background executor for pipeline attempts
//!
//! Attempts run as tracked tokio tasks. A panic inside a task is caught and
//! logged here and never reaches the request handler that spawned it.

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tokio_util::task::TaskTracker;

/// Spawns and tracks background tasks
#[derive(Clone, Default)]
pub struct JobExecutor {
    tracker: TaskTracker,
}

impl JobExecutor {
    pub fn new() -> Self {
        Self {
            tracker: TaskTracker::new(),
        }
    }

    /// Run `task` in the background
    ///
    /// Returns immediately. `label` identifies the task in logs.
    pub fn spawn<F>(&self, label: String, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::debug!(task = %label, "Spawning background task");

        self.tracker.spawn(async move {
            if let Err(panic) = AssertUnwindSafe(task).catch_unwind().await {
                tracing::error!(
                    task = %label,
                    panic = %panic_message(panic.as_ref()),
                    "Background task panicked"
                );
            }
        });
    }

    /// Number of tasks still running
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every task spawned so far has finished
    ///
    /// The executor keeps accepting tasks afterwards.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

/// Best-effort text of a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
