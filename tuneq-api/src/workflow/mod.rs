//! Job lifecycle orchestration
//!
//! - `Dispatcher`: per-request decision (cached / processing / failed / claim)
//! - `PipelineRunner`: one attempt, fetch → upload → terminal store write
//! - `JobExecutor`: runs attempts off the request path with panic isolation

pub mod dispatcher;
pub mod executor;
pub mod pipeline;

pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use executor::JobExecutor;
pub use pipeline::{PipelineRunner, PipelineTimeouts};
