//! Data models for tuneq-api
//!
//! - Job record and status state machine
//! - Claim token owned by one pipeline attempt

pub mod job;

pub use job::{Claim, JobRecord, JobStatus};
