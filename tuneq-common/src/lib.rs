//! # TuneQ Common Library
//!
//! Shared code for the TuneQ services:
//! - Common error and result types
//! - Bootstrap configuration loading and root folder resolution
//! - Job lifecycle events and the broadcast `EventBus`
//! - SSE helpers
//! - Timestamp helpers for persisted records

pub mod config;
pub mod error;
pub mod events;
pub mod sse;
pub mod time;

pub use error::{Error, Result};
