//! Test Helper Utilities
//!
//! Shared utilities for testing tuneq-api

#![allow(dead_code)]

pub mod doubles;
pub mod harness;

// Re-export commonly used items
pub use doubles::{FakeFetcher, FakeStorage, FakeTranslator, FetchMode};
pub use harness::{test_policy, TestService};
