//! Query normalization
//!
//! The dedup key is the raw query trimmed and lowercased. Normalizing a key
//! again yields the same key.

use serde::Serialize;
use std::fmt;

use crate::error::JobError;

/// Normalized query key
///
/// Only constructed through [`normalize`], so every `QueryKey` is non-empty
/// and already in normal form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct QueryKey(String);

impl QueryKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalize a raw query into its dedup key
///
/// Fails with `InvalidQuery` for empty or whitespace-only input.
pub fn normalize(raw: &str) -> Result<QueryKey, JobError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(JobError::InvalidQuery);
    }
    Ok(QueryKey(trimmed.to_lowercase()))
}
