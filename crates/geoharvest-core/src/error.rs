//! Error types for geoharvest-core.

use chrono::NaiveDate;
use thiserror::Error;

/// Result type alias using [`HarvestError`].
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Everything that can go wrong while harvesting one cell or planning a run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HarvestError {
    /// A probe or page request failed in a way that may succeed on retry
    /// (network error, HTTP 429/5xx).
    #[error("transient query failure: {0}")]
    TransientQuery(String),

    /// The API refused the request outright (bad key, bad parameters).
    #[error("query rejected by the search API: {0}")]
    QueryRejected(String),

    /// The API answered with a payload that could not be understood.
    #[error("malformed search response: {0}")]
    MalformedResponse(String),

    /// The shrink loop reached the minimum window width and the count is
    /// still above the cap.
    #[error("window starting {start} still matches {count} records (cap {cap}) at the minimum width")]
    WindowTooNarrow {
        start: NaiveDate,
        count: u64,
        cap: u64,
    },

    /// Invalid bounding box, segment count, or date range.
    #[error("invalid partition input: {0}")]
    PartitionInput(String),

    /// Inconsistent window policy (e.g. band floor above the cap).
    #[error("invalid window policy: {0}")]
    InvalidPolicy(String),
}

impl HarvestError {
    pub fn transient(msg: impl Into<String>) -> Self {
        HarvestError::TransientQuery(msg.into())
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        HarvestError::QueryRejected(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        HarvestError::MalformedResponse(msg.into())
    }

    pub fn partition(msg: impl Into<String>) -> Self {
        HarvestError::PartitionInput(msg.into())
    }

    /// Whether a retry of the same request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            HarvestError::TransientQuery(_) | HarvestError::MalformedResponse(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(HarvestError::transient("timeout").is_transient());
        assert!(HarvestError::malformed("bad json").is_transient());
        assert!(!HarvestError::rejected("invalid key").is_transient());
        assert!(!HarvestError::partition("n = 0").is_transient());
    }
}
