//! Error handling for the holdings tracker
//!
//! Defines custom error types and establishes a unified Result type
//! using anyhow for context chaining and error propagation.

use thiserror::Error;

/// Core error types for tracker operations
#[derive(Error, Debug)]
pub enum TrackerError {
    /// A durable store failed to deserialize. Always fatal for the cycle:
    /// silently starting empty would reclassify every position as NEW and
    /// fabricate sale records.
    #[error("corrupt store ({store}): {detail}")]
    CorruptStore { store: &'static str, detail: String },

    /// A single ticker's price or filing data was unavailable. Recovered
    /// locally; the cycle continues with degraded data for that ticker.
    #[error("fetch failure: {0}")]
    FetchFailure(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("io error")]
    Io(#[from] std::io::Error),
}

impl TrackerError {
    pub fn corrupt(store: &'static str, detail: impl Into<String>) -> Self {
        TrackerError::CorruptStore {
            store,
            detail: detail.into(),
        }
    }
}

/// Result type alias for tracker operations
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_formatting_is_readable() {
        let err = TrackerError::corrupt("sale_ledger", "bad decimal 'x'");
        assert_eq!(err.to_string(), "corrupt store (sale_ledger): bad decimal 'x'");
    }

    #[test]
    fn test_anyhow_context_chains_errors() {
        use anyhow::Context;
        let result: Result<()> =
            Err(anyhow::anyhow!("original error")).context("failed to load snapshot store");
        match result {
            Err(e) => {
                let msg = e.to_string();
                assert!(msg.contains("failed to load snapshot store"));
                let debug_msg = format!("{:?}", e);
                assert!(debug_msg.contains("original error") || msg.contains("original error"));
            }
            Ok(_) => panic!("expected error"),
        }
    }

    #[test]
    fn test_fetch_failure_is_not_corrupt_store() {
        let err = TrackerError::FetchFailure("AAPL quote timed out".to_string());
        assert!(err.to_string().starts_with("fetch failure"));
        assert!(!matches!(err, TrackerError::CorruptStore { .. }));
    }
}
