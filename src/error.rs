//! Error types for critiq
//!
//! Centralized error handling using thiserror. Configuration problems are the
//! only errors raised while building a pipeline; problems found while
//! evaluating a candidate are folded into the evaluation result instead.

use std::time::Duration;
use thiserror::Error;

/// All error types that can occur in critiq
#[derive(Debug, Error)]
pub enum CritiqError {
    /// Scoring or gate configuration is invalid (fatal at construction time)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Timeout or collaborator unavailability
    #[error("Transient failure: {0}")]
    Transient(#[from] TransientError),

    /// Generator collaborator reported a failure
    #[error("Generator error: {0}")]
    Generator(String),

    /// Result sink could not persist a record
    #[error("Sink error: {0}")]
    Sink(String),

    /// A spawned lineage task panicked or was aborted
    #[error("Task error: {0}")]
    Task(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl CritiqError {
    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

/// Failure of a call that suspends on an external collaborator.
///
/// These are retried against the controller's retry budget and never
/// treated as a verdict on the candidate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransientError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl TransientError {
    /// Short reason recorded on a result once retries are exhausted.
    pub fn reason(&self) -> &'static str {
        match self {
            TransientError::Timeout(_) => "timeout",
            TransientError::Unavailable(_) => "unavailable",
        }
    }
}

/// Result type alias for critiq operations
pub type Result<T> = std::result::Result<T, CritiqError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error() {
        let err = CritiqError::config("rubric weights sum to 0.9");
        assert_eq!(err.to_string(), "Configuration error: rubric weights sum to 0.9");
    }

    #[test]
    fn test_transient_timeout_display() {
        let err = TransientError::Timeout(Duration::from_millis(250));
        assert_eq!(err.to_string(), "timed out after 250ms");
        assert_eq!(err.reason(), "timeout");
    }

    #[test]
    fn test_transient_conversion() {
        let err: CritiqError = TransientError::Unavailable("provider down".to_string()).into();
        assert!(matches!(err, CritiqError::Transient(_)));
        assert_eq!(err.to_string(), "Transient failure: unavailable: provider down");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: CritiqError = io_err.into();
        assert!(matches!(err, CritiqError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: CritiqError = json_err.into();
        assert!(matches!(err, CritiqError::Json(_)));
    }

    #[test]
    fn test_yaml_error_conversion() {
        let yaml_err = serde_yaml::from_str::<Vec<u32>>("{ not: a list").unwrap_err();
        let err: CritiqError = yaml_err.into();
        assert!(matches!(err, CritiqError::Yaml(_)));
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<i32> {
            Ok(42)
        }

        fn returns_err() -> Result<i32> {
            Err(CritiqError::Sink("disk full".to_string()))
        }

        assert!(returns_ok().is_ok());
        assert!(returns_err().is_err());
    }
}
