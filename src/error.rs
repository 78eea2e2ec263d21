use std::io;
use thiserror::Error;

use crate::analysis::AnalysisKind;

/// Custom result type alias for the application
pub type Result<T> = std::result::Result<T, ButterflyError>;

/// Errors that can occur while selecting files, calling the completion
/// service, aggregating reports or touching the key store
#[derive(Debug, Error)]
pub enum ButterflyError {
    /// The analysis root is missing or is not a directory
    #[error("Selection error: {0}")]
    Selection(String),

    /// I/O errors
    #[error("IO error: {0}")]
    IO(#[from] io::Error),

    /// Invalid glob pattern in a task allowlist
    #[error("Glob error: {0}")]
    Glob(#[from] globset::Error),

    /// HTTP request/response errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing/serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The remote completion service failed for one task
    #[error("{kind} analysis failed: {message}")]
    Service {
        /// Task the call was made for
        kind: AnalysisKind,
        /// Underlying cause
        message: String,
    },

    /// The remote completion service answered with a payload that does not
    /// satisfy the task's schema
    #[error("{kind} analysis returned an invalid payload: {message}")]
    SchemaViolation {
        /// Task the payload belongs to
        kind: AnalysisKind,
        /// Which constraint was broken
        message: String,
    },

    /// Network errors that carry no `reqwest::Error` (timeouts, 5xx, 429)
    #[error("Network error: {0}")]
    Network(String),

    /// The aggregator itself failed; no report is produced
    #[error("Aggregation error: {0}")]
    Aggregation(String),

    /// SQLite errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Connection pool errors
    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Password hashing or access token failures
    #[error("Auth error: {0}")]
    Auth(String),

    /// Rate limit exceeded errors
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// General message errors
    #[error("{0}")]
    Message(String),
}

impl ButterflyError {
    /// Creates a new error with the specified message
    pub fn new(message: &str) -> Self {
        Self::Message(message.to_string())
    }

    /// Builds a per-task service failure
    pub fn service(kind: AnalysisKind, message: impl Into<String>) -> Self {
        Self::Service {
            kind,
            message: message.into(),
        }
    }

    /// Checks if this error is transient and worth retrying
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::RateLimitExceeded(_) | Self::IO(_) => true,
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }

    /// Checks if this error ends a whole analysis run rather than one task
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Selection(_) | Self::Aggregation(_))
    }

    /// The task this error is attributed to, if any
    pub fn task(&self) -> Option<AnalysisKind> {
        match self {
            Self::Service { kind, .. } | Self::SchemaViolation { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = ButterflyError::new("test error");
        assert!(matches!(error, ButterflyError::Message(_)));

        if let ButterflyError::Message(msg) = error {
            assert_eq!(msg, "test error");
        }
    }

    #[test]
    fn test_is_transient() {
        let transient = ButterflyError::Network("connection timeout".into());
        let fatal = ButterflyError::Selection("no such directory".into());

        assert!(transient.is_transient());
        assert!(!fatal.is_transient());
        assert!(fatal.is_fatal());
    }

    #[test]
    fn test_task_attribution() {
        let err = ButterflyError::SchemaViolation {
            kind: AnalysisKind::Dependency,
            message: "missing field `directDependencies`".into(),
        };
        assert_eq!(err.task(), Some(AnalysisKind::Dependency));
        assert!(!err.is_fatal());
        assert_eq!(
            err.to_string(),
            "dependency analysis returned an invalid payload: missing field `directDependencies`"
        );
    }
}
