//! Error types for research operations

use research_llm::LLMError;
use research_utils::EnvError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Research pipeline errors
#[derive(Debug, Error)]
pub enum ResearchError {
    /// Nothing to do: blank query or no time partitions
    #[error("Empty input: {0}")]
    EmptyInput(String),

    /// An external service failed, timed out or answered garbage
    #[error("{service} unavailable: {reason}")]
    UpstreamUnavailable { service: String, reason: String },

    /// Generated text contained no `SELECT ... ;` statement
    #[error("No SQL statement found in generated text")]
    NoStatementFound,

    /// Retrieval succeeded but returned nothing
    #[error("No matches: {0}")]
    NoMatches(String),

    /// The tabular store rejected the statement
    #[error("Statement execution failed: {0}")]
    ExecutionFailed(String),

    /// Template or chart rendering failed
    #[error("Render error: {0}")]
    Render(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for research operations
pub type Result<T> = std::result::Result<T, ResearchError>;

/// Serializable classification of a [`ResearchError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    EmptyInput,
    UpstreamUnavailable,
    NoStatementFound,
    NoMatches,
    ExecutionFailed,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EmptyInput => "empty_input",
            Self::UpstreamUnavailable => "upstream_unavailable",
            Self::NoStatementFound => "no_statement_found",
            Self::NoMatches => "no_matches",
            Self::ExecutionFailed => "execution_failed",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ResearchError {
    /// Shorthand for [`ResearchError::UpstreamUnavailable`]
    pub fn upstream(service: impl Into<String>, reason: impl ToString) -> Self {
        Self::UpstreamUnavailable {
            service: service.into(),
            reason: reason.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyInput(_) => ErrorKind::EmptyInput,
            Self::UpstreamUnavailable { .. } => ErrorKind::UpstreamUnavailable,
            Self::NoStatementFound => ErrorKind::NoStatementFound,
            Self::NoMatches(_) => ErrorKind::NoMatches,
            Self::ExecutionFailed(_) => ErrorKind::ExecutionFailed,
            Self::Render(_) | Self::Config(_) | Self::Serialization(_) => ErrorKind::Internal,
        }
    }
}

impl From<LLMError> for ResearchError {
    fn from(err: LLMError) -> Self {
        match err {
            LLMError::ConfigurationError(msg) => Self::Config(msg),
            other => Self::upstream("language-model", other),
        }
    }
}

impl From<reqwest::Error> for ResearchError {
    fn from(err: reqwest::Error) -> Self {
        let service = err
            .url()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| "http".to_string());
        Self::upstream(service, err)
    }
}

impl From<EnvError> for ResearchError {
    fn from(err: EnvError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<minijinja::Error> for ResearchError {
    fn from(err: minijinja::Error) -> Self {
        Self::Render(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ResearchError::upstream("vector-index", "connection reset");
        assert_eq!(err.to_string(), "vector-index unavailable: connection reset");

        let err = ResearchError::ExecutionFailed("SQL compilation error".to_string());
        assert_eq!(
            err.to_string(),
            "Statement execution failed: SQL compilation error"
        );
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(
            ResearchError::EmptyInput("x".into()).kind(),
            ErrorKind::EmptyInput
        );
        assert_eq!(ResearchError::NoStatementFound.kind(), ErrorKind::NoStatementFound);
        assert_eq!(ResearchError::Render("x".into()).kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_llm_error_conversion() {
        let err: ResearchError = LLMError::RateLimitExceeded("quota".to_string()).into();
        match err {
            ResearchError::UpstreamUnavailable { service, reason } => {
                assert_eq!(service, "language-model");
                assert!(reason.contains("quota"));
            }
            other => panic!("Expected UpstreamUnavailable, got {other:?}"),
        }

        let err: ResearchError = LLMError::ConfigurationError("no key".to_string()).into();
        assert!(matches!(err, ResearchError::Config(_)));
    }

    #[test]
    fn test_error_kind_serialization() {
        let json = serde_json::to_string(&ErrorKind::UpstreamUnavailable).unwrap();
        assert_eq!(json, "\"upstream_unavailable\"");
        assert_eq!(ErrorKind::NoStatementFound.to_string(), "no_statement_found");
    }
}
