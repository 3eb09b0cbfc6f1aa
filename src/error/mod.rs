use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Langbase error: {0}")]
    Langbase(#[from] LangbaseError),

    #[error("Reasoning error: {0}")]
    Reasoning(#[from] ReasoningError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Langbase API errors
#[derive(Debug, Error)]
pub enum LangbaseError {
    #[error("Langbase unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Errors raised inside a reasoning engine.
///
/// None of these cross the orchestrator boundary: engines turn them into
/// trace steps and degraded [`crate::trace::ReasoningResult`]s.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ReasoningError {
    #[error("Backend error: {message}")]
    Backend { message: String },

    #[error("Call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Tool {tool_name} failed: {message}")]
    Tool { tool_name: String, message: String },

    #[error("Failed to parse {context}: {message}")]
    Parse { context: String, message: String },

    #[error("{bound} limit of {limit} reached without a definitive answer")]
    BoundExceeded { bound: String, limit: usize },

    #[error("Reasoning cancelled")]
    Cancelled,

    #[error("Validation failed: {field} - {reason}")]
    Validation { field: String, reason: String },
}

impl ReasoningError {
    /// Create a backend error from any displayable message.
    pub fn backend(message: impl Into<String>) -> Self {
        ReasoningError::Backend {
            message: message.into(),
        }
    }

    /// Backend errors and timeouts get the same retry/fallback treatment.
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            ReasoningError::Backend { .. } | ReasoningError::Timeout { .. }
        )
    }

    /// Whether the error is a cancellation signal rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ReasoningError::Cancelled)
    }
}

impl From<LangbaseError> for ReasoningError {
    fn from(err: LangbaseError) -> Self {
        match err {
            LangbaseError::Timeout { timeout_ms } => ReasoningError::Timeout { timeout_ms },
            other => ReasoningError::Backend {
                message: other.to_string(),
            },
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for Langbase operations
pub type LangbaseResult<T> = Result<T, LangbaseError>;

/// Result type alias for engine-internal operations
pub type EngineResult<T> = Result<T, ReasoningError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::Config {
            message: "missing key".to_string(),
        };
        assert_eq!(err.to_string(), "Configuration error: missing key");

        let err = AppError::Internal {
            message: "unexpected".to_string(),
        };
        assert_eq!(err.to_string(), "Internal error: unexpected");
    }

    #[test]
    fn test_langbase_error_display() {
        let err = LangbaseError::Unavailable {
            message: "server down".to_string(),
            retries: 3,
        };
        assert_eq!(err.to_string(), "Langbase unavailable: server down (retries: 3)");

        let err = LangbaseError::Api {
            status: 401,
            message: "unauthorized".to_string(),
        };
        assert_eq!(err.to_string(), "API error: 401 - unauthorized");

        let err = LangbaseError::Timeout { timeout_ms: 5000 };
        assert_eq!(err.to_string(), "Request timeout after 5000ms");
    }

    #[test]
    fn test_reasoning_error_display() {
        assert_eq!(
            ReasoningError::backend("rate limited").to_string(),
            "Backend error: rate limited"
        );
        assert_eq!(
            ReasoningError::Timeout { timeout_ms: 250 }.to_string(),
            "Call timed out after 250ms"
        );
        assert_eq!(
            ReasoningError::Tool {
                tool_name: "shell".to_string(),
                message: "exit 1".to_string(),
            }
            .to_string(),
            "Tool shell failed: exit 1"
        );
        assert_eq!(
            ReasoningError::Parse {
                context: "judge verdict".to_string(),
                message: "no JSON object".to_string(),
            }
            .to_string(),
            "Failed to parse judge verdict: no JSON object"
        );
        assert_eq!(
            ReasoningError::BoundExceeded {
                bound: "Iteration".to_string(),
                limit: 3,
            }
            .to_string(),
            "Iteration limit of 3 reached without a definitive answer"
        );
        assert_eq!(ReasoningError::Cancelled.to_string(), "Reasoning cancelled");
    }

    #[test]
    fn test_backend_failure_classification() {
        assert!(ReasoningError::backend("x").is_backend_failure());
        assert!(ReasoningError::Timeout { timeout_ms: 1 }.is_backend_failure());
        assert!(!ReasoningError::Cancelled.is_backend_failure());
        assert!(ReasoningError::Cancelled.is_cancelled());
        assert!(!ReasoningError::Parse {
            context: "c".to_string(),
            message: "m".to_string(),
        }
        .is_backend_failure());
    }

    #[test]
    fn test_langbase_timeout_maps_to_timeout() {
        let err: ReasoningError = LangbaseError::Timeout { timeout_ms: 1000 }.into();
        assert_eq!(err, ReasoningError::Timeout { timeout_ms: 1000 });
    }

    #[test]
    fn test_langbase_api_error_maps_to_backend() {
        let err: ReasoningError = LangbaseError::Api {
            status: 429,
            message: "slow down".to_string(),
        }
        .into();
        assert!(matches!(err, ReasoningError::Backend { .. }));
        assert!(err.to_string().contains("429"));
    }

    #[test]
    fn test_reasoning_error_conversion_to_app_error() {
        let app_err: AppError = ReasoningError::Cancelled.into();
        assert!(matches!(app_err, AppError::Reasoning(_)));
    }

    #[test]
    fn test_langbase_error_conversion_to_app_error() {
        let langbase_err = LangbaseError::Timeout { timeout_ms: 1000 };
        let app_err: AppError = langbase_err.into();
        assert!(matches!(app_err, AppError::Langbase(_)));
    }
}
