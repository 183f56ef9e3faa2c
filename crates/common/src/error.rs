//! Error types for tally.

use serde_json::json;
use thiserror::Error;

/// Application result type.
pub type AppResult<T> = Result<T, AppError>;

/// Application error type.
#[derive(Debug, Error)]
pub enum AppError {
    // === Client Errors ===
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    // === Server Errors ===
    #[error("Database error: {0}")]
    Database(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Redis error: {0}")]
    Redis(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse error taxonomy shared by every caller-facing operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed request: bad choice counts, bad dates.
    Validation,
    /// Unknown poll or option.
    NotFound,
    /// Request conflicts with current state.
    Conflict,
    /// Storage, timeout or configuration failure.
    Infrastructure,
}

impl AppError {
    /// Returns the taxonomy bucket for this error.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound(_) => ErrorCategory::NotFound,
            Self::Validation(_) => ErrorCategory::Validation,
            Self::Conflict(_) => ErrorCategory::Conflict,
            Self::Database(_)
            | Self::Timeout(_)
            | Self::Redis(_)
            | Self::Config(_)
            | Self::Internal(_) => ErrorCategory::Infrastructure,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Conflict(_) => "CONFLICT",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::Redis(_) => "REDIS_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns whether this error should be logged at error level.
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        matches!(self.category(), ErrorCategory::Infrastructure)
    }

    /// Renders the error as the JSON body the HTTP layer hands back to clients.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let code = self.error_code();

        if self.is_server_error() {
            tracing::error!(error = %self, code = code, "Server error occurred");
        } else {
            tracing::debug!(error = %self, code = code, "Client error occurred");
        }

        json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        })
    }
}

// === From implementations ===

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(
            AppError::Validation("bad".into()).category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            AppError::NotFound("poll".into()).category(),
            ErrorCategory::NotFound
        );
        assert_eq!(
            AppError::Conflict("voted".into()).category(),
            ErrorCategory::Conflict
        );
        assert_eq!(
            AppError::Timeout("store".into()).category(),
            ErrorCategory::Infrastructure
        );
    }

    #[test]
    fn test_server_error_flag() {
        assert!(AppError::Database("down".into()).is_server_error());
        assert!(!AppError::Conflict("voted".into()).is_server_error());
    }

    #[test]
    fn test_json_body() {
        let body = AppError::Conflict("already voted".into()).to_json();
        assert_eq!(body["error"]["code"], "CONFLICT");
        assert_eq!(body["error"]["message"], "Conflict: already voted");
    }
}
