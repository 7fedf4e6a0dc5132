//! Error types for skillmark-grading

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Error type for grading, credentialing and share-code operations.
///
/// Every variant maps to a distinct status hint so the layer above can pick a
/// user-facing response without string matching.
#[derive(Debug, Error)]
pub enum GradingError {
    /// Assessment, submission, skill or other record missing
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Malformed share code
    #[error("Invalid share code format: {0:?}")]
    InvalidFormat(String),

    /// Share code past its expiry timestamp
    #[error("Share code {code} expired at {expired_at}")]
    Expired {
        code: String,
        expired_at: DateTime<Utc>,
    },

    /// Every generated candidate collided with an active code
    #[error("Could not generate a unique share code after {attempts} attempts")]
    CodeExhaustion { attempts: u32 },

    /// Authorization failure. Carries no detail on purpose.
    #[error("Access denied")]
    AccessDenied,

    /// Operation not valid for the record's current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Preview feedback cap reached for this student and assessment
    #[error("Preview limit of {limit} requests reached")]
    RateLimited { limit: u32 },

    /// Unique constraint violated in the store
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Persistence gateway failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization or deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GradingError {
    /// Shorthand for [`GradingError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// HTTP-equivalent status hint for the thin layer above this crate.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidFormat(_) => 400,
            Self::AccessDenied => 403,
            Self::NotFound { .. } => 404,
            Self::Conflict(_) => 409,
            Self::Expired { .. } => 410,
            Self::InvalidState(_) => 422,
            Self::RateLimited { .. } => 429,
            Self::CodeExhaustion { .. } => 503,
            Self::Storage(_) | Self::Serialization(_) | Self::Io(_) => 500,
        }
    }
}

/// Result type alias for grading operations
pub type Result<T> = std::result::Result<T, GradingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = GradingError::not_found("assessment", 42);
        assert_eq!(err.to_string(), "assessment not found: 42");
    }

    #[test]
    fn test_share_code_errors_are_distinguishable() {
        let format = GradingError::InvalidFormat("AB1".into());
        let missing = GradingError::not_found("share code", "ABCDE");
        let expired = GradingError::Expired {
            code: "ABCDE".into(),
            expired_at: Utc::now(),
        };
        assert_eq!(format.status_code(), 400);
        assert_eq!(missing.status_code(), 404);
        assert_eq!(expired.status_code(), 410);
    }

    #[test]
    fn test_access_denied_reveals_nothing() {
        assert_eq!(GradingError::AccessDenied.to_string(), "Access denied");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: GradingError = io_err.into();
        assert!(matches!(err, GradingError::Io(_)));
        assert_eq!(err.status_code(), 500);
    }
}
