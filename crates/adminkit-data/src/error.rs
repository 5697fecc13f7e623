//! Error types for data provider calls.

use thiserror::Error;

/// Errors reported by a data provider or by the layers in front of it.
///
/// `Clone` so that one failed request can be delivered to every caller
/// waiting on it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DataError {
    /// The backend rejected the request or could not be reached.
    #[error("backend error: {message}")]
    Backend {
        /// Message reported by the backend.
        message: String,
        /// HTTP-like status code, when the backend has one.
        status: Option<u16>,
    },

    /// The request was abandoned before it produced a result.
    #[error("request to '{resource}' was cancelled")]
    Cancelled {
        /// Resource the request targeted.
        resource: String,
    },
}

impl DataError {
    /// Backend error without a status code.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
            status: None,
        }
    }

    /// Backend error with a status code.
    pub fn with_status(message: impl Into<String>, status: u16) -> Self {
        Self::Backend {
            message: message.into(),
            status: Some(status),
        }
    }

    /// Returns a user-friendly message suitable for a notification.
    #[must_use]
    pub fn user_message(&self) -> &str {
        match self {
            Self::Backend {
                status: Some(401 | 403),
                ..
            } => "You are not allowed to access this data.",
            Self::Backend { .. } => "The server could not complete the request.",
            Self::Cancelled { .. } => "The request was cancelled.",
        }
    }

    /// Returns whether this error is potentially recoverable with a retry.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Backend { status, .. } => !matches!(status, Some(400..=499)),
            Self::Cancelled { .. } => true,
        }
    }
}

/// Result type alias for data operations.
pub type Result<T> = std::result::Result<T, DataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(DataError::backend("timeout").is_retryable());
        assert!(DataError::with_status("unavailable", 503).is_retryable());
        assert!(!DataError::with_status("not found", 404).is_retryable());
        assert!(
            DataError::Cancelled {
                resource: "posts".to_string()
            }
            .is_retryable()
        );
    }

    #[test]
    fn user_messages() {
        assert_eq!(
            DataError::with_status("denied", 403).user_message(),
            "You are not allowed to access this data."
        );
        assert_eq!(
            DataError::backend("boom").to_string(),
            "backend error: boom"
        );
    }
}
