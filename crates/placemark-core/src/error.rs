//! Error types for placemark.

use thiserror::Error;

/// Result type alias using placemark's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for placemark operations.
///
/// Every payload is owned text so one outcome can be handed to several
/// waiters of a de-duplicated fetch.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Update targets a review id that does not exist
    #[error("review-not-found: {0}")]
    ReviewNotFound(String),

    /// Author mismatch on update/delete
    #[error("review-forbidden: {0}")]
    ReviewForbidden(String),

    /// Comment text is empty after trimming
    #[error("engagement-comment-empty")]
    CommentEmpty,

    /// Comment text exceeds the maximum length
    #[error("engagement-comment-too-long: max {max} characters")]
    CommentTooLong { max: usize },

    /// Caller does not own the comment it tried to delete
    #[error("engagement-comment-delete-forbidden")]
    CommentDeleteForbidden,

    /// A bounded step did not finish in time (display: `<op>-timeout`)
    #[error("{0}-timeout")]
    Timeout(String),

    /// Blob storage operation failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Document store operation failed
    #[error("Database error: {0}")]
    Database(String),

    /// Photo compression failed
    #[error("Media error: {0}")]
    Media(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable code for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Error::ReviewNotFound(_) => "review-not-found",
            Error::ReviewForbidden(_) => "review-forbidden",
            Error::CommentEmpty => "engagement-comment-empty",
            Error::CommentTooLong { .. } => "engagement-comment-too-long",
            Error::CommentDeleteForbidden => "engagement-comment-delete-forbidden",
            Error::Timeout(_) => "timeout",
            Error::Storage(_) => "storage",
            Error::Database(_) => "database",
            Error::Media(_) => "media",
            Error::NotFound(_) => "not-found",
            Error::Serialization(_) => "serialization",
            Error::Config(_) => "config",
            Error::InvalidInput(_) => "invalid-input",
            Error::Request(_) => "request",
            Error::Io(_) => "io",
            Error::Internal(_) => "internal",
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout("request".to_string())
        } else {
            Error::Request(e.to_string())
        }
    }
}
