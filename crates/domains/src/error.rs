//! # AppError
//!
//! Centralized error handling for the Refuge content core.
//! Every failure a backend can report is normalized into one of these
//! variants before it reaches the vote, tree or mutation logic.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The primary error type for all content-core operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Resource not found (e.g., Post, Comment, Profile)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// Caller is not signed in or lacks read access
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Caller is signed in but may not perform the action (e.g., deleting someone else's post)
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Validation failure (e.g., empty comment, non-image attachment)
    #[error("validation error: {0}")]
    ValidationError(String),

    /// The same mutation is still outstanding for this target
    #[error("already in flight: {0}")]
    AlreadyInFlight(String),

    /// Transport failure, timeout or an unusable response
    #[error("request failed: {0}")]
    RequestFailed(String),
}

/// Machine-readable error kind, as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    NotFound,
    Unauthorized,
    Forbidden,
    ValidationError,
    AlreadyInFlight,
    RequestFailed,
}

impl AppError {
    pub fn not_found(what: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound(what.into(), id.to_string())
    }

    pub fn unauthorized<T: ToString>(msg: T) -> Self {
        Self::Unauthorized(msg.to_string())
    }

    pub fn forbidden<T: ToString>(msg: T) -> Self {
        Self::Forbidden(msg.to_string())
    }

    pub fn validation<T: ToString>(msg: T) -> Self {
        Self::ValidationError(msg.to_string())
    }

    pub fn request_failed<T: ToString>(msg: T) -> Self {
        Self::RequestFailed(msg.to_string())
    }

    /// Rebuilds an error from a kind and a message, as received from a backend.
    pub fn from_kind(kind: ErrorKind, msg: impl Into<String>) -> Self {
        let msg = msg.into();
        match kind {
            ErrorKind::NotFound => Self::NotFound("resource".into(), msg),
            ErrorKind::Unauthorized => Self::Unauthorized(msg),
            ErrorKind::Forbidden => Self::Forbidden(msg),
            ErrorKind::ValidationError => Self::ValidationError(msg),
            ErrorKind::AlreadyInFlight => Self::AlreadyInFlight(msg),
            ErrorKind::RequestFailed => Self::RequestFailed(msg),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(..) => ErrorKind::NotFound,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::ValidationError(_) => ErrorKind::ValidationError,
            Self::AlreadyInFlight(_) => ErrorKind::AlreadyInFlight,
            Self::RequestFailed(_) => ErrorKind::RequestFailed,
        }
    }

    /// Human-readable line shown to the user, distinct per kind.
    pub fn notice(&self) -> String {
        match self {
            Self::NotFound(what, _) => format!("That {what} no longer exists"),
            Self::Unauthorized(_) => "Please sign in to continue".to_string(),
            Self::Forbidden(msg) => format!("You are not allowed to do that: {msg}"),
            Self::ValidationError(msg) => format!("Please check your input: {msg}"),
            Self::AlreadyInFlight(_) => "Still working on your last request".to_string(),
            Self::RequestFailed(msg) => format!("Something went wrong, try again: {msg}"),
        }
    }
}

/// A specialized Result type for content-core logic.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_from_kind() {
        let kinds = [
            ErrorKind::NotFound,
            ErrorKind::Unauthorized,
            ErrorKind::Forbidden,
            ErrorKind::ValidationError,
            ErrorKind::AlreadyInFlight,
            ErrorKind::RequestFailed,
        ];
        for kind in kinds {
            assert_eq!(AppError::from_kind(kind, "x").kind(), kind);
        }
    }

    #[test]
    fn notices_are_distinct_per_kind() {
        let errors = [
            AppError::not_found("post", "1"),
            AppError::unauthorized("x"),
            AppError::forbidden("x"),
            AppError::validation("x"),
            AppError::AlreadyInFlight("x".into()),
            AppError::request_failed("x"),
        ];
        let notices: std::collections::HashSet<_> = errors.iter().map(AppError::notice).collect();
        assert_eq!(notices.len(), errors.len());
    }
}
