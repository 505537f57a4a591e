//! Error types for tubeline.

use thiserror::Error;

/// Application result type.
pub type AppResult<T> = Result<T, AppError>;

/// Broad classification of an [`AppError`].
///
/// Transports map kinds to their own status codes; the core only ever
/// reasons about the kind, never the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or malformed input, including self-referential subscriptions.
    InvalidArgument,
    /// A referenced entity does not exist.
    NotFound,
    /// The actor does not own the entity being mutated.
    Forbidden,
    /// A uniqueness constraint was violated.
    Conflict,
    /// A mutation was attempted without an authenticated actor.
    Unauthenticated,
    /// The media store or the entity store failed.
    UpstreamFailure,
}

/// Application error type.
#[derive(Debug, Error)]
pub enum AppError {
    // === Client Errors ===
    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Authentication required")]
    Unauthenticated,

    // === Server Errors ===
    #[error("Database error: {0}")]
    Database(String),

    #[error("Media store error: {0}")]
    MediaStore(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Unauthenticated => ErrorKind::Unauthenticated,
            Self::Database(_) | Self::MediaStore(_) | Self::Config(_) | Self::Internal(_) => {
                ErrorKind::UpstreamFailure
            }
        }
    }

    /// Returns the HTTP status code a transport should use for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::InvalidArgument => 400,
            ErrorKind::Unauthenticated => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::UpstreamFailure => 500,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Conflict(_) => "CONFLICT",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::Database(_) => "DATABASE_ERROR",
            Self::MediaStore(_) => "MEDIA_STORE_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns whether this error should be logged at error level.
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::UpstreamFailure)
    }

    /// Shorthand for an [`AppError::InvalidArgument`].
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Shorthand for an [`AppError::NotFound`] naming the missing entity.
    pub fn not_found(label: &str) -> Self {
        Self::NotFound(format!("{label} not found"))
    }
}

// === From implementations ===

impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        if let Some(sea_orm::SqlErr::UniqueConstraintViolation(detail)) = err.sql_err() {
            tracing::debug!(detail = %detail, "Unique constraint violation");
            return Self::Conflict("Entity already exists".to_string());
        }

        // Backend text may contain table names and values; keep it in the logs.
        tracing::error!(error = %err, "Database operation failed");
        Self::Database("storage backend unavailable".to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!(error = %err, "Document (de)serialization failed");
        Self::Internal("malformed document".to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        tracing::warn!(error = %err, "Media store I/O failed");
        Self::MediaStore("media store unavailable".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_and_status_codes() {
        assert_eq!(AppError::invalid("x").kind(), ErrorKind::InvalidArgument);
        assert_eq!(AppError::invalid("x").status_code(), 400);
        assert_eq!(AppError::not_found("Video").status_code(), 404);
        assert_eq!(AppError::Forbidden("no".into()).status_code(), 403);
        assert_eq!(AppError::Conflict("dup".into()).status_code(), 409);
        assert_eq!(AppError::Unauthenticated.status_code(), 401);
        assert_eq!(
            AppError::MediaStore("down".into()).kind(),
            ErrorKind::UpstreamFailure
        );
    }

    #[test]
    fn test_not_found_message() {
        assert_eq!(AppError::not_found("Video").to_string(), "Video not found");
    }

    #[test]
    fn test_db_error_does_not_leak_backend_text() {
        let err: AppError =
            sea_orm::DbErr::Custom("relation \"video\" does not exist".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::UpstreamFailure);
        assert!(!err.to_string().contains("relation"));
    }

    #[test]
    fn test_server_error_classification() {
        assert!(AppError::Database("x".into()).is_server_error());
        assert!(!AppError::Unauthenticated.is_server_error());
    }
}
