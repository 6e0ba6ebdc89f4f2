//! Service error types.
//!
//! [`AppError`] is the central error type. Storage failures coming out of
//! `sqlx` are classified on conversion so callers can tell a duplicate
//! username or an empty lookup apart from a broken connection. Each variant
//! carries a numeric code that the HTTP layer embeds in the `err` field of
//! its response body.

use serde::Serialize;
use utoipa::ToSchema;

/// Error payload embedded in JSON responses.
///
/// ```json
/// { "code": 2001, "message": "record not found" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
}

/// Server-side error enum.
///
/// # Error Code Ranges
///
/// | Range     | Category                 |
/// |-----------|--------------------------|
/// | 1000–1999 | Configuration / startup  |
/// | 2000–2999 | Record state             |
/// | 3000–3999 | Storage / internal       |
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Configuration file missing, unreadable or malformed.
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem failure (log files, config discovery).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A uniqueness constraint rejected the write.
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    /// The lookup matched no row.
    #[error("record not found")]
    RecordNotFound,

    /// Transport or storage failure.
    #[error("database error: {0}")]
    Database(sqlx::Error),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::Config(_) => 1001,
            Self::Io(_) => 1002,
            Self::RecordNotFound => 2001,
            Self::UniqueViolation(_) => 2002,
            Self::Database(_) => 3001,
            Self::Internal(_) => 3000,
        }
    }

    /// Returns `true` for the distinguished "no matching row" outcome.
    #[must_use]
    pub const fn is_record_not_found(&self) -> bool {
        matches!(self, Self::RecordNotFound)
    }

    /// Builds the JSON error payload for this error.
    #[must_use]
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            code: self.error_code(),
            message: self.to_string(),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::RecordNotFound,
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Self::UniqueViolation(db_err.message().to_string())
            }
            other => Self::Database(other),
        }
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_not_found_maps_to_record_not_found() {
        let err = AppError::from(sqlx::Error::RowNotFound);
        assert!(err.is_record_not_found());
        assert_eq!(err.error_code(), 2001);
    }

    #[test]
    fn other_sqlx_errors_are_storage_errors() {
        let err = AppError::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, AppError::Database(_)));
        assert!(!err.is_record_not_found());
    }

    #[test]
    fn body_carries_code_and_message() {
        let body = AppError::UniqueViolation("users.username".to_string()).to_body();
        assert_eq!(body.code, 2002);
        assert!(body.message.contains("users.username"));
    }
}
