// Error model shared by every module
// Domain operations return AppError; setup code and binaries use anyhow

use thiserror::Error;

use crate::entities::LoanStatus;

/// Errors surfaced by domain operations
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not signed in")]
    Unauthenticated,

    #[error("Action requires {required}")]
    Forbidden { required: &'static str },

    /// Missing rows and rows hidden by a row policy both land here
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("Invalid status transition: {from} → {to}")]
    InvalidTransition { from: LoanStatus, to: LoanStatus },

    #[error("Object too large for bucket {bucket}: {size} bytes (limit {limit})")]
    PayloadTooLarge {
        bucket: &'static str,
        size: usize,
        limit: usize,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database connection is poisoned")]
    Poisoned,
}

impl AppError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        AppError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        AppError::Validation {
            field,
            message: message.into(),
        }
    }

    /// True for failures caused by the caller rather than the service
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            AppError::Storage(_)
                | AppError::Database(_)
                | AppError::Serialization(_)
                | AppError::Poisoned
        )
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_are_classified() {
        assert!(AppError::Unauthenticated.is_client_error());
        assert!(AppError::not_found("loan application", "abc").is_client_error());
        assert!(!AppError::Poisoned.is_client_error());
        assert!(!AppError::Database(rusqlite::Error::InvalidQuery).is_client_error());
    }

    #[test]
    fn test_messages_name_the_entity() {
        let err = AppError::not_found("financial service", "svc-1");
        assert_eq!(err.to_string(), "financial service not found: svc-1");

        let err = AppError::InvalidTransition {
            from: LoanStatus::Approved,
            to: LoanStatus::Pending,
        };
        assert_eq!(err.to_string(), "Invalid status transition: approved → pending");
    }
}
