use crate::error::DatabaseErrorConverter;
use thiserror::Error;

/// Application-wide error type that represents all possible errors in the system.
///
/// Infrastructure failures carry an `anyhow::Error` source so the original cause
/// survives into logs, while the variant itself decides the HTTP status.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found error with entity, field, and value information
    #[error("Resource not found: {entity} with {field}={value}")]
    NotFound {
        entity: String,
        field: String,
        value: String,
    },

    /// Duplicate entry error for unique constraint violations
    #[error("Duplicate entry: {entity}.{field} = '{value}' already exists")]
    Duplicate {
        entity: String,
        field: String,
        value: String,
    },

    /// Validation error with field-specific details
    #[error("Validation failed for {field}: {reason}")]
    Validation { field: String, reason: String },

    /// Bad request error with descriptive message
    #[error("Bad request: {message}")]
    BadRequest { message: String },

    /// Unauthorized access error with authentication message
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    /// Forbidden access error with authorization message
    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    /// The request collides with work already in progress
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// Credit balance does not cover the requested operation
    #[error("Insufficient credits: {message}")]
    InsufficientCredits { message: String },

    /// Workflow slot allowance exhausted
    #[error("Workflow limit reached: {used} of {allowance} workflows in use")]
    WorkflowLimitReached { used: i64, allowance: i32 },

    /// Model API or schedule service failure (non-2xx, timeout, malformed response)
    #[error("External call to {service} failed: {message}")]
    ExternalCall { service: String, message: String },

    /// A ledger transaction aborted and nothing was applied
    #[error("Credit settlement failed: {operation}")]
    Settlement {
        operation: String,
        #[source]
        source: anyhow::Error,
    },

    /// Database operation error with operation context
    #[error("Database operation failed: {operation}")]
    Database {
        operation: String,
        #[source]
        source: anyhow::Error,
    },

    /// Configuration error with key information
    #[error("Configuration error: {key}")]
    Configuration {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    /// Connection pool error
    #[error("Connection pool error")]
    ConnectionPool {
        #[source]
        source: anyhow::Error,
    },

    /// Internal error for unexpected failures
    #[error("Internal error")]
    Internal {
        #[source]
        source: anyhow::Error,
    },
}

impl AppError {
    pub fn not_found(entity: &str, field: &str, value: impl Into<String>) -> Self {
        AppError::NotFound {
            entity: entity.to_string(),
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn external(service: &str, message: impl Into<String>) -> Self {
        AppError::ExternalCall {
            service: service.to_string(),
            message: message.into(),
        }
    }

    pub fn insufficient_credits(message: impl Into<String>) -> Self {
        AppError::InsufficientCredits {
            message: message.into(),
        }
    }

    /// Text stored as the `reason` of a failed workflow value.
    ///
    /// Includes the source chain so the stored reason is useful without logs.
    pub fn failure_reason(&self) -> String {
        let mut reason = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            reason.push_str(": ");
            reason.push_str(&cause.to_string());
            source = cause.source();
        }
        reason
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Internal { source: error }
    }
}

impl From<diesel::result::Error> for AppError {
    fn from(error: diesel::result::Error) -> Self {
        DatabaseErrorConverter::convert_diesel_error(error, "database operation")
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let (field, reason) = errors
            .field_errors()
            .into_iter()
            .next()
            .map(|(field, errs)| {
                let reason = errs
                    .iter()
                    .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
                    .next()
                    .unwrap_or_else(|| "invalid value".to_string());
                (field.to_string(), reason)
            })
            .unwrap_or_else(|| ("request".to_string(), errors.to_string()));
        AppError::Validation { field, reason }
    }
}

/// Type alias for Result with AppError to simplify function signatures
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_reason_includes_source_chain() {
        let err = AppError::Settlement {
            operation: "apply ledger batch".to_string(),
            source: anyhow::anyhow!("row for user u-3 not updated"),
        };
        let reason = err.failure_reason();
        assert!(reason.starts_with("Credit settlement failed: apply ledger batch"));
        assert!(reason.ends_with("row for user u-3 not updated"));
    }

    #[test]
    fn test_workflow_limit_message() {
        let err = AppError::WorkflowLimitReached {
            used: 1,
            allowance: 1,
        };
        assert_eq!(
            err.to_string(),
            "Workflow limit reached: 1 of 1 workflows in use"
        );
    }

    #[test]
    fn test_validation_errors_conversion() {
        use validator::Validate;

        #[derive(Validate)]
        struct Probe {
            #[validate(length(min = 1, message = "name is required"))]
            name: String,
        }

        let errors = Probe {
            name: String::new(),
        }
        .validate()
        .unwrap_err();

        match AppError::from(errors) {
            AppError::Validation { field, reason } => {
                assert_eq!(field, "name");
                assert_eq!(reason, "name is required");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }
}
