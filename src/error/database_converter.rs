use std::sync::OnceLock;

use diesel::result::{DatabaseErrorInformation, DatabaseErrorKind, Error as DieselError};
use regex::Regex;

use crate::error::AppError;

/// Utility for converting database errors to structured AppError variants.
pub struct DatabaseErrorConverter;

/// Matches PostgreSQL's `Key (field)=(value)` detail line
static KEY_VALUE: OnceLock<Option<Regex>> = OnceLock::new();

fn key_value_pattern() -> Option<&'static Regex> {
    KEY_VALUE
        .get_or_init(|| Regex::new(r"Key \(([^)]+)\)=\(([^)]*)\)").ok())
        .as_ref()
}

impl DatabaseErrorConverter {
    /// Converts a Diesel error to an appropriate AppError variant.
    ///
    /// # Arguments
    /// * `error` - The Diesel error to convert
    /// * `operation` - Description of the database operation that failed
    pub fn convert_diesel_error(error: DieselError, operation: &str) -> AppError {
        match error {
            DieselError::DatabaseError(kind, info) => {
                Self::convert_database_error(kind, info.as_ref(), operation)
            }
            DieselError::NotFound => AppError::not_found("resource", "id", "unknown"),
            other => AppError::Database {
                operation: operation.to_string(),
                source: anyhow::Error::from(other),
            },
        }
    }

    fn convert_database_error(
        kind: DatabaseErrorKind,
        info: &(dyn DatabaseErrorInformation + Send + Sync),
        operation: &str,
    ) -> AppError {
        let entity = info.table_name().unwrap_or("resource").to_string();
        let detail = info.details().unwrap_or(info.message());

        match kind {
            DatabaseErrorKind::UniqueViolation => {
                let (field, value) = Self::extract_key_value(detail)
                    .unwrap_or_else(|| (Self::constraint_or_unknown(info), String::new()));
                AppError::Duplicate {
                    entity,
                    field,
                    value,
                }
            }
            DatabaseErrorKind::NotNullViolation => AppError::Validation {
                field: info.column_name().unwrap_or("unknown").to_string(),
                reason: format!("Field is required for {}", entity),
            },
            DatabaseErrorKind::ForeignKeyViolation => {
                let (field, value) = Self::extract_key_value(detail)
                    .unwrap_or_else(|| (Self::constraint_or_unknown(info), String::new()));
                AppError::Validation {
                    field,
                    reason: format!("Invalid reference to {} with value '{}'", entity, value),
                }
            }
            DatabaseErrorKind::CheckViolation => AppError::Validation {
                field: Self::constraint_or_unknown(info),
                reason: format!("Check constraint failed for {}", entity),
            },
            _ => AppError::Database {
                operation: operation.to_string(),
                source: anyhow::Error::msg(format!("Database error: {}", info.message())),
            },
        }
    }

    fn extract_key_value(detail: &str) -> Option<(String, String)> {
        key_value_pattern()?
            .captures(detail)
            .map(|caps| (caps[1].to_string(), caps[2].to_string()))
    }

    fn constraint_or_unknown(info: &(dyn DatabaseErrorInformation + Send + Sync)) -> String {
        info.constraint_name().unwrap_or("unknown").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockDatabaseErrorInfo {
        message: String,
        details: Option<String>,
        table: Option<String>,
        constraint_name: Option<String>,
    }

    impl DatabaseErrorInformation for MockDatabaseErrorInfo {
        fn message(&self) -> &str {
            &self.message
        }

        fn details(&self) -> Option<&str> {
            self.details.as_deref()
        }

        fn hint(&self) -> Option<&str> {
            None
        }

        fn table_name(&self) -> Option<&str> {
            self.table.as_deref()
        }

        fn column_name(&self) -> Option<&str> {
            None
        }

        fn constraint_name(&self) -> Option<&str> {
            self.constraint_name.as_deref()
        }

        fn statement_position(&self) -> Option<i32> {
            None
        }
    }

    #[test]
    fn test_convert_not_found_error() {
        let result = DatabaseErrorConverter::convert_diesel_error(DieselError::NotFound, "find");
        assert!(matches!(result, AppError::NotFound { .. }));
    }

    #[test]
    fn test_convert_unique_violation_reads_detail() {
        let info = MockDatabaseErrorInfo {
            message: "duplicate key value violates unique constraint \"uq_workflow_values_version\""
                .to_string(),
            details: Some(
                "Key (workflow_definition_id, channel_id, version)=(wf-1, ch-1, 3) already exists."
                    .to_string(),
            ),
            table: Some("workflow_values".to_string()),
            constraint_name: Some("uq_workflow_values_version".to_string()),
        };
        let error = DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, Box::new(info));

        match DatabaseErrorConverter::convert_diesel_error(error, "insert value") {
            AppError::Duplicate {
                entity,
                field,
                value,
            } => {
                assert_eq!(entity, "workflow_values");
                assert_eq!(field, "workflow_definition_id, channel_id, version");
                assert_eq!(value, "wf-1, ch-1, 3");
            }
            other => panic!("Expected Duplicate error, got: {:?}", other),
        }
    }

    #[test]
    fn test_convert_check_violation_uses_constraint() {
        let info = MockDatabaseErrorInfo {
            message: "new row violates check constraint".to_string(),
            details: None,
            table: Some("user_credits".to_string()),
            constraint_name: Some("user_credits_workflows_check".to_string()),
        };
        let error = DieselError::DatabaseError(DatabaseErrorKind::CheckViolation, Box::new(info));

        match DatabaseErrorConverter::convert_diesel_error(error, "update credits") {
            AppError::Validation { field, .. } => {
                assert_eq!(field, "user_credits_workflows_check");
            }
            other => panic!("Expected Validation error, got: {:?}", other),
        }
    }

    #[test]
    fn test_convert_other_error_is_database() {
        let result = DatabaseErrorConverter::convert_diesel_error(
            DieselError::RollbackTransaction,
            "settle",
        );
        match result {
            AppError::Database { operation, .. } => assert_eq!(operation, "settle"),
            other => panic!("Expected Database error, got: {:?}", other),
        }
    }
}
