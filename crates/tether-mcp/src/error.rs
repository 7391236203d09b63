//! Error types for the MCP crate.

use tether_storage::{ErrorShape, StorageError};
use thiserror::Error;

/// Errors that can occur in the MCP server itself (transport level).
#[derive(Debug, Error)]
pub enum McpError {
    /// Failed to start the server.
    #[error("failed to start MCP server: {0}")]
    StartupFailed(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Terminal failure of a single tool invocation.
///
/// Recoverable schema-shape conditions never appear here; they are consumed
/// inside the adaptive insert loop. Everything in this enum is surfaced to
/// the caller as a failure envelope.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolError {
    /// Input shape rejected before any storage access.
    #[error("invalid input: {0}")]
    Validation(String),

    /// A not-null constraint on the owning-company reference the caller did
    /// not supply. Retrying cannot help; the caller must pass the
    /// relationship explicitly or the constraint must be relaxed.
    #[error(
        "insert into {table} requires {column}: supply it explicitly or relax the not-null constraint"
    )]
    RequiredRelationshipMissing { table: String, column: String },

    /// Row-level security or credential denial.
    #[error(
        "permission denied for {table}: use an elevated storage credential or adjust the row-level security policy"
    )]
    PermissionDenied { table: String },

    /// Foreign key violation.
    #[error("constraint violation on {table}: {message}")]
    ConstraintViolation { table: String, message: String },

    /// Any other storage failure.
    #[error("storage error on {table}: {message}")]
    Storage { table: String, message: String },

    /// The adaptive insert budget ran out.
    #[error("insert into {table} gave up after {attempts} attempts against an incompatible schema")]
    InsertExhausted { table: String, attempts: u32 },
}

impl ToolError {
    pub fn validation(message: impl Into<String>) -> Self {
        ToolError::Validation(message.into())
    }

    pub fn storage(table: &str, message: impl Into<String>) -> Self {
        ToolError::Storage {
            table: table.to_string(),
            message: message.into(),
        }
    }
}

/// Map an unrecoverable storage failure to its user-facing cause.
///
/// This is the single place user-facing wording is derived from backend
/// error text; all write tools funnel unclassified failures through it.
pub fn classify(table: &str, err: StorageError) -> ToolError {
    match err.shape() {
        ErrorShape::PermissionDenied => {
            tracing::warn!(table = %table, "storage denied access");
            ToolError::PermissionDenied {
                table: table.to_string(),
            }
        }
        ErrorShape::ForeignKeyViolation => ToolError::ConstraintViolation {
            table: table.to_string(),
            message: err.message,
        },
        _ => ToolError::Storage {
            table: table.to_string(),
            message: err.message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rls_denial_becomes_permission_denied() {
        let err = StorageError::new(
            r#"new row violates row-level security policy for table "notes""#,
        );
        assert_eq!(
            classify("notes", err),
            ToolError::PermissionDenied {
                table: "notes".to_string()
            }
        );
    }

    #[test]
    fn fk_violation_becomes_constraint_violation() {
        let message = r#"insert or update on table "notes" violates foreign key constraint "fk""#;
        let err = StorageError::new(message);
        assert_eq!(
            classify("notes", err),
            ToolError::ConstraintViolation {
                table: "notes".to_string(),
                message: message.to_string()
            }
        );
    }

    #[test]
    fn anything_else_keeps_the_raw_message() {
        let err = StorageError::new("connection reset by peer");
        assert_eq!(
            classify("deals", err),
            ToolError::Storage {
                table: "deals".to_string(),
                message: "connection reset by peer".to_string()
            }
        );
    }
}
