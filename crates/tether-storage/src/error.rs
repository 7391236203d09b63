//! Storage error type and backend-message translation.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Error from a storage operation, carrying the backend's raw message.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct StorageError {
    /// Raw backend message, verbatim.
    pub message: String,
}

impl StorageError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Classify this error's raw message into a tagged shape.
    pub fn shape(&self) -> ErrorShape {
        ErrorShape::of(&self.message)
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        // Database-level errors keep the server's own wording; everything
        // else (pool, io, decode) falls through as-is and classifies as Other.
        match err {
            sqlx::Error::Database(db) => StorageError::new(db.message().to_string()),
            other => StorageError::new(other.to_string()),
        }
    }
}

/// The closed set of error shapes the core reacts to.
///
/// All pattern matching of backend wording lives in [`ErrorShape::of`]. The
/// patterns follow the Postgres dialect; a replacement backend means updating
/// this function and nothing else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorShape {
    /// `column "x" [of relation "t"] does not exist`
    UndefinedColumn { column: String },
    /// `relation "t" does not exist`
    UndefinedTable { table: String },
    /// `null value in column "x" ... violates not-null constraint`
    NotNullViolation { column: String },
    /// `... violates foreign key constraint ...`
    ForeignKeyViolation,
    /// Row-level security denial or plain permission failure.
    PermissionDenied,
    /// Anything else.
    Other,
}

static UNDEFINED_COLUMN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"column "([^"]+)"(?: of relation "[^"]+")? does not exist"#).unwrap()
});
static UNDEFINED_TABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"relation "([^"]+)" does not exist"#).unwrap());
static NOT_NULL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"null value in column "([^"]+)".*violates not-null constraint"#).unwrap()
});

impl ErrorShape {
    /// Translate a raw backend message into a shape.
    pub fn of(message: &str) -> ErrorShape {
        if let Some(caps) = NOT_NULL.captures(message) {
            return ErrorShape::NotNullViolation {
                column: caps[1].to_string(),
            };
        }
        if let Some(caps) = UNDEFINED_COLUMN.captures(message) {
            return ErrorShape::UndefinedColumn {
                column: caps[1].to_string(),
            };
        }
        if let Some(caps) = UNDEFINED_TABLE.captures(message) {
            return ErrorShape::UndefinedTable {
                table: caps[1].to_string(),
            };
        }
        if message.contains("violates foreign key constraint") {
            return ErrorShape::ForeignKeyViolation;
        }
        if message.contains("row-level security") || message.contains("permission denied") {
            return ErrorShape::PermissionDenied;
        }
        ErrorShape::Other
    }
}
