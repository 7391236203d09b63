//! The generic storage client trait.

use crate::error::StorageError;
use async_trait::async_trait;
use serde_json::Value;

/// A row as seen by the core: field name to JSON value.
pub type Row = serde_json::Map<String, Value>;

/// A single filter condition.
#[derive(Debug, Clone)]
pub enum Filter {
    /// `column = value`
    Eq(String, Value),
    /// Case-insensitive substring match on a text column. The needle is a
    /// plain substring; the adapter adds the surrounding wildcards.
    Contains(String, String),
    /// `column IN (values)`. An empty list matches nothing.
    In(String, Vec<Value>),
    /// `column IS NULL`
    IsNull(String),
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq(column.into(), value.into())
    }

    pub fn contains(column: impl Into<String>, needle: impl Into<String>) -> Self {
        Filter::Contains(column.into(), needle.into())
    }
}

/// Shape of a select: optional projection, conjunctive filters, an optional
/// disjunctive group, and a row limit.
#[derive(Debug, Clone, Default)]
pub struct SelectSpec {
    /// Columns to return; `None` means all.
    pub columns: Option<Vec<String>>,
    /// Conditions joined with AND.
    pub all_of: Vec<Filter>,
    /// Conditions joined with OR, AND-ed with `all_of` when non-empty.
    pub any_of: Vec<Filter>,
    pub limit: Option<u64>,
}

impl SelectSpec {
    pub fn filtered(all_of: Vec<Filter>) -> Self {
        Self {
            all_of,
            ..Default::default()
        }
    }

    pub fn matching_any(any_of: Vec<Filter>) -> Self {
        Self {
            any_of,
            ..Default::default()
        }
    }

    pub fn columns(mut self, columns: Vec<String>) -> Self {
        self.columns = Some(columns);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Generic relational operations against named tables.
///
/// Every call yields rows or a [`StorageError`] carrying the backend's raw
/// message. Implementations must be stateless/reentrant: the client is shared
/// across concurrent in-flight tool invocations.
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Select rows matching the spec.
    async fn select(&self, table: &str, spec: SelectSpec) -> Result<Vec<Row>, StorageError>;

    /// Insert one row and return it as persisted.
    async fn insert(&self, table: &str, row: Row) -> Result<Row, StorageError>;

    /// Update all rows matching `filters` and return them as persisted.
    async fn update(
        &self,
        table: &str,
        changes: Row,
        filters: Vec<Filter>,
    ) -> Result<Vec<Row>, StorageError>;

    /// Insert or update keyed on `conflict_key`, returning the row.
    async fn upsert(&self, table: &str, row: Row, conflict_key: &str)
    -> Result<Row, StorageError>;

    /// Delete rows matching `filters`, returning the count removed.
    async fn delete(&self, table: &str, filters: Vec<Filter>) -> Result<u64, StorageError>;
}
