//! In-memory storage client for tests.
//!
//! Tables declare their column set up front, and operations fail with the
//! same wording Postgres uses when a statement references a column or
//! relation the table does not have. That lets the adaptive-write paths be
//! driven through real schema-drift scenarios without a live database.

use crate::client::{Filter, Row, SelectSpec, StorageClient};
use crate::error::StorageError;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

/// A fake table: declared columns, not-null constraints, stored rows.
#[derive(Debug, Clone, Default)]
pub struct FakeTable {
    columns: Vec<String>,
    not_null: Vec<String>,
    rows: Vec<Row>,
}

impl FakeTable {
    pub fn with_columns(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            not_null: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Mark columns as NOT NULL; inserts missing them fail like Postgres.
    pub fn not_null(mut self, columns: &[&str]) -> Self {
        self.not_null = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn seeded(mut self, rows: Vec<Row>) -> Self {
        self.rows = rows;
        self
    }

    fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }
}

#[derive(Default)]
struct Inner {
    tables: HashMap<String, FakeTable>,
    /// Tables forced to fail every operation with a fixed raw message.
    forced_errors: HashMap<String, String>,
    /// Per-table queues of messages; each insert consumes one and fails with
    /// it until the queue drains.
    insert_error_scripts: HashMap<String, VecDeque<String>>,
}

/// In-memory [`StorageClient`] with schema-shape error simulation.
#[derive(Default)]
pub struct FakeStorage {
    inner: Mutex<Inner>,
    insert_attempts: AtomicU32,
}

impl FakeStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(self, name: &str, table: FakeTable) -> Self {
        self.inner.lock().unwrap().tables.insert(name.to_string(), table);
        self
    }

    /// Force every operation on `table` to fail with `message`.
    pub fn force_error(self, table: &str, message: &str) -> Self {
        self.inner
            .lock()
            .unwrap()
            .forced_errors
            .insert(table.to_string(), message.to_string());
        self
    }

    /// Fail the next inserts into `table` with these messages, in order.
    /// Once the script drains, inserts behave normally again.
    pub fn fail_inserts_with(self, table: &str, messages: &[&str]) -> Self {
        self.inner
            .lock()
            .unwrap()
            .insert_error_scripts
            .insert(
                table.to_string(),
                messages.iter().map(|m| m.to_string()).collect(),
            );
        self
    }

    /// Total insert calls observed, across all tables.
    pub fn insert_attempts(&self) -> u32 {
        self.insert_attempts.load(Ordering::SeqCst)
    }

    /// Snapshot of a table's stored rows.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.inner
            .lock()
            .unwrap()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }
}

fn undefined_table(table: &str) -> StorageError {
    StorageError::new(format!(r#"relation "{}" does not exist"#, table))
}

fn undefined_column_select(column: &str) -> StorageError {
    StorageError::new(format!(r#"column "{}" does not exist"#, column))
}

fn undefined_column_insert(column: &str, table: &str) -> StorageError {
    StorageError::new(format!(
        r#"column "{}" of relation "{}" does not exist"#,
        column, table
    ))
}

fn not_null_violation(column: &str, table: &str) -> StorageError {
    StorageError::new(format!(
        r#"null value in column "{}" of relation "{}" violates not-null constraint"#,
        column, table
    ))
}

fn filter_columns(filters: &[Filter]) -> Vec<&str> {
    filters
        .iter()
        .map(|f| match f {
            Filter::Eq(c, _) | Filter::Contains(c, _) | Filter::In(c, _) | Filter::IsNull(c) => {
                c.as_str()
            }
        })
        .collect()
}

/// Interpret backslash escapes in a LIKE needle, so `\%` matches a literal
/// percent the way Postgres does.
fn unescape_like(needle: &str) -> String {
    let mut out = String::with_capacity(needle.len());
    let mut chars = needle.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn matches_filter(row: &Row, filter: &Filter) -> bool {
    match filter {
        Filter::Eq(column, value) => row.get(column).unwrap_or(&Value::Null) == value,
        Filter::Contains(column, needle) => row
            .get(column)
            .and_then(|v| v.as_str())
            .map(|s| {
                s.to_lowercase()
                    .contains(&unescape_like(needle).to_lowercase())
            })
            .unwrap_or(false),
        Filter::In(column, values) => values.contains(row.get(column).unwrap_or(&Value::Null)),
        Filter::IsNull(column) => row.get(column).map(|v| v.is_null()).unwrap_or(true),
    }
}

fn matches(row: &Row, all_of: &[Filter], any_of: &[Filter]) -> bool {
    all_of.iter().all(|f| matches_filter(row, f))
        && (any_of.is_empty() || any_of.iter().any(|f| matches_filter(row, f)))
}

#[async_trait]
impl StorageClient for FakeStorage {
    async fn select(&self, table: &str, spec: SelectSpec) -> Result<Vec<Row>, StorageError> {
        let inner = self.inner.lock().unwrap();
        if let Some(message) = inner.forced_errors.get(table) {
            return Err(StorageError::new(message.clone()));
        }
        let fake = inner.tables.get(table).ok_or_else(|| undefined_table(table))?;

        if let Some(columns) = &spec.columns {
            if let Some(missing) = columns.iter().find(|c| !fake.has_column(c)) {
                return Err(undefined_column_select(missing));
            }
        }
        for column in filter_columns(&spec.all_of)
            .into_iter()
            .chain(filter_columns(&spec.any_of))
        {
            if !fake.has_column(column) {
                return Err(undefined_column_select(column));
            }
        }

        let mut out: Vec<Row> = fake
            .rows
            .iter()
            .filter(|row| matches(row, &spec.all_of, &spec.any_of))
            .cloned()
            .collect();
        if let Some(limit) = spec.limit {
            out.truncate(limit as usize);
        }
        if let Some(columns) = &spec.columns {
            out = out
                .into_iter()
                .map(|row| {
                    columns
                        .iter()
                        .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(Value::Null)))
                        .collect()
                })
                .collect();
        }
        Ok(out)
    }

    async fn insert(&self, table: &str, row: Row) -> Result<Row, StorageError> {
        self.insert_attempts.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.inner.lock().unwrap();
        if let Some(message) = inner.forced_errors.get(table) {
            return Err(StorageError::new(message.clone()));
        }
        if let Some(script) = inner.insert_error_scripts.get_mut(table) {
            if let Some(message) = script.pop_front() {
                return Err(StorageError::new(message));
            }
        }
        let fake = inner
            .tables
            .get_mut(table)
            .ok_or_else(|| undefined_table(table))?;

        if let Some((missing, _)) = row.iter().find(|(c, _)| !fake.has_column(c)) {
            return Err(undefined_column_insert(missing, table));
        }
        for column in fake.not_null.clone() {
            let value = row.get(&column).unwrap_or(&Value::Null);
            if value.is_null() {
                return Err(not_null_violation(&column, table));
            }
        }

        let mut persisted = row;
        if fake.has_column("id") && !persisted.contains_key("id") {
            persisted.insert("id".to_string(), json!(uuid::Uuid::new_v4().to_string()));
        }
        fake.rows.push(persisted.clone());
        Ok(persisted)
    }

    async fn update(
        &self,
        table: &str,
        changes: Row,
        filters: Vec<Filter>,
    ) -> Result<Vec<Row>, StorageError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(message) = inner.forced_errors.get(table) {
            return Err(StorageError::new(message.clone()));
        }
        let fake = inner
            .tables
            .get_mut(table)
            .ok_or_else(|| undefined_table(table))?;

        if let Some((missing, _)) = changes.iter().find(|(c, _)| !fake.has_column(c)) {
            return Err(undefined_column_insert(missing, table));
        }
        for column in filter_columns(&filters) {
            if !fake.has_column(column) {
                return Err(undefined_column_select(column));
            }
        }

        let mut updated = Vec::new();
        for row in fake.rows.iter_mut() {
            if matches(row, &filters, &[]) {
                for (column, value) in &changes {
                    row.insert(column.clone(), value.clone());
                }
                updated.push(row.clone());
            }
        }
        Ok(updated)
    }

    async fn upsert(
        &self,
        table: &str,
        row: Row,
        conflict_key: &str,
    ) -> Result<Row, StorageError> {
        let key_value = row.get(conflict_key).cloned().unwrap_or(Value::Null);
        let existing = {
            let inner = self.inner.lock().unwrap();
            if let Some(message) = inner.forced_errors.get(table) {
                return Err(StorageError::new(message.clone()));
            }
            let fake = inner.tables.get(table).ok_or_else(|| undefined_table(table))?;
            fake.rows
                .iter()
                .any(|r| r.get(conflict_key).unwrap_or(&Value::Null) == &key_value)
        };

        if existing {
            let updated = self
                .update(
                    table,
                    row,
                    vec![Filter::Eq(conflict_key.to_string(), key_value)],
                )
                .await?;
            Ok(updated.into_iter().next().unwrap_or_default())
        } else {
            self.insert(table, row).await
        }
    }

    async fn delete(&self, table: &str, filters: Vec<Filter>) -> Result<u64, StorageError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(message) = inner.forced_errors.get(table) {
            return Err(StorageError::new(message.clone()));
        }
        let fake = inner
            .tables
            .get_mut(table)
            .ok_or_else(|| undefined_table(table))?;
        for column in filter_columns(&filters) {
            if !fake.has_column(column) {
                return Err(undefined_column_select(column));
            }
        }

        let before = fake.rows.len();
        fake.rows.retain(|row| !matches(row, &filters, &[]));
        Ok((before - fake.rows.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorShape;

    fn note_row(id: &str, deal: &str) -> Row {
        let mut row = Row::new();
        row.insert("id".to_string(), json!(id));
        row.insert("deal_id".to_string(), json!(deal));
        row
    }

    #[tokio::test]
    async fn insert_reports_unknown_columns_like_postgres() {
        let storage = FakeStorage::new().table("notes", FakeTable::with_columns(&["id", "body"]));
        let mut row = Row::new();
        row.insert("body".to_string(), json!("hi"));
        row.insert("zzz".to_string(), json!(1));

        let err = storage.insert("notes", row).await.unwrap_err();
        assert_eq!(
            err.shape(),
            ErrorShape::UndefinedColumn {
                column: "zzz".to_string()
            }
        );
    }

    #[tokio::test]
    async fn missing_table_reports_undefined_relation() {
        let storage = FakeStorage::new();
        let err = storage
            .select("contact_deals", SelectSpec::default())
            .await
            .unwrap_err();
        assert_eq!(
            err.shape(),
            ErrorShape::UndefinedTable {
                table: "contact_deals".to_string()
            }
        );
    }

    #[tokio::test]
    async fn select_applies_filters_and_limit() {
        let storage = FakeStorage::new().table(
            "notes",
            FakeTable::with_columns(&["id", "deal_id"]).seeded(vec![
                note_row("n1", "d1"),
                note_row("n2", "d1"),
                note_row("n3", "d2"),
            ]),
        );

        let rows = storage
            .select(
                "notes",
                SelectSpec::filtered(vec![Filter::eq("deal_id", "d1")]).limit(1),
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["deal_id"], json!("d1"));
    }

    #[tokio::test]
    async fn upsert_updates_on_conflict() {
        let storage = FakeStorage::new().table(
            "companies",
            FakeTable::with_columns(&["id", "name", "domain"]),
        );

        let mut first = Row::new();
        first.insert("name".to_string(), json!("Acme"));
        first.insert("domain".to_string(), json!("acme.io"));
        storage.upsert("companies", first, "name").await.unwrap();

        let mut second = Row::new();
        second.insert("name".to_string(), json!("Acme"));
        second.insert("domain".to_string(), json!("acme.com"));
        storage.upsert("companies", second, "name").await.unwrap();

        let rows = storage.rows("companies");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["domain"], json!("acme.com"));
    }
}
