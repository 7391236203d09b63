//! Postgres adapter for the storage client.
//!
//! SQL is assembled from validated identifiers and escaped literals; every
//! write uses `RETURNING *` so callers observe the persisted row. Failures
//! surface verbatim as [`StorageError`] — translation into shapes happens at
//! the error layer, never here.

use crate::client::{Filter, Row, SelectSpec, StorageClient};
use crate::error::StorageError;
use async_trait::async_trait;
use bigdecimal::{BigDecimal, ToPrimitive};
use serde_json::{Value, json};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Column, PgPool, Row as SqlxRow};

/// sqlx-backed Postgres storage.
#[derive(Clone)]
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `url` with a bounded pool.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    fn where_clause(all_of: &[Filter], any_of: &[Filter]) -> Result<String, StorageError> {
        let mut conjuncts = Vec::new();
        for filter in all_of {
            conjuncts.push(filter_sql(filter)?);
        }
        if !any_of.is_empty() {
            let disjuncts = any_of
                .iter()
                .map(filter_sql)
                .collect::<Result<Vec<_>, _>>()?;
            conjuncts.push(format!("({})", disjuncts.join(" OR ")));
        }
        if conjuncts.is_empty() {
            return Ok(String::new());
        }
        Ok(format!(" WHERE {}", conjuncts.join(" AND ")))
    }
}

#[async_trait]
impl StorageClient for PgStorage {
    async fn select(&self, table: &str, spec: SelectSpec) -> Result<Vec<Row>, StorageError> {
        check_ident(table)?;
        let column_list = match &spec.columns {
            Some(columns) => {
                for column in columns {
                    check_ident(column)?;
                }
                columns.join(", ")
            }
            None => "*".to_string(),
        };
        let mut query = format!(
            "SELECT {} FROM {}{}",
            column_list,
            table,
            Self::where_clause(&spec.all_of, &spec.any_of)?
        );
        if let Some(limit) = spec.limit {
            query.push_str(&format!(" LIMIT {}", limit));
        }

        tracing::debug!(table = %table, "executing select");
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn insert(&self, table: &str, row: Row) -> Result<Row, StorageError> {
        check_ident(table)?;
        let mut columns = Vec::with_capacity(row.len());
        let mut values = Vec::with_capacity(row.len());
        for (column, value) in &row {
            check_ident(column)?;
            columns.push(column.clone());
            values.push(sql_literal(value));
        }
        let query = format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
            table,
            columns.join(", "),
            values.join(", ")
        );

        tracing::debug!(table = %table, "executing insert");
        let row = sqlx::query(&query).fetch_one(&self.pool).await?;
        Ok(row_to_json(&row))
    }

    async fn update(
        &self,
        table: &str,
        changes: Row,
        filters: Vec<Filter>,
    ) -> Result<Vec<Row>, StorageError> {
        check_ident(table)?;
        let mut set_clauses = Vec::with_capacity(changes.len());
        for (column, value) in &changes {
            check_ident(column)?;
            set_clauses.push(format!("{} = {}", column, sql_literal(value)));
        }
        if set_clauses.is_empty() {
            return Err(StorageError::new("update requires at least one change"));
        }
        let query = format!(
            "UPDATE {} SET {}{} RETURNING *",
            table,
            set_clauses.join(", "),
            Self::where_clause(&filters, &[])?
        );

        tracing::debug!(table = %table, "executing update");
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn upsert(
        &self,
        table: &str,
        row: Row,
        conflict_key: &str,
    ) -> Result<Row, StorageError> {
        check_ident(table)?;
        check_ident(conflict_key)?;
        let mut columns = Vec::with_capacity(row.len());
        let mut values = Vec::with_capacity(row.len());
        let mut updates = Vec::new();
        for (column, value) in &row {
            check_ident(column)?;
            columns.push(column.clone());
            values.push(sql_literal(value));
            if column != conflict_key {
                updates.push(format!("{} = EXCLUDED.{}", column, column));
            }
        }
        let conflict_action = if updates.is_empty() {
            format!("DO UPDATE SET {} = EXCLUDED.{}", conflict_key, conflict_key)
        } else {
            format!("DO UPDATE SET {}", updates.join(", "))
        };
        let query = format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) {} RETURNING *",
            table,
            columns.join(", "),
            values.join(", "),
            conflict_key,
            conflict_action
        );

        tracing::debug!(table = %table, conflict_key = %conflict_key, "executing upsert");
        let row = sqlx::query(&query).fetch_one(&self.pool).await?;
        Ok(row_to_json(&row))
    }

    async fn delete(&self, table: &str, filters: Vec<Filter>) -> Result<u64, StorageError> {
        check_ident(table)?;
        let clause = Self::where_clause(&filters, &[])?;
        if clause.is_empty() {
            return Err(StorageError::new("delete requires at least one filter"));
        }
        let query = format!("DELETE FROM {}{}", table, clause);

        tracing::debug!(table = %table, "executing delete");
        let result = sqlx::query(&query).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

/// Identifiers come from the catalog, not callers, but reject anything that
/// is not plain snake_case before it reaches a query string.
fn check_ident(ident: &str) -> Result<(), StorageError> {
    if !ident.is_empty() && ident.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(StorageError::new(format!("invalid identifier: {}", ident)))
    }
}

fn quote_str(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Render a JSON value as a SQL literal. Complex values go through their JSON
/// text form, which Postgres coerces into json/jsonb columns.
fn sql_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote_str(s),
        other => quote_str(&other.to_string()),
    }
}

fn filter_sql(filter: &Filter) -> Result<String, StorageError> {
    match filter {
        Filter::Eq(column, value) => {
            check_ident(column)?;
            if value.is_null() {
                Ok(format!("{} IS NULL", column))
            } else {
                Ok(format!("{} = {}", column, sql_literal(value)))
            }
        }
        Filter::Contains(column, needle) => {
            check_ident(column)?;
            Ok(format!("{} ILIKE {}", column, quote_str(&format!("%{}%", needle))))
        }
        Filter::In(column, values) => {
            check_ident(column)?;
            if values.is_empty() {
                // IN () is invalid SQL; an empty list matches nothing.
                return Ok("FALSE".to_string());
            }
            let literals: Vec<String> = values.iter().map(sql_literal).collect();
            Ok(format!("{} IN ({})", column, literals.join(", ")))
        }
        Filter::IsNull(column) => {
            check_ident(column)?;
            Ok(format!("{} IS NULL", column))
        }
    }
}

/// Convert a sqlx row to a JSON map, trying the common column types in turn.
fn row_to_json(row: &PgRow) -> Row {
    let mut obj = Row::new();
    for col in row.columns() {
        let name = col.name();
        let value: Value = if let Ok(v) = row.try_get::<i64, _>(name) {
            json!(v)
        } else if let Ok(v) = row.try_get::<i32, _>(name) {
            json!(v)
        } else if let Ok(v) = row.try_get::<f64, _>(name) {
            json!(v)
        } else if let Ok(v) = row.try_get::<bool, _>(name) {
            json!(v)
        } else if let Ok(v) = row.try_get::<String, _>(name) {
            json!(v)
        } else if let Ok(v) = row.try_get::<uuid::Uuid, _>(name) {
            json!(v.to_string())
        } else if let Ok(v) = row.try_get::<chrono::DateTime<chrono::Utc>, _>(name) {
            json!(v.to_rfc3339())
        } else if let Ok(v) = row.try_get::<chrono::NaiveDate, _>(name) {
            json!(v.to_string())
        } else if let Ok(v) = row.try_get::<BigDecimal, _>(name) {
            v.to_f64().map(|f| json!(f)).unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Value, _>(name) {
            v
        } else if let Ok(v) = row.try_get::<Option<String>, _>(name) {
            v.map(|s| json!(s)).unwrap_or(Value::Null)
        } else {
            Value::Null
        };
        obj.insert(name.to_string(), value);
    }
    obj
}
