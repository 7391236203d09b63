//! Adaptive insert against an unknown schema.
//!
//! The backing schema's exact shape varies per deployment. Rather than probe
//! it before every write, the first insert is treated as a speculative probe:
//! when it fails with a recognizable column-shape error, the payload is
//! narrowed (drop or rename exactly one field) and the insert retried, up to
//! a fixed attempt budget. The rewrite rules form a declarative table
//! evaluated in priority order against the typed error shape.

use crate::error::{ToolError, classify};
use serde_json::json;
use tether_storage::{ErrorShape, Row, StorageClient};

/// Hard ceiling on storage attempts per invocation.
pub const MAX_INSERT_ATTEMPTS: u32 = 8;

/// How to repair a payload when the named column is reported missing.
#[derive(Debug, Clone, Copy)]
enum Remedy {
    /// Remove the field.
    Drop,
    /// Remove the field and carry its value under the replacement name.
    Rename(&'static str),
    /// Like [`Remedy::Rename`], but substitute the configured fallback when
    /// the original value is null.
    RenameOrFallback(&'static str),
}

/// Rewrite rules in priority order. Each rule is self-guarded: it fires only
/// when the named field is still present in the payload, so a column the
/// backend keeps rejecting cannot loop forever.
const REWRITE_RULES: &[(&str, Remedy)] = &[
    ("author", Remedy::RenameOrFallback("created_by")),
    ("created_by", Remedy::Drop),
    ("activity_date", Remedy::Rename("created_at")),
    ("created_at", Remedy::Drop),
    ("body", Remedy::Rename("content")),
    ("content", Remedy::Drop),
    ("type", Remedy::Drop),
];

/// Inserter that adapts its payload to the schema it discovers.
pub struct AdaptiveInserter {
    /// Column holding the owning-company reference; droppable when unknown,
    /// fatal when required.
    owner_column: String,
    /// Value carried into `created_by` when the original author is null.
    fallback_author: String,
}

impl AdaptiveInserter {
    pub fn new(owner_column: impl Into<String>, fallback_author: impl Into<String>) -> Self {
        Self {
            owner_column: owner_column.into(),
            fallback_author: fallback_author.into(),
        }
    }

    /// Insert `payload` into `table`, adapting on recoverable schema-shape
    /// errors. Succeeds with the persisted row, or fails with a classified
    /// terminal error; never retries past [`MAX_INSERT_ATTEMPTS`].
    pub async fn insert(
        &self,
        storage: &dyn StorageClient,
        table: &str,
        mut payload: Row,
    ) -> Result<Row, ToolError> {
        for attempt in 1..=MAX_INSERT_ATTEMPTS {
            match storage.insert(table, payload.clone()).await {
                Ok(row) => {
                    if attempt > 1 {
                        tracing::info!(table = %table, attempt, "insert converged after payload adjustment");
                    }
                    return Ok(row);
                }
                Err(err) => match err.shape() {
                    // A required owner relationship cannot be satisfied by
                    // narrowing the payload; checked before the generic
                    // unknown-column rule for the same field.
                    ErrorShape::NotNullViolation { column } if column == self.owner_column => {
                        return Err(ToolError::RequiredRelationshipMissing {
                            table: table.to_string(),
                            column,
                        });
                    }
                    ErrorShape::UndefinedColumn { column }
                        if self.rewrite(&mut payload, &column) =>
                    {
                        tracing::debug!(
                            table = %table,
                            column = %column,
                            attempt,
                            "column absent, retrying with adjusted payload"
                        );
                    }
                    _ => return Err(classify(table, err)),
                },
            }
        }

        Err(ToolError::InsertExhausted {
            table: table.to_string(),
            attempts: MAX_INSERT_ATTEMPTS,
        })
    }

    /// Apply the highest-priority matching rule for `column`. Returns false
    /// when no rule applies or the field is already absent, in which case
    /// the error is not recoverable here.
    fn rewrite(&self, payload: &mut Row, column: &str) -> bool {
        if column == self.owner_column {
            return payload.remove(column).is_some();
        }
        for (name, remedy) in REWRITE_RULES {
            if *name != column {
                continue;
            }
            let Some(value) = payload.remove(column) else {
                return false;
            };
            match remedy {
                Remedy::Drop => {}
                Remedy::Rename(to) => {
                    payload.insert(to.to_string(), value);
                }
                Remedy::RenameOrFallback(to) => {
                    let carried = if value.is_null() {
                        json!(self.fallback_author)
                    } else {
                        value
                    };
                    payload.insert(to.to_string(), carried);
                }
            }
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tether_storage::fake::{FakeStorage, FakeTable};

    fn inserter() -> AdaptiveInserter {
        AdaptiveInserter::new("company_id", "mcp")
    }

    fn legacy_note_payload() -> Row {
        let mut payload = Row::new();
        payload.insert("deal_id".to_string(), json!("d1"));
        payload.insert("body".to_string(), json!("hi"));
        payload.insert("author".to_string(), json!("mcp"));
        payload.insert("type".to_string(), json!("note"));
        payload.insert("activity_date".to_string(), json!("2024-01-01"));
        payload.insert("company_id".to_string(), json!("c1"));
        payload
    }

    #[tokio::test]
    async fn first_attempt_succeeds_on_a_matching_schema() {
        let storage = FakeStorage::new().table(
            "notes",
            FakeTable::with_columns(&[
                "id",
                "deal_id",
                "body",
                "author",
                "type",
                "activity_date",
                "company_id",
            ]),
        );

        let row = inserter()
            .insert(&storage, "notes", legacy_note_payload())
            .await
            .unwrap();
        assert_eq!(row["body"], json!("hi"));
        assert_eq!(storage.insert_attempts(), 1);
    }

    #[tokio::test]
    async fn converges_on_a_renamed_schema() {
        // The table lacks company_id, author, body, type and activity_date
        // but has the modern spellings content / created_by / created_at.
        let storage = FakeStorage::new().table(
            "notes",
            FakeTable::with_columns(&["id", "deal_id", "content", "created_by", "created_at"]),
        );

        let row = inserter()
            .insert(&storage, "notes", legacy_note_payload())
            .await
            .unwrap();

        assert_eq!(row["deal_id"], json!("d1"));
        assert_eq!(row["content"], json!("hi"));
        assert_eq!(row["created_by"], json!("mcp"));
        assert_eq!(row["created_at"], json!("2024-01-01"));
        assert!(!row.contains_key("body"));
        assert!(!row.contains_key("company_id"));
        // One recoverable cycle per missing column (five here), plus the
        // final successful attempt, all inside the budget of eight.
        assert!(storage.insert_attempts() <= 6);
    }

    #[tokio::test]
    async fn drops_renamed_fields_the_schema_also_lacks() {
        // Neither body nor content exists: body renames to content, content
        // then drops. The note still lands with what the schema accepts.
        let storage = FakeStorage::new().table(
            "notes",
            FakeTable::with_columns(&["id", "deal_id", "author", "type", "activity_date", "company_id"]),
        );

        let row = inserter()
            .insert(&storage, "notes", legacy_note_payload())
            .await
            .unwrap();
        assert!(!row.contains_key("body"));
        assert!(!row.contains_key("content"));
        assert_eq!(row["deal_id"], json!("d1"));
    }

    #[tokio::test]
    async fn owner_not_null_violation_is_immediately_fatal() {
        // company_id exists and is required, but the payload carries null:
        // no rewrite may fire, not even ones that would otherwise apply.
        let storage = FakeStorage::new().table(
            "notes",
            FakeTable::with_columns(&[
                "id",
                "deal_id",
                "body",
                "author",
                "type",
                "activity_date",
                "company_id",
            ])
            .not_null(&["company_id"]),
        );

        let mut payload = legacy_note_payload();
        payload.insert("company_id".to_string(), Value::Null);

        let err = inserter()
            .insert(&storage, "notes", payload)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ToolError::RequiredRelationshipMissing {
                table: "notes".to_string(),
                column: "company_id".to_string(),
            }
        );
        assert_eq!(storage.insert_attempts(), 1);
    }

    #[tokio::test]
    async fn attempt_budget_is_a_hard_ceiling() {
        // A backend that keeps reporting recoverable column errors, each
        // naming a field the payload still carries at that point, burns one
        // attempt per cycle. After eight attempts the loop gives up even
        // though every individual error was recoverable.
        let storage = FakeStorage::new()
            .table("notes", FakeTable::with_columns(&["id"]))
            .fail_inserts_with(
                "notes",
                &[
                    r#"column "author" of relation "notes" does not exist"#,
                    r#"column "created_by" of relation "notes" does not exist"#,
                    r#"column "activity_date" of relation "notes" does not exist"#,
                    r#"column "created_at" of relation "notes" does not exist"#,
                    r#"column "body" of relation "notes" does not exist"#,
                    r#"column "content" of relation "notes" does not exist"#,
                    r#"column "type" of relation "notes" does not exist"#,
                    r#"column "company_id" of relation "notes" does not exist"#,
                ],
            );

        let err = inserter()
            .insert(&storage, "notes", legacy_note_payload())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ToolError::InsertExhausted {
                table: "notes".to_string(),
                attempts: MAX_INSERT_ATTEMPTS,
            }
        );
        assert_eq!(storage.insert_attempts(), MAX_INSERT_ATTEMPTS);
    }

    #[tokio::test]
    async fn absent_field_errors_are_not_retried() {
        // The backend names a column the payload does not carry: the rule is
        // self-guarded and the failure routes to the classifier instead of
        // looping.
        let storage = FakeStorage::new()
            .table("notes", FakeTable::with_columns(&["id"]))
            .force_error(
                "notes",
                r#"column "author" of relation "notes" does not exist"#,
            );

        let mut payload = Row::new();
        payload.insert("something_else".to_string(), json!(1));

        let err = inserter().insert(&storage, "notes", payload).await.unwrap_err();
        assert!(matches!(err, ToolError::Storage { .. }));
        assert_eq!(storage.insert_attempts(), 1);
    }

    #[tokio::test]
    async fn null_author_renames_with_the_configured_fallback() {
        let storage = FakeStorage::new().table(
            "notes",
            FakeTable::with_columns(&["id", "deal_id", "body", "type", "activity_date", "company_id", "created_by"]),
        );

        let mut payload = legacy_note_payload();
        payload.insert("author".to_string(), Value::Null);

        let row = inserter().insert(&storage, "notes", payload).await.unwrap();
        assert_eq!(row["created_by"], json!("mcp"));
    }

    #[tokio::test]
    async fn unclassifiable_failures_go_through_the_classifier() {
        let storage = FakeStorage::new()
            .table("notes", FakeTable::with_columns(&["id", "body"]))
            .force_error(
                "notes",
                r#"new row violates row-level security policy for table "notes""#,
            );

        let mut payload = Row::new();
        payload.insert("body".to_string(), json!("hi"));

        let err = inserter().insert(&storage, "notes", payload).await.unwrap_err();
        assert_eq!(
            err,
            ToolError::PermissionDenied {
                table: "notes".to_string()
            }
        );
        assert_eq!(storage.insert_attempts(), 1);
    }
}
