//! Note creation tools.
//!
//! Notes are the write path most exposed to schema drift: deployments
//! disagree on column spellings (`body` vs `content`, `author` vs
//! `created_by`, `activity_date` vs `created_at`) and on whether notes carry
//! an owning-company reference at all. The payload built here is therefore
//! handed to the adaptive inserter rather than written directly.

use crate::error::ToolError;
use crate::executor::{ToolOutcome, Toolbox, str_arg};
use crate::resolve::resolve_owner;
use chrono::Utc;
use serde_json::{Value, json};
use tether_core::EntityKind;
use tether_storage::Row;

const NOTES_TABLE: &str = "notes";

impl Toolbox {
    /// Add a note to a record of `kind`, identified by `args[id_field]`.
    pub(crate) async fn add_note(
        &self,
        kind: EntityKind,
        args: &Value,
        id_field: &str,
    ) -> Result<ToolOutcome, ToolError> {
        let entity_id = str_arg(args, id_field)?;
        let body = str_arg(args, "body")?;
        let author = args
            .get("author")
            .and_then(|v| v.as_str())
            .unwrap_or(&self.crm().default_author);

        // Company notes have no further owner; everything else tries to
        // inherit the owning company from its parent record.
        let owner = if kind == EntityKind::Company {
            None
        } else {
            resolve_owner(
                self.storage(),
                kind.table(),
                &self.crm().owner_column,
                entity_id,
            )
            .await?
        };

        let mut payload = Row::new();
        payload.insert(kind.note_link_column().to_string(), json!(entity_id));
        payload.insert("body".to_string(), json!(body));
        payload.insert("author".to_string(), json!(author));
        payload.insert("type".to_string(), json!("note"));
        payload.insert("activity_date".to_string(), json!(Utc::now().to_rfc3339()));
        if let Some(owner_id) = owner {
            payload.insert(self.crm().owner_column.clone(), json!(owner_id));
        }

        let row = self.inserter().insert(self.storage(), NOTES_TABLE, payload).await?;

        tracing::info!(kind = %kind, entity_id = %entity_id, "note added");
        Ok(ToolOutcome::with_result(
            format!("Added note to {} {}", kind.label(), entity_id),
            Value::Object(row),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tether_core::CrmConfig;
    use tether_storage::fake::{FakeStorage, FakeTable};

    fn toolbox(storage: FakeStorage) -> Toolbox {
        Toolbox::new(Arc::new(storage), CrmConfig::default())
    }

    fn deal_row(id: &str, company: &str) -> Row {
        let mut row = Row::new();
        row.insert("id".to_string(), json!(id));
        row.insert("company_id".to_string(), json!(company));
        row
    }

    fn modern_notes_table() -> FakeTable {
        // Note columns use the modern spellings; the legacy payload must
        // adapt on the way in.
        FakeTable::with_columns(&[
            "id",
            "deal_id",
            "contact_id",
            "lead_id",
            "company_id",
            "content",
            "created_by",
            "created_at",
        ])
    }

    fn legacy_notes_table() -> FakeTable {
        FakeTable::with_columns(&[
            "id",
            "deal_id",
            "contact_id",
            "lead_id",
            "company_id",
            "body",
            "author",
            "type",
            "activity_date",
        ])
    }

    #[tokio::test]
    async fn deal_note_inherits_the_owning_company() {
        let storage = FakeStorage::new()
            .table(
                "deals",
                FakeTable::with_columns(&["id", "company_id"]).seeded(vec![deal_row("d1", "co7")]),
            )
            .table("notes", legacy_notes_table());

        let outcome = toolbox(storage)
            .add_note(EntityKind::Deal, &json!({ "deal_id": "d1", "body": "call went well" }), "deal_id")
            .await
            .unwrap();

        let row = outcome.result.unwrap();
        assert_eq!(row["deal_id"], json!("d1"));
        assert_eq!(row["company_id"], json!("co7"));
        assert_eq!(row["body"], json!("call went well"));
        assert_eq!(row["author"], json!("mcp"));
        assert_eq!(row["type"], json!("note"));
    }

    #[tokio::test]
    async fn note_payload_adapts_to_a_modern_schema() {
        let storage = FakeStorage::new()
            .table(
                "deals",
                FakeTable::with_columns(&["id", "company_id"]).seeded(vec![deal_row("d1", "co7")]),
            )
            .table("notes", modern_notes_table());

        let outcome = toolbox(storage)
            .add_note(
                EntityKind::Deal,
                &json!({ "deal_id": "d1", "body": "hi", "author": "sales-bot" }),
                "deal_id",
            )
            .await
            .unwrap();

        let row = outcome.result.unwrap();
        assert_eq!(row["content"], json!("hi"));
        assert_eq!(row["created_by"], json!("sales-bot"));
        assert!(row.as_object().unwrap().contains_key("created_at"));
        assert!(!row.as_object().unwrap().contains_key("body"));
        assert!(!row.as_object().unwrap().contains_key("type"));
    }

    #[tokio::test]
    async fn company_notes_skip_owner_resolution() {
        // No companies table at all: if resolution ran, the select would
        // fail with an undefined relation.
        let storage = FakeStorage::new().table("notes", legacy_notes_table());

        let outcome = toolbox(storage)
            .add_note(
                EntityKind::Company,
                &json!({ "company_id": "co1", "body": "renewal soon" }),
                "company_id",
            )
            .await
            .unwrap();

        let row = outcome.result.unwrap();
        assert_eq!(row["company_id"], json!("co1"));
    }

    #[tokio::test]
    async fn contact_note_on_unlinked_contact_has_no_owner() {
        let storage = FakeStorage::new()
            .table(
                "contacts",
                FakeTable::with_columns(&["id", "email"]).seeded(vec![{
                    let mut row = Row::new();
                    row.insert("id".to_string(), json!("c1"));
                    row
                }]),
            )
            .table("notes", legacy_notes_table());

        let outcome = toolbox(storage)
            .add_note(
                EntityKind::Contact,
                &json!({ "contact_id": "c1", "body": "left voicemail" }),
                "contact_id",
            )
            .await
            .unwrap();

        let row = outcome.result.unwrap();
        assert_eq!(row["contact_id"], json!("c1"));
        assert!(row.get("company_id").map(|v| v.is_null()).unwrap_or(true));
    }

    #[tokio::test]
    async fn required_owner_constraint_surfaces_as_relationship_error() {
        let storage = FakeStorage::new()
            .table(
                "contacts",
                FakeTable::with_columns(&["id", "email"]).seeded(vec![{
                    let mut row = Row::new();
                    row.insert("id".to_string(), json!("c1"));
                    row
                }]),
            )
            .table(
                "notes",
                FakeTable::with_columns(&[
                    "id",
                    "contact_id",
                    "company_id",
                    "body",
                    "author",
                    "type",
                    "activity_date",
                ])
                .not_null(&["company_id"]),
            );

        let err = toolbox(storage)
            .add_note(
                EntityKind::Contact,
                &json!({ "contact_id": "c1", "body": "hi" }),
                "contact_id",
            )
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ToolError::RequiredRelationshipMissing {
                table: "notes".to_string(),
                column: "company_id".to_string(),
            }
        );
    }
}
