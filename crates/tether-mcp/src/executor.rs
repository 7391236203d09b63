//! Tool execution engine.
//!
//! The [`Toolbox`] owns the storage client and the deployment configuration,
//! validates every call against the tool's declared schema, and dispatches to
//! the handler for the named operation. Handlers for notes, search, and
//! associations live in their own modules; the generic record operations
//! (create/update/upsert/cancel) live here.

use crate::adaptive::AdaptiveInserter;
use crate::error::{ToolError, classify};
use crate::protocol::ToolDefinition;
use crate::sanitize::sanitize_updates;
use crate::validate::validate_arguments;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tether_core::{CrmConfig, EntityKind};
use tether_storage::{Filter, Row, StorageClient};

/// Uniform result envelope of a successful tool invocation.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    /// Human-readable summary of what happened.
    pub summary: String,
    /// Optional structured payload.
    pub result: Option<Value>,
}

impl ToolOutcome {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            result: None,
        }
    }

    pub fn with_result(summary: impl Into<String>, result: Value) -> Self {
        Self {
            summary: summary.into(),
            result: Some(result),
        }
    }
}

/// Executes catalog tools against the storage client.
pub struct Toolbox {
    storage: Arc<dyn StorageClient>,
    crm: CrmConfig,
    inserter: AdaptiveInserter,
}

/// Fields a create tool will carry into the insert payload.
fn create_allow_list(kind: EntityKind) -> &'static [&'static str] {
    match kind {
        EntityKind::Contact => &["first_name", "last_name", "email", "phone", "title", "company_id"],
        EntityKind::Company => &["name", "domain", "industry", "size"],
        EntityKind::Deal => &["name", "amount", "stage", "close_date", "company_id", "contact_id"],
        EntityKind::Lead => &[
            "first_name",
            "last_name",
            "email",
            "phone",
            "company_name",
            "source",
            "status",
        ],
    }
}

/// Fields an update tool may patch. Everything else in the caller's updates
/// mapping is discarded by the sanitizer.
fn update_allow_list(kind: EntityKind) -> &'static [&'static str] {
    match kind {
        EntityKind::Contact => &[
            "first_name",
            "last_name",
            "email",
            "phone",
            "title",
            "status",
            "company_id",
        ],
        EntityKind::Company => &["name", "domain", "industry", "size", "description"],
        EntityKind::Deal => &[
            "name",
            "amount",
            "stage",
            "status",
            "close_date",
            "company_id",
            "contact_id",
            "cancellation_reason",
        ],
        EntityKind::Lead => &[
            "first_name",
            "last_name",
            "email",
            "phone",
            "company_name",
            "source",
            "status",
            "company_id",
        ],
    }
}

impl Toolbox {
    pub fn new(storage: Arc<dyn StorageClient>, crm: CrmConfig) -> Self {
        let inserter = AdaptiveInserter::new(&crm.owner_column, &crm.default_author);
        Self {
            storage,
            crm,
            inserter,
        }
    }

    pub(crate) fn storage(&self) -> &dyn StorageClient {
        self.storage.as_ref()
    }

    pub(crate) fn crm(&self) -> &CrmConfig {
        &self.crm
    }

    pub(crate) fn inserter(&self) -> &AdaptiveInserter {
        &self.inserter
    }

    /// Validate and execute a tool call.
    pub async fn execute(
        &self,
        tool: &ToolDefinition,
        arguments: &Value,
    ) -> Result<ToolOutcome, ToolError> {
        validate_arguments(tool, arguments)?;
        self.dispatch(&tool.name, arguments).await
    }

    async fn dispatch(&self, name: &str, args: &Value) -> Result<ToolOutcome, ToolError> {
        match name {
            "create_contact" => self.create_record(EntityKind::Contact, args).await,
            "create_company" => self.create_record(EntityKind::Company, args).await,
            "create_deal" => self.create_record(EntityKind::Deal, args).await,
            "create_lead" => self.create_record(EntityKind::Lead, args).await,
            "upsert_company" => self.upsert_company(args).await,

            "update_contact" => self.update_from_args(EntityKind::Contact, args).await,
            "update_company" => self.update_from_args(EntityKind::Company, args).await,
            "update_deal" => self.update_from_args(EntityKind::Deal, args).await,
            "update_lead" => self.update_from_args(EntityKind::Lead, args).await,
            "update_entity" => {
                let kind = entity_kind_arg(args)?;
                self.update_from_args(kind, args).await
            }

            "add_contact_note" => self.add_note(EntityKind::Contact, args, "contact_id").await,
            "add_company_note" => self.add_note(EntityKind::Company, args, "company_id").await,
            "add_deal_note" => self.add_note(EntityKind::Deal, args, "deal_id").await,
            "add_lead_note" => self.add_note(EntityKind::Lead, args, "lead_id").await,
            "add_note" => {
                let kind = entity_kind_arg(args)?;
                self.add_note(kind, args, "id").await
            }

            "search_contacts" => self.search_contacts(args).await,
            "search_companies" => self.search_companies(args).await,
            "search_deals" => self.search_deals(args).await,
            "search_leads" => self.search_leads(args).await,

            "get_contact_deals" => self.get_contact_deals(args).await,
            "get_contact_deal_associations" => self.get_contact_deal_associations(args).await,
            "cancel_deal" => self.cancel_deal(args).await,

            "link_contact_deal" => self.link_contact_deal(args).await,
            "unlink_contact_deal" => self.unlink_contact_deal(args).await,
            "link_contact_company" => self.link_contact_company(args).await,
            "unlink_contact_company" => self.unlink_contact_company(args).await,
            "link_company_deal" => self.link_company_deal(args).await,
            "unlink_company_deal" => self.unlink_company_deal(args).await,

            other => Err(ToolError::validation(format!("unknown tool: {}", other))),
        }
    }

    /// Insert a new record built from the allow-listed creation fields.
    async fn create_record(
        &self,
        kind: EntityKind,
        args: &Value,
    ) -> Result<ToolOutcome, ToolError> {
        let mut payload = Row::new();
        for field in create_allow_list(kind) {
            if let Some(value) = args.get(field) {
                payload.insert(field.to_string(), value.clone());
            }
        }

        let row = self
            .storage
            .insert(kind.table(), payload)
            .await
            .map_err(|e| classify(kind.table(), e))?;

        let id = display_id(&row);
        tracing::info!(table = %kind.table(), id = %id, "record created");
        Ok(ToolOutcome::with_result(
            format!("Created {} {}", kind.label(), id),
            Value::Object(row),
        ))
    }

    async fn update_from_args(
        &self,
        kind: EntityKind,
        args: &Value,
    ) -> Result<ToolOutcome, ToolError> {
        let id = str_arg(args, "id")?;
        let updates = object_arg(args, "updates")?;
        self.update_record(kind, id, updates).await
    }

    /// Sanitize and apply an update. An updates mapping that sanitizes to
    /// nothing short-circuits without touching storage.
    pub(crate) async fn update_record(
        &self,
        kind: EntityKind,
        id: &str,
        updates: &Map<String, Value>,
    ) -> Result<ToolOutcome, ToolError> {
        let changes = sanitize_updates(updates, update_allow_list(kind));
        if changes.is_empty() {
            return Ok(ToolOutcome::new(format!(
                "No updatable fields for {} {}; nothing was changed",
                kind.label(),
                id
            )));
        }

        let field_count = changes.len();
        let rows = self
            .storage
            .update(kind.table(), changes, vec![Filter::eq("id", json!(id))])
            .await
            .map_err(|e| classify(kind.table(), e))?;

        let Some(row) = rows.into_iter().next() else {
            return Err(ToolError::storage(
                kind.table(),
                format!("no {} found with id {}", kind.label(), id),
            ));
        };

        tracing::info!(table = %kind.table(), id = %id, fields = field_count, "record updated");
        Ok(ToolOutcome::with_result(
            format!("Updated {} field(s) on {} {}", field_count, kind.label(), id),
            Value::Object(row),
        ))
    }

    async fn upsert_company(&self, args: &Value) -> Result<ToolOutcome, ToolError> {
        let name = str_arg(args, "name")?;
        let mut payload = Row::new();
        for field in create_allow_list(EntityKind::Company) {
            if let Some(value) = args.get(field) {
                payload.insert(field.to_string(), value.clone());
            }
        }

        let row = self
            .storage
            .upsert("companies", payload, "name")
            .await
            .map_err(|e| classify("companies", e))?;

        Ok(ToolOutcome::with_result(
            format!("Upserted company '{}'", name),
            Value::Object(row),
        ))
    }

    async fn cancel_deal(&self, args: &Value) -> Result<ToolOutcome, ToolError> {
        let deal_id = str_arg(args, "deal_id")?;
        let status = args
            .get("status")
            .and_then(|v| v.as_str())
            .unwrap_or("cancelled");

        let mut changes = Row::new();
        changes.insert("status".to_string(), json!(status));
        if let Some(reason) = args.get("reason").and_then(|v| v.as_str()) {
            changes.insert("cancellation_reason".to_string(), json!(reason));
        }

        let rows = self
            .storage
            .update("deals", changes, vec![Filter::eq("id", json!(deal_id))])
            .await
            .map_err(|e| classify("deals", e))?;

        let Some(row) = rows.into_iter().next() else {
            return Err(ToolError::storage(
                "deals",
                format!("no deal found with id {}", deal_id),
            ));
        };

        tracing::info!(deal_id = %deal_id, status = %status, "deal cancelled");
        Ok(ToolOutcome::with_result(
            format!("Marked deal {} as {}", deal_id, status),
            Value::Object(row),
        ))
    }
}

/// Required string argument.
pub(crate) fn str_arg<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::validation(format!("missing required field: {}", key)))
}

/// Required object argument.
pub(crate) fn object_arg<'a>(
    args: &'a Value,
    key: &str,
) -> Result<&'a Map<String, Value>, ToolError> {
    args.get(key)
        .and_then(|v| v.as_object())
        .ok_or_else(|| ToolError::validation(format!("'{}' must be an object", key)))
}

fn entity_kind_arg(args: &Value) -> Result<EntityKind, ToolError> {
    str_arg(args, "entity_type")?
        .parse::<EntityKind>()
        .map_err(ToolError::Validation)
}

fn display_id(row: &Row) -> String {
    row.get("id")
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_else(|| "(no id)".to_string())
}
