//! Contact/company/deal association tools.
//!
//! Deployments split on how contacts relate to deals: newer schemas carry a
//! `contact_deals` junction table, older ones a single `contact_id` column on
//! the deal. Readers union both sources; writers prefer the junction and fall
//! back to the direct column when the junction relation does not exist.

use crate::error::{ToolError, classify};
use crate::executor::{ToolOutcome, Toolbox, str_arg};
use serde_json::{Value, json};
use std::collections::HashSet;
use tether_storage::{ErrorShape, Filter, Row, SelectSpec, StorageClient, StorageError};

const DEALS_TABLE: &str = "deals";
const JUNCTION_TABLE: &str = "contact_deals";

/// True when the failure means the junction relation (or its columns) simply
/// is not part of this deployment's schema.
fn junction_absent(err: &StorageError) -> bool {
    matches!(
        err.shape(),
        ErrorShape::UndefinedTable { .. } | ErrorShape::UndefinedColumn { .. }
    )
}

async fn junction_rows(
    storage: &dyn StorageClient,
    contact_id: &str,
) -> Result<Option<Vec<Row>>, ToolError> {
    let spec = SelectSpec::filtered(vec![Filter::eq("contact_id", json!(contact_id))]);
    match storage.select(JUNCTION_TABLE, spec).await {
        Ok(rows) => Ok(Some(rows)),
        Err(err) if junction_absent(&err) => Ok(None),
        Err(err) => Err(classify(JUNCTION_TABLE, err)),
    }
}

fn row_id(row: &Row) -> Option<String> {
    row.get("id").and_then(|v| v.as_str()).map(String::from)
}

impl Toolbox {
    /// Union of directly linked deals and junction-linked deals, keyed by
    /// deal id with the direct row preferred.
    pub(crate) async fn get_contact_deals(&self, args: &Value) -> Result<ToolOutcome, ToolError> {
        let contact_id = str_arg(args, "contact_id")?;

        let direct_lookup = self.storage().select(
            DEALS_TABLE,
            SelectSpec::filtered(vec![Filter::eq("contact_id", json!(contact_id))]),
        );
        let junction_lookup = junction_rows(self.storage(), contact_id);
        let (direct, junction) = tokio::join!(direct_lookup, junction_lookup);

        let direct = direct.map_err(|e| classify(DEALS_TABLE, e))?;
        let junction = junction?;

        let mut merged = direct;
        let mut seen: HashSet<String> = merged.iter().filter_map(row_id).collect();

        if let Some(rows) = junction {
            let deal_ids: Vec<Value> = rows
                .iter()
                .filter_map(|r| r.get("deal_id").cloned())
                .filter(|id| {
                    id.as_str()
                        .map(|s| !seen.contains(s))
                        .unwrap_or(false)
                })
                .collect();
            if !deal_ids.is_empty() {
                let linked = self
                    .storage()
                    .select(
                        DEALS_TABLE,
                        SelectSpec::filtered(vec![Filter::In("id".to_string(), deal_ids)]),
                    )
                    .await
                    .map_err(|e| classify(DEALS_TABLE, e))?;
                for row in linked {
                    if let Some(id) = row_id(&row) {
                        if seen.insert(id) {
                            merged.push(row);
                        }
                    }
                }
            }
        }

        let count = merged.len();
        Ok(ToolOutcome::with_result(
            format!("Found {} deal(s) for contact {}", count, contact_id),
            json!(merged),
        ))
    }

    /// The contact's association records themselves. When the junction is
    /// absent, pseudo-associations are derived from the deals' direct
    /// foreign key and flagged with their source.
    pub(crate) async fn get_contact_deal_associations(
        &self,
        args: &Value,
    ) -> Result<ToolOutcome, ToolError> {
        let contact_id = str_arg(args, "contact_id")?;

        if let Some(rows) = junction_rows(self.storage(), contact_id).await? {
            let count = rows.len();
            return Ok(ToolOutcome::with_result(
                format!("Found {} association(s) for contact {}", count, contact_id),
                json!(rows),
            ));
        }

        let deals = self
            .storage()
            .select(
                DEALS_TABLE,
                SelectSpec::filtered(vec![Filter::eq("contact_id", json!(contact_id))])
                    .columns(vec!["id".to_string()]),
            )
            .await
            .map_err(|e| classify(DEALS_TABLE, e))?;

        let derived: Vec<Value> = deals
            .iter()
            .filter_map(|r| r.get("id"))
            .map(|deal_id| {
                json!({
                    "contact_id": contact_id,
                    "deal_id": deal_id,
                    "source": "direct"
                })
            })
            .collect();

        Ok(ToolOutcome::with_result(
            format!(
                "Found {} association(s) for contact {} (derived from direct links)",
                derived.len(),
                contact_id
            ),
            json!(derived),
        ))
    }

    pub(crate) async fn link_contact_deal(&self, args: &Value) -> Result<ToolOutcome, ToolError> {
        let contact_id = str_arg(args, "contact_id")?;
        let deal_id = str_arg(args, "deal_id")?;

        let mut link = Row::new();
        link.insert("contact_id".to_string(), json!(contact_id));
        link.insert("deal_id".to_string(), json!(deal_id));
        if let Some(role) = args.get("role").and_then(|v| v.as_str()) {
            link.insert("role".to_string(), json!(role));
        }

        match self.storage().insert(JUNCTION_TABLE, link).await {
            Ok(row) => Ok(ToolOutcome::with_result(
                format!(
                    "Linked contact {} to deal {} via the junction table",
                    contact_id, deal_id
                ),
                Value::Object(row),
            )),
            Err(err) if junction_absent(&err) => {
                tracing::debug!("junction table absent, linking via the deal's contact field");
                let mut changes = Row::new();
                changes.insert("contact_id".to_string(), json!(contact_id));
                let rows = self
                    .storage()
                    .update(DEALS_TABLE, changes, vec![Filter::eq("id", json!(deal_id))])
                    .await
                    .map_err(|e| classify(DEALS_TABLE, e))?;
                let Some(row) = rows.into_iter().next() else {
                    return Err(ToolError::storage(
                        DEALS_TABLE,
                        format!("no deal found with id {}", deal_id),
                    ));
                };
                Ok(ToolOutcome::with_result(
                    format!(
                        "Linked contact {} to deal {} via the deal's contact field (no junction table)",
                        contact_id, deal_id
                    ),
                    Value::Object(row),
                ))
            }
            Err(err) => Err(classify(JUNCTION_TABLE, err)),
        }
    }

    pub(crate) async fn unlink_contact_deal(&self, args: &Value) -> Result<ToolOutcome, ToolError> {
        let contact_id = str_arg(args, "contact_id")?;
        let deal_id = str_arg(args, "deal_id")?;

        let filters = vec![
            Filter::eq("contact_id", json!(contact_id)),
            Filter::eq("deal_id", json!(deal_id)),
        ];
        match self.storage().delete(JUNCTION_TABLE, filters).await {
            Ok(removed) => Ok(ToolOutcome::new(format!(
                "Removed {} association(s) between contact {} and deal {} from the junction table",
                removed, contact_id, deal_id
            ))),
            Err(err) if junction_absent(&err) => {
                let mut changes = Row::new();
                changes.insert("contact_id".to_string(), Value::Null);
                let rows = self
                    .storage()
                    .update(
                        DEALS_TABLE,
                        changes,
                        vec![
                            Filter::eq("id", json!(deal_id)),
                            Filter::eq("contact_id", json!(contact_id)),
                        ],
                    )
                    .await
                    .map_err(|e| classify(DEALS_TABLE, e))?;
                Ok(ToolOutcome::new(format!(
                    "Cleared the contact field on {} deal(s) (no junction table)",
                    rows.len()
                )))
            }
            Err(err) => Err(classify(JUNCTION_TABLE, err)),
        }
    }

    pub(crate) async fn link_contact_company(&self, args: &Value) -> Result<ToolOutcome, ToolError> {
        let contact_id = str_arg(args, "contact_id")?;
        let company_id = str_arg(args, "company_id")?;
        self.set_direct_link("contacts", contact_id, &self.crm().owner_column, json!(company_id))
            .await?;
        Ok(ToolOutcome::new(format!(
            "Linked contact {} to company {}",
            contact_id, company_id
        )))
    }

    pub(crate) async fn unlink_contact_company(
        &self,
        args: &Value,
    ) -> Result<ToolOutcome, ToolError> {
        let contact_id = str_arg(args, "contact_id")?;
        self.set_direct_link("contacts", contact_id, &self.crm().owner_column, Value::Null)
            .await?;
        Ok(ToolOutcome::new(format!(
            "Cleared the company link on contact {}",
            contact_id
        )))
    }

    pub(crate) async fn link_company_deal(&self, args: &Value) -> Result<ToolOutcome, ToolError> {
        let deal_id = str_arg(args, "deal_id")?;
        let company_id = str_arg(args, "company_id")?;
        self.set_direct_link(DEALS_TABLE, deal_id, &self.crm().owner_column, json!(company_id))
            .await?;
        Ok(ToolOutcome::new(format!(
            "Linked deal {} to company {}",
            deal_id, company_id
        )))
    }

    pub(crate) async fn unlink_company_deal(&self, args: &Value) -> Result<ToolOutcome, ToolError> {
        let deal_id = str_arg(args, "deal_id")?;
        self.set_direct_link(DEALS_TABLE, deal_id, &self.crm().owner_column, Value::Null)
            .await?;
        Ok(ToolOutcome::new(format!(
            "Cleared the company link on deal {}",
            deal_id
        )))
    }

    async fn set_direct_link(
        &self,
        table: &str,
        id: &str,
        column: &str,
        value: Value,
    ) -> Result<(), ToolError> {
        let mut changes = Row::new();
        changes.insert(column.to_string(), value);
        let rows = self
            .storage()
            .update(table, changes, vec![Filter::eq("id", json!(id))])
            .await
            .map_err(|e| classify(table, e))?;
        if rows.is_empty() {
            return Err(ToolError::storage(
                table,
                format!("no row found with id {}", id),
            ));
        }
        Ok(())
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

    fn deal(id: &str, contact: Option<&str>) -> Row {
        let mut row = Row::new();
        row.insert("id".to_string(), json!(id));
        row.insert("name".to_string(), json!(format!("deal {}", id)));
        row.insert(
            "contact_id".to_string(),
            contact.map(|c| json!(c)).unwrap_or(Value::Null),
        );
        row
    }

    fn junction(contact: &str, deal: &str) -> Row {
        let mut row = Row::new();
        row.insert("contact_id".to_string(), json!(contact));
        row.insert("deal_id".to_string(), json!(deal));
        row
    }

    fn deals_table(rows: Vec<Row>) -> FakeTable {
        FakeTable::with_columns(&["id", "name", "contact_id", "company_id"]).seeded(rows)
    }

    #[tokio::test]
    async fn merges_direct_and_junction_matches_without_duplicates() {
        // d1 appears both directly and via the junction; d2 only directly;
        // d3 only via the junction.
        let storage = FakeStorage::new()
            .table(
                DEALS_TABLE,
                deals_table(vec![
                    deal("d1", Some("c1")),
                    deal("d2", Some("c1")),
                    deal("d3", None),
                ]),
            )
            .table(
                JUNCTION_TABLE,
                FakeTable::with_columns(&["contact_id", "deal_id", "role"])
                    .seeded(vec![junction("c1", "d1"), junction("c1", "d3")]),
            );

        let outcome = toolbox(storage)
            .get_contact_deals(&json!({ "contact_id": "c1" }))
            .await
            .unwrap();

        let deals = outcome.result.unwrap();
        let ids: Vec<&str> = deals
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids.len(), 3);
        assert!(ids.contains(&"d1") && ids.contains(&"d2") && ids.contains(&"d3"));
    }

    #[tokio::test]
    async fn tolerates_a_missing_junction_table() {
        let storage = FakeStorage::new().table(
            DEALS_TABLE,
            deals_table(vec![deal("d1", Some("c1")), deal("d2", None)]),
        );

        let outcome = toolbox(storage)
            .get_contact_deals(&json!({ "contact_id": "c1" }))
            .await
            .unwrap();

        let deals = outcome.result.unwrap();
        assert_eq!(deals.as_array().unwrap().len(), 1);
        assert_eq!(deals[0]["id"], json!("d1"));
    }

    #[tokio::test]
    async fn associations_fall_back_to_derived_rows() {
        let storage = FakeStorage::new().table(
            DEALS_TABLE,
            deals_table(vec![deal("d1", Some("c1"))]),
        );

        let outcome = toolbox(storage)
            .get_contact_deal_associations(&json!({ "contact_id": "c1" }))
            .await
            .unwrap();

        let associations = outcome.result.unwrap();
        assert_eq!(associations[0]["deal_id"], json!("d1"));
        assert_eq!(associations[0]["source"], json!("direct"));
    }

    #[tokio::test]
    async fn link_prefers_the_junction_table() {
        let storage = FakeStorage::new()
            .table(DEALS_TABLE, deals_table(vec![deal("d1", None)]))
            .table(
                JUNCTION_TABLE,
                FakeTable::with_columns(&["contact_id", "deal_id", "role"]),
            );
        let toolbox = toolbox(storage);

        let outcome = toolbox
            .link_contact_deal(&json!({ "contact_id": "c1", "deal_id": "d1", "role": "champion" }))
            .await
            .unwrap();

        assert!(outcome.summary.contains("junction table"));
        assert_eq!(outcome.result.unwrap()["role"], json!("champion"));
    }

    #[tokio::test]
    async fn link_falls_back_to_the_direct_field() {
        let storage = FakeStorage::new().table(DEALS_TABLE, deals_table(vec![deal("d1", None)]));
        let toolbox = toolbox(storage);

        let outcome = toolbox
            .link_contact_deal(&json!({ "contact_id": "c1", "deal_id": "d1" }))
            .await
            .unwrap();

        assert!(outcome.summary.contains("deal's contact field"));
        assert_eq!(outcome.result.unwrap()["contact_id"], json!("c1"));
    }

    #[tokio::test]
    async fn unlink_clears_the_direct_field_when_junction_is_absent() {
        let storage =
            FakeStorage::new().table(DEALS_TABLE, deals_table(vec![deal("d1", Some("c1"))]));
        let toolbox = toolbox(storage);

        let outcome = toolbox
            .unlink_contact_deal(&json!({ "contact_id": "c1", "deal_id": "d1" }))
            .await
            .unwrap();
        assert!(outcome.summary.contains("Cleared the contact field on 1"));

        let rows = toolbox
            .storage()
            .select(
                DEALS_TABLE,
                SelectSpec::filtered(vec![Filter::eq("id", json!("d1"))]),
            )
            .await
            .unwrap();
        assert!(rows[0]["contact_id"].is_null());
    }

    #[tokio::test]
    async fn contact_company_links_set_and_clear_the_owner_column() {
        let storage = FakeStorage::new().table(
            "contacts",
            FakeTable::with_columns(&["id", "company_id"]).seeded(vec![{
                let mut row = Row::new();
                row.insert("id".to_string(), json!("c1"));
                row.insert("company_id".to_string(), Value::Null);
                row
            }]),
        );
        let toolbox = toolbox(storage);

        toolbox
            .link_contact_company(&json!({ "contact_id": "c1", "company_id": "co2" }))
            .await
            .unwrap();
        let rows = toolbox
            .storage()
            .select(
                "contacts",
                SelectSpec::filtered(vec![Filter::eq("id", json!("c1"))]),
            )
            .await
            .unwrap();
        assert_eq!(rows[0]["company_id"], json!("co2"));

        toolbox
            .unlink_contact_company(&json!({ "contact_id": "c1" }))
            .await
            .unwrap();
        let rows = toolbox
            .storage()
            .select(
                "contacts",
                SelectSpec::filtered(vec![Filter::eq("id", json!("c1"))]),
            )
            .await
            .unwrap();
        assert!(rows[0]["company_id"].is_null());
    }

    #[tokio::test]
    async fn linking_a_missing_deal_is_an_error() {
        let storage = FakeStorage::new().table(DEALS_TABLE, deals_table(vec![]));
        let err = toolbox(storage)
            .link_contact_deal(&json!({ "contact_id": "c1", "deal_id": "ghost" }))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Storage { .. }));
    }
}
