//! Substring search tools.

use crate::catalog::{DEAL_SEARCH_LIMIT_DEFAULT, SEARCH_LIMIT_DEFAULT};
use crate::error::{ToolError, classify};
use crate::executor::{ToolOutcome, Toolbox, str_arg};
use serde_json::{Value, json};
use tether_storage::{ErrorShape, Filter, SelectSpec, StorageClient};

fn limit_arg(args: &Value, default: u64) -> u64 {
    args.get("limit").and_then(|v| v.as_u64()).unwrap_or(default)
}

/// Escape ILIKE wildcard metacharacters so a query like `50%_off` matches
/// literally instead of as a pattern.
fn escape_like(query: &str) -> String {
    query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

impl Toolbox {
    pub(crate) async fn search_contacts(&self, args: &Value) -> Result<ToolOutcome, ToolError> {
        self.search_table(args, "contacts", &["first_name", "last_name", "email"], SEARCH_LIMIT_DEFAULT)
            .await
    }

    pub(crate) async fn search_companies(&self, args: &Value) -> Result<ToolOutcome, ToolError> {
        self.search_table(args, "companies", &["name", "domain", "industry"], SEARCH_LIMIT_DEFAULT)
            .await
    }

    pub(crate) async fn search_leads(&self, args: &Value) -> Result<ToolOutcome, ToolError> {
        self.search_table(
            args,
            "leads",
            &["first_name", "last_name", "email", "company_name"],
            SEARCH_LIMIT_DEFAULT,
        )
        .await
    }

    async fn search_table(
        &self,
        args: &Value,
        table: &str,
        fields: &[&str],
        default_limit: u64,
    ) -> Result<ToolOutcome, ToolError> {
        let query = str_arg(args, "query")?;
        let limit = limit_arg(args, default_limit);

        let any_of = fields
            .iter()
            .map(|f| Filter::contains(*f, query))
            .collect();
        let rows = self
            .storage()
            .select(table, SelectSpec::matching_any(any_of).limit(limit))
            .await
            .map_err(|e| classify(table, e))?;

        let count = rows.len();
        Ok(ToolOutcome::with_result(
            format!("Found {} {} matching \"{}\"", count, table, query),
            json!(rows),
        ))
    }

    /// Deal search matches the deal name and the owning company's name. The
    /// query is wildcard-escaped, and when the company relation or the
    /// linking column is missing the search degrades to the name match alone.
    pub(crate) async fn search_deals(&self, args: &Value) -> Result<ToolOutcome, ToolError> {
        let query = str_arg(args, "query")?;
        let limit = limit_arg(args, DEAL_SEARCH_LIMIT_DEFAULT);
        let needle = escape_like(query);

        let rows = match self.deals_by_name_or_company(&needle, limit).await {
            Ok(rows) => rows,
            Err(err)
                if matches!(
                    err.shape(),
                    ErrorShape::UndefinedTable { .. } | ErrorShape::UndefinedColumn { .. }
                ) =>
            {
                tracing::debug!("company relation unavailable, falling back to name-only deal search");
                self.storage()
                    .select(
                        "deals",
                        SelectSpec::matching_any(vec![Filter::contains("name", needle.clone())])
                            .limit(limit),
                    )
                    .await
                    .map_err(|e| classify("deals", e))?
            }
            Err(err) => return Err(classify("deals", err)),
        };

        let count = rows.len();
        Ok(ToolOutcome::with_result(
            format!("Found {} deals matching \"{}\"", count, query),
            json!(rows),
        ))
    }

    async fn deals_by_name_or_company(
        &self,
        needle: &str,
        limit: u64,
    ) -> Result<Vec<tether_storage::Row>, tether_storage::StorageError> {
        let companies = self
            .storage()
            .select(
                "companies",
                SelectSpec::matching_any(vec![Filter::contains("name", needle)])
                    .columns(vec!["id".to_string()]),
            )
            .await?;
        let company_ids: Vec<Value> = companies.iter().filter_map(|r| r.get("id").cloned()).collect();

        let mut any_of = vec![Filter::contains("name", needle)];
        if !company_ids.is_empty() {
            any_of.push(Filter::In(self.crm().owner_column.clone(), company_ids));
        }
        self.storage()
            .select("deals", SelectSpec { any_of, limit: Some(limit), ..Default::default() })
            .await
    }
}
