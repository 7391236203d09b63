//! Owning-company association resolution.

use crate::error::{ToolError, classify};
use serde_json::json;
use tether_storage::{ErrorShape, Filter, SelectSpec, StorageClient};

/// Look up the owner/link column value for `entity_id` in `table`.
///
/// Absence of the relationship concept is not an error: a missing column, a
/// missing row, and a null value all resolve to `None`. Any other lookup
/// failure is fatal and classified with the table name attached.
pub async fn resolve_owner(
    storage: &dyn StorageClient,
    table: &str,
    owner_column: &str,
    entity_id: &str,
) -> Result<Option<String>, ToolError> {
    let spec = SelectSpec::filtered(vec![Filter::eq("id", json!(entity_id))])
        .columns(vec![owner_column.to_string()])
        .limit(1);

    match storage.select(table, spec).await {
        Ok(rows) => Ok(rows
            .into_iter()
            .next()
            .and_then(|row| row.get(owner_column).and_then(|v| v.as_str().map(String::from)))),
        Err(err) => match err.shape() {
            ErrorShape::UndefinedColumn { column } if column == owner_column => {
                tracing::debug!(table = %table, column = %owner_column, "owner column absent, treating as unlinked");
                Ok(None)
            }
            _ => Err(classify(table, err)),
        },
    }
}
