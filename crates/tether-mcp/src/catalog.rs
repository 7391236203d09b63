//! The CRM tool catalog.
//!
//! Unlike a schema-driven generator, the catalog is fixed: the CRM exposes a
//! known set of operations over contacts, companies, deals and leads. Each
//! definition declares the input shape the validator enforces before the
//! tool body runs.

use crate::protocol::{ToolAnnotations, ToolDefinition};
use serde_json::{Value, json};

/// Maximum search result count a caller may request.
pub const SEARCH_LIMIT_CAP: u64 = 100;
/// Default result count for entity searches.
pub const SEARCH_LIMIT_DEFAULT: u64 = 10;
/// Default result count for deal searches.
pub const DEAL_SEARCH_LIMIT_DEFAULT: u64 = 50;

fn uuid_param(description: &str) -> Value {
    json!({ "type": "string", "format": "uuid", "description": description })
}

fn limit_param(default: u64) -> Value {
    json!({
        "type": "integer",
        "minimum": 1,
        "maximum": SEARCH_LIMIT_CAP,
        "default": default,
        "description": "Maximum number of results"
    })
}

fn object_schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required
    })
}

fn read_only() -> Option<ToolAnnotations> {
    Some(ToolAnnotations {
        read_only: Some(true),
    })
}

fn tool(name: &str, description: &str, input_schema: Value) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: Some(description.to_string()),
        input_schema,
        annotations: None,
    }
}

fn read_tool(name: &str, description: &str, input_schema: Value) -> ToolDefinition {
    ToolDefinition {
        annotations: read_only(),
        ..tool(name, description, input_schema)
    }
}

fn create_tool(name: &str, entity: &str, properties: Value, required: &[&str]) -> ToolDefinition {
    tool(
        name,
        &format!("Create a new {}", entity),
        object_schema(properties, required),
    )
}

fn update_tool(name: &str, entity: &str) -> ToolDefinition {
    tool(
        name,
        &format!("Update fields on an existing {}", entity),
        object_schema(
            json!({
                "id": uuid_param(&format!("Identifier of the {}", entity)),
                "updates": {
                    "type": "object",
                    "description": "Field values to change; unknown and immutable fields are ignored"
                }
            }),
            &["id", "updates"],
        ),
    )
}

fn note_tool(name: &str, entity: &str, id_field: &str) -> ToolDefinition {
    tool(
        name,
        &format!("Add a note to a {}", entity),
        object_schema(
            json!({
                id_field: uuid_param(&format!("Identifier of the {}", entity)),
                "body": { "type": "string", "description": "Note text" },
                "author": { "type": "string", "description": "Author attribution" }
            }),
            &[id_field, "body"],
        ),
    )
}

fn search_tool(name: &str, entity: &str, default_limit: u64) -> ToolDefinition {
    read_tool(
        name,
        &format!("Search {} by a case-insensitive substring", entity),
        object_schema(
            json!({
                "query": { "type": "string", "description": "Substring to match" },
                "limit": limit_param(default_limit)
            }),
            &["query"],
        ),
    )
}

/// Build the full tool catalog.
pub fn build_catalog() -> Vec<ToolDefinition> {
    vec![
        // Creation
        create_tool(
            "create_contact",
            "contact",
            json!({
                "first_name": { "type": "string" },
                "last_name": { "type": "string" },
                "email": { "type": "string" },
                "phone": { "type": "string" },
                "title": { "type": "string" },
                "company_id": uuid_param("Owning company")
            }),
            &["first_name"],
        ),
        create_tool(
            "create_company",
            "company",
            json!({
                "name": { "type": "string" },
                "domain": { "type": "string" },
                "industry": { "type": "string" },
                "size": { "type": "integer", "minimum": 1 }
            }),
            &["name"],
        ),
        create_tool(
            "create_lead",
            "lead",
            json!({
                "first_name": { "type": "string" },
                "last_name": { "type": "string" },
                "email": { "type": "string" },
                "phone": { "type": "string" },
                "company_name": { "type": "string" },
                "source": { "type": "string" },
                "status": { "type": "string" }
            }),
            &["first_name"],
        ),
        create_tool(
            "create_deal",
            "deal",
            json!({
                "name": { "type": "string" },
                "amount": { "type": "number", "minimum": 0 },
                "stage": { "type": "string" },
                "close_date": { "type": "string" },
                "company_id": uuid_param("Owning company"),
                "contact_id": uuid_param("Primary contact")
            }),
            &["name"],
        ),
        tool(
            "upsert_company",
            "Create a company, or update it if one with the same name exists",
            object_schema(
                json!({
                    "name": { "type": "string", "description": "Company name (conflict key)" },
                    "domain": { "type": "string" },
                    "industry": { "type": "string" },
                    "size": { "type": "integer", "minimum": 1 }
                }),
                &["name"],
            ),
        ),
        // Updates
        update_tool("update_contact", "contact"),
        update_tool("update_company", "company"),
        update_tool("update_lead", "lead"),
        update_tool("update_deal", "deal"),
        tool(
            "update_entity",
            "Update fields on a record of any entity type",
            object_schema(
                json!({
                    "entity_type": {
                        "type": "string",
                        "enum": ["contact", "company", "deal", "lead"]
                    },
                    "id": uuid_param("Identifier of the record"),
                    "updates": {
                        "type": "object",
                        "description": "Field values to change; unknown and immutable fields are ignored"
                    }
                }),
                &["entity_type", "id", "updates"],
            ),
        ),
        // Notes
        note_tool("add_contact_note", "contact", "contact_id"),
        note_tool("add_company_note", "company", "company_id"),
        note_tool("add_deal_note", "deal", "deal_id"),
        note_tool("add_lead_note", "lead", "lead_id"),
        tool(
            "add_note",
            "Add a note to a record of any entity type",
            object_schema(
                json!({
                    "entity_type": {
                        "type": "string",
                        "enum": ["contact", "company", "deal", "lead"]
                    },
                    "id": uuid_param("Identifier of the record"),
                    "body": { "type": "string", "description": "Note text" },
                    "author": { "type": "string", "description": "Author attribution" }
                }),
                &["entity_type", "id", "body"],
            ),
        ),
        // Search
        search_tool("search_contacts", "contacts", SEARCH_LIMIT_DEFAULT),
        search_tool("search_companies", "companies", SEARCH_LIMIT_DEFAULT),
        search_tool("search_deals", "deals", DEAL_SEARCH_LIMIT_DEFAULT),
        search_tool("search_leads", "leads", SEARCH_LIMIT_DEFAULT),
        // Deal associations
        read_tool(
            "get_contact_deals",
            "List all deals associated with a contact, directly or via the junction table",
            object_schema(
                json!({ "contact_id": uuid_param("Identifier of the contact") }),
                &["contact_id"],
            ),
        ),
        read_tool(
            "get_contact_deal_associations",
            "List a contact's deal association records",
            object_schema(
                json!({ "contact_id": uuid_param("Identifier of the contact") }),
                &["contact_id"],
            ),
        ),
        tool(
            "cancel_deal",
            "Mark a deal as cancelled",
            object_schema(
                json!({
                    "deal_id": uuid_param("Identifier of the deal"),
                    "status": {
                        "type": "string",
                        "enum": ["cancelled", "lost", "closed_lost"],
                        "default": "cancelled"
                    },
                    "reason": { "type": "string", "description": "Cancellation reason" }
                }),
                &["deal_id"],
            ),
        ),
        // Linking
        tool(
            "link_contact_deal",
            "Associate a contact with a deal",
            object_schema(
                json!({
                    "contact_id": uuid_param("Identifier of the contact"),
                    "deal_id": uuid_param("Identifier of the deal"),
                    "role": { "type": "string", "description": "Contact's role on the deal" }
                }),
                &["contact_id", "deal_id"],
            ),
        ),
        tool(
            "unlink_contact_deal",
            "Remove the association between a contact and a deal",
            object_schema(
                json!({
                    "contact_id": uuid_param("Identifier of the contact"),
                    "deal_id": uuid_param("Identifier of the deal")
                }),
                &["contact_id", "deal_id"],
            ),
        ),
        tool(
            "link_contact_company",
            "Attach a contact to a company",
            object_schema(
                json!({
                    "contact_id": uuid_param("Identifier of the contact"),
                    "company_id": uuid_param("Identifier of the company")
                }),
                &["contact_id", "company_id"],
            ),
        ),
        tool(
            "unlink_contact_company",
            "Detach a contact from its company",
            object_schema(
                json!({ "contact_id": uuid_param("Identifier of the contact") }),
                &["contact_id"],
            ),
        ),
        tool(
            "link_company_deal",
            "Attach a deal to a company",
            object_schema(
                json!({
                    "deal_id": uuid_param("Identifier of the deal"),
                    "company_id": uuid_param("Identifier of the company")
                }),
                &["deal_id", "company_id"],
            ),
        ),
        tool(
            "unlink_company_deal",
            "Detach a deal from its company",
            object_schema(
                json!({ "deal_id": uuid_param("Identifier of the deal") }),
                &["deal_id"],
            ),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn catalog_names_are_unique() {
        let catalog = build_catalog();
        let names: HashSet<&str> = catalog.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names.len(), catalog.len());
    }

    #[test]
    fn every_tool_declares_an_object_schema() {
        for tool in build_catalog() {
            assert_eq!(
                tool.input_schema["type"], "object",
                "tool {} lacks an object schema",
                tool.name
            );
        }
    }

    #[test]
    fn search_limits_are_capped() {
        for tool in build_catalog() {
            if let Some(limit) = tool.input_schema["properties"].get("limit") {
                assert_eq!(limit["maximum"].as_u64(), Some(SEARCH_LIMIT_CAP));
                assert_eq!(limit["minimum"].as_u64(), Some(1));
            }
        }
    }
}
