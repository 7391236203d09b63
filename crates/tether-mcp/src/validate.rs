//! Tool argument validation.
//!
//! Arguments are checked against the tool's declared input schema before the
//! tool body runs: required fields, primitive types, enum membership, numeric
//! bounds, and uuid formats. A rejection here never reaches storage.

use crate::error::ToolError;
use crate::protocol::ToolDefinition;
use serde_json::Value;

/// Validate `arguments` against the tool's input schema.
pub fn validate_arguments(tool: &ToolDefinition, arguments: &Value) -> Result<(), ToolError> {
    let schema = &tool.input_schema;

    if !arguments.is_object() && !arguments.is_null() {
        return Err(ToolError::validation("arguments must be an object"));
    }

    if let Some(required) = schema["required"].as_array() {
        for req in required {
            if let Some(field) = req.as_str() {
                if arguments.get(field).is_none() {
                    return Err(ToolError::validation(format!(
                        "missing required field: {}",
                        field
                    )));
                }
            }
        }
    }

    if let Some(props) = schema["properties"].as_object() {
        for (field, prop_schema) in props {
            let Some(value) = arguments.get(field) else {
                continue;
            };

            if let Some(expected) = prop_schema["type"].as_str() {
                if !check_type(value, expected) {
                    return Err(ToolError::validation(format!(
                        "invalid type for '{}': expected {}, got {}",
                        field, expected, value
                    )));
                }
            }

            if let Some(allowed) = prop_schema["enum"].as_array() {
                if !allowed.contains(value) {
                    return Err(ToolError::validation(format!(
                        "invalid value for '{}': {}. Allowed: {}",
                        field,
                        value,
                        Value::Array(allowed.clone())
                    )));
                }
            }

            if let Some(min) = prop_schema["minimum"].as_f64() {
                if let Some(v) = value.as_f64() {
                    if v < min {
                        return Err(ToolError::validation(format!(
                            "value for '{}' must be at least {}",
                            field, min
                        )));
                    }
                }
            }
            if let Some(max) = prop_schema["maximum"].as_f64() {
                if let Some(v) = value.as_f64() {
                    if v > max {
                        return Err(ToolError::validation(format!(
                            "value for '{}' must be at most {}",
                            field, max
                        )));
                    }
                }
            }

            if prop_schema["format"].as_str() == Some("uuid") {
                if let Some(s) = value.as_str() {
                    if uuid::Uuid::parse_str(s).is_err() {
                        return Err(ToolError::validation(format!(
                            "value for '{}' is not a valid uuid",
                            field
                        )));
                    }
                }
            }
        }
    }

    Ok(())
}

/// Check if a value matches an expected JSON schema type.
fn check_type(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}
