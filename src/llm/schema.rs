//! Tool JSON-Schema normalization and struct reflection.
//!
//! Tool schemas sent to providers are always object schemas of the shape
//! `{type: "object", properties, required}`. Schemas can be hand-written
//! (the built-in tools do this) or reflected from a parameter struct.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::error::LlmError;
use super::types::ToolSpec;

/// The normalized object-schema shape used by tool mappings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolJsonSchema {
    #[serde(rename = "type", default)]
    pub schema_type: String,
    #[serde(default)]
    pub properties: serde_json::Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

/// Validate and normalize a tool schema value.
///
/// Null/empty input normalizes to an empty object schema. A missing `type`
/// defaults to `"object"`; any other type is rejected.
pub fn decode_tool_schema(raw: &Value) -> Result<ToolJsonSchema, LlmError> {
    if raw.is_null() {
        return Ok(ToolJsonSchema {
            schema_type: "object".to_string(),
            ..ToolJsonSchema::default()
        });
    }

    let mut schema: ToolJsonSchema = serde_json::from_value(raw.clone())
        .map_err(|_| LlmError::InvalidRequest("invalid tool schema json".to_string()))?;

    if schema.schema_type.trim().is_empty() {
        schema.schema_type = "object".to_string();
    }
    if schema.schema_type != "object" {
        return Err(LlmError::InvalidRequest(
            "tool schema type must be object".to_string(),
        ));
    }
    Ok(schema)
}

/// Build a [`ToolSpec`] by reflecting a parameter struct into JSON Schema.
pub fn tool_spec_for<T: JsonSchema>(
    name: impl Into<String>,
    description: impl Into<String>,
) -> Result<ToolSpec, LlmError> {
    let root = schemars::schema_for!(T);
    let reflected = serde_json::to_value(&root.schema)
        .map_err(|e| LlmError::InvalidRequest(format!("reflect tool schema: {e}")))?;

    let normalized = ToolJsonSchema {
        schema_type: "object".to_string(),
        properties: reflected
            .get("properties")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default(),
        required: reflected
            .get("required")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
    };

    Ok(ToolSpec {
        name: name.into(),
        description: description.into(),
        schema: json!({
            "type": normalized.schema_type,
            "properties": normalized.properties,
            "required": normalized.required,
        }),
    })
}
