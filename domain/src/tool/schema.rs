//! Canonical parameter schema.
//!
//! Every provider's native input schema is rebuilt into one shape before it
//! reaches the model layer:
//!
//! ```json
//! { "type": "object", "properties": {...}, "required": [...], "additionalProperties": false }
//! ```
//!
//! A tool whose native schema declares no `properties` at all carries no
//! parameter schema (a zero-argument tool).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Canonical parameter schema handed to the model layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    pub properties: Map<String, Value>,
    pub required: Vec<String>,
    #[serde(rename = "additionalProperties")]
    pub additional_properties: bool,
}

impl ParameterSchema {
    fn object(properties: Map<String, Value>, required: Vec<String>) -> Self {
        Self {
            schema_type: "object".to_string(),
            properties,
            required,
            additional_properties: false,
        }
    }

    /// Rebuild a self-hosted server's input schema.
    ///
    /// `required` is passed through exactly as the server declared it.
    /// Returns `None` when the schema declares no `properties`.
    pub fn from_input_schema(input_schema: &Value) -> Option<Self> {
        let properties = input_schema.get("properties")?.as_object()?.clone();
        let required = input_schema
            .get("required")
            .and_then(|r| r.as_array())
            .map(|names| {
                names
                    .iter()
                    .filter_map(|n| n.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        Some(Self::object(properties, required))
    }

    /// Rebuild a marketplace tool's parameters.
    ///
    /// Marketplace tools treat every declared property as mandatory,
    /// whatever the source declared.
    pub fn all_required(input_schema: &Value) -> Option<Self> {
        let properties = input_schema.get("properties")?.as_object()?.clone();
        let required = properties.keys().cloned().collect();
        Some(Self::object(properties, required))
    }

    pub fn is_required(&self, name: &str) -> bool {
        self.required.iter().any(|r| r == name)
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "type": self.schema_type,
            "properties": self.properties,
            "required": self.required,
            "additionalProperties": self.additional_properties,
        })
    }
}
