//! Tool domain entities

use super::schema::ParameterSchema;
use super::signature::CallSignature;
use crate::core::error::DomainError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A tool exactly as a provider described it, before canonicalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredTool {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Native input schema (root type already checked to be `object`)
    #[serde(default)]
    pub input_schema: Value,
}

impl DiscoveredTool {
    pub fn new(name: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Canonical, provider-agnostic description of a tool.
///
/// `name` is unique within a catalog by convention; collisions across
/// providers are reported, not resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter_schema: Option<ParameterSchema>,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            parameter_schema: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_parameter_schema(mut self, schema: ParameterSchema) -> Self {
        self.parameter_schema = Some(schema);
        self
    }

    /// Canonicalize a self-hosted server's tool.
    pub fn from_discovered(tool: &DiscoveredTool) -> Self {
        Self {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameter_schema: ParameterSchema::from_input_schema(&tool.input_schema),
        }
    }

    /// Canonicalize a marketplace tool (every declared parameter required).
    pub fn from_marketplace(tool: &DiscoveredTool) -> Self {
        Self {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameter_schema: ParameterSchema::all_required(&tool.input_schema),
        }
    }

    /// Render the function entry handed to the model:
    /// `{type: "function", function: {name, description?, strict: true, parameters?}}`
    pub fn to_function_schema(&self) -> Value {
        let mut function = Map::new();
        function.insert("name".to_string(), Value::String(self.name.clone()));
        if let Some(description) = &self.description {
            function.insert(
                "description".to_string(),
                Value::String(description.clone()),
            );
        }
        function.insert("strict".to_string(), Value::Bool(true));
        if let Some(schema) = &self.parameter_schema {
            function.insert("parameters".to_string(), schema.to_value());
        }

        serde_json::json!({
            "type": "function",
            "function": function,
        })
    }
}

/// A tool call proposed by the model.
///
/// Parameters keep the order the model supplied them in, but that order
/// carries no meaning: equality is defined by [`CallSignature`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub tool_name: String,
    pub parameters: Vec<(String, Value)>,
}

impl ToolCallRequest {
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            parameters: Vec::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.push((name.into(), value.into()));
        self
    }

    /// Build a request from the model's JSON arguments object.
    ///
    /// `null` is accepted as "no arguments"; anything other than an object
    /// is rejected.
    pub fn from_arguments(tool_name: impl Into<String>, arguments: &Value) -> Result<Self, DomainError> {
        let tool_name = tool_name.into();
        if tool_name.is_empty() {
            return Err(DomainError::EmptyToolName);
        }

        let parameters = match arguments {
            Value::Null => Vec::new(),
            Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            other => return Err(DomainError::ArgumentsNotObject(json_kind(other).to_string())),
        };

        Ok(Self {
            tool_name,
            parameters,
        })
    }

    /// Arguments as a JSON object, ready to forward to a provider.
    pub fn arguments(&self) -> Map<String, Value> {
        self.parameters.iter().cloned().collect()
    }

    pub fn signature(&self) -> CallSignature {
        CallSignature::of(self)
    }
}

impl PartialEq for ToolCallRequest {
    fn eq(&self, other: &Self) -> bool {
        self.signature() == other.signature()
    }
}

impl Eq for ToolCallRequest {}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
