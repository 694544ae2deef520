//! Call signature codec.
//!
//! A [`CallSignature`] is the string key used for loop detection and call
//! budgets. It is built by sorting the call's parameters by name (stable,
//! lexicographic) and serializing `{toolName, parameters}`.
//!
//! Only the top-level parameter list is sorted. Nested object and array
//! values are serialized as supplied, so `{"a":1,"b":2}` and `{"b":2,"a":1}`
//! nested inside a parameter yield different signatures.

use super::entities::ToolCallRequest;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignaturePayload<'a> {
    tool_name: &'a str,
    parameters: Vec<SignatureParameter<'a>>,
}

#[derive(Serialize)]
struct SignatureParameter<'a> {
    name: &'a str,
    value: &'a Value,
}

/// Order-independent key for a tool call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallSignature(String);

impl CallSignature {
    pub fn of(call: &ToolCallRequest) -> Self {
        let mut parameters: Vec<SignatureParameter<'_>> = call
            .parameters
            .iter()
            .map(|(name, value)| SignatureParameter { name, value })
            .collect();
        // sort_by is stable: duplicate names keep their supplied order
        parameters.sort_by(|a, b| a.name.cmp(b.name));

        let payload = SignaturePayload {
            tool_name: &call.tool_name,
            parameters,
        };
        Self(serde_json::to_string(&payload).unwrap_or_default())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CallSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
