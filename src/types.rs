//! Wire types shared with the embedding harness.
//!
//! Descriptors follow the function-calling shape used by mainstream LLM
//! APIs; tool calls arrive as a tool name plus a JSON argument object.

use serde::{Deserialize, Serialize};

// --- Tool Definition ---

/// The callable part of a descriptor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionSpec {
    /// The tool's name (unique across the registry)
    pub name: String,
    /// Free text the model reads to decide when to call the tool
    pub description: String,
    /// Object-shaped JSON Schema fragment with `properties` and `required`
    pub parameters: serde_json::Value,
}

/// A tool descriptor: `{"type": "function", "function": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionSpec,
}

impl ToolDefinition {
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            kind: "function".to_string(),
            function: FunctionSpec {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

// --- Tool Call ---

/// One request from the harness.
///
/// The optional `id` lets the harness correlate results; the core ignores it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Name of the tool to invoke (e.g. "manage_payroll")
    pub name: String,
    /// Argument object shaped like the descriptor's `properties`
    #[serde(default = "empty_arguments")]
    pub arguments: serde_json::Value,
}

fn empty_arguments() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}
