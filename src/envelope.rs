//! The result envelope every tool returns.
//!
//! Success: `{"success": true, ...fields}`.
//! Failure: `{"success": false, "error": "...", ...detail}`.
//! The envelope is always handed back to the caller as a JSON string.

use serde_json::{Map, Value};

use crate::error::ToolError;

#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Success(Map<String, Value>),
    Failure {
        error: ToolError,
        detail: Map<String, Value>,
    },
}

impl Envelope {
    pub fn success() -> Self {
        Envelope::Success(Map::new())
    }

    pub fn failure(error: ToolError) -> Self {
        Envelope::Failure {
            error,
            detail: Map::new(),
        }
    }

    /// Attach an extra field to either variant.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        match &mut self {
            Envelope::Success(fields) => {
                fields.insert(key.to_string(), value.into());
            }
            Envelope::Failure { detail, .. } => {
                detail.insert(key.to_string(), value.into());
            }
        }
        self
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Envelope::Success(_))
    }

    pub fn to_value(&self) -> Value {
        let mut out = Map::new();
        match self {
            Envelope::Success(fields) => {
                out.extend(fields.clone());
                out.insert("success".to_string(), Value::Bool(true));
            }
            Envelope::Failure { error, detail } => {
                out.extend(detail.clone());
                out.insert("success".to_string(), Value::Bool(false));
                out.insert("error".to_string(), Value::String(error.to_string()));
            }
        }
        Value::Object(out)
    }

    /// Canonical JSON string.
    pub fn render(&self) -> String {
        self.to_value().to_string()
    }
}

impl From<Result<Envelope, ToolError>> for Envelope {
    fn from(result: Result<Envelope, ToolError>) -> Self {
        result.unwrap_or_else(Envelope::failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_render() {
        let env = Envelope::success()
            .with("action", "create")
            .with("bridge_id", "3");
        let parsed: Value = serde_json::from_str(&env.render()).unwrap();
        assert_eq!(
            parsed,
            json!({"success": true, "action": "create", "bridge_id": "3"})
        );
    }

    #[test]
    fn test_failure_render() {
        let env = Envelope::failure(ToolError::invalid_transition());
        let parsed: Value = serde_json::from_str(&env.render()).unwrap();
        assert_eq!(
            parsed,
            json!({"success": false, "error": "Halt: Invalid status transition"})
        );
    }

    #[test]
    fn test_failure_detail_cannot_override_error() {
        let env = Envelope::failure(ToolError::Lookup("boom".to_string()))
            .with("error", "shadow")
            .with("approval_valid", false);
        let parsed = env.to_value();
        assert_eq!(parsed["error"], json!("boom"));
        assert_eq!(parsed["approval_valid"], json!(false));
    }

    #[test]
    fn test_from_result() {
        let env: Envelope = Err(ToolError::Shape("Invalid action 'x'".to_string())).into();
        assert!(!env.is_success());
        assert_eq!(env.to_value()["error"], json!("Halt: Invalid action 'x'"));
    }
}
