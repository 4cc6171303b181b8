//! Error taxonomy shared by every tool handler.
//!
//! A `ToolError` never crosses the tool boundary: the pipeline folds it into
//! a failure envelope, and its `Display` output is exactly the `error`
//! string the model sees. Business halts carry the `"Halt: "` prefix,
//! read-side lookup failures use a bare message.

use thiserror::Error;

/// A single validation or business-rule failure raised inside a tool.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ToolError {
    /// Unrecognized action or entity type, missing or malformed bundle.
    #[error("Halt: {0}")]
    Shape(String),

    /// Mandatory fields absent or blank.
    #[error("Halt: Missing mandatory fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    /// Properties outside the allow-list of the requested action.
    #[error("Halt: Invalid fields for {action}: {}", .fields.join(", "))]
    UnexpectedFields { action: String, fields: Vec<String> },

    /// Wrong type, out-of-range number, malformed date or email.
    #[error("Halt: {0}")]
    InvalidValue(String),

    /// Value outside a declared enum.
    #[error("Halt: Invalid {field} '{value}'. Must be one of: {}", .allowed.join(", "))]
    InvalidEnum {
        field: String,
        value: String,
        allowed: Vec<String>,
    },

    /// Referenced row does not exist.
    #[error("Halt: {0}")]
    NotFound(String),

    /// Referenced row exists but is in the wrong state or role.
    #[error("Halt: {0}")]
    InvalidReference(String),

    /// Uniqueness violation.
    #[error("Halt: {0}")]
    Duplicate(String),

    /// State-machine violation.
    #[error("Halt: {0}")]
    Transition(String),

    /// Missing approval or insufficient approver roles.
    #[error("Halt: {0}")]
    Unauthorized(String),

    /// Date ordering, cut-off, overlap, or future/past violations.
    #[error("Halt: {0}")]
    Temporal(String),

    /// Any other entity-specific precondition.
    #[error("Halt: {0}")]
    BusinessRule(String),

    /// Finder failures (unknown entity type, bad filters).
    #[error("{0}")]
    Lookup(String),
}

impl ToolError {
    /// The generic state-machine rejection.
    pub fn invalid_transition() -> Self {
        ToolError::Transition("Invalid status transition".to_string())
    }

    /// Whether this error is surfaced as a business halt.
    pub fn is_halt(&self) -> bool {
        !matches!(self, ToolError::Lookup(_))
    }
}

/// Failures of the dispatcher itself, before any tool runs.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid JSON arguments for tool '{name}': {source}")]
    InvalidArguments {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Arguments for tool '{0}' must be a JSON object")]
    NotAnObject(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_halt_prefix() {
        let err = ToolError::Unauthorized("Finance Officer approval required".to_string());
        assert_eq!(err.to_string(), "Halt: Finance Officer approval required");
        assert!(err.is_halt());
    }

    #[test]
    fn test_lookup_is_bare() {
        let err = ToolError::Lookup("Invalid entity_type 'x'".to_string());
        assert_eq!(err.to_string(), "Invalid entity_type 'x'");
        assert!(!err.is_halt());
    }

    #[test]
    fn test_list_formatting() {
        let err = ToolError::MissingFields(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(err.to_string(), "Halt: Missing mandatory fields: a, b");

        let err = ToolError::InvalidEnum {
            field: "severity".to_string(),
            value: "P9".to_string(),
            allowed: vec!["P1".to_string(), "P2".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Halt: Invalid severity 'P9'. Must be one of: P1, P2"
        );
    }

    #[test]
    fn test_invalid_transition_wording() {
        assert_eq!(
            ToolError::invalid_transition().to_string(),
            "Halt: Invalid status transition"
        );
    }
}
