//! Tool dispatch for one back-office suite.
//!
//! Defines the `Tool` trait and the `ToolRouter` that holds a suite's
//! finders and managers.
//!
//! Key concepts:
//! - **Tool trait**: every tool provides its name, description, JSON Schema
//!   for parameters, and an execute method that works on the database
//! - **Envelope**: tools never raise across the boundary; `invoke` folds
//!   every outcome into the JSON string the model reads
//! - **ToolRouter**: a registry that holds the tools of one suite and
//!   dispatches calls by name
//! - **Declarative tools**: managers and finders are generic; what they do
//!   is driven by the `EntitySpec`s they are built from

pub mod authenticate;
pub mod finder;
pub mod manager;

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::approval::ApprovalMatrix;
use crate::clock::FrozenClock;
use crate::db::Database;
use crate::envelope::Envelope;
use crate::error::{DispatchError, ToolError};
use crate::suites::Suite;
use crate::types::ToolDefinition;

/// Trait that all tools must implement.
///
/// Each tool is a capability the model can invoke. Tools receive a JSON
/// argument object and the session database, and answer with an envelope.
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g. "manage_payroll").
    fn name(&self) -> &str;

    /// A human-readable description of what this tool does.
    fn description(&self) -> &str;

    /// JSON Schema describing the tool's input parameters.
    fn parameters_schema(&self) -> Value;

    /// Run the tool. `Err` is a validation or business failure; the
    /// database must be untouched when it is returned.
    fn execute(&self, db: &mut Database, params: &Value) -> Result<Envelope, ToolError>;

    /// Run the tool and render the envelope string.
    fn invoke(&self, db: &mut Database, params: &Value) -> String {
        let envelope = match self.execute(db, params) {
            Ok(envelope) => envelope,
            Err(error) => {
                warn!(tool = self.name(), %error, "tool halted");
                Envelope::failure(error)
            }
        };
        envelope.render()
    }

    /// Convert this tool into a descriptor for the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition::function(self.name(), self.description(), self.parameters_schema())
    }
}

/// What every tool of a suite shares: the frozen clock and the approval
/// matrix.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub clock: FrozenClock,
    pub approvals: Arc<ApprovalMatrix>,
}

impl ToolContext {
    pub fn new(clock: FrozenClock, approvals: ApprovalMatrix) -> Self {
        Self {
            clock,
            approvals: Arc::new(approvals),
        }
    }
}

/// Routes tool calls to the correct tool implementation.
pub struct ToolRouter {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRouter {
    /// Create a new empty ToolRouter.
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Register a tool. A tool with the same name replaces the earlier one.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        if let Some(pos) = self.tools.iter().position(|t| t.name() == tool.name()) {
            warn!(tool = tool.name(), "replacing registered tool");
            self.tools[pos] = tool;
        } else {
            self.tools.push(tool);
        }
    }

    /// Get all tool definitions, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.to_definition()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Execute a tool by name with raw JSON arguments.
    pub fn execute(
        &self,
        db: &mut Database,
        name: &str,
        arguments: &str,
    ) -> Result<String, DispatchError> {
        if !self.has_tool(name) {
            return Err(DispatchError::UnknownTool(name.to_string()));
        }
        let params: Value =
            serde_json::from_str(arguments).map_err(|source| DispatchError::InvalidArguments {
                name: name.to_string(),
                source,
            })?;
        self.call(db, name, &params)
    }

    /// Execute a tool by name with already-parsed arguments.
    pub fn call(
        &self,
        db: &mut Database,
        name: &str,
        params: &Value,
    ) -> Result<String, DispatchError> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| DispatchError::UnknownTool(name.to_string()))?;
        if !params.is_object() {
            return Err(DispatchError::NotAnObject(name.to_string()));
        }
        debug!(tool = name, "dispatching tool call");
        Ok(tool.invoke(db, params))
    }

    /// Check if a tool with the given name is registered.
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name() == name)
    }

    /// Keep only the listed tools. An empty list keeps everything.
    pub fn retain_enabled(&mut self, enabled: &[String]) {
        if enabled.is_empty() {
            return;
        }
        self.tools.retain(|t| enabled.iter().any(|e| e == t.name()));
    }

    /// Get the number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if the router has no tools.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRouter {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a ToolRouter with every tool of `suite` registered.
pub fn create_router(suite: Suite, clock: FrozenClock) -> ToolRouter {
    let mut router = ToolRouter::new();
    for tool in suite.tools(clock) {
        router.register(tool);
    }
    router
}

/// Id argument as a string; integers are accepted.
pub(crate) fn id_argument(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) if n.is_u64() => Some(n.to_string()),
        _ => None,
    }
}
