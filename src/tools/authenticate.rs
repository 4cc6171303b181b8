//! The approval check tool.
//!
//! Answers with an envelope in every case, including unknown actions and
//! missing approvals.

use std::sync::Arc;

use serde_json::{json, Value};

use super::{Tool, ToolContext};
use crate::approval::{ApprovalMatrix, ApprovedBy};
use crate::db::Database;
use crate::envelope::Envelope;
use crate::error::ToolError;
use crate::schema::row_str;

/// `authenticate_approval`: tells the model whether a sensitive action is
/// sanctioned, either by the requester's own role or by approval rows.
pub struct AuthenticateApprovalTool {
    approvals: Arc<ApprovalMatrix>,
}

impl AuthenticateApprovalTool {
    pub fn new(ctx: &ToolContext) -> Self {
        Self {
            approvals: Arc::clone(&ctx.approvals),
        }
    }

    fn authenticate(&self, db: &Database, params: &Value) -> Result<(ApprovedBy, String), ToolError> {
        let action = params
            .get("action")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ToolError::MissingFields(vec!["action".to_string()]))?;
        let policy = self.approvals.policy(action).ok_or_else(|| {
            ToolError::Shape(format!(
                "Invalid action '{}'. Must be one of: {}",
                action,
                self.approvals.actions().join(", ")
            ))
        })?;

        let email = params
            .get("requester_email")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty());
        if let Some(email) = email {
            let (_, user) = db
                .rows("users")
                .find(|(_, row)| row_str(row, "email").is_some_and(|e| e.eq_ignore_ascii_case(email)))
                .ok_or_else(|| ToolError::NotFound(format!("User with email '{email}' not found")))?;
            if row_str(user, "status") != Some("active") {
                return Err(ToolError::InvalidReference(format!(
                    "User with email '{email}' is not active"
                )));
            }
            let role = row_str(user, "role").unwrap_or_default();
            if self.approvals.authorizes_role(role, policy.action) {
                return Ok((
                    ApprovedBy::Role(role.to_string()),
                    format!("Role '{role}' is authorized to perform {action} directly"),
                ));
            }
        }

        let approved = self.approvals.verify(db, policy.action)?;
        Ok((approved, format!("Approval verified for {action}")))
    }
}

impl Tool for AuthenticateApprovalTool {
    fn name(&self) -> &str {
        "authenticate_approval"
    }

    fn description(&self) -> &str {
        "Check whether an action that needs sign-off is approved, either because the \
         requester's role may perform it directly or because the required approvals are \
         recorded. Call this before any gated operation."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "description": "Action that needs approval",
                    "enum": self.approvals.actions(),
                },
                "requester_email": {
                    "type": "string",
                    "description": "Email of the user asking to perform the action",
                },
            },
            "required": ["action"],
        })
    }

    fn execute(&self, db: &mut Database, params: &Value) -> Result<Envelope, ToolError> {
        match self.authenticate(db, params) {
            Ok((approved_by, message)) => Ok(Envelope::success()
                .with("approval_valid", true)
                .with("approved_by", approved_by.to_value())
                .with("message", message)),
            Err(error) => Ok(Envelope::failure(error).with("approval_valid", false)),
        }
    }
}
