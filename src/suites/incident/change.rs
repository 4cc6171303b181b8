//! Change requests, rollbacks and approval requests.

use serde_json::json;

use super::resolve_polymorphic;
use crate::db::{Row, RowKey};
use crate::error::ToolError;
use crate::schema::state;
use crate::schema::{
    is_blank, row_str, CoupledWrite, EntitySpec, FieldKind, FieldSpec, Gate, Operation, Reference,
    RuleContext, Trigger,
};

const RISK_LEVELS: &[&str] = &["low", "medium", "high", "critical"];

pub fn change_requests() -> EntitySpec {
    EntitySpec::new("change_requests", "change", "change_id", "Change request")
        .code("change_number", "CHG", 7)
        .field(FieldSpec::text("title", "Short summary").required())
        .field(FieldSpec::text("description", "Planned work"))
        .field(
            FieldSpec::choice("change_type", &["standard", "normal", "emergency"], "Change class")
                .required(),
        )
        .field(FieldSpec::choice("risk_level", RISK_LEVELS, "Assessed risk").required())
        .field(FieldSpec::id(
            "incident_id",
            Reference::to("incidents", "Incident"),
            "Incident the change responds to; required for emergency changes",
        ))
        .field(
            FieldSpec::id("requested_by", Reference::user(), "Requesting user")
                .required()
                .fixed(),
        )
        .field(FieldSpec::id(
            "approved_by",
            Reference::user().roles(&["change_manager", "incident_manager"]),
            "Approving user",
        ))
        .field(FieldSpec::date("scheduled_start", "Planned start"))
        .field(FieldSpec::date("scheduled_end", "Planned end"))
        .field(
            FieldSpec::choice(
                "status",
                &[
                    "requested",
                    "approved",
                    "scheduled",
                    "in_progress",
                    "implemented",
                    "failed",
                    "cancelled",
                    "rolled_back",
                ],
                "Change status",
            )
            .default(json!("requested")),
        )
        .ordered("scheduled_start", "scheduled_end")
        .machine(state::change_request())
        .gate(Gate::Recorded {
            action: "change_approval",
            trigger: Trigger::FieldBecomes {
                field: "status",
                value: "approved",
            },
        })
        .rule(emergency_needs_incident)
}

fn emergency_needs_incident(
    _ctx: &RuleContext<'_>,
    row: &mut Row,
) -> Result<Vec<CoupledWrite>, ToolError> {
    if row_str(row, "change_type") == Some("emergency") && is_blank(row.get("incident_id")) {
        return Err(ToolError::BusinessRule(
            "Emergency changes must reference an incident".to_string(),
        ));
    }
    Ok(Vec::new())
}

pub fn rollback_requests() -> EntitySpec {
    EntitySpec::new("rollback_requests", "rollback", "rollback_id", "Rollback request")
        .field(
            FieldSpec::id(
                "change_id",
                Reference::to("change_requests", "Change request")
                    .when("status", &["in_progress", "implemented", "failed"]),
                "Change to roll back",
            )
            .required()
            .fixed(),
        )
        .field(FieldSpec::id("incident_id", Reference::to("incidents", "Incident"), "Related incident"))
        .field(FieldSpec::text("rollback_reason", "Why the change is reverted").required())
        .field(
            FieldSpec::id("requested_by", Reference::user(), "Requesting user")
                .required()
                .fixed(),
        )
        .field(FieldSpec::id(
            "executed_by",
            Reference::user().roles(&["system_administrator", "change_manager"]),
            "User carrying out the rollback",
        ))
        .field(
            FieldSpec::choice(
                "status",
                &["requested", "approved", "executed", "failed"],
                "Rollback status",
            )
            .default(json!("requested")),
        )
        .machine(state::rollback_request())
        .gate(Gate::Recorded {
            action: "rollback_execution",
            trigger: Trigger::FieldBecomes {
                field: "status",
                value: "approved",
            },
        })
        .rule(mark_change_rolled_back)
}

/// An executed rollback moves its change to `rolled_back`, provided the
/// change may still make that move.
fn mark_change_rolled_back(
    ctx: &RuleContext<'_>,
    row: &mut Row,
) -> Result<Vec<CoupledWrite>, ToolError> {
    let was_executed = match ctx.op {
        Operation::Create => false,
        Operation::Update { prior, .. } => row_str(prior, "status") == Some("executed"),
    };
    if was_executed || row_str(row, "status") != Some("executed") {
        return Ok(Vec::new());
    }
    let Some(change_id) = row_str(row, "change_id") else {
        return Ok(Vec::new());
    };
    let key = RowKey::from(change_id);
    let current = ctx
        .db
        .get("change_requests", &key)
        .and_then(|c| row_str(c, "status"))
        .ok_or_else(|| ToolError::NotFound(format!("Change request {change_id} not found")))?;
    state::change_request().check(current, "rolled_back")?;
    let mut changes = Row::new();
    changes.insert("status".to_string(), json!("rolled_back"));
    Ok(vec![CoupledWrite::Patch {
        table: "change_requests",
        key,
        changes,
    }])
}

pub fn approval_requests() -> EntitySpec {
    EntitySpec::new("approval_requests", "approval_request", "approval_request_id", "Approval request")
        .field(
            FieldSpec::choice(
                "reference_type",
                &["change", "rollback", "incident"],
                "Kind of record awaiting approval",
            )
            .required()
            .fixed(),
        )
        .field(
            FieldSpec::new("reference_id", FieldKind::Id, "Id of that record")
                .required()
                .fixed(),
        )
        .field(
            FieldSpec::id("requested_by", Reference::user(), "Requesting user")
                .required()
                .fixed(),
        )
        .field(
            FieldSpec::id("approver_id", Reference::user(), "User asked to decide")
                .required()
                .fixed(),
        )
        .field(FieldSpec::text("comments", "Decision notes"))
        .field(FieldSpec::text("decided_at", "Stamped when decided").computed())
        .field(
            FieldSpec::choice("status", &["pending", "approved", "rejected"], "Decision")
                .default(json!("pending")),
        )
        .machine(state::approval_request())
        .rule(approval_target)
        .rule(approver_not_requester)
        .rule(stamp_decision)
}

fn approval_target(ctx: &RuleContext<'_>, row: &mut Row) -> Result<Vec<CoupledWrite>, ToolError> {
    const TARGETS: &[(&str, &str, &str)] = &[
        ("change", "change_requests", "Change request"),
        ("rollback", "rollback_requests", "Rollback request"),
        ("incident", "incidents", "Incident"),
    ];
    resolve_polymorphic(ctx, row, TARGETS)
}

fn approver_not_requester(
    _ctx: &RuleContext<'_>,
    row: &mut Row,
) -> Result<Vec<CoupledWrite>, ToolError> {
    if row_str(row, "approver_id").is_some() && row_str(row, "approver_id") == row_str(row, "requested_by") {
        return Err(ToolError::BusinessRule(
            "Approver cannot be the same user as the requester".to_string(),
        ));
    }
    Ok(Vec::new())
}

fn stamp_decision(ctx: &RuleContext<'_>, row: &mut Row) -> Result<Vec<CoupledWrite>, ToolError> {
    let decided = matches!(row_str(row, "status"), Some("approved" | "rejected"));
    if decided && is_blank(row.get("decided_at")) {
        row.insert("decided_at".to_string(), json!(ctx.clock.timestamp()));
    }
    Ok(Vec::new())
}
