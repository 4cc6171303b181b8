//! Incident management: tickets, changes, major-incident response and the
//! reference data they point at.

mod change;
mod reference;
mod response;
mod tickets;

use std::sync::Arc;

use crate::approval::{ActionPolicy, ApprovalMatrix, Mode, APPROVALS_TABLE};
use crate::db::{Row, RowKey};
use crate::error::ToolError;
use crate::schema::{row_str, CoupledWrite, EntitySpec, FieldSpec, RuleContext};
use crate::tools::authenticate::AuthenticateApprovalTool;
use crate::tools::finder::FinderTool;
use crate::tools::manager::{ActionKind, ManagerTool};
use crate::tools::{Tool, ToolContext};

pub fn approvals() -> ApprovalMatrix {
    ApprovalMatrix::new(vec![
        ActionPolicy {
            action: "change_approval",
            keywords: &["change"],
            mode: Mode::Any,
            roles: &["change_manager", "incident_manager"],
        },
        ActionPolicy {
            action: "rollback_execution",
            keywords: &["rollback"],
            mode: Mode::All,
            roles: &["change_manager", "system_administrator"],
        },
        ActionPolicy {
            action: "major_incident_declaration",
            keywords: &["major_incident", "major incident"],
            mode: Mode::Single,
            roles: &["incident_manager", "executive"],
        },
    ])
}

fn approval_rows() -> EntitySpec {
    EntitySpec::new(APPROVALS_TABLE, "approval", "code", "Approval")
        .field(FieldSpec::text("action_name", "Action the approval covers"))
        .field(FieldSpec::text("approver_role", "Role of the approver"))
        .field(FieldSpec::text("approver_id", "Approving user"))
        .field(FieldSpec::text("status", "approved / rejected"))
}

/// Resolve `reference_type` / `reference_id` against the table the type
/// names. `targets` maps each type to its table and label.
fn resolve_polymorphic(
    ctx: &RuleContext<'_>,
    row: &Row,
    targets: &[(&str, &'static str, &str)],
) -> Result<Vec<CoupledWrite>, ToolError> {
    let (Some(kind), Some(id)) = (row_str(row, "reference_type"), row_str(row, "reference_id"))
    else {
        return Ok(Vec::new());
    };
    let Some((_, table, label)) = targets.iter().find(|(k, _, _)| *k == kind) else {
        return Ok(Vec::new());
    };
    if !ctx.db.contains(table, &RowKey::from(id)) {
        return Err(ToolError::NotFound(format!("{label} {id} not found")));
    }
    Ok(Vec::new())
}

pub fn tools(ctx: &ToolContext) -> Vec<Box<dyn Tool>> {
    let users = Arc::new(reference::users());
    let clients = Arc::new(reference::clients());
    let cis = Arc::new(reference::configuration_items());

    let incidents = Arc::new(tickets::incidents());
    let problems = Arc::new(tickets::problem_tickets());
    let incident_cis = Arc::new(tickets::incident_configuration_items());
    let problem_cis = Arc::new(tickets::problem_configuration_items());
    let escalations = Arc::new(tickets::escalations());
    let communications = Arc::new(tickets::communications());
    let work_orders = Arc::new(tickets::work_orders());
    let attachments = Arc::new(tickets::attachments());

    let changes = Arc::new(change::change_requests());
    let rollbacks = Arc::new(change::rollback_requests());
    let approval_requests = Arc::new(change::approval_requests());

    let bridges = Arc::new(response::bridges());
    let participants = Arc::new(response::bridge_participants());
    let rcas = Arc::new(response::root_cause_analyses());
    let reviews = Arc::new(response::post_incident_reviews());

    vec![
        Box::new(AuthenticateApprovalTool::new(ctx)),
        Box::new(FinderTool::new(
            "discover_incident_entities",
            "Look up incidents, problems, changes, rollbacks, escalations, bridges, analyses, reviews, communications, work orders, attachments and approval requests.",
            vec![
                Arc::clone(&incidents),
                Arc::clone(&problems),
                Arc::clone(&incident_cis),
                Arc::clone(&problem_cis),
                Arc::clone(&changes),
                Arc::clone(&rollbacks),
                Arc::clone(&escalations),
                Arc::clone(&bridges),
                Arc::clone(&participants),
                Arc::clone(&rcas),
                Arc::clone(&reviews),
                Arc::clone(&communications),
                Arc::clone(&work_orders),
                Arc::clone(&attachments),
                Arc::clone(&approval_requests),
            ],
        )),
        Box::new(
            FinderTool::new(
                "discover_reference_entities",
                "Look up users, clients, configuration items and recorded approvals.",
                vec![
                    Arc::clone(&users),
                    Arc::clone(&clients),
                    Arc::clone(&cis),
                    Arc::new(approval_rows()),
                ],
            )
            .strict(),
        ),
        Box::new(
            ManagerTool::new("manage_user", "Create or update users. Emails are unique.", users, ctx)
                .bundle("user_data"),
        ),
        Box::new(
            ManagerTool::new(
                "manage_client",
                "Create or update clients. Names and registration numbers are unique.",
                clients,
                ctx,
            )
            .bundle("client_data"),
        ),
        Box::new(
            ManagerTool::new(
                "manage_configuration_item",
                "Create or update configuration items.",
                cis,
                ctx,
            )
            .bundle("ci_data"),
        ),
        Box::new(
            ManagerTool::new(
                "manage_incident",
                "Create or update incidents. Status moves forward one step at a time; resolving and closing stamp the time.",
                incidents,
                ctx,
            )
            .bundle("incident_data"),
        ),
        Box::new(
            ManagerTool::new(
                "manage_problem_ticket",
                "Create or update problem tickets.",
                problems,
                ctx,
            )
            .bundle("problem_data"),
        ),
        Box::new(ManagerTool::new(
            "manage_incident_configuration_item",
            "Link a configuration item to an open incident, or change its impact level.",
            incident_cis,
            ctx,
        )),
        Box::new(ManagerTool::new(
            "manage_problem_configuration_item",
            "Link a configuration item to a problem ticket.",
            problem_cis,
            ctx,
        )),
        Box::new(
            ManagerTool::new(
                "manage_change_request",
                "Create or update change requests. Emergency changes must reference an incident; approving requires change_approval.",
                changes,
                ctx,
            )
            .bundle("change_data"),
        ),
        Box::new(
            ManagerTool::new(
                "manage_rollback_request",
                "Request or update a rollback of an in-flight change. Approving requires rollback_execution.",
                rollbacks,
                ctx,
            )
            .bundle("rollback_data"),
        ),
        Box::new(
            ManagerTool::new(
                "manage_escalation",
                "Escalate an open incident to another user, or update the escalation.",
                escalations,
                ctx,
            )
            .bundle("escalation_data"),
        ),
        Box::new(
            ManagerTool::new(
                "manage_bridge",
                "Open, update or close a bridge call for an open incident.",
                bridges,
                ctx,
            )
            .bundle("bridge_data")
            .action("close", ActionKind::Transition("closed")),
        ),
        Box::new(
            ManagerTool::new(
                "manage_bridge_participant",
                "Add a user to an active bridge, or change their role on it.",
                participants,
                ctx,
            )
            .bundle("participant_data"),
        ),
        Box::new(
            ManagerTool::new(
                "manage_root_cause_analysis",
                "Create or update root cause analyses for resolved P1/P2 incidents.",
                rcas,
                ctx,
            )
            .bundle("rca_data"),
        ),
        Box::new(
            ManagerTool::new(
                "manage_post_incident_review",
                "Schedule or update the post-incident review of a resolved incident.",
                reviews,
                ctx,
            )
            .bundle("review_data"),
        ),
        Box::new(
            ManagerTool::new(
                "manage_communication",
                "Draft, send or update incident communications.",
                communications,
                ctx,
            )
            .bundle("communication_data"),
        ),
        Box::new(
            ManagerTool::new(
                "manage_work_order",
                "Create or update work orders.",
                work_orders,
                ctx,
            )
            .bundle("work_order_data"),
        ),
        Box::new(
            ManagerTool::new(
                "manage_attachment",
                "Attach a file to an incident, problem, change, analysis or work order.",
                attachments,
                ctx,
            )
            .bundle("attachment_data")
            .create_only(),
        ),
        Box::new(
            ManagerTool::new(
                "manage_approval_request",
                "Create, approve or reject approval requests for changes, rollbacks and incidents.",
                approval_requests,
                ctx,
            )
            .bundle("approval_request_data")
            .action("approve", ActionKind::Transition("approved"))
            .action("reject", ActionKind::Transition("rejected")),
        ),
    ]
}
