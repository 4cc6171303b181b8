//! Incidents, problems and the records attached to them.

use serde_json::json;

use super::resolve_polymorphic;
use crate::db::Row;
use crate::error::ToolError;
use crate::schema::state;
use crate::schema::{
    is_blank, row_str, Bounds, CoupledWrite, EntitySpec, FieldKind, FieldSpec, Reference,
    RuleContext,
};

const SEVERITIES: &[&str] = &["P1", "P2", "P3", "P4"];
const PRIORITIES: &[&str] = &["critical", "high", "medium", "low"];
const OPEN_INCIDENT: &[&str] = &["open", "in_progress", "monitoring"];

pub fn incidents() -> EntitySpec {
    EntitySpec::new("incidents", "incident", "incident_id", "Incident")
        .code("incident_number", "INC", 7)
        .field(FieldSpec::text("title", "Short summary").required())
        .field(FieldSpec::text("description", "What happened"))
        .field(FieldSpec::choice(
            "category",
            &["hardware", "software", "network", "security", "database", "access", "other"],
            "Category",
        ))
        .field(FieldSpec::choice("severity", SEVERITIES, "P1 is most severe").required())
        .field(FieldSpec::choice("impact", PRIORITIES, "Business impact"))
        .field(FieldSpec::choice("urgency", PRIORITIES, "Urgency"))
        .field(FieldSpec::id(
            "client_id",
            Reference::to("clients", "Client").when("status", &["active"]),
            "Affected client",
        ))
        .field(
            FieldSpec::id("reported_by", Reference::user(), "Reporting user")
                .required()
                .fixed(),
        )
        .field(FieldSpec::id("assigned_to", Reference::user(), "Assignee"))
        .field(FieldSpec::date("detected_date", "Date the issue was detected").not_future())
        .field(FieldSpec::text("resolution_notes", "How it was resolved"))
        .field(FieldSpec::text("resolved_at", "Stamped when resolved").computed())
        .field(FieldSpec::text("closed_at", "Stamped when closed").computed())
        .field(
            FieldSpec::choice(
                "status",
                &["open", "in_progress", "monitoring", "resolved", "closed"],
                "Lifecycle stage; moves forward one step at a time",
            )
            .default(json!("open")),
        )
        .machine(state::incident())
        .rule(stamp_resolution)
}

fn stamp_resolution(ctx: &RuleContext<'_>, row: &mut Row) -> Result<Vec<CoupledWrite>, ToolError> {
    let stamp = match row_str(row, "status") {
        Some("resolved") => "resolved_at",
        Some("closed") => "closed_at",
        _ => return Ok(Vec::new()),
    };
    if is_blank(row.get(stamp)) {
        row.insert(stamp.to_string(), json!(ctx.clock.timestamp()));
    }
    Ok(Vec::new())
}

pub fn problem_tickets() -> EntitySpec {
    EntitySpec::new("problem_tickets", "problem", "problem_id", "Problem ticket")
        .code("problem_number", "PRB", 7)
        .field(FieldSpec::text("title", "Short summary").required())
        .field(FieldSpec::text("description", "Symptoms"))
        .field(FieldSpec::choice(
            "category",
            &["hardware", "software", "network", "security", "database", "other"],
            "Category",
        ))
        .field(FieldSpec::choice("priority", PRIORITIES, "Priority").required())
        .field(
            FieldSpec::choice(
                "status",
                &["open", "investigating", "known_error", "resolved", "closed"],
                "Problem status",
            )
            .default(json!("open")),
        )
        .field(FieldSpec::id("assigned_to", Reference::user(), "Assignee"))
        .field(FieldSpec::text("root_cause", "Identified root cause"))
        .field(FieldSpec::text("workaround", "Known workaround"))
}

pub fn incident_configuration_items() -> EntitySpec {
    EntitySpec::new(
        "incident_configuration_items",
        "incident_ci",
        "incident_ci_id",
        "Incident configuration item",
    )
    .field(
        FieldSpec::id(
            "incident_id",
            Reference::to("incidents", "Incident").when("status", OPEN_INCIDENT),
            "Open incident",
        )
        .required()
        .fixed(),
    )
    .field(
        FieldSpec::id("ci_id", Reference::to("configuration_items", "Configuration item"), "Affected component")
            .required()
            .fixed(),
    )
    .field(
        FieldSpec::choice("impact_level", &["primary", "secondary", "affected"], "How the component is involved")
            .default(json!("affected")),
    )
    .unique(&["incident_id", "ci_id"])
}

pub fn problem_configuration_items() -> EntitySpec {
    EntitySpec::new(
        "problem_configuration_items",
        "problem_ci",
        "problem_ci_id",
        "Problem configuration item",
    )
    .field(
        FieldSpec::id("problem_id", Reference::to("problem_tickets", "Problem ticket"), "Problem")
            .required()
            .fixed(),
    )
    .field(
        FieldSpec::id("ci_id", Reference::to("configuration_items", "Configuration item"), "Component")
            .required()
            .fixed(),
    )
    .unique(&["problem_id", "ci_id"])
}

pub fn escalations() -> EntitySpec {
    EntitySpec::new("escalations", "escalation", "escalation_id", "Escalation")
        .field(
            FieldSpec::id(
                "incident_id",
                Reference::to("incidents", "Incident").when("status", &["open", "in_progress"]),
                "Incident being escalated",
            )
            .required()
            .fixed(),
        )
        .field(
            FieldSpec::id("escalated_by", Reference::user(), "User escalating")
                .required()
                .fixed(),
        )
        .field(FieldSpec::id("escalated_to", Reference::user(), "User receiving the escalation").required())
        .field(
            FieldSpec::choice(
                "escalation_level",
                &["level_1", "level_2", "level_3", "executive"],
                "Tier",
            )
            .required(),
        )
        .field(FieldSpec::text("reason", "Why").required())
        .field(
            FieldSpec::choice("status", &["open", "acknowledged", "resolved"], "Escalation status")
                .default(json!("open")),
        )
        .rule(distinct_escalation_target)
}

fn distinct_escalation_target(_ctx: &RuleContext<'_>, row: &mut Row) -> Result<Vec<CoupledWrite>, ToolError> {
    if let (Some(by), Some(to)) = (row_str(row, "escalated_by"), row_str(row, "escalated_to")) {
        if by == to {
            return Err(ToolError::BusinessRule(
                "Cannot escalate an incident to yourself".to_string(),
            ));
        }
    }
    Ok(Vec::new())
}

pub fn communications() -> EntitySpec {
    EntitySpec::new("communications", "communication", "communication_id", "Communication")
        .field(
            FieldSpec::id("incident_id", Reference::to("incidents", "Incident"), "Incident")
                .required()
                .fixed(),
        )
        .field(
            FieldSpec::id("sender_id", Reference::user(), "Sending user")
                .required()
                .fixed(),
        )
        .field(
            FieldSpec::choice(
                "recipient_type",
                &["client", "internal", "executive", "all_stakeholders"],
                "Audience",
            )
            .required(),
        )
        .field(
            FieldSpec::choice("delivery_method", &["email", "sms", "portal", "phone", "slack"], "Channel")
                .required(),
        )
        .field(FieldSpec::text("subject", "Subject line"))
        .field(FieldSpec::text("message", "Body").required())
        .field(FieldSpec::text("sent_at", "Stamped when sent").computed())
        .field(
            FieldSpec::choice("status", &["draft", "sent", "failed"], "Delivery status")
                .default(json!("draft")),
        )
        .rule(stamp_sent)
}

fn stamp_sent(ctx: &RuleContext<'_>, row: &mut Row) -> Result<Vec<CoupledWrite>, ToolError> {
    if row_str(row, "status") == Some("sent") && is_blank(row.get("sent_at")) {
        row.insert("sent_at".to_string(), json!(ctx.clock.timestamp()));
    }
    Ok(Vec::new())
}

pub fn work_orders() -> EntitySpec {
    EntitySpec::new("work_orders", "work_order", "work_order_id", "Work order")
        .code("work_order_number", "WO", 7)
        .field(FieldSpec::text("title", "Task").required())
        .field(FieldSpec::text("description", "Details"))
        .field(FieldSpec::id("incident_id", Reference::to("incidents", "Incident"), "Related incident"))
        .field(FieldSpec::id("change_id", Reference::to("change_requests", "Change request"), "Related change"))
        .field(FieldSpec::id("assigned_to", Reference::user(), "Assignee"))
        .field(FieldSpec::choice("priority", PRIORITIES, "Priority").default(json!("medium")))
        .field(FieldSpec::date("due_date", "Due date"))
        .field(
            FieldSpec::choice(
                "status",
                &["open", "in_progress", "completed", "cancelled"],
                "Work order status",
            )
            .default(json!("open")),
        )
}

pub fn attachments() -> EntitySpec {
    EntitySpec::new("attachments", "attachment", "attachment_id", "Attachment")
        .field(
            FieldSpec::choice(
                "reference_type",
                &["incident", "problem", "change", "rca", "work_order"],
                "Kind of record the file belongs to",
            )
            .required()
            .fixed(),
        )
        .field(
            FieldSpec::new("reference_id", FieldKind::Id, "Id of that record")
                .required()
                .fixed(),
        )
        .field(FieldSpec::text("file_name", "File name").required())
        .field(FieldSpec::text("file_url", "Storage location"))
        .field(FieldSpec::integer("file_size_bytes", "Size").bounds(Bounds::non_negative()))
        .field(
            FieldSpec::id("uploaded_by", Reference::user(), "Uploading user")
                .required()
                .fixed(),
        )
        .rule(attachment_target)
}

fn attachment_target(ctx: &RuleContext<'_>, row: &mut Row) -> Result<Vec<CoupledWrite>, ToolError> {
    const TARGETS: &[(&str, &str, &str)] = &[
        ("incident", "incidents", "Incident"),
        ("problem", "problem_tickets", "Problem ticket"),
        ("change", "change_requests", "Change request"),
        ("rca", "root_cause_analyses", "Root cause analysis"),
        ("work_order", "work_orders", "Work order"),
    ];
    resolve_polymorphic(ctx, row, TARGETS)
}
