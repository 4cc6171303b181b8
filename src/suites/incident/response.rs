//! Major-incident response: bridges, participants, root cause analyses and
//! post-incident reviews.

use serde_json::json;

use crate::db::Row;
use crate::error::ToolError;
use crate::schema::state;
use crate::schema::{
    is_blank, row_str, Bounds, CoupledWrite, EntitySpec, FieldSpec, Reference, RuleContext,
};

pub fn bridges() -> EntitySpec {
    EntitySpec::new("bridges", "bridge", "bridge_id", "Bridge")
        .code("bridge_number", "BRG", 7)
        .field(
            FieldSpec::id(
                "incident_id",
                Reference::to("incidents", "Incident").when("status", &["open", "in_progress"]),
                "Incident the bridge is opened for",
            )
            .required()
            .fixed(),
        )
        .field(
            FieldSpec::choice(
                "bridge_type",
                &["major_incident", "technical", "executive"],
                "Purpose of the call",
            )
            .required(),
        )
        .field(
            FieldSpec::id(
                "host_user_id",
                Reference::user().roles(&["incident_manager", "technical_support", "executive"]),
                "User running the bridge",
            )
            .required(),
        )
        .field(FieldSpec::text("meeting_link", "Conference link"))
        .field(FieldSpec::text("closed_at", "Stamped when closed").computed())
        .field(
            FieldSpec::choice("status", &["active", "closed"], "Bridge status")
                .default(json!("active")),
        )
        .machine(state::bridge())
        .rule(stamp_closed)
}

fn stamp_closed(ctx: &RuleContext<'_>, row: &mut Row) -> Result<Vec<CoupledWrite>, ToolError> {
    if row_str(row, "status") == Some("closed") && is_blank(row.get("closed_at")) {
        row.insert("closed_at".to_string(), json!(ctx.clock.timestamp()));
    }
    Ok(Vec::new())
}

pub fn bridge_participants() -> EntitySpec {
    EntitySpec::new(
        "bridge_participants",
        "participant",
        "participant_id",
        "Bridge participant",
    )
    .field(
        FieldSpec::id(
            "bridge_id",
            Reference::to("bridges", "Bridge").when("status", &["active"]),
            "Active bridge",
        )
        .required()
        .fixed(),
    )
    .field(
        FieldSpec::id("user_id", Reference::user(), "Participant")
            .required()
            .fixed(),
    )
    .field(
        FieldSpec::choice(
            "participant_role",
            &["host", "technical_lead", "communicator", "observer", "stakeholder"],
            "Role on the call",
        )
        .default(json!("observer")),
    )
    .unique(&["bridge_id", "user_id"])
}

pub fn root_cause_analyses() -> EntitySpec {
    EntitySpec::new("root_cause_analyses", "rca", "rca_id", "Root cause analysis")
        .code("rca_number", "RCA", 7)
        .field(
            FieldSpec::id(
                "incident_id",
                Reference::to("incidents", "Incident")
                    .when("severity", &["P1", "P2"])
                    .when("status", &["resolved", "closed"]),
                "Resolved P1 or P2 incident",
            )
            .required()
            .fixed(),
        )
        .field(FieldSpec::text("rca_title", "Title").required())
        .field(
            FieldSpec::id("assigned_to", Reference::user(), "Analyst")
                .required(),
        )
        .field(FieldSpec::choice(
            "analysis_method",
            &["five_whys", "fishbone", "timeline", "fault_tree", "other"],
            "Method",
        ))
        .field(FieldSpec::text("root_cause_summary", "Findings"))
        .field(FieldSpec::date("due_date", "Due date").not_past())
        .field(
            FieldSpec::choice(
                "status",
                &["assigned", "in_progress", "completed", "approved"],
                "Analysis status",
            )
            .default(json!("assigned")),
        )
        .machine(state::root_cause_analysis())
        .rule(completion_has_summary)
}

fn completion_has_summary(
    _ctx: &RuleContext<'_>,
    row: &mut Row,
) -> Result<Vec<CoupledWrite>, ToolError> {
    let done = matches!(row_str(row, "status"), Some("completed" | "approved"));
    if done && is_blank(row.get("root_cause_summary")) {
        return Err(ToolError::BusinessRule(
            "root_cause_summary is required to complete a root cause analysis".to_string(),
        ));
    }
    Ok(Vec::new())
}

pub fn post_incident_reviews() -> EntitySpec {
    EntitySpec::new("post_incident_reviews", "review", "review_id", "Post-incident review")
        .field(
            FieldSpec::id(
                "incident_id",
                Reference::to("incidents", "Incident").when("status", &["resolved", "closed"]),
                "Reviewed incident",
            )
            .required()
            .fixed(),
        )
        .field(FieldSpec::date("scheduled_date", "Review date").required())
        .field(
            FieldSpec::id("facilitator_id", Reference::user(), "Facilitator")
                .required(),
        )
        .field(
            FieldSpec::integer("timeline_accuracy_rating", "1 (poor) to 5 (exact)")
                .bounds(Bounds::between(1.0, 5.0)),
        )
        .field(FieldSpec::text("lessons_learned", "What to keep or change"))
        .field(FieldSpec::text("action_items", "Follow-up work"))
        .field(
            FieldSpec::choice(
                "status",
                &["scheduled", "in_progress", "completed", "cancelled"],
                "Review status",
            )
            .default(json!("scheduled")),
        )
        .unique(&["incident_id"])
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use crate::clock::INCIDENT_TIMESTAMP;
    use crate::suites::testing::{call, router, seed};
    use crate::suites::Suite;

    fn base() -> Value {
        json!({
            "users": {
                "1": {"role": "incident_manager", "status": "active"},
                "2": {"role": "client_contact", "status": "active"}
            },
            "incidents": {
                "1": {"incident_number": "INC0000001", "severity": "P1", "status": "closed"},
                "2": {"incident_number": "INC0000002", "severity": "P1", "status": "in_progress"},
                "3": {"incident_number": "INC0000003", "severity": "P3", "status": "resolved"}
            }
        })
    }

    fn bridge_args(incident: &str) -> Value {
        json!({"action": "create", "bridge_data": {
            "incident_id": incident, "bridge_type": "major_incident", "host_user_id": "1"
        }})
    }

    #[test]
    fn test_bridge_requires_open_incident() {
        let router = router(Suite::Incident);
        let mut db = seed(base());
        let out = call(&router, &mut db, "manage_bridge", bridge_args("1"));
        assert_eq!(out["success"], json!(false));
        assert!(out["error"].as_str().unwrap().contains("has invalid status"));
        assert!(db.table("bridges").is_none());

        let out = call(&router, &mut db, "manage_bridge", bridge_args("2"));
        assert_eq!(out["success"], json!(true), "{out}");
        assert_eq!(out["bridge_id"], json!("1"));
        assert_eq!(out["bridge_data"]["bridge_number"], json!("BRG0000001"));
        assert_eq!(out["bridge_data"]["status"], json!("active"));
    }

    #[test]
    fn test_bridge_close_and_participants() {
        let router = router(Suite::Incident);
        let mut db = seed(base());
        call(&router, &mut db, "manage_bridge", bridge_args("2"));
        let join = json!({"action": "create", "participant_data": {"bridge_id": "1", "user_id": "2"}});
        let out = call(&router, &mut db, "manage_bridge_participant", join.clone());
        assert_eq!(out["participant_data"]["participant_role"], json!("observer"));
        let out = call(&router, &mut db, "manage_bridge_participant", join.clone());
        assert_eq!(
            out["error"],
            json!("Halt: Bridge participant already exists for bridge_id '1' and user_id '2'")
        );

        let out = call(&router, &mut db, "manage_bridge", json!({"action": "close", "bridge_id": "1"}));
        assert_eq!(out["bridge_data"]["closed_at"], json!(INCIDENT_TIMESTAMP));
        let out = call(
            &router,
            &mut db,
            "manage_bridge",
            json!({"action": "update", "bridge_id": "1", "bridge_data": {"status": "active"}}),
        );
        assert_eq!(out["error"], json!("Halt: Invalid status transition"));
    }

    #[test]
    fn test_rca_requires_major_resolved_incident() {
        let router = router(Suite::Incident);
        let mut db = seed(base());
        let rca = |incident: &str| {
            json!({"action": "create", "rca_data": {
                "incident_id": incident, "rca_title": "Outage", "assigned_to": "1"
            }})
        };
        let out = call(&router, &mut db, "manage_root_cause_analysis", rca("3"));
        assert_eq!(
            out["error"],
            json!("Halt: Incident 3 has invalid severity 'P3' for this operation; expected one of: P1, P2")
        );
        let out = call(&router, &mut db, "manage_root_cause_analysis", rca("2"));
        assert_eq!(
            out["error"],
            json!("Halt: Incident 2 has invalid status 'in_progress' for this operation; expected one of: resolved, closed")
        );
        let out = call(&router, &mut db, "manage_root_cause_analysis", rca("1"));
        assert_eq!(out["rca_data"]["rca_number"], json!("RCA0000001"));

        let advance = |status: &str| {
            json!({"action": "update", "rca_id": "1", "rca_data": {"status": status}})
        };
        call(&router, &mut db, "manage_root_cause_analysis", advance("in_progress"));
        let out = call(&router, &mut db, "manage_root_cause_analysis", advance("completed"));
        assert_eq!(
            out["error"],
            json!("Halt: root_cause_summary is required to complete a root cause analysis")
        );
    }

    #[test]
    fn test_one_review_per_incident() {
        let router = router(Suite::Incident);
        let mut db = seed(base());
        let review = json!({"action": "create", "review_data": {
            "incident_id": "1", "scheduled_date": "2025-10-09", "facilitator_id": "1"
        }});
        let out = call(&router, &mut db, "manage_post_incident_review", review.clone());
        assert_eq!(out["success"], json!(true), "{out}");
        let out = call(&router, &mut db, "manage_post_incident_review", review);
        assert_eq!(
            out["error"],
            json!("Halt: Post-incident review with incident_id '1' already exists")
        );
    }
}
