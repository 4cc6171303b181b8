//! Candidates, requisitions, postings, applications and interviews.

use serde_json::json;

use crate::db::{Row, RowKey};
use crate::error::ToolError;
use crate::schema::state::{self, APPLICATION_STATES};
use crate::schema::{
    row_str, Bounds, CoupledWrite, EntitySpec, FieldSpec, Gate, Operation, Reference, RuleContext,
    Trigger,
};

/// Application states an interview may be scheduled from.
const SHORTLISTED: &[&str] = &["screening", "interviewing"];

pub fn candidates() -> EntitySpec {
    EntitySpec::new("candidates", "candidate", "candidate_id", "Candidate")
        .field(FieldSpec::text("first_name", "Given name").required())
        .field(FieldSpec::text("last_name", "Family name").required())
        .field(FieldSpec::email("email", "Contact email; unique").required())
        .field(FieldSpec::text("phone_number", "Contact phone; unique"))
        .field(FieldSpec::text("linkedin_url", "Profile URL; unique"))
        .field(FieldSpec::choice(
            "source",
            &["referral", "job_board", "linkedin", "career_site", "agency", "other"],
            "How the candidate was sourced",
        ))
        .field(FieldSpec::text("current_location", "City / country"))
        .field(
            FieldSpec::number("years_of_experience", "Years of experience")
                .bounds(Bounds::non_negative()),
        )
        .field(
            FieldSpec::choice(
                "status",
                &["active", "inactive", "hired", "do_not_contact"],
                "Candidate status",
            )
            .default(json!("active")),
        )
        .unique_ci(&["email"])
        .unique(&["phone_number"])
        .unique_ci(&["linkedin_url"])
}

pub fn job_requisitions() -> EntitySpec {
    EntitySpec::new("job_requisitions", "requisition", "requisition_id", "Job requisition")
        .field(
            FieldSpec::id("position_id", Reference::to("job_positions", "Job position"), "Position to fill")
                .required()
                .fixed(),
        )
        .field(
            FieldSpec::id(
                "department_id",
                Reference::to("departments", "Department").when("status", &["active"]),
                "Hiring department",
            )
            .required(),
        )
        .field(
            FieldSpec::id(
                "hiring_manager_id",
                Reference::user().roles(&["hiring_manager", "department_manager", "hr_manager"]),
                "User who owns the hire",
            )
            .required(),
        )
        .field(
            FieldSpec::integer("headcount", "Number of openings")
                .required()
                .bounds(Bounds::at_least(1.0)),
        )
        .field(FieldSpec::number("budget_max", "Maximum salary budget").bounds(Bounds::non_negative()))
        .field(FieldSpec::date("target_start_date", "Desired start date").not_past())
        .field(FieldSpec::text("justification", "Business case"))
        .field(
            FieldSpec::choice(
                "status",
                &["draft", "pending_approval", "approved", "rejected", "closed"],
                "Requisition status; approving needs job_requisition_approval",
            )
            .default(json!("draft")),
        )
        .gate(Gate::Recorded {
            action: "job_requisition_approval",
            trigger: Trigger::FieldBecomes {
                field: "status",
                value: "approved",
            },
        })
}

pub fn job_postings() -> EntitySpec {
    EntitySpec::new("job_postings", "posting", "posting_id", "Job posting")
        .field(
            FieldSpec::id(
                "requisition_id",
                Reference::to("job_requisitions", "Job requisition").when("status", &["approved"]),
                "Approved requisition",
            )
            .required()
            .fixed(),
        )
        .field(FieldSpec::text("title", "Posting title").required())
        .field(FieldSpec::text("description", "Posting body"))
        .field(
            FieldSpec::choice("posting_channel", &["internal", "external", "both"], "Audience")
                .default(json!("external")),
        )
        .field(FieldSpec::date("posted_date", "Date published"))
        .field(FieldSpec::date("closing_date", "Date applications close"))
        .field(
            FieldSpec::choice("status", &["draft", "active", "closed"], "Posting status")
                .default(json!("draft")),
        )
        .ordered("posted_date", "closing_date")
}

pub fn applications() -> EntitySpec {
    EntitySpec::new("applications", "application", "application_id", "Application")
        .field(
            FieldSpec::id(
                "candidate_id",
                Reference::to("candidates", "Candidate").when("status", &["active"]),
                "Applicant",
            )
            .required()
            .fixed(),
        )
        .field(
            FieldSpec::id(
                "posting_id",
                Reference::to("job_postings", "Job posting").when("status", &["active"]),
                "Posting applied to",
            )
            .required()
            .fixed(),
        )
        .field(FieldSpec::date("application_date", "Date received").required().not_future())
        .field(
            FieldSpec::number("ai_screening_score", "Automated screening score")
                .bounds(Bounds::between(0.0, 100.0)),
        )
        .field(FieldSpec::text("cover_letter", "Cover letter"))
        .field(
            FieldSpec::choice(
                "status",
                APPLICATION_STATES,
                "Pipeline stage; moves forward one step at a time",
            )
            .default(json!("submitted")),
        )
        .unique(&["candidate_id", "posting_id"])
        .machine(state::application())
}

pub fn interviews() -> EntitySpec {
    EntitySpec::new("interviews", "interview", "interview_id", "Interview")
        .field(
            FieldSpec::id(
                "application_id",
                Reference::to("applications", "Application").when("status", SHORTLISTED),
                "Application in screening or interviewing",
            )
            .required()
            .fixed(),
        )
        .field(
            FieldSpec::choice(
                "interview_type",
                &["phone_screen", "technical", "behavioral", "panel", "final"],
                "Round",
            )
            .required(),
        )
        .field(FieldSpec::date("scheduled_date", "Interview date").required().not_past())
        .field(FieldSpec::time("start_time", "Start time (HH:MM)"))
        .field(FieldSpec::integer("duration_minutes", "Length").bounds(Bounds::positive()))
        .field(FieldSpec::text("location", "Room or video link"))
        .field(
            FieldSpec::choice(
                "status",
                &["scheduled", "completed", "cancelled", "no_show"],
                "Interview status",
            )
            .default(json!("scheduled")),
        )
        .field(FieldSpec::choice(
            "recommendation",
            &["strong_hire", "hire", "lean_hire", "no_hire", "strong_no_hire"],
            "Outcome; recording it completes the interview and advances the application",
        ))
        .field(FieldSpec::number("technical_score", "0 to 10").bounds(Bounds::between(0.0, 10.0)))
        .field(FieldSpec::number("communication_score", "0 to 10").bounds(Bounds::between(0.0, 10.0)))
        .field(FieldSpec::number("overall_rating", "1 to 5").bounds(Bounds::between(1.0, 5.0)))
        .field(FieldSpec::text("feedback", "Interviewer notes"))
        .machine(state::interview())
        .rule(advance_to_interviewing)
        .rule(record_outcome)
}

pub fn panel_members() -> EntitySpec {
    EntitySpec::new("interview_panel_members", "panel_member", "panel_member_id", "Panel member")
        .field(
            FieldSpec::id(
                "interview_id",
                Reference::to("interviews", "Interview").when("status", &["scheduled"]),
                "Scheduled interview",
            )
            .required()
            .fixed(),
        )
        .field(
            FieldSpec::id("interviewer_id", Reference::user(), "Interviewing user")
                .required()
                .fixed(),
        )
        .field(
            FieldSpec::choice("panel_role", &["lead", "member", "shadow", "observer"], "Role on the panel")
                .default(json!("member")),
        )
        .unique(&["interview_id", "interviewer_id"])
}

fn application_patch(id: &str, status: &str) -> CoupledWrite {
    let mut changes = Row::new();
    changes.insert("status".to_string(), json!(status));
    CoupledWrite::Patch {
        table: "applications",
        key: RowKey::from(id),
        changes,
    }
}

fn advance_to_interviewing(ctx: &RuleContext<'_>, row: &mut Row) -> Result<Vec<CoupledWrite>, ToolError> {
    if !ctx.op.is_create() {
        return Ok(Vec::new());
    }
    let id = row_str(row, "application_id").unwrap_or_default();
    let status = ctx
        .db
        .get("applications", &RowKey::from(id))
        .and_then(|a| row_str(a, "status"));
    if status == Some("screening") {
        return Ok(vec![application_patch(id, "interviewing")]);
    }
    Ok(Vec::new())
}

/// A recommendation on a scheduled interview completes it and moves the
/// application to offer or rejection. A completed interview may revise its
/// recommendation without touching the application again.
fn record_outcome(ctx: &RuleContext<'_>, row: &mut Row) -> Result<Vec<CoupledWrite>, ToolError> {
    let Operation::Update { prior, .. } = ctx.op else {
        return Ok(Vec::new());
    };
    let Some(recommendation) = row_str(row, "recommendation").map(str::to_string) else {
        return Ok(Vec::new());
    };
    if row_str(prior, "recommendation") == Some(recommendation.as_str()) {
        return Ok(Vec::new());
    }
    if row_str(row, "status") == Some("scheduled") {
        row.insert("status".to_string(), json!("completed"));
    }
    if let Some(status) = row_str(row, "status").filter(|s| *s != "completed") {
        return Err(ToolError::BusinessRule(format!(
            "Cannot record a recommendation for a {status} interview"
        )));
    }
    if row_str(prior, "status") != Some("scheduled") {
        return Ok(Vec::new());
    }

    let is_final = row_str(row, "interview_type") == Some("final");
    let target = match recommendation.as_str() {
        "strong_hire" | "hire" => "offer_made",
        "lean_hire" if is_final => "offer_made",
        "no_hire" | "strong_no_hire" => "rejected",
        _ => return Ok(Vec::new()),
    };
    let id = row_str(row, "application_id").unwrap_or_default();
    let current = ctx
        .db
        .get("applications", &RowKey::from(id))
        .and_then(|a| row_str(a, "status"));
    match current {
        Some(status) if status != target && state::application().allows(status, target) => {
            Ok(vec![application_patch(id, target)])
        }
        _ => Ok(Vec::new()),
    }
}
