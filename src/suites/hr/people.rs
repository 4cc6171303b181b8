//! Employees and the records hanging off them: benefits, training,
//! reviews, leave and timesheets.

use chrono::NaiveTime;
use serde_json::json;

use crate::db::{Row, RowKey};
use crate::error::ToolError;
use crate::schema::state;
use crate::schema::{
    is_blank, row_str, Bounds, CoupledWrite, EntitySpec, FieldSpec, Gate, Operation, Reference,
    RuleContext, Trigger,
};
use crate::validate::parse_date;

const ACTIVE: &[&str] = &["active"];

fn active_employee() -> Reference {
    Reference::to("employees", "Employee").when("employment_status", ACTIVE)
}

fn employee_field() -> FieldSpec {
    FieldSpec::id("employee_id", active_employee(), "Employee")
        .required()
        .fixed()
}

pub fn employees() -> EntitySpec {
    EntitySpec::new("employees", "employee", "employee_id", "Employee")
        .field(
            FieldSpec::id("user_id", Reference::user(), "Login account of the employee")
                .required()
                .fixed(),
        )
        .field(
            FieldSpec::id("position_id", Reference::to("job_positions", "Job position"), "Position held")
                .required(),
        )
        .field(
            FieldSpec::id(
                "department_id",
                Reference::to("departments", "Department").when("status", ACTIVE),
                "Department",
            )
            .required(),
        )
        .field(FieldSpec::id("manager_id", active_employee(), "Direct manager (an employee)"))
        .field(FieldSpec::date("hire_date", "First day of work").required().not_future())
        .field(
            FieldSpec::choice(
                "employment_status",
                &["active", "on_leave", "terminated"],
                "Employment status; terminating needs employee_termination approval",
            )
            .default(json!("active")),
        )
        .field(FieldSpec::text("work_location", "Office or remote"))
        .field(FieldSpec::number("base_salary", "Annual base salary").bounds(Bounds::non_negative()))
        .field(FieldSpec::date("termination_date", "Last day of work"))
        .unique(&["user_id"])
        .ordered("hire_date", "termination_date")
        .gate(Gate::Recorded {
            action: "employee_termination",
            trigger: Trigger::FieldBecomes {
                field: "employment_status",
                value: "terminated",
            },
        })
        .rule(not_own_manager)
}

fn not_own_manager(ctx: &RuleContext<'_>, row: &mut Row) -> Result<Vec<CoupledWrite>, ToolError> {
    if let (Some(key), Some(manager)) = (ctx.op.key(), row_str(row, "manager_id")) {
        if key.as_str() == manager {
            return Err(ToolError::BusinessRule(
                "Employee cannot be their own manager".to_string(),
            ));
        }
    }
    Ok(Vec::new())
}

pub fn benefits_plans() -> EntitySpec {
    EntitySpec::new("benefits_plans", "plan", "plan_id", "Benefits plan")
        .field(FieldSpec::text("plan_name", "Plan name").required())
        .field(
            FieldSpec::choice(
                "plan_type",
                &["health", "dental", "vision", "life", "retirement", "disability", "wellness"],
                "Kind of benefit",
            )
            .required(),
        )
        .field(FieldSpec::text("provider", "Insurer or provider"))
        .field(FieldSpec::number("employer_cost", "Employer share per period").bounds(Bounds::non_negative()))
        .field(FieldSpec::number("employee_cost", "Employee share per period").bounds(Bounds::non_negative()))
        .field(FieldSpec::text("coverage_details", "What the plan covers"))
        .field(FieldSpec::date("effective_date", "Start of coverage").required())
        .field(FieldSpec::date("expiration_date", "End of coverage"))
        .field(
            FieldSpec::choice("status", &["active", "inactive"], "Plan status")
                .default(json!("active")),
        )
        .unique_ci(&["plan_name"])
        .ordered("effective_date", "expiration_date")
        .gate(Gate::Recorded {
            action: "benefits_plan_management",
            trigger: Trigger::Create,
        })
}

pub fn benefits_enrollments() -> EntitySpec {
    EntitySpec::new("employee_benefits", "enrollment", "enrollment_id", "Benefits enrollment")
        .field(employee_field())
        .field(
            FieldSpec::id(
                "plan_id",
                Reference::to("benefits_plans", "Benefits plan").when("status", ACTIVE),
                "Plan",
            )
            .required()
            .fixed(),
        )
        .field(FieldSpec::date("enrollment_date", "Date of enrollment").required())
        .field(
            FieldSpec::choice(
                "coverage_level",
                &["employee_only", "employee_spouse", "employee_children", "family"],
                "Who is covered",
            )
            .required(),
        )
        .field(FieldSpec::text("beneficiary_name", "Named beneficiary"))
        .field(
            FieldSpec::choice("status", &["pending", "active", "terminated"], "Enrollment status")
                .default(json!("pending")),
        )
        .unique(&["employee_id", "plan_id"])
        .machine(state::benefits_enrollment())
}

pub fn trainings() -> EntitySpec {
    EntitySpec::new("employee_training", "training", "training_id", "Training record")
        .field(employee_field())
        .field(FieldSpec::text("training_name", "Course name").required())
        .field(FieldSpec::text("provider", "Course provider"))
        .field(FieldSpec::date("start_date", "Course start").required())
        .field(FieldSpec::date("completion_date", "Course completion"))
        .field(
            FieldSpec::choice(
                "status",
                &["enrolled", "in_progress", "completed", "failed", "cancelled"],
                "Training status",
            )
            .default(json!("enrolled")),
        )
        .field(FieldSpec::number("score", "Final score").bounds(Bounds::between(0.0, 100.0)))
        .ordered("start_date", "completion_date")
        .rule(completion_recorded)
}

fn completion_recorded(_ctx: &RuleContext<'_>, row: &mut Row) -> Result<Vec<CoupledWrite>, ToolError> {
    if row_str(row, "status") == Some("completed") && is_blank(row.get("completion_date")) {
        return Err(ToolError::BusinessRule(
            "completion_date is required when status is completed".to_string(),
        ));
    }
    Ok(Vec::new())
}

pub fn performance_reviews() -> EntitySpec {
    EntitySpec::new("performance_reviews", "review", "review_id", "Performance review")
        .field(employee_field())
        .field(
            FieldSpec::id(
                "reviewer_id",
                Reference::to("employees", "Reviewer").when("employment_status", ACTIVE),
                "Reviewing employee; must be the direct manager",
            )
            .required()
            .fixed(),
        )
        .field(FieldSpec::date("review_period_start", "Period start").required().fixed())
        .field(FieldSpec::date("review_period_end", "Period end").required().fixed())
        .field(FieldSpec::integer("overall_rating", "Rating from 1 to 5").bounds(Bounds::between(1.0, 5.0)))
        .field(FieldSpec::text("comments", "Reviewer comments"))
        .field(
            FieldSpec::choice("status", &["draft", "submitted", "approved"], "Review status")
                .default(json!("draft")),
        )
        .unique(&["employee_id", "review_period_start", "review_period_end"])
        .ordered("review_period_start", "review_period_end")
        .machine(state::performance_review())
        .rule(reviewer_is_manager)
}

fn reviewer_is_manager(ctx: &RuleContext<'_>, row: &mut Row) -> Result<Vec<CoupledWrite>, ToolError> {
    if !ctx.op.is_create() {
        return Ok(Vec::new());
    }
    let employee = row_str(row, "employee_id").unwrap_or_default();
    let reviewer = row_str(row, "reviewer_id").unwrap_or_default();
    let manager = ctx
        .db
        .get("employees", &RowKey::from(employee))
        .and_then(|e| row_str(e, "manager_id"));
    if manager != Some(reviewer) {
        return Err(ToolError::BusinessRule(format!(
            "Reviewer {reviewer} is not the direct manager of employee {employee}"
        )));
    }
    Ok(Vec::new())
}

pub fn leave_requests() -> EntitySpec {
    EntitySpec::new("leave_requests", "leave", "leave_id", "Leave request")
        .field(employee_field())
        .field(
            FieldSpec::choice(
                "leave_type",
                &["annual", "sick", "personal", "parental", "bereavement", "unpaid"],
                "Kind of leave",
            )
            .required(),
        )
        .field(FieldSpec::date("start_date", "First day off").required())
        .field(FieldSpec::date("end_date", "Last day off").required())
        .field(
            FieldSpec::number("days_requested", "Working days; computed from the dates when omitted")
                .bounds(Bounds::positive()),
        )
        .field(FieldSpec::text("reason", "Reason for leave"))
        .field(
            FieldSpec::choice("status", &["pending", "approved", "rejected", "cancelled"], "Request status")
                .default(json!("pending")),
        )
        .field(FieldSpec::id(
            "approved_by",
            Reference::user().roles(&["hr_manager", "hr_director", "department_manager"]),
            "User deciding the request",
        ))
        .ordered("start_date", "end_date")
        .machine(state::leave_request())
        .rule(leave_days)
        .rule(leave_overlap)
        .rule(decision_has_approver)
}

/// Derive `days_requested` from the dates when it is omitted, or when an
/// update moves the dates without restating it.
fn leave_days(ctx: &RuleContext<'_>, row: &mut Row) -> Result<Vec<CoupledWrite>, ToolError> {
    let stale = match ctx.op {
        Operation::Create => false,
        Operation::Update { prior, .. } => {
            let moved = ["start_date", "end_date"]
                .iter()
                .any(|f| row.get(*f) != prior.get(*f));
            moved && row.get("days_requested") == prior.get("days_requested")
        }
    };
    if !stale && !is_blank(row.get("days_requested")) {
        return Ok(Vec::new());
    }
    let start = row_str(row, "start_date").and_then(parse_date);
    let end = row_str(row, "end_date").and_then(parse_date);
    if let (Some(start), Some(end)) = (start, end) {
        let days = (end - start).num_days() + 1;
        row.insert("days_requested".to_string(), json!(days));
    }
    Ok(Vec::new())
}

fn leave_overlap(ctx: &RuleContext<'_>, row: &mut Row) -> Result<Vec<CoupledWrite>, ToolError> {
    const OPEN: &[&str] = &["pending", "approved"];
    if !row_str(row, "status").is_some_and(|s| OPEN.contains(&s)) {
        return Ok(Vec::new());
    }
    let employee = row_str(row, "employee_id");
    let start = row_str(row, "start_date").and_then(parse_date);
    let end = row_str(row, "end_date").and_then(parse_date);
    let (Some(start), Some(end)) = (start, end) else {
        return Ok(Vec::new());
    };
    let clash = ctx
        .db
        .rows(ctx.spec.table)
        .filter(|(key, _)| Some(*key) != ctx.op.key())
        .filter(|(_, other)| row_str(other, "employee_id") == employee)
        .filter(|(_, other)| row_str(other, "status").is_some_and(|s| OPEN.contains(&s)))
        .any(|(_, other)| {
            let other_start = row_str(other, "start_date").and_then(parse_date);
            let other_end = row_str(other, "end_date").and_then(parse_date);
            matches!((other_start, other_end), (Some(s), Some(e)) if start <= e && s <= end)
        });
    if clash {
        return Err(ToolError::Temporal(
            "Leave request overlaps with an existing leave request".to_string(),
        ));
    }
    Ok(Vec::new())
}

/// Approving or rejecting needs a named decision maker.
fn decision_has_approver(ctx: &RuleContext<'_>, row: &mut Row) -> Result<Vec<CoupledWrite>, ToolError> {
    let decided = matches!(row_str(row, "status"), Some("approved" | "rejected"));
    if decided && is_blank(row.get("approved_by")) {
        return Err(ToolError::BusinessRule(format!(
            "approved_by is required to approve or reject a {}",
            ctx.spec.label.to_lowercase()
        )));
    }
    Ok(Vec::new())
}

pub fn timesheets() -> EntitySpec {
    EntitySpec::new("employee_timesheets", "timesheet", "timesheet_id", "Timesheet")
        .field(employee_field())
        .field(FieldSpec::date("work_date", "Day worked").required().fixed().not_future())
        .field(FieldSpec::time("clock_in", "Start time (HH:MM)"))
        .field(FieldSpec::time("clock_out", "End time (HH:MM)"))
        .field(
            FieldSpec::number("total_hours", "Hours worked that day")
                .required()
                .bounds(Bounds::between(0.0, 24.0)),
        )
        .field(FieldSpec::text("project_code", "Charge code"))
        .field(
            FieldSpec::choice("status", &["submitted", "approved", "rejected"], "Timesheet status")
                .default(json!("submitted")),
        )
        .field(FieldSpec::id(
            "approved_by",
            Reference::user().roles(&["hr_manager", "department_manager", "payroll_administrator"]),
            "User deciding the timesheet",
        ))
        .unique(&["employee_id", "work_date"])
        .machine(state::timesheet())
        .rule(clock_order)
        .rule(decision_has_approver)
}

fn clock_order(_ctx: &RuleContext<'_>, row: &mut Row) -> Result<Vec<CoupledWrite>, ToolError> {
    let parse = |field| row_str(row, field).and_then(|s| NaiveTime::parse_from_str(s, "%H:%M").ok());
    if let (Some(start), Some(end)) = (parse("clock_in"), parse("clock_out")) {
        if end <= start {
            return Err(ToolError::Temporal(
                "clock_out must be after clock_in".to_string(),
            ));
        }
    }
    Ok(Vec::new())
}
