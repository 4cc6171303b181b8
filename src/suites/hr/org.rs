//! Users, departments, positions and skills.

use serde_json::json;

use crate::db::Row;
use crate::error::ToolError;
use crate::schema::{
    row_f64, Bounds, CoupledWrite, EntitySpec, FieldSpec, Reference, RuleContext,
};

pub const USER_ROLES: &[&str] = &[
    "employee",
    "hr_manager",
    "hr_director",
    "hr_admin",
    "finance_officer",
    "payroll_administrator",
    "hiring_manager",
    "recruiter",
    "department_manager",
    "compliance_officer",
];

const ACTIVE: &[&str] = &["active"];

pub fn users() -> EntitySpec {
    EntitySpec::new("users", "user", "user_id", "User")
        .field(FieldSpec::text("first_name", "Given name").required())
        .field(FieldSpec::text("last_name", "Family name").required())
        .field(FieldSpec::email("email", "Login email; unique, case-insensitive").required())
        .field(FieldSpec::choice("role", USER_ROLES, "Access role").required())
        .field(FieldSpec::text("phone_number", "Contact phone"))
        .field(FieldSpec::text("timezone", "IANA timezone name"))
        .field(
            FieldSpec::choice("status", &["active", "inactive", "suspended"], "Account status")
                .default(json!("active")),
        )
        .field(FieldSpec::boolean("mfa_enabled", "Multi-factor authentication").default(json!(false)))
        .unique_ci(&["email"])
}

pub fn departments() -> EntitySpec {
    EntitySpec::new("departments", "department", "department_id", "Department")
        .field(FieldSpec::text("department_name", "Department name").required())
        .field(FieldSpec::id(
            "manager_id",
            Reference::user().roles(&["department_manager", "hr_manager", "hr_director"]),
            "User who heads the department",
        ))
        .field(FieldSpec::number("budget", "Annual budget").bounds(Bounds::non_negative()))
        .field(FieldSpec::text("location", "Office location"))
        .field(
            FieldSpec::choice("status", &["active", "inactive"], "Department status")
                .default(json!("active")),
        )
        .unique_ci(&["department_name"])
}

pub fn job_positions() -> EntitySpec {
    EntitySpec::new("job_positions", "position", "position_id", "Job position")
        .field(FieldSpec::text("title", "Position title").required())
        .field(
            FieldSpec::id(
                "department_id",
                Reference::to("departments", "Department").when("status", ACTIVE),
                "Owning department",
            )
            .required(),
        )
        .field(
            FieldSpec::choice(
                "job_level",
                &["entry", "junior", "mid", "senior", "lead", "manager", "director", "executive"],
                "Seniority band",
            )
            .required(),
        )
        .field(
            FieldSpec::choice(
                "employment_type",
                &["full_time", "part_time", "contract", "intern", "temporary"],
                "Employment type",
            )
            .required(),
        )
        .field(FieldSpec::number("hourly_rate_min", "Lowest hourly rate").bounds(Bounds::non_negative()))
        .field(FieldSpec::number("hourly_rate_max", "Highest hourly rate").bounds(Bounds::non_negative()))
        .field(
            FieldSpec::choice("status", &["draft", "open", "closed"], "Position status")
                .default(json!("draft")),
        )
        .rule(rate_range)
}

fn rate_range(_ctx: &RuleContext<'_>, row: &mut Row) -> Result<Vec<CoupledWrite>, ToolError> {
    if let (Some(min), Some(max)) = (row_f64(row, "hourly_rate_min"), row_f64(row, "hourly_rate_max")) {
        if min > max {
            return Err(ToolError::BusinessRule(
                "hourly_rate_min cannot exceed hourly_rate_max".to_string(),
            ));
        }
    }
    Ok(Vec::new())
}

pub fn skills() -> EntitySpec {
    EntitySpec::new("skills", "skill", "skill_id", "Skill")
        .field(FieldSpec::text("skill_name", "Skill name").required())
        .field(FieldSpec::text("category", "Skill family"))
        .field(
            FieldSpec::choice("status", &["active", "inactive"], "Skill status")
                .default(json!("active")),
        )
        .unique_ci(&["skill_name"])
}

pub fn position_skills() -> EntitySpec {
    EntitySpec::new("job_position_skills", "position_skill", "position_skill_id", "Position skill")
        .field(
            FieldSpec::id("position_id", Reference::to("job_positions", "Job position"), "Position")
                .required()
                .fixed(),
        )
        .field(
            FieldSpec::id(
                "skill_id",
                Reference::to("skills", "Skill").when("status", ACTIVE),
                "Skill",
            )
            .required()
            .fixed(),
        )
        .field(
            FieldSpec::choice(
                "proficiency_level",
                &["beginner", "intermediate", "advanced", "expert"],
                "Expected proficiency",
            )
            .required(),
        )
        .field(FieldSpec::boolean("is_required", "Must-have rather than nice-to-have").default(json!(true)))
        .unique(&["position_id", "skill_id"])
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::suites::testing::{call, router, seed};
    use crate::suites::Suite;

    #[test]
    fn test_user_email_unique_case_insensitive() {
        let router = router(Suite::Hr);
        let mut db = seed(json!({"users": {"1": {"email": "Ann@corp.com", "status": "active"}}}));
        let out = call(
            &router,
            &mut db,
            "manage_user",
            json!({"action": "create", "user_data": {
                "first_name": "Ann", "last_name": "Lee", "email": "ann@CORP.com", "role": "employee"
            }}),
        );
        assert_eq!(
            out["error"],
            json!("Halt: User with email 'ann@CORP.com' already exists")
        );
    }

    #[test]
    fn test_user_create_defaults() {
        let router = router(Suite::Hr);
        let mut db = seed(json!({}));
        let out = call(
            &router,
            &mut db,
            "manage_user",
            json!({"action": "create", "user_data": {
                "first_name": "Bo", "last_name": "Kim", "email": "bo@corp.com", "role": "recruiter"
            }}),
        );
        assert_eq!(out["success"], json!(true), "{out}");
        assert_eq!(out["user_id"], json!("1"));
        assert_eq!(out["user_data"]["status"], json!("active"));
        assert_eq!(out["user_data"]["mfa_enabled"], json!(false));
        assert_eq!(out["user_data"]["timezone"], json!(null));
    }

    #[test]
    fn test_position_rate_range_and_department_state() {
        let router = router(Suite::Hr);
        let mut db = seed(json!({"departments": {
            "1": {"department_name": "Ops", "status": "active"},
            "2": {"department_name": "Old", "status": "inactive"}
        }}));
        let base = json!({"title": "Analyst", "job_level": "mid", "employment_type": "full_time"});
        let mut data = base.clone();
        data["department_id"] = json!("2");
        let out = call(&router, &mut db, "manage_job_position", json!({"action": "create", "position_data": data}));
        assert_eq!(
            out["error"],
            json!("Halt: Department 2 has invalid status 'inactive' for this operation; expected one of: active")
        );

        let mut data = base;
        data["department_id"] = json!(1);
        data["hourly_rate_min"] = json!(50);
        data["hourly_rate_max"] = json!(40);
        let out = call(&router, &mut db, "manage_job_position", json!({"action": "create", "position_data": data}));
        assert_eq!(
            out["error"],
            json!("Halt: hourly_rate_min cannot exceed hourly_rate_max")
        );
    }

    #[test]
    fn test_position_skill_composite_unique() {
        let router = router(Suite::Hr);
        let mut db = seed(json!({
            "job_positions": {"1": {"title": "Dev"}},
            "skills": {"3": {"skill_name": "Rust", "status": "active"}},
            "job_position_skills": {"1": {"position_id": "1", "skill_id": "3"}}
        }));
        let out = call(
            &router,
            &mut db,
            "manage_position_skill",
            json!({"action": "create", "position_id": "1", "skill_id": "3", "proficiency_level": "expert"}),
        );
        assert_eq!(
            out["error"],
            json!("Halt: Position skill already exists for position_id '1' and skill_id '3'")
        );
    }
}
