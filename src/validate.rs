//! The validation cascade.
//!
//! Each method is one step of the pipeline and reports the first failure it
//! finds, walking fields in declaration order. Managers call the steps in
//! a fixed order so that, between two invalid inputs, the earlier step
//! always wins.

use chrono::{NaiveDate, NaiveTime};
use serde_json::{Number, Value};

use crate::clock::FrozenClock;
use crate::db::{Database, Row, RowKey};
use crate::error::ToolError;
use crate::schema::{is_blank, row_str, DateRule, EntitySpec, FieldKind, FieldSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Create,
    Update,
}

pub struct Validator<'a> {
    spec: &'a EntitySpec,
    db: &'a Database,
    clock: &'a FrozenClock,
}

impl<'a> Validator<'a> {
    pub fn new(spec: &'a EntitySpec, db: &'a Database, clock: &'a FrozenClock) -> Self {
        Self { spec, db, clock }
    }

    /// Mandatory fields present and non-blank. On update only the fields
    /// being changed are checked, so a required field cannot be cleared.
    pub fn check_presence(&self, input: &Row, stage: Stage) -> Result<(), ToolError> {
        let missing: Vec<String> = self
            .spec
            .fields
            .iter()
            .filter(|f| f.required && f.accepts_on_create())
            .filter(|f| match stage {
                Stage::Create => is_blank(input.get(f.name)),
                Stage::Update => input.contains_key(f.name) && is_blank(input.get(f.name)),
            })
            .map(|f| f.name.to_string())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ToolError::MissingFields(missing))
        }
    }

    /// Reject properties outside the action's allow-list.
    pub fn check_allowed(&self, input: &Row, action: &str, stage: Stage) -> Result<(), ToolError> {
        let unexpected: Vec<String> = input
            .keys()
            .filter(|key| match self.spec.get_field(key) {
                Some(field) => match stage {
                    Stage::Create => !field.accepts_on_create(),
                    Stage::Update => !field.accepts_on_update(),
                },
                None => true,
            })
            .cloned()
            .collect();
        if unexpected.is_empty() {
            Ok(())
        } else {
            Err(ToolError::UnexpectedFields {
                action: action.to_string(),
                fields: unexpected,
            })
        }
    }

    /// Type and range checks. Accepted alternative spellings (integer ids,
    /// numeric strings, "true"/"false") are normalized in place.
    pub fn normalize_types(&self, input: &mut Row) -> Result<(), ToolError> {
        for field in &self.spec.fields {
            let Some(value) = input.get_mut(field.name) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            let normalized = coerce(field, value)?;
            *value = normalized;
        }
        Ok(())
    }

    pub fn check_enums(&self, input: &Row) -> Result<(), ToolError> {
        for field in &self.spec.fields {
            let FieldKind::Enum(allowed) = field.kind else {
                continue;
            };
            if let Some(value) = row_str(input, field.name) {
                if !allowed.contains(&value) {
                    return Err(ToolError::InvalidEnum {
                        field: field.name.to_string(),
                        value: value.to_string(),
                        allowed: allowed.iter().map(|s| s.to_string()).collect(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Foreign keys resolve and the referenced rows meet their state
    /// preconditions.
    pub fn check_references(&self, input: &Row) -> Result<(), ToolError> {
        for field in &self.spec.fields {
            let Some(reference) = &field.reference else {
                continue;
            };
            let Some(id) = row_str(input, field.name) else {
                continue;
            };
            let target = self
                .db
                .get(reference.table, &RowKey::from(id))
                .ok_or_else(|| ToolError::NotFound(format!("{} {} not found", reference.label, id)))?;
            for condition in &reference.conditions {
                let actual = row_str(target, condition.field);
                if !actual.is_some_and(|v| condition.allowed.contains(&v)) {
                    return Err(ToolError::InvalidReference(format!(
                        "{} {} has invalid {} '{}' for this operation; expected one of: {}",
                        reference.label,
                        id,
                        condition.field,
                        actual.unwrap_or("null"),
                        condition.allowed.join(", ")
                    )));
                }
            }
        }
        Ok(())
    }

    /// Users acting as approver, manager, host, etc. must be active and,
    /// where declared, hold one of the listed roles.
    pub fn check_actors(&self, input: &Row) -> Result<(), ToolError> {
        for field in &self.spec.fields {
            let Some(reference) = &field.reference else {
                continue;
            };
            let Some(actor) = &reference.actor else {
                continue;
            };
            let Some(id) = row_str(input, field.name) else {
                continue;
            };
            let Some(user) = self.db.get(reference.table, &RowKey::from(id)) else {
                continue;
            };
            if row_str(user, "status") != Some("active") {
                return Err(ToolError::InvalidReference(format!(
                    "{} {} is not active",
                    reference.label, id
                )));
            }
            if let Some(roles) = actor.roles {
                let role = row_str(user, "role").unwrap_or_default();
                if !roles.contains(&role) {
                    return Err(ToolError::InvalidReference(format!(
                        "{} {} does not have a required role ({})",
                        reference.label,
                        id,
                        roles.join(", ")
                    )));
                }
            }
        }
        Ok(())
    }

    /// Uniqueness against the current table, skipping the row being updated.
    pub fn check_unique(&self, candidate: &Row, exclude: Option<&RowKey>) -> Result<(), ToolError> {
        for key in &self.spec.unique {
            if key.fields.iter().any(|f| is_blank(candidate.get(*f))) {
                continue;
            }
            let clash = self
                .db
                .rows(self.spec.table)
                .filter(|(k, _)| Some(*k) != exclude)
                .any(|(_, row)| {
                    key.fields.iter().all(|f| {
                        same_value(candidate.get(*f), row.get(*f), key.case_insensitive)
                    })
                });
            if clash {
                let parts: Vec<String> = key
                    .fields
                    .iter()
                    .map(|f| format!("{} '{}'", f, display(candidate.get(*f))))
                    .collect();
                let message = if parts.len() == 1 {
                    format!("{} with {} already exists", self.spec.label, parts[0])
                } else {
                    format!("{} already exists for {}", self.spec.label, parts.join(" and "))
                };
                return Err(ToolError::Duplicate(message));
            }
        }
        Ok(())
    }

    /// Future/past predicates on supplied dates, then date ordering on the
    /// merged row.
    pub fn check_temporal(&self, input: &Row, candidate: &Row) -> Result<(), ToolError> {
        for field in &self.spec.fields {
            if field.kind != FieldKind::Date || field.date_rule == DateRule::Any {
                continue;
            }
            let Some(date) = row_str(input, field.name).and_then(parse_date) else {
                continue;
            };
            match field.date_rule {
                DateRule::NotFuture if self.clock.is_future(date) => {
                    return Err(ToolError::Temporal(format!(
                        "{} cannot be in the future",
                        field.name
                    )));
                }
                DateRule::NotPast if self.clock.is_past(date) => {
                    return Err(ToolError::Temporal(format!(
                        "{} cannot be in the past",
                        field.name
                    )));
                }
                _ => {}
            }
        }
        for (start, end) in &self.spec.date_order {
            let from = row_str(candidate, start).and_then(parse_date);
            let to = row_str(candidate, end).and_then(parse_date);
            if let (Some(from), Some(to)) = (from, to) {
                if to < from {
                    return Err(ToolError::Temporal(format!(
                        "{end} cannot be before {start}"
                    )));
                }
            }
        }
        Ok(())
    }
}

fn coerce(field: &FieldSpec, value: &Value) -> Result<Value, ToolError> {
    let name = field.name;
    let invalid = |msg: String| ToolError::InvalidValue(msg);
    match field.kind {
        FieldKind::Text | FieldKind::Enum(_) => match value {
            Value::String(_) => Ok(value.clone()),
            _ => Err(invalid(format!("{name} must be a string"))),
        },
        FieldKind::Id => match value {
            Value::String(s) if !s.trim().is_empty() => Ok(Value::String(s.trim().to_string())),
            Value::Number(n) if n.is_u64() => Ok(Value::String(n.to_string())),
            _ => Err(invalid(format!("{name} must be a valid identifier"))),
        },
        FieldKind::Email => match value.as_str() {
            Some(s) if is_email(s.trim()) => Ok(Value::String(s.trim().to_string())),
            _ => Err(invalid(format!("Invalid email format for {name}"))),
        },
        FieldKind::Date => match value.as_str() {
            Some(s) if parse_date(s).is_some() => Ok(value.clone()),
            _ => Err(invalid(format!(
                "Invalid date format for {name}. Expected YYYY-MM-DD"
            ))),
        },
        FieldKind::Time => match value.as_str() {
            Some(s) if NaiveTime::parse_from_str(s, "%H:%M").is_ok() => Ok(value.clone()),
            _ => Err(invalid(format!("Invalid time format for {name}. Expected HH:MM"))),
        },
        FieldKind::Boolean => match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
            Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
            _ => Err(invalid(format!("{name} must be a boolean"))),
        },
        FieldKind::Integer => {
            let number = numeric(value)
                .filter(|n| n.fract() == 0.0)
                .ok_or_else(|| invalid(format!("{name} must be an integer")))?;
            check_bounds(field, number)?;
            Ok(Value::Number(Number::from(number as i64)))
        }
        FieldKind::Number => {
            let number = numeric(value).ok_or_else(|| invalid(format!("{name} must be a number")))?;
            check_bounds(field, number)?;
            match value {
                Value::Number(_) => Ok(value.clone()),
                _ => Number::from_f64(number)
                    .map(Value::Number)
                    .ok_or_else(|| invalid(format!("{name} must be a number"))),
            }
        }
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

fn check_bounds(field: &FieldSpec, number: f64) -> Result<(), ToolError> {
    match field.bounds {
        Some(bounds) if !bounds.contains(number) => {
            Err(ToolError::InvalidValue(bounds.violation(field.name)))
        }
        _ => Ok(()),
    }
}

fn is_email(s: &str) -> bool {
    let mut parts = s.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !s.contains(char::is_whitespace)
        }
        _ => false,
    }
}

/// Parse a canonical `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    if s.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// Equality used by uniqueness checks and finder filters: numbers compare
/// by value, numbers and numeric strings compare by rendering.
pub fn loosely_equal(a: &Value, b: &Value, case_insensitive: bool) -> bool {
    match (a, b) {
        (Value::String(x), Value::String(y)) if case_insensitive => {
            x.to_lowercase() == y.to_lowercase()
        }
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::String(s), Value::Number(n)) | (Value::Number(n), Value::String(s)) => {
            *s == n.to_string()
        }
        _ => a == b,
    }
}

fn same_value(a: Option<&Value>, b: Option<&Value>, case_insensitive: bool) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => loosely_equal(a, b, case_insensitive),
        _ => false,
    }
}

/// Render a value for an error message.
pub fn display(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "null".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::HR_TIMESTAMP;
    use crate::schema::{Bounds, Reference};
    use serde_json::json;

    fn spec() -> EntitySpec {
        EntitySpec::new("employees", "employee", "employee_id", "Employee")
            .field(
                FieldSpec::id(
                    "user_id",
                    Reference::to("users", "User").roles(&["hr_manager"]),
                    "User",
                )
                .required()
                .fixed(),
            )
            .field(FieldSpec::email("work_email", "Email"))
            .field(FieldSpec::date("hire_date", "Hire date").required().not_future())
            .field(FieldSpec::date("end_date", "End date"))
            .field(FieldSpec::number("salary", "Salary").bounds(Bounds::positive()))
            .field(FieldSpec::integer("level", "Level").bounds(Bounds::between(1.0, 5.0)))
            .field(FieldSpec::choice("status", &["active", "terminated"], "Status"))
            .field(FieldSpec::number("score", "Score").computed())
            .unique_ci(&["work_email"])
            .ordered("hire_date", "end_date")
    }

    fn db() -> Database {
        Database::from_json_str(
            r#"{
                "users": {
                    "1": {"status": "active", "role": "hr_manager"},
                    "2": {"status": "inactive", "role": "hr_manager"},
                    "3": {"status": "active", "role": "employee"}
                },
                "employees": {
                    "1": {"user_id": "1", "work_email": "Ann@Corp.com"}
                }
            }"#,
        )
        .unwrap()
    }

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_presence_lists_all_missing() {
        let (spec, db) = (spec(), db());
        let clock = FrozenClock::new(HR_TIMESTAMP).unwrap();
        let v = Validator::new(&spec, &db, &clock);
        let err = v.check_presence(&row(json!({"user_id": " "})), Stage::Create).unwrap_err();
        assert_eq!(err.to_string(), "Halt: Missing mandatory fields: user_id, hire_date");
        assert!(v.check_presence(&row(json!({"salary": 3})), Stage::Update).is_ok());
        assert!(v
            .check_presence(&row(json!({"hire_date": null})), Stage::Update)
            .is_err());
    }

    #[test]
    fn test_allow_list_per_stage() {
        let (spec, db) = (spec(), db());
        let clock = FrozenClock::new(HR_TIMESTAMP).unwrap();
        let v = Validator::new(&spec, &db, &clock);
        let err = v
            .check_allowed(&row(json!({"score": 1, "bogus": 2})), "create", Stage::Create)
            .unwrap_err();
        assert_eq!(err.to_string(), "Halt: Invalid fields for create: bogus, score");
        let err = v
            .check_allowed(&row(json!({"user_id": "1"})), "update", Stage::Update)
            .unwrap_err();
        assert_eq!(err.to_string(), "Halt: Invalid fields for update: user_id");
    }

    #[test]
    fn test_type_normalization() {
        let (spec, db) = (spec(), db());
        let clock = FrozenClock::new(HR_TIMESTAMP).unwrap();
        let v = Validator::new(&spec, &db, &clock);
        let mut input = row(json!({"user_id": 7, "salary": "1200.5", "level": 3.0}));
        v.normalize_types(&mut input).unwrap();
        assert_eq!(input["user_id"], json!("7"));
        assert_eq!(input["salary"], json!(1200.5));
        assert_eq!(input["level"], json!(3));
    }

    #[test]
    fn test_type_and_range_failures() {
        let (spec, db) = (spec(), db());
        let clock = FrozenClock::new(HR_TIMESTAMP).unwrap();
        let v = Validator::new(&spec, &db, &clock);
        let cases = [
            (json!({"salary": 0}), "Halt: salary must be greater than 0"),
            (json!({"level": 6}), "Halt: level must be between 1 and 5"),
            (json!({"level": 2.5}), "Halt: level must be an integer"),
            (json!({"work_email": "nope"}), "Halt: Invalid email format for work_email"),
            (
                json!({"hire_date": "10-01-2025"}),
                "Halt: Invalid date format for hire_date. Expected YYYY-MM-DD",
            ),
        ];
        for (input, expected) in cases {
            let err = v.normalize_types(&mut row(input)).unwrap_err();
            assert_eq!(err.to_string(), expected);
        }
    }

    #[test]
    fn test_enum_check() {
        let (spec, db) = (spec(), db());
        let clock = FrozenClock::new(HR_TIMESTAMP).unwrap();
        let v = Validator::new(&spec, &db, &clock);
        let err = v.check_enums(&row(json!({"status": "fired"}))).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Halt: Invalid status 'fired'. Must be one of: active, terminated"
        );
    }

    #[test]
    fn test_reference_and_actor_checks() {
        let (spec, db) = (spec(), db());
        let clock = FrozenClock::new(HR_TIMESTAMP).unwrap();
        let v = Validator::new(&spec, &db, &clock);
        let err = v.check_references(&row(json!({"user_id": "9"}))).unwrap_err();
        assert_eq!(err.to_string(), "Halt: User 9 not found");
        let err = v.check_actors(&row(json!({"user_id": "2"}))).unwrap_err();
        assert_eq!(err.to_string(), "Halt: User 2 is not active");
        let err = v.check_actors(&row(json!({"user_id": "3"}))).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Halt: User 3 does not have a required role (hr_manager)"
        );
        assert!(v.check_actors(&row(json!({"user_id": "1"}))).is_ok());
    }

    #[test]
    fn test_unique_case_insensitive_and_self_exclusion() {
        let (spec, db) = (spec(), db());
        let clock = FrozenClock::new(HR_TIMESTAMP).unwrap();
        let v = Validator::new(&spec, &db, &clock);
        let candidate = row(json!({"work_email": "ann@corp.com"}));
        let err = v.check_unique(&candidate, None).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Halt: Employee with work_email 'ann@corp.com' already exists"
        );
        assert!(v.check_unique(&candidate, Some(&RowKey::from("1"))).is_ok());
    }

    #[test]
    fn test_temporal_checks() {
        let (spec, db) = (spec(), db());
        let clock = FrozenClock::new(HR_TIMESTAMP).unwrap();
        let v = Validator::new(&spec, &db, &clock);
        let future = row(json!({"hire_date": "2026-01-01"}));
        assert_eq!(
            v.check_temporal(&future, &future).unwrap_err().to_string(),
            "Halt: hire_date cannot be in the future"
        );
        let reversed = row(json!({"hire_date": "2025-01-10", "end_date": "2025-01-01"}));
        assert_eq!(
            v.check_temporal(&reversed, &reversed).unwrap_err().to_string(),
            "Halt: end_date cannot be before hire_date"
        );
    }

    #[test]
    fn test_loosely_equal() {
        assert!(loosely_equal(&json!(5), &json!("5"), false));
        assert!(loosely_equal(&json!(40), &json!(40.0), false));
        assert!(loosely_equal(&json!("A"), &json!("a"), true));
        assert!(!loosely_equal(&json!("A"), &json!("a"), false));
    }
}
