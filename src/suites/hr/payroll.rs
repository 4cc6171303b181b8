//! Payroll cycles, inputs, records, earnings and deductions.

use serde_json::{json, Value};

use crate::db::{Row, RowKey};
use crate::error::ToolError;
use crate::schema::state;
use crate::schema::{
    row_f64, row_str, Bounds, CoupledWrite, EntitySpec, FieldSpec, Gate, Reference, RuleContext,
    Trigger,
};
use crate::validate::parse_date;

const ACTIVE_EMPLOYEE: &[&str] = &["active"];
const DRAFT: &[&str] = &["draft"];

fn employee_field() -> FieldSpec {
    FieldSpec::id(
        "employee_id",
        Reference::to("employees", "Employee").when("employment_status", ACTIVE_EMPLOYEE),
        "Employee",
    )
    .required()
    .fixed()
}

fn overlaps(a: (&str, &str), b: (&str, &str)) -> bool {
    match (parse_date(a.0), parse_date(a.1), parse_date(b.0), parse_date(b.1)) {
        (Some(a0), Some(a1), Some(b0), Some(b1)) => a0 <= b1 && b0 <= a1,
        _ => false,
    }
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn payroll_cycles() -> EntitySpec {
    EntitySpec::new("payroll_cycles", "cycle", "cycle_id", "Payroll cycle")
        .field(FieldSpec::date("cycle_start_date", "First day of the cycle").required())
        .field(FieldSpec::date("cycle_end_date", "Last day of the cycle").required())
        .field(
            FieldSpec::choice(
                "frequency",
                &["weekly", "bi_weekly", "semi_monthly", "monthly"],
                "Pay frequency",
            )
            .required(),
        )
        .field(FieldSpec::date("cutoff_date", "Last day inputs are accepted; inside the cycle"))
        .field(FieldSpec::date("pay_date", "Day employees are paid"))
        .field(
            FieldSpec::choice("status", &["open", "processing", "closed"], "Cycle status")
                .default(json!("open")),
        )
        .ordered("cycle_start_date", "cycle_end_date")
        .gate(Gate::Recorded {
            action: "payroll_cycle_management",
            trigger: Trigger::Create,
        })
        .rule(cycle_overlap)
        .rule(cutoff_within_cycle)
}

fn cycle_overlap(ctx: &RuleContext<'_>, row: &mut Row) -> Result<Vec<CoupledWrite>, ToolError> {
    let (Some(start), Some(end)) = (row_str(row, "cycle_start_date"), row_str(row, "cycle_end_date"))
    else {
        return Ok(Vec::new());
    };
    let clash = ctx
        .db
        .rows(ctx.spec.table)
        .filter(|(key, _)| Some(*key) != ctx.op.key())
        .any(|(_, other)| {
            match (row_str(other, "cycle_start_date"), row_str(other, "cycle_end_date")) {
                (Some(s), Some(e)) => overlaps((start, end), (s, e)),
                _ => false,
            }
        });
    if clash {
        return Err(ToolError::Temporal(
            "Overlapping cycles detected - new cycle overlaps with existing cycle".to_string(),
        ));
    }
    Ok(Vec::new())
}

fn cutoff_within_cycle(_ctx: &RuleContext<'_>, row: &mut Row) -> Result<Vec<CoupledWrite>, ToolError> {
    let date = |field| row_str(row, field).and_then(parse_date);
    if let (Some(start), Some(end), Some(cutoff)) =
        (date("cycle_start_date"), date("cycle_end_date"), date("cutoff_date"))
    {
        if cutoff < start || cutoff > end {
            return Err(ToolError::Temporal(
                "cutoff_date must fall within the payroll cycle".to_string(),
            ));
        }
    }
    Ok(Vec::new())
}

pub fn payroll_inputs() -> EntitySpec {
    EntitySpec::new("payroll_inputs", "input", "input_id", "Payroll input")
        .field(employee_field())
        .field(
            FieldSpec::id(
                "cycle_id",
                Reference::to("payroll_cycles", "Payroll cycle").when("status", &["open"]),
                "Open payroll cycle",
            )
            .required()
            .fixed(),
        )
        .field(
            FieldSpec::number("hours_worked", "Regular hours")
                .required()
                .bounds(Bounds::non_negative()),
        )
        .field(
            FieldSpec::number("overtime_hours", "Overtime hours")
                .bounds(Bounds::non_negative())
                .default(json!(0)),
        )
        .field(FieldSpec::number("allowances", "Allowances paid with the cycle").bounds(Bounds::non_negative()))
        .field(FieldSpec::text("notes", "Free text"))
        .field(
            FieldSpec::boolean("manager_approval", "Manager sign-off; needed to submit")
                .default(json!(false)),
        )
        .field(
            FieldSpec::choice("status", &["draft", "submitted", "rejected"], "Input status")
                .default(json!("draft")),
        )
        .unique(&["employee_id", "cycle_id"])
        .machine(state::payroll_input())
        .rule(submission_approved)
}

fn submission_approved(_ctx: &RuleContext<'_>, row: &mut Row) -> Result<Vec<CoupledWrite>, ToolError> {
    if row_str(row, "status") == Some("submitted")
        && row.get("manager_approval") != Some(&Value::Bool(true))
    {
        return Err(ToolError::Unauthorized(
            "Manager approval required to submit payroll input".to_string(),
        ));
    }
    Ok(Vec::new())
}

pub fn payroll_records() -> EntitySpec {
    EntitySpec::new("payroll_records", "payroll", "payroll_id", "Payroll record")
        .field(employee_field())
        .field(
            FieldSpec::id("cycle_id", Reference::to("payroll_cycles", "Payroll cycle"), "Payroll cycle")
                .fixed(),
        )
        .field(FieldSpec::date("pay_period_start", "Period start").required().fixed())
        .field(FieldSpec::date("pay_period_end", "Period end").required().fixed())
        .field(
            FieldSpec::number("hourly_rate", "Hourly rate")
                .required()
                .bounds(Bounds::positive()),
        )
        .field(FieldSpec::number("hours_worked", "Approved timesheet hours in the period").computed())
        .field(FieldSpec::number("gross_pay", "hours_worked times hourly_rate").computed())
        .field(FieldSpec::date("payment_date", "Day the payroll was paid"))
        .field(
            FieldSpec::choice("status", &["draft", "approved", "paid", "cancelled"], "Payroll status")
                .default(json!("draft")),
        )
        .field(
            FieldSpec::boolean(
                "finance_officer_approval",
                "Finance Officer sign-off; required to create or approve",
            )
            .transient(),
        )
        .ordered("pay_period_start", "pay_period_end")
        .machine(state::payroll_record())
        .rule(payroll_overlap)
        .rule(aggregate_hours)
        .gate(Gate::Flag {
            field: "finance_officer_approval",
            message: "Finance Officer approval required",
            trigger: Trigger::Create,
        })
        .gate(Gate::Flag {
            field: "finance_officer_approval",
            message: "Finance Officer approval required",
            trigger: Trigger::FieldBecomes {
                field: "status",
                value: "approved",
            },
        })
}

fn payroll_overlap(ctx: &RuleContext<'_>, row: &mut Row) -> Result<Vec<CoupledWrite>, ToolError> {
    if !ctx.op.is_create() {
        return Ok(Vec::new());
    }
    let employee = row_str(row, "employee_id").unwrap_or_default();
    let start = row_str(row, "pay_period_start").unwrap_or_default();
    let end = row_str(row, "pay_period_end").unwrap_or_default();
    let clash = ctx
        .db
        .rows(ctx.spec.table)
        .filter(|(_, other)| row_str(other, "employee_id") == Some(employee))
        .filter(|(_, other)| row_str(other, "status") != Some("cancelled"))
        .any(|(_, other)| {
            match (row_str(other, "pay_period_start"), row_str(other, "pay_period_end")) {
                (Some(s), Some(e)) => overlaps((start, end), (s, e)),
                _ => false,
            }
        });
    if clash {
        return Err(ToolError::BusinessRule(format!(
            "Payroll already exists for employee {employee} in an overlapping pay period"
        )));
    }
    Ok(Vec::new())
}

/// Sums approved timesheet hours for the period on create and recomputes
/// gross pay whenever the rate changes.
fn aggregate_hours(ctx: &RuleContext<'_>, row: &mut Row) -> Result<Vec<CoupledWrite>, ToolError> {
    let rate = row_f64(row, "hourly_rate").unwrap_or_default();
    let hours = if ctx.op.is_create() {
        let employee = row_str(row, "employee_id").unwrap_or_default();
        let start = row_str(row, "pay_period_start").unwrap_or_default();
        let end = row_str(row, "pay_period_end").unwrap_or_default();
        let hours: f64 = ctx
            .db
            .rows("employee_timesheets")
            .filter(|(_, t)| row_str(t, "employee_id") == Some(employee))
            .filter(|(_, t)| row_str(t, "status") == Some("approved"))
            .filter(|(_, t)| row_str(t, "work_date").is_some_and(|d| d >= start && d <= end))
            .filter_map(|(_, t)| row_f64(t, "total_hours"))
            .sum();
        if hours <= 0.0 {
            return Err(ToolError::BusinessRule(format!(
                "No approved timesheets found for employee {employee} between {start} and {end}"
            )));
        }
        hours
    } else {
        row_f64(row, "hours_worked").unwrap_or_default()
    };
    row.insert("hours_worked".to_string(), json!(hours));
    row.insert("gross_pay".to_string(), json!(round_cents(hours * rate)));
    Ok(Vec::new())
}

pub fn payroll_earnings() -> EntitySpec {
    EntitySpec::new("payroll_earnings", "earning", "earning_id", "Payroll earning")
        .field(
            FieldSpec::id(
                "payroll_id",
                Reference::to("payroll_records", "Payroll record").when("status", DRAFT),
                "Draft payroll record",
            )
            .required()
            .fixed(),
        )
        .field(
            FieldSpec::choice(
                "earning_type",
                &["bonus", "commission", "overtime", "allowance", "reimbursement", "other"],
                "Kind of earning",
            )
            .required(),
        )
        .field(FieldSpec::number("amount", "Amount").required().bounds(Bounds::positive()))
        .field(FieldSpec::text("description", "Free text"))
}

pub fn payroll_deductions() -> EntitySpec {
    EntitySpec::new("payroll_deductions", "deduction", "deduction_id", "Payroll deduction")
        .field(
            FieldSpec::id(
                "payroll_id",
                Reference::to("payroll_records", "Payroll record").when("status", DRAFT),
                "Draft payroll record",
            )
            .required()
            .fixed(),
        )
        .field(
            FieldSpec::choice(
                "deduction_type",
                &["tax", "social_security", "health_insurance", "retirement", "garnishment", "other"],
                "Kind of deduction",
            )
            .required(),
        )
        .field(FieldSpec::number("amount", "Amount").required().bounds(Bounds::positive()))
        .field(FieldSpec::text("description", "Free text"))
        .rule(deductions_within_gross)
}

fn deductions_within_gross(ctx: &RuleContext<'_>, row: &mut Row) -> Result<Vec<CoupledWrite>, ToolError> {
    let payroll_id = row_str(row, "payroll_id").unwrap_or_default();
    let Some(payroll) = ctx.db.get("payroll_records", &RowKey::from(payroll_id)) else {
        return Ok(Vec::new());
    };
    let sum_for = |table: &str, exclude: Option<&RowKey>| -> f64 {
        ctx.db
            .rows(table)
            .filter(|(key, _)| Some(*key) != exclude)
            .filter(|(_, r)| row_str(r, "payroll_id") == Some(payroll_id))
            .filter_map(|(_, r)| row_f64(r, "amount"))
            .sum()
    };
    let gross = row_f64(payroll, "gross_pay").unwrap_or_default() + sum_for("payroll_earnings", None);
    let deducted = sum_for(ctx.spec.table, ctx.op.key()) + row_f64(row, "amount").unwrap_or_default();
    if deducted > gross {
        return Err(ToolError::BusinessRule(format!(
            "Total deductions ({}) exceed gross pay ({}) for payroll {}",
            round_cents(deducted),
            round_cents(gross),
            payroll_id
        )));
    }
    Ok(Vec::new())
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use crate::clock::HR_TIMESTAMP;
    use crate::db::RowKey;
    use crate::suites::testing::{call, router, seed};
    use crate::suites::Suite;

    fn base() -> Value {
        json!({
            "users": {"1": {"role": "finance_officer", "status": "active"}},
            "employees": {"5": {"user_id": "1", "employment_status": "active"}},
            "employee_timesheets": {
                "1": {"employee_id": "5", "work_date": "2025-01-02", "total_hours": 8, "status": "approved"},
                "2": {"employee_id": "5", "work_date": "2025-01-03", "total_hours": 8, "status": "approved"},
                "3": {"employee_id": "5", "work_date": "2025-01-06", "total_hours": 8, "status": "approved"},
                "4": {"employee_id": "5", "work_date": "2025-01-07", "total_hours": 8, "status": "approved"},
                "5": {"employee_id": "5", "work_date": "2025-01-08", "total_hours": 8, "status": "approved"},
                "6": {"employee_id": "5", "work_date": "2025-01-09", "total_hours": 6, "status": "submitted"},
                "7": {"employee_id": "5", "work_date": "2025-01-20", "total_hours": 8, "status": "approved"}
            }
        })
    }

    fn payroll(approval: bool) -> Value {
        json!({"action": "create", "payroll_data": {
            "employee_id": "5",
            "pay_period_start": "2025-01-01",
            "pay_period_end": "2025-01-14",
            "hourly_rate": 25.0,
            "finance_officer_approval": approval
        }})
    }

    #[test]
    fn test_payroll_create_aggregates_approved_hours() {
        let router = router(Suite::Hr);
        let mut db = seed(base());
        let out = call(&router, &mut db, "manage_payroll", payroll(true));
        assert_eq!(out["success"], json!(true), "{out}");
        assert_eq!(out["action"], json!("create"));
        assert_eq!(out["payroll_id"], json!("1"));
        let data = &out["payroll_data"];
        assert_eq!(data["hours_worked"], json!(40.0));
        assert_eq!(data["gross_pay"], json!(1000.0));
        assert_eq!(data["status"], json!("draft"));
        assert_eq!(data["created_at"], json!(HR_TIMESTAMP));
        assert!(data.get("finance_officer_approval").is_none());
        assert!(db.contains("payroll_records", &RowKey::from("1")));
    }

    #[test]
    fn test_payroll_without_finance_approval_halts() {
        let router = router(Suite::Hr);
        let mut db = seed(base());
        let before = db.keyset("payroll_records");
        let out = call(&router, &mut db, "manage_payroll", payroll(false));
        assert_eq!(
            out,
            json!({"success": false, "error": "Halt: Finance Officer approval required"})
        );
        assert_eq!(db.keyset("payroll_records"), before);
    }

    #[test]
    fn test_payroll_rejects_computed_and_overlap() {
        let router = router(Suite::Hr);
        let mut db = seed(base());
        let mut args = payroll(true);
        args["payroll_data"]["gross_pay"] = json!(5);
        let out = call(&router, &mut db, "manage_payroll", args);
        assert_eq!(out["error"], json!("Halt: Invalid fields for create: gross_pay"));

        call(&router, &mut db, "manage_payroll", payroll(true));
        let out = call(&router, &mut db, "manage_payroll", payroll(true));
        assert_eq!(
            out["error"],
            json!("Halt: Payroll already exists for employee 5 in an overlapping pay period")
        );
    }

    #[test]
    fn test_payroll_without_timesheets() {
        let router = router(Suite::Hr);
        let mut db = seed(base());
        let mut args = payroll(true);
        args["payroll_data"]["pay_period_start"] = json!("2025-02-01");
        args["payroll_data"]["pay_period_end"] = json!("2025-02-14");
        let out = call(&router, &mut db, "manage_payroll", args);
        assert_eq!(
            out["error"],
            json!("Halt: No approved timesheets found for employee 5 between 2025-02-01 and 2025-02-14")
        );
    }

    #[test]
    fn test_payroll_approve_needs_flag_and_rate_recomputes() {
        let router = router(Suite::Hr);
        let mut db = seed(base());
        call(&router, &mut db, "manage_payroll", payroll(true));
        let out = call(
            &router,
            &mut db,
            "manage_payroll",
            json!({"action": "update", "payroll_id": "1", "payroll_data": {"hourly_rate": 30}}),
        );
        assert_eq!(out["payroll_data"]["gross_pay"], json!(1200.0));
        let out = call(
            &router,
            &mut db,
            "manage_payroll",
            json!({"action": "update", "payroll_id": "1", "payroll_data": {"status": "approved"}}),
        );
        assert_eq!(out["error"], json!("Halt: Finance Officer approval required"));
        let out = call(
            &router,
            &mut db,
            "manage_payroll",
            json!({"action": "update", "payroll_id": "1",
                   "payroll_data": {"status": "paid", "finance_officer_approval": true}}),
        );
        assert_eq!(out["error"], json!("Halt: Invalid status transition"));
    }

    #[test]
    fn test_payroll_cycle_overlap_reported_before_approval() {
        let router = router(Suite::Hr);
        let mut db = seed(json!({"payroll_cycles": {"1": {
            "cycle_start_date": "2025-01-01", "cycle_end_date": "2025-01-14",
            "frequency": "bi_weekly", "status": "open"
        }}}));
        let out = call(
            &router,
            &mut db,
            "manage_payroll_cycle",
            json!({"action": "create", "cycle_data": {
                "cycle_start_date": "2025-01-10", "cycle_end_date": "2025-01-24", "frequency": "bi_weekly"
            }}),
        );
        assert_eq!(
            out["error"],
            json!("Halt: Overlapping cycles detected - new cycle overlaps with existing cycle")
        );
        assert_eq!(db.keyset("payroll_cycles"), vec![RowKey::from("1")]);
    }

    #[test]
    fn test_payroll_cycle_needs_both_approvals() {
        let router = router(Suite::Hr);
        let mut db = seed(json!({"approvals": {
            "1": {"action_name": "payroll_cycle Q1", "approver_role": "finance_officer"}
        }}));
        let args = json!({"action": "create", "cycle_data": {
            "cycle_start_date": "2025-02-01", "cycle_end_date": "2025-02-14",
            "frequency": "bi_weekly", "cutoff_date": "2025-02-10"
        }});
        let out = call(&router, &mut db, "manage_payroll_cycle", args.clone());
        assert_eq!(
            out["error"],
            json!("Halt: Approval required for payroll_cycle_management: missing approval from: hr_director")
        );
        db.insert(
            "approvals",
            RowKey::from("2"),
            json!({"action_name": "payroll_cycle Q1", "approver_role": "hr_director"})
                .as_object()
                .cloned()
                .unwrap(),
        );
        let out = call(&router, &mut db, "manage_payroll_cycle", args);
        assert_eq!(out["success"], json!(true), "{out}");

        let out = call(
            &router,
            &mut db,
            "manage_payroll_cycle",
            json!({"action": "create", "cycle_data": {
                "cycle_start_date": "2025-03-01", "cycle_end_date": "2025-03-14",
                "frequency": "bi_weekly", "cutoff_date": "2025-03-20"
            }}),
        );
        assert_eq!(
            out["error"],
            json!("Halt: cutoff_date must fall within the payroll cycle")
        );
    }

    #[test]
    fn test_payroll_input_submission() {
        let router = router(Suite::Hr);
        let mut seeded = base();
        seeded["payroll_cycles"] = json!({"1": {"status": "open"}, "2": {"status": "closed"}});
        let mut db = seed(seeded);
        let out = call(
            &router,
            &mut db,
            "manage_payroll_input",
            json!({"action": "create", "input_data": {"employee_id": "5", "cycle_id": "2", "hours_worked": 10}}),
        );
        assert_eq!(
            out["error"],
            json!("Halt: Payroll cycle 2 has invalid status 'closed' for this operation; expected one of: open")
        );
        let out = call(
            &router,
            &mut db,
            "manage_payroll_input",
            json!({"action": "create", "input_data": {
                "employee_id": "5", "cycle_id": "1", "hours_worked": 10, "status": "submitted"
            }}),
        );
        assert_eq!(
            out["error"],
            json!("Halt: Manager approval required to submit payroll input")
        );
    }

    #[test]
    fn test_deductions_cannot_exceed_gross() {
        let router = router(Suite::Hr);
        let mut seeded = base();
        seeded["payroll_records"] = json!({"1": {"employee_id": "5", "gross_pay": 1000.0, "status": "draft"}});
        seeded["payroll_deductions"] = json!({"1": {"payroll_id": "1", "amount": 900}});
        let mut db = seed(seeded);
        let out = call(
            &router,
            &mut db,
            "manage_payroll_deduction",
            json!({"action": "create", "deduction_data": {"payroll_id": "1", "deduction_type": "tax", "amount": 150}}),
        );
        assert_eq!(
            out["error"],
            json!("Halt: Total deductions (1050) exceed gross pay (1000) for payroll 1")
        );
        let out = call(
            &router,
            &mut db,
            "manage_payroll_deduction",
            json!({"action": "create", "deduction_data": {"payroll_id": "1", "deduction_type": "tax", "amount": 100}}),
        );
        assert_eq!(out["success"], json!(true), "{out}");
    }
}
