//! Human resources: organization, employees, benefits, payroll and
//! recruitment.

mod org;
mod payroll;
mod people;
mod recruitment;

use std::sync::Arc;

use crate::approval::{ActionPolicy, ApprovalMatrix, Mode, APPROVALS_TABLE};
use crate::schema::{EntitySpec, FieldSpec};
use crate::tools::authenticate::AuthenticateApprovalTool;
use crate::tools::finder::FinderTool;
use crate::tools::manager::{ActionKind, ManagerTool};
use crate::tools::{Tool, ToolContext};

pub fn approvals() -> ApprovalMatrix {
    ApprovalMatrix::new(vec![
        ActionPolicy {
            action: "benefits_plan_management",
            keywords: &["benefits_plan", "benefits plan"],
            mode: Mode::Any,
            roles: &["hr_director", "compliance_officer"],
        },
        ActionPolicy {
            action: "payroll_cycle_management",
            keywords: &["payroll_cycle", "payroll cycle"],
            mode: Mode::All,
            roles: &["finance_officer", "hr_director"],
        },
        ActionPolicy {
            action: "job_requisition_approval",
            keywords: &["requisition"],
            mode: Mode::Any,
            roles: &["hr_director", "department_manager"],
        },
        ActionPolicy {
            action: "employee_termination",
            keywords: &["termination", "offboard"],
            mode: Mode::Single,
            roles: &["hr_director", "hr_manager"],
        },
        ActionPolicy {
            action: "payroll_processing",
            keywords: &["payroll_run", "payroll processing"],
            mode: Mode::Single,
            roles: &["finance_officer", "payroll_administrator"],
        },
    ])
}

/// Read-only view of the approvals table.
fn approval_rows() -> EntitySpec {
    EntitySpec::new(APPROVALS_TABLE, "approval", "code", "Approval")
        .field(FieldSpec::text("action_name", "Action the approval covers"))
        .field(FieldSpec::text("approver_role", "Role of the approver"))
        .field(FieldSpec::text("approver_id", "Approving user"))
        .field(FieldSpec::text("status", "approved / rejected"))
}

pub fn tools(ctx: &ToolContext) -> Vec<Box<dyn Tool>> {
    let users = Arc::new(org::users());
    let departments = Arc::new(org::departments());
    let positions = Arc::new(org::job_positions());
    let skills = Arc::new(org::skills());
    let position_skills = Arc::new(org::position_skills());

    let employees = Arc::new(people::employees());
    let plans = Arc::new(people::benefits_plans());
    let enrollments = Arc::new(people::benefits_enrollments());
    let trainings = Arc::new(people::trainings());
    let reviews = Arc::new(people::performance_reviews());
    let leave = Arc::new(people::leave_requests());
    let timesheets = Arc::new(people::timesheets());

    let cycles = Arc::new(payroll::payroll_cycles());
    let inputs = Arc::new(payroll::payroll_inputs());
    let records = Arc::new(payroll::payroll_records());
    let earnings = Arc::new(payroll::payroll_earnings());
    let deductions = Arc::new(payroll::payroll_deductions());

    let candidates = Arc::new(recruitment::candidates());
    let requisitions = Arc::new(recruitment::job_requisitions());
    let postings = Arc::new(recruitment::job_postings());
    let applications = Arc::new(recruitment::applications());
    let interviews = Arc::new(recruitment::interviews());
    let panel = Arc::new(recruitment::panel_members());

    vec![
        Box::new(AuthenticateApprovalTool::new(ctx)),
        Box::new(FinderTool::new(
            "discover_org_entities",
            "Look up users, departments, job positions, skills, position skills and recorded approvals.",
            vec![
                Arc::clone(&users),
                Arc::clone(&departments),
                Arc::clone(&positions),
                Arc::clone(&skills),
                Arc::clone(&position_skills),
                Arc::new(approval_rows()),
            ],
        )),
        Box::new(FinderTool::new(
            "discover_employee_entities",
            "Look up employees and their training, reviews, leave requests and timesheets.",
            vec![
                Arc::clone(&employees),
                Arc::clone(&trainings),
                Arc::clone(&reviews),
                Arc::clone(&leave),
                Arc::clone(&timesheets),
            ],
        )),
        Box::new(
            FinderTool::new(
                "discover_benefits_entities",
                "Look up benefits plans and enrollments. Supports date and amount ranges.",
                vec![Arc::clone(&plans), Arc::clone(&enrollments)],
            )
            .ranged(),
        ),
        Box::new(
            FinderTool::new(
                "discover_payroll_entities",
                "Look up payroll cycles, inputs, records, earnings and deductions. Supports date and amount ranges.",
                vec![
                    Arc::clone(&cycles),
                    Arc::clone(&inputs),
                    Arc::clone(&records),
                    Arc::clone(&earnings),
                    Arc::clone(&deductions),
                ],
            )
            .ranged(),
        ),
        Box::new(
            FinderTool::new(
                "discover_recruitment_entities",
                "Look up candidates, requisitions, postings, applications, interviews and panel members.",
                vec![
                    Arc::clone(&candidates),
                    Arc::clone(&requisitions),
                    Arc::clone(&postings),
                    Arc::clone(&applications),
                    Arc::clone(&interviews),
                    Arc::clone(&panel),
                ],
            )
            .strict(),
        ),
        Box::new(
            ManagerTool::new("manage_user", "Create or update user accounts.", users, ctx)
                .bundle("user_data"),
        ),
        Box::new(
            ManagerTool::new(
                "manage_department",
                "Create or update departments. Department names are unique.",
                departments,
                ctx,
            )
            .bundle("department_data"),
        ),
        Box::new(
            ManagerTool::new(
                "manage_job_position",
                "Create or update job positions in an active department.",
                positions,
                ctx,
            )
            .bundle("position_data"),
        ),
        Box::new(ManagerTool::new("manage_skill", "Create or update skills.", skills, ctx).bundle("skill_data")),
        Box::new(ManagerTool::new(
            "manage_position_skill",
            "Attach a skill to a job position, or change its proficiency.",
            position_skills,
            ctx,
        )),
        Box::new(
            ManagerTool::new(
                "manage_employee",
                "Create or update employee records. Terminating an employee requires employee_termination approval.",
                employees,
                ctx,
            )
            .bundle("employee_data"),
        ),
        Box::new(
            ManagerTool::new(
                "manage_benefits_plan",
                "Create or update benefits plans. Creating a plan requires benefits_plan_management approval.",
                plans,
                ctx,
            )
            .bundle("plan_data"),
        ),
        Box::new(
            ManagerTool::new(
                "manage_benefits_enrollment",
                "Enroll an employee in a benefits plan or change the enrollment. Terminated enrollments cannot be reactivated.",
                enrollments,
                ctx,
            )
            .bundle("enrollment_data"),
        ),
        Box::new(
            ManagerTool::new(
                "manage_employee_training",
                "Record or update employee training.",
                trainings,
                ctx,
            )
            .bundle("training_data"),
        ),
        Box::new(
            ManagerTool::new(
                "manage_performance_review",
                "Create or update performance reviews. The reviewer must be the employee's direct manager.",
                reviews,
                ctx,
            )
            .bundle("review_data"),
        ),
        Box::new(
            ManagerTool::new(
                "manage_leave_request",
                "Create, update, approve or reject leave requests.",
                leave,
                ctx,
            )
            .bundle("leave_data")
            .action("approve", ActionKind::Transition("approved"))
            .action("reject", ActionKind::Transition("rejected")),
        ),
        Box::new(
            ManagerTool::new(
                "manage_timesheet",
                "Create, update, approve or reject daily timesheets.",
                timesheets,
                ctx,
            )
            .bundle("timesheet_data")
            .action("approve", ActionKind::Transition("approved"))
            .action("reject", ActionKind::Transition("rejected")),
        ),
        Box::new(
            ManagerTool::new(
                "manage_payroll_cycle",
                "Create or update payroll cycles. Cycles may not overlap; creating one requires payroll_cycle_management approval.",
                cycles,
                ctx,
            )
            .bundle("cycle_data"),
        ),
        Box::new(
            ManagerTool::new(
                "manage_payroll_input",
                "Record hours and allowances for an employee in an open payroll cycle.",
                inputs,
                ctx,
            )
            .bundle("input_data"),
        ),
        Box::new(
            ManagerTool::new(
                "manage_payroll",
                "Create or update payroll records. Hours come from approved timesheets; creating or approving requires finance_officer_approval.",
                records,
                ctx,
            )
            .bundle("payroll_data"),
        ),
        Box::new(
            ManagerTool::new(
                "manage_payroll_earning",
                "Add or update an earning line on a draft payroll record.",
                earnings,
                ctx,
            )
            .bundle("earning_data"),
        ),
        Box::new(
            ManagerTool::new(
                "manage_payroll_deduction",
                "Add or update a deduction on a draft payroll record. Deductions may not exceed gross pay.",
                deductions,
                ctx,
            )
            .bundle("deduction_data"),
        ),
        Box::new(
            ManagerTool::new("manage_candidate", "Create or update candidates.", candidates, ctx)
                .bundle("candidate_data"),
        ),
        Box::new(
            ManagerTool::new(
                "manage_job_requisition",
                "Create or update job requisitions. Approving requires job_requisition_approval.",
                requisitions,
                ctx,
            )
            .bundle("requisition_data"),
        ),
        Box::new(
            ManagerTool::new(
                "manage_job_posting",
                "Create or update job postings for approved requisitions.",
                postings,
                ctx,
            )
            .bundle("posting_data"),
        ),
        Box::new(
            ManagerTool::new(
                "manage_application",
                "Create or update job applications. Status moves forward one stage at a time.",
                applications,
                ctx,
            )
            .bundle("application_data"),
        ),
        Box::new(
            ManagerTool::new(
                "manage_interview",
                "Schedule interviews, record outcomes and add panel members. Recording a recommendation completes the interview and advances the application.",
                interviews,
                ctx,
            )
            .bundle("interview_data")
            .action("schedule", ActionKind::Create)
            .action("add_panel_member", ActionKind::CreateRelated(panel)),
        ),
    ]
}
