//! Authorization and approval checks.
//!
//! Each sensitive action is declared once as an `ActionPolicy`. A `Single`
//! policy may be satisfied directly by the requester's role; every policy
//! may be satisfied by rows in the `approvals` table whose `action_name`
//! mentions one of the action's keywords and whose `approver_role` values
//! cover the policy (`Any`/`Single`: at least one role; `All`: every role).

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{json, Value};

use crate::db::Database;
use crate::error::ToolError;
use crate::schema::row_str;

pub const APPROVALS_TABLE: &str = "approvals";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// One approver role suffices, and that role may act without a row.
    Single,
    /// Approval rows from at least one of the roles.
    Any,
    /// Approval rows from every role.
    All,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionPolicy {
    pub action: &'static str,
    pub keywords: &'static [&'static str],
    pub mode: Mode,
    pub roles: &'static [&'static str],
}

/// Who sanctioned an action.
#[derive(Debug, Clone, PartialEq)]
pub enum ApprovedBy {
    Role(String),
    Roles(Vec<String>),
}

impl ApprovedBy {
    pub fn to_value(&self) -> Value {
        match self {
            ApprovedBy::Role(role) => json!(role),
            ApprovedBy::Roles(roles) => json!(roles),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ApprovalMatrix {
    policies: Vec<ActionPolicy>,
}

impl ApprovalMatrix {
    pub fn new(policies: Vec<ActionPolicy>) -> Self {
        Self { policies }
    }

    pub fn policy(&self, action: &str) -> Option<&ActionPolicy> {
        self.policies.iter().find(|p| p.action == action)
    }

    pub fn actions(&self) -> Vec<&'static str> {
        self.policies.iter().map(|p| p.action).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Role to directly authorized actions, derived from `Single` policies.
    pub fn role_authorizations(&self) -> BTreeMap<&'static str, BTreeSet<&'static str>> {
        let mut map: BTreeMap<&'static str, BTreeSet<&'static str>> = BTreeMap::new();
        for policy in self.policies.iter().filter(|p| p.mode == Mode::Single) {
            for role in policy.roles {
                map.entry(*role).or_default().insert(policy.action);
            }
        }
        map
    }

    pub fn authorizes_role(&self, role: &str, action: &str) -> bool {
        self.role_authorizations()
            .get(role)
            .is_some_and(|actions| actions.contains(action))
    }

    /// Roles that have approved rows matching the policy's keywords.
    pub fn recorded_roles(&self, db: &Database, policy: &ActionPolicy) -> BTreeSet<String> {
        db.rows(APPROVALS_TABLE)
            .filter(|(_, row)| {
                let name = row_str(row, "action_name").unwrap_or_default().to_lowercase();
                policy
                    .keywords
                    .iter()
                    .any(|k| name.contains(&k.to_lowercase()))
            })
            .filter(|(_, row)| row_str(row, "status").map_or(true, |s| s == "approved"))
            .filter_map(|(_, row)| row_str(row, "approver_role").map(str::to_string))
            .collect()
    }

    /// Check the approvals table for `action`.
    pub fn verify(&self, db: &Database, action: &str) -> Result<ApprovedBy, ToolError> {
        let policy = self
            .policy(action)
            .ok_or_else(|| ToolError::Shape(format!("Unknown approval action '{action}'")))?;
        let found = self.recorded_roles(db, policy);
        match policy.mode {
            Mode::Single | Mode::Any => policy
                .roles
                .iter()
                .find(|role| found.contains(**role))
                .map(|role| ApprovedBy::Role(role.to_string()))
                .ok_or_else(|| {
                    ToolError::Unauthorized(format!(
                        "Approval required for {action}: needs approval from one of: {}",
                        policy.roles.join(", ")
                    ))
                }),
            Mode::All => {
                let missing: Vec<&str> = policy
                    .roles
                    .iter()
                    .filter(|role| !found.contains(**role))
                    .copied()
                    .collect();
                if missing.is_empty() {
                    Ok(ApprovedBy::Roles(
                        policy.roles.iter().map(|r| r.to_string()).collect(),
                    ))
                } else {
                    Err(ToolError::Unauthorized(format!(
                        "Approval required for {action}: missing approval from: {}",
                        missing.join(", ")
                    )))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix() -> ApprovalMatrix {
        ApprovalMatrix::new(vec![
            ActionPolicy {
                action: "benefits_plan_management",
                keywords: &["benefits_plan"],
                mode: Mode::Single,
                roles: &["hr_director", "compliance_officer"],
            },
            ActionPolicy {
                action: "payroll_cycle_management",
                keywords: &["payroll_cycle"],
                mode: Mode::All,
                roles: &["finance_officer", "hr_director"],
            },
        ])
    }

    fn db(rows: &str) -> Database {
        Database::from_json_str(&format!(r#"{{"approvals": {{{rows}}}}}"#)).unwrap()
    }

    #[test]
    fn test_role_authorizations_derived_from_single() {
        let m = matrix();
        assert!(m.authorizes_role("hr_director", "benefits_plan_management"));
        assert!(!m.authorizes_role("finance_officer", "payroll_cycle_management"));
        assert_eq!(m.role_authorizations().len(), 2);
    }

    #[test]
    fn test_any_mode_matches_keyword() {
        let db = db(r#""1": {"action_name": "Create BENEFITS_PLAN dental", "approver_role": "compliance_officer"}"#);
        let approved = matrix().verify(&db, "benefits_plan_management").unwrap();
        assert_eq!(approved, ApprovedBy::Role("compliance_officer".to_string()));
    }

    #[test]
    fn test_all_mode_requires_every_role() {
        let partial = db(r#""1": {"action_name": "payroll_cycle", "approver_role": "finance_officer"}"#);
        let err = matrix().verify(&partial, "payroll_cycle_management").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Halt: Approval required for payroll_cycle_management: missing approval from: hr_director"
        );

        let full = db(r#"
            "1": {"action_name": "payroll_cycle", "approver_role": "finance_officer"},
            "2": {"action_name": "payroll_cycle", "approver_role": "hr_director"}"#);
        let approved = matrix().verify(&full, "payroll_cycle_management").unwrap();
        assert_eq!(approved.to_value(), json!(["finance_officer", "hr_director"]));
    }

    #[test]
    fn test_rejected_rows_are_not_proof() {
        let db = db(r#""1": {"action_name": "benefits_plan", "approver_role": "hr_director", "status": "rejected"}"#);
        assert!(matrix().verify(&db, "benefits_plan_management").is_err());
    }

    #[test]
    fn test_unknown_action() {
        let err = matrix().verify(&Database::new(), "launch").unwrap_err();
        assert_eq!(err.to_string(), "Halt: Unknown approval action 'launch'");
    }
}
