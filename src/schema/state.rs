//! Declared state machines.
//!
//! A machine is a status field plus a transition relation. Staying in the
//! same state is always allowed; every other pair must be declared. A new
//! row must start in one of the machine's initial states.

use crate::error::ToolError;

#[derive(Debug, Clone, PartialEq)]
pub struct StateMachine {
    pub field: &'static str,
    initial: Vec<&'static str>,
    edges: Vec<(&'static str, &'static str)>,
    /// States with a dedicated rejection message when left.
    sealed: Vec<(&'static str, &'static str)>,
}

impl StateMachine {
    pub fn new(field: &'static str) -> Self {
        Self {
            field,
            initial: Vec::new(),
            edges: Vec::new(),
            sealed: Vec::new(),
        }
    }

    /// States a created row may start in.
    pub fn initial(mut self, states: &[&'static str]) -> Self {
        self.initial.extend_from_slice(states);
        self
    }

    /// Declare consecutive one-step edges along `states`.
    pub fn chain(mut self, states: &[&'static str]) -> Self {
        for pair in states.windows(2) {
            self.edges.push((pair[0], pair[1]));
        }
        self
    }

    pub fn edge(mut self, from: &'static str, to: &'static str) -> Self {
        self.edges.push((from, to));
        self
    }

    /// Declare edges from every state in `from` to every state in `to`.
    pub fn exits(mut self, from: &[&'static str], to: &[&'static str]) -> Self {
        for f in from {
            for t in to {
                self.edges.push((*f, *t));
            }
        }
        self
    }

    /// Leaving `state` fails with `message` instead of the generic wording.
    pub fn sealed(mut self, state: &'static str, message: &'static str) -> Self {
        self.sealed.push((state, message));
        self
    }

    pub fn allows(&self, from: &str, to: &str) -> bool {
        from == to || self.edges.iter().any(|(f, t)| *f == from && *t == to)
    }

    pub fn check_initial(&self, state: &str) -> Result<(), ToolError> {
        if self.initial.contains(&state) {
            Ok(())
        } else {
            Err(ToolError::invalid_transition())
        }
    }

    pub fn check(&self, from: &str, to: &str) -> Result<(), ToolError> {
        if from == to {
            return Ok(());
        }
        if let Some((_, message)) = self.sealed.iter().find(|(s, _)| *s == from) {
            return Err(ToolError::Transition((*message).to_string()));
        }
        if self.allows(from, to) {
            Ok(())
        } else {
            Err(ToolError::invalid_transition())
        }
    }
}

pub const APPLICATION_STATES: &[&str] = &[
    "submitted",
    "under_review",
    "screening",
    "interviewing",
    "offer_made",
    "accepted",
    "rejected",
    "withdrawn",
];

/// Forward one step at a time; any open state may drop to rejected or
/// withdrawn; accepted, rejected and withdrawn are absorbing.
pub fn application() -> StateMachine {
    StateMachine::new("status")
        .initial(&["submitted"])
        .chain(&[
            "submitted",
            "under_review",
            "screening",
            "interviewing",
            "offer_made",
            "accepted",
        ])
        .exits(
            &[
                "submitted",
                "under_review",
                "screening",
                "interviewing",
                "offer_made",
            ],
            &["rejected", "withdrawn"],
        )
}

pub fn performance_review() -> StateMachine {
    StateMachine::new("status")
        .initial(&["draft"])
        .chain(&["draft", "submitted", "approved"])
}

pub fn benefits_enrollment() -> StateMachine {
    StateMachine::new("status")
        .initial(&["pending", "active"])
        .edge("pending", "active")
        .edge("active", "pending")
        .edge("active", "terminated")
        .sealed(
            "terminated",
            "Cannot reactivate terminated benefits enrollment",
        )
}

pub fn payroll_input() -> StateMachine {
    StateMachine::new("status")
        .initial(&["draft", "submitted"])
        .exits(&["draft"], &["submitted", "rejected"])
}

pub fn payroll_record() -> StateMachine {
    StateMachine::new("status")
        .initial(&["draft"])
        .chain(&["draft", "approved", "paid"])
        .exits(&["draft", "approved"], &["cancelled"])
}

pub fn incident() -> StateMachine {
    StateMachine::new("status")
        .initial(&["open"])
        .chain(&["open", "in_progress", "monitoring", "resolved", "closed"])
}

pub fn interview() -> StateMachine {
    StateMachine::new("status")
        .initial(&["scheduled"])
        .exits(&["scheduled"], &["completed", "cancelled", "no_show"])
}

pub fn bridge() -> StateMachine {
    StateMachine::new("status")
        .initial(&["active"])
        .edge("active", "closed")
}

pub fn root_cause_analysis() -> StateMachine {
    StateMachine::new("status")
        .initial(&["assigned"])
        .chain(&["assigned", "in_progress", "completed", "approved"])
}

pub fn leave_request() -> StateMachine {
    StateMachine::new("status")
        .initial(&["pending"])
        .exits(&["pending"], &["approved", "rejected", "cancelled"])
        .edge("approved", "cancelled")
}

pub fn timesheet() -> StateMachine {
    StateMachine::new("status")
        .initial(&["submitted"])
        .exits(&["submitted"], &["approved", "rejected"])
}

pub fn device() -> StateMachine {
    StateMachine::new("status")
        .initial(&["active", "inactive"])
        .edge("active", "inactive")
        .edge("inactive", "active")
        .exits(&["active", "inactive"], &["removed"])
        .sealed("removed", "Cannot restore a removed device")
}

pub fn approval_request() -> StateMachine {
    StateMachine::new("status")
        .initial(&["pending"])
        .exits(&["pending"], &["approved", "rejected"])
}

/// Approval comes before scheduling; a change that went in or failed may
/// only be rolled back.
pub fn change_request() -> StateMachine {
    StateMachine::new("status")
        .initial(&["requested"])
        .chain(&["requested", "approved", "scheduled", "in_progress", "implemented"])
        .edge("in_progress", "failed")
        .exits(&["requested", "approved", "scheduled"], &["cancelled"])
        .exits(&["in_progress", "implemented", "failed"], &["rolled_back"])
}

pub fn rollback_request() -> StateMachine {
    StateMachine::new("status")
        .initial(&["requested"])
        .edge("requested", "approved")
        .exits(&["approved"], &["executed", "failed"])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_application_single_step() {
        let m = application();
        assert!(m.check("submitted", "under_review").is_ok());
        assert!(m.check("submitted", "interviewing").is_err());
        assert!(m.check("under_review", "submitted").is_err());
        assert!(m.check("screening", "screening").is_ok());
    }

    #[test]
    fn test_application_exits_and_terminals() {
        let m = application();
        assert!(m.check("interviewing", "withdrawn").is_ok());
        assert!(m.check("offer_made", "rejected").is_ok());
        for terminal in ["accepted", "rejected", "withdrawn"] {
            assert!(m.check(terminal, "submitted").is_err());
        }
        assert!(m.check("accepted", "rejected").is_err());
    }

    #[test]
    fn test_benefits_reactivation_message() {
        let err = benefits_enrollment().check("terminated", "active").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Halt: Cannot reactivate terminated benefits enrollment"
        );
        assert!(benefits_enrollment().check("active", "pending").is_ok());
        assert!(benefits_enrollment().check("pending", "terminated").is_err());
    }

    #[test]
    fn test_payroll_record_exits() {
        let m = payroll_record();
        assert!(m.check("draft", "approved").is_ok());
        assert!(m.check("approved", "cancelled").is_ok());
        assert!(m.check("draft", "paid").is_err());
        assert!(m.check("paid", "cancelled").is_err());
    }

    #[test]
    fn test_initial_states() {
        assert!(application().check_initial("submitted").is_ok());
        assert_eq!(
            application().check_initial("accepted").unwrap_err().to_string(),
            "Halt: Invalid status transition"
        );
        assert!(payroll_input().check_initial("submitted").is_ok());
        assert!(device().check_initial("removed").is_err());
    }

    #[test]
    fn test_change_request_needs_approval_step() {
        let m = change_request();
        assert!(m.check("requested", "approved").is_ok());
        assert!(m.check("requested", "implemented").is_err());
        assert!(m.check("implemented", "requested").is_err());
        assert!(m.check("implemented", "rolled_back").is_ok());
        assert!(m.check("rolled_back", "implemented").is_err());
    }

    #[test]
    fn test_rollback_request_needs_approval_step() {
        let m = rollback_request();
        assert!(m.check("requested", "executed").is_err());
        assert!(m.check("approved", "executed").is_ok());
        assert!(m.check("executed", "requested").is_err());
    }

    #[test]
    fn test_incident_chain() {
        let m = incident();
        assert!(m.check("open", "in_progress").is_ok());
        assert!(m.check("resolved", "closed").is_ok());
        assert!(m.check("closed", "open").is_err());
        assert_eq!(
            m.check("open", "closed").unwrap_err().to_string(),
            "Halt: Invalid status transition"
        );
    }
}
