//! Tool catalogs per handler family.
//!
//! Families share table names (every family has `users`) but not their
//! shapes, so each suite is its own catalog with its own frozen clock and
//! approval matrix.

pub mod hr;
pub mod incident;
pub mod smart_home;

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::approval::ApprovalMatrix;
use crate::clock::{FrozenClock, HR_TIMESTAMP, INCIDENT_TIMESTAMP, SMART_HOME_TIMESTAMP};
use crate::tools::{Tool, ToolContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Suite {
    #[default]
    Hr,
    Incident,
    #[value(name = "smart_home")]
    SmartHome,
}

impl Suite {
    pub fn all() -> [Suite; 3] {
        [Suite::Hr, Suite::Incident, Suite::SmartHome]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Suite::Hr => "hr",
            Suite::Incident => "incident",
            Suite::SmartHome => "smart_home",
        }
    }

    /// The family's frozen clock literal.
    pub fn default_timestamp(self) -> &'static str {
        match self {
            Suite::Hr => HR_TIMESTAMP,
            Suite::Incident => INCIDENT_TIMESTAMP,
            Suite::SmartHome => SMART_HOME_TIMESTAMP,
        }
    }

    pub fn approvals(self) -> ApprovalMatrix {
        match self {
            Suite::Hr => hr::approvals(),
            Suite::Incident => incident::approvals(),
            Suite::SmartHome => ApprovalMatrix::default(),
        }
    }

    pub fn tools(self, clock: FrozenClock) -> Vec<Box<dyn Tool>> {
        let ctx = ToolContext::new(clock, self.approvals());
        match self {
            Suite::Hr => hr::tools(&ctx),
            Suite::Incident => incident::tools(&ctx),
            Suite::SmartHome => smart_home::tools(&ctx),
        }
    }
}

impl fmt::Display for Suite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Suite {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Suite::all()
            .into_iter()
            .find(|suite| suite.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown suite '{s}' (expected hr, incident or smart_home)"))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use serde_json::Value;

    use crate::db::Database;
    use crate::tools::{create_router, ToolRouter};

    use super::Suite;

    pub fn router(suite: Suite) -> ToolRouter {
        let clock = crate::clock::FrozenClock::new(suite.default_timestamp()).unwrap();
        create_router(suite, clock)
    }

    /// Call a tool and parse the envelope.
    pub fn call(router: &ToolRouter, db: &mut Database, name: &str, args: Value) -> Value {
        let out = router.call(db, name, &args).unwrap();
        serde_json::from_str(&out).unwrap()
    }

    pub fn seed(json: Value) -> Database {
        serde_json::from_value(json).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suite_names_round_trip() {
        for suite in Suite::all() {
            assert_eq!(suite.as_str().parse::<Suite>().unwrap(), suite);
            let json = serde_json::to_string(&suite).unwrap();
            assert_eq!(json, format!("\"{}\"", suite.as_str()));
        }
        assert!("payroll".parse::<Suite>().is_err());
    }

    #[test]
    fn test_smart_home_has_no_authenticator() {
        let clock = FrozenClock::new(SMART_HOME_TIMESTAMP).unwrap();
        let tools = Suite::SmartHome.tools(clock);
        assert!(tools.iter().all(|t| t.name() != "authenticate_approval"));
        let clock = FrozenClock::new(HR_TIMESTAMP).unwrap();
        let tools = Suite::Hr.tools(clock);
        assert!(tools.iter().any(|t| t.name() == "authenticate_approval"));
    }
}
