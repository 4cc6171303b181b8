//! Call transcripts: persistence and replay.
//!
//! A transcript records the suite, seed and clock of a run plus every call
//! and the exact envelope string it produced. Replaying it against the same
//! seed must reproduce every envelope byte for byte.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::db::Database;
use crate::suites::Suite;
use crate::tools::ToolRouter;
use crate::types::ToolCall;

/// Persistent transcript saved to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    pub id: String,
    pub name: String,
    pub created_at: String,
    pub suite: Suite,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<PathBuf>,
    /// Frozen clock literal the run used.
    pub clock: String,
    pub calls: Vec<CallRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallRecord {
    #[serde(flatten)]
    pub call: ToolCall,
    /// Envelope string exactly as returned.
    pub result: String,
}

/// A replayed call whose envelope differs from the recorded one.
#[derive(Debug, Clone, PartialEq)]
pub struct Divergence {
    pub index: usize,
    pub name: String,
    pub expected: String,
    pub actual: String,
}

impl SessionData {
    pub fn new(name: &str, suite: Suite, seed: Option<PathBuf>, clock: &str) -> Self {
        Self {
            id: generate_session_id(),
            name: name.to_string(),
            created_at: now_timestamp(),
            suite,
            seed,
            clock: clock.to_string(),
            calls: Vec::new(),
        }
    }
}

/// Run one call. Dispatch failures become failure envelopes so a session
/// always gets one line back per request.
pub fn run_call(router: &ToolRouter, db: &mut Database, call: &ToolCall) -> String {
    router
        .call(db, &call.name, &call.arguments)
        .unwrap_or_else(|e| {
            warn!(tool = %call.name, error = %e, "dispatch failed");
            json!({"success": false, "error": e.to_string()}).to_string()
        })
}

/// Re-run every recorded call against `db` and report differences.
pub fn replay(data: &SessionData, router: &ToolRouter, db: &mut Database) -> Vec<Divergence> {
    data.calls
        .iter()
        .enumerate()
        .filter_map(|(index, record)| {
            let actual = run_call(router, db, &record.call);
            let same = actual == record.result || same_json(&actual, &record.result);
            (!same).then(|| Divergence {
                index,
                name: record.call.name.clone(),
                expected: record.result.clone(),
                actual,
            })
        })
        .collect()
}

fn same_json(a: &str, b: &str) -> bool {
    match (
        serde_json::from_str::<Value>(a),
        serde_json::from_str::<Value>(b),
    ) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn sessions_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    let dir = home.join(".backoffice-sim").join("sessions");
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

pub fn save_session(data: &SessionData) -> Result<PathBuf> {
    let dir = sessions_dir()?;
    let path = dir.join(format!("{}.json", data.id));
    export_session(data, &path)?;
    Ok(path)
}

pub fn load_session(id: &str) -> Result<SessionData> {
    let dir = sessions_dir()?;
    let path = dir.join(format!("{}.json", id));
    let content =
        std::fs::read_to_string(&path).with_context(|| format!("Session '{}' not found", id))?;
    let data: SessionData = serde_json::from_str(&content)
        .with_context(|| format!("Session '{}' is not a valid transcript", id))?;
    Ok(data)
}

pub fn export_session(data: &SessionData, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(data)?;
    std::fs::write(path, json).with_context(|| format!("Cannot write {}", path.display()))?;
    Ok(())
}

pub fn import_session(path: &Path) -> Result<SessionData> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Cannot read {}", path.display()))?;
    let data: SessionData = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a valid transcript", path.display()))?;
    Ok(data)
}

pub fn generate_session_id() -> String {
    uuid::Uuid::new_v4().to_string()[..8].to_string()
}

pub fn now_timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{FrozenClock, HR_TIMESTAMP};
    use crate::tools::create_router;

    fn router() -> ToolRouter {
        create_router(Suite::Hr, FrozenClock::new(HR_TIMESTAMP).unwrap())
    }

    fn seed() -> Database {
        Database::from_json_str(r#"{"users": {"1": {"email": "a@corp.io", "role": "hr_manager", "status": "active"}}}"#)
            .unwrap()
    }

    fn record(data: &mut SessionData, router: &ToolRouter, db: &mut Database, name: &str, args: Value) {
        let call = ToolCall {
            id: None,
            name: name.to_string(),
            arguments: args,
        };
        let result = run_call(router, db, &call);
        data.calls.push(CallRecord { call, result });
    }

    fn transcript() -> SessionData {
        let router = router();
        let mut db = seed();
        let mut data = SessionData::new("test", Suite::Hr, None, HR_TIMESTAMP);
        record(
            &mut data,
            &router,
            &mut db,
            "manage_department",
            json!({"action": "create", "department_data": {"department_name": "Ops", "manager_id": "1"}}),
        );
        record(
            &mut data,
            &router,
            &mut db,
            "discover_org_entities",
            json!({"entity_type": "departments"}),
        );
        record(&mut data, &router, &mut db, "launch_rocket", json!({}));
        data
    }

    #[test]
    fn test_generate_session_id() {
        let id = generate_session_id();
        assert_eq!(id.len(), 8);
    }

    #[test]
    fn test_unknown_tool_becomes_envelope() {
        let data = transcript();
        let last: Value = serde_json::from_str(&data.calls[2].result).unwrap();
        assert_eq!(last["success"], json!(false));
        assert_eq!(last["error"], json!("Unknown tool: launch_rocket"));
    }

    #[test]
    fn test_replay_reproduces_envelopes() {
        let data = transcript();
        let mut db = seed();
        assert!(replay(&data, &router(), &mut db).is_empty());
    }

    #[test]
    fn test_replay_reports_divergence() {
        let data = transcript();
        let mut db = Database::new();
        let diffs = replay(&data, &router(), &mut db);
        assert_eq!(diffs.len(), 2);
        assert_eq!(diffs[0].index, 0);
        assert_eq!(diffs[0].name, "manage_department");
    }

    #[test]
    fn test_export_import() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transcript.json");
        let data = transcript();
        export_session(&data, &path).unwrap();
        let loaded = import_session(&path).unwrap();
        assert_eq!(loaded.id, data.id);
        assert_eq!(loaded.suite, Suite::Hr);
        assert_eq!(loaded.calls, data.calls);
        assert_eq!(loaded.clock, HR_TIMESTAMP);
    }
}
