//! Smart home: household users, devices and the automation built on them.
//!
//! This family has no approval matrix. Device changes that matter to
//! support (connectivity, lifecycle status, firmware) leave an audit row.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::db::Row;
use crate::error::ToolError;
use crate::schema::state;
use crate::schema::{
    is_blank, Bounds, CoupledWrite, EntitySpec, FieldSpec, Operation, Reference, RuleContext,
};
use crate::tools::finder::FinderTool;
use crate::tools::manager::ManagerTool;
use crate::tools::{Tool, ToolContext};

const ROLES: &[&str] = &["admin", "member", "guest"];
const ACTIVE: &[&str] = &["active", "inactive"];

/// Device fields whose changes are written to `audit_logs`.
const AUDITED: &[&str] = &["connection_status", "status", "firmware_version"];

fn users() -> EntitySpec {
    EntitySpec::new("users", "user", "user_id", "User")
        .field(FieldSpec::text("first_name", "Given name").required())
        .field(FieldSpec::text("last_name", "Family name").required())
        .field(FieldSpec::email("email", "Login email; unique, case-insensitive").required())
        .field(FieldSpec::choice("role", ROLES, "Household role").required())
        .field(FieldSpec::text("phone_number", "Contact number"))
        .field(FieldSpec::choice("status", ACTIVE, "Account status").default(json!("active")))
        .unique_ci(&["email"])
}

fn groups() -> EntitySpec {
    EntitySpec::new("groups", "group", "group_id", "Group")
        .field(FieldSpec::text("group_name", "Name, e.g. Living room").required())
        .field(
            FieldSpec::choice("group_type", &["room", "zone", "custom"], "Kind of grouping")
                .default(json!("room")),
        )
        .field(
            FieldSpec::id("created_by", Reference::user(), "Creating user")
                .required()
                .fixed(),
        )
        .unique_ci(&["group_name"])
}

fn devices() -> EntitySpec {
    EntitySpec::new("devices", "device", "device_id", "Device")
        .field(FieldSpec::text("device_name", "Display name").required())
        .field(
            FieldSpec::choice(
                "device_type",
                &[
                    "light",
                    "thermostat",
                    "lock",
                    "camera",
                    "speaker",
                    "sensor",
                    "plug",
                    "hub",
                    "other",
                ],
                "Kind of device",
            )
            .required(),
        )
        .field(FieldSpec::text("manufacturer", "Manufacturer"))
        .field(FieldSpec::text("model", "Model"))
        .field(FieldSpec::text("serial_number", "Serial number; unique").fixed())
        .field(FieldSpec::text("firmware_version", "Installed firmware"))
        .field(FieldSpec::text("location", "Room or place in the home"))
        .field(FieldSpec::id("group_id", Reference::to("groups", "Group"), "Group the device belongs to"))
        .field(
            FieldSpec::id("owner_user_id", Reference::user(), "Owning user")
                .required(),
        )
        .field(
            FieldSpec::choice("connection_status", &["online", "offline", "pairing"], "Connectivity")
                .default(json!("pairing")),
        )
        .field(
            FieldSpec::integer("battery_level", "Battery percentage, absent for mains power")
                .bounds(Bounds::between(0.0, 100.0)),
        )
        .field(
            FieldSpec::choice("status", &["active", "inactive", "removed"], "Lifecycle status")
                .default(json!("active")),
        )
        .unique(&["serial_number"])
        .machine(state::device())
        .rule(audit_device_change)
}

/// Append an `audit_logs` row when an update touches an audited field.
fn audit_device_change(
    ctx: &RuleContext<'_>,
    row: &mut Row,
) -> Result<Vec<CoupledWrite>, ToolError> {
    let Operation::Update { key, prior } = ctx.op else {
        return Ok(Vec::new());
    };
    let changed: Vec<&str> = AUDITED
        .iter()
        .copied()
        .filter(|f| row.get(*f) != prior.get(*f))
        .collect();
    if changed.is_empty() {
        return Ok(Vec::new());
    }
    let old: Row = changed
        .iter()
        .map(|f| (f.to_string(), prior.get(*f).cloned().unwrap_or(Value::Null)))
        .collect();
    let new: Row = changed
        .iter()
        .map(|f| (f.to_string(), row.get(*f).cloned().unwrap_or(Value::Null)))
        .collect();
    let mut entry = Row::new();
    entry.insert("entity_type".to_string(), json!("device"));
    entry.insert("entity_id".to_string(), json!(key.as_str()));
    entry.insert("action".to_string(), json!("update"));
    entry.insert("changed_fields".to_string(), json!(changed));
    entry.insert("old_values".to_string(), Value::Object(old));
    entry.insert("new_values".to_string(), Value::Object(new));
    Ok(vec![CoupledWrite::Append {
        table: "audit_logs",
        id_field: "audit_log_id",
        row: entry,
    }])
}

fn routines() -> EntitySpec {
    EntitySpec::new("routines", "routine", "routine_id", "Routine")
        .field(FieldSpec::text("routine_name", "Name").required())
        .field(
            FieldSpec::choice(
                "trigger_type",
                &["time", "device_event", "voice", "manual", "sunrise", "sunset"],
                "What starts the routine",
            )
            .required(),
        )
        .field(FieldSpec::time("trigger_time", "HH:MM for time triggers"))
        .field(
            FieldSpec::id("owner_user_id", Reference::user(), "Owning user")
                .required()
                .fixed(),
        )
        .field(FieldSpec::boolean("enabled", "Whether the routine runs").default(json!(true)))
        .rule(time_trigger_has_time)
}

fn time_trigger_has_time(
    _ctx: &RuleContext<'_>,
    row: &mut Row,
) -> Result<Vec<CoupledWrite>, ToolError> {
    let timed = row.get("trigger_type").and_then(Value::as_str) == Some("time");
    if timed && is_blank(row.get("trigger_time")) {
        return Err(ToolError::BusinessRule(
            "trigger_time is required for time-triggered routines".to_string(),
        ));
    }
    Ok(Vec::new())
}

fn routine_devices() -> EntitySpec {
    EntitySpec::new("routine_devices", "routine_device", "routine_device_id", "Routine device")
        .field(
            FieldSpec::id("routine_id", Reference::to("routines", "Routine"), "Routine")
                .required()
                .fixed(),
        )
        .field(
            FieldSpec::id(
                "device_id",
                Reference::to("devices", "Device").when("status", &["active"]),
                "Active device",
            )
            .required()
            .fixed(),
        )
        .field(FieldSpec::text("device_action", "What the device does, e.g. turn_on").required())
        .field(FieldSpec::text("action_value", "Setting for the action, e.g. 21 or 40%"))
        .field(
            FieldSpec::integer("execution_order", "Position within the routine")
                .bounds(Bounds::at_least(1.0))
                .default(json!(1)),
        )
        .unique(&["routine_id", "device_id"])
}

fn scenes() -> EntitySpec {
    EntitySpec::new("scenes", "scene", "scene_id", "Scene")
        .field(FieldSpec::text("scene_name", "Name").required())
        .field(FieldSpec::text("description", "What the scene sets"))
        .field(
            FieldSpec::id("created_by", Reference::user(), "Creating user")
                .required()
                .fixed(),
        )
        .field(FieldSpec::boolean("is_active", "Whether the scene can be triggered").default(json!(true)))
        .unique_ci(&["scene_name"])
}

fn voice_profiles() -> EntitySpec {
    EntitySpec::new("voice_profiles", "voice_profile", "voice_profile_id", "Voice profile")
        .field(
            FieldSpec::id("user_id", Reference::user(), "Profile owner")
                .required()
                .fixed(),
        )
        .field(FieldSpec::text("language", "Language tag, e.g. en-US").default(json!("en-US")))
        .field(FieldSpec::text("wake_word", "Custom wake word"))
        .field(FieldSpec::boolean("voice_match_enabled", "Recognize this speaker").default(json!(true)))
        .field(FieldSpec::choice("status", ACTIVE, "Profile status").default(json!("active")))
        .unique(&["user_id"])
}

fn device_permissions() -> EntitySpec {
    EntitySpec::new(
        "user_device_permissions",
        "permission",
        "permission_id",
        "Device permission",
    )
    .field(
        FieldSpec::id("user_id", Reference::user(), "User receiving access")
            .required()
            .fixed(),
    )
    .field(
        FieldSpec::id(
            "device_id",
            Reference::to("devices", "Device").when("status", ACTIVE),
            "Device",
        )
        .required()
        .fixed(),
    )
    .field(
        FieldSpec::choice("permission_level", &["view", "control", "admin"], "Access level")
            .required(),
    )
    .field(
        FieldSpec::id("granted_by", Reference::user().roles(&["admin"]), "Admin granting access")
            .required(),
    )
    .field(FieldSpec::date("expires_on", "Last day of access").not_past())
    .unique(&["user_id", "device_id"])
}

fn skills() -> EntitySpec {
    EntitySpec::new("skills", "skill", "skill_id", "Skill")
        .field(FieldSpec::text("skill_name", "Third-party skill"))
        .field(FieldSpec::text("provider", "Publisher"))
        .field(FieldSpec::text("status", "enabled / disabled"))
}

fn skill_device_permissions() -> EntitySpec {
    EntitySpec::new(
        "skill_device_permissions",
        "skill_permission",
        "skill_permission_id",
        "Skill permission",
    )
    .field(FieldSpec::text("skill_id", "Skill"))
    .field(FieldSpec::text("device_id", "Device"))
    .field(FieldSpec::text("permission_level", "Access level"))
}

fn group_permissions() -> EntitySpec {
    EntitySpec::new(
        "user_group_permissions",
        "group_permission",
        "group_permission_id",
        "Group permission",
    )
    .field(FieldSpec::text("user_id", "User"))
    .field(FieldSpec::text("group_id", "Group"))
    .field(FieldSpec::text("permission_level", "Access level"))
}

fn access_logs() -> EntitySpec {
    EntitySpec::new("access_logs", "access_log", "access_log_id", "Access log")
        .field(FieldSpec::text("user_id", "Acting user"))
        .field(FieldSpec::text("device_id", "Device"))
        .field(FieldSpec::text("access_type", "What was attempted"))
        .field(FieldSpec::text("result", "granted / denied"))
}

fn audit_logs() -> EntitySpec {
    EntitySpec::new("audit_logs", "audit_log", "audit_log_id", "Audit log")
        .field(FieldSpec::text("entity_type", "Kind of record changed"))
        .field(FieldSpec::text("entity_id", "Id of the record"))
        .field(FieldSpec::text("action", "What happened"))
}

pub fn tools(ctx: &ToolContext) -> Vec<Box<dyn Tool>> {
    let users = Arc::new(users());
    let devices = Arc::new(devices());
    let groups = Arc::new(groups());
    let routines = Arc::new(routines());
    let routine_devices = Arc::new(routine_devices());
    let scenes = Arc::new(scenes());
    let voice_profiles = Arc::new(voice_profiles());
    let permissions = Arc::new(device_permissions());

    vec![
        Box::new(
            FinderTool::new(
                "discover_home_entities",
                "Look up users, devices, groups, routines, scenes, voice profiles, skills, permissions, access logs and audit logs.",
                vec![
                    Arc::clone(&users),
                    Arc::clone(&devices),
                    Arc::clone(&groups),
                    Arc::clone(&routines),
                    Arc::clone(&routine_devices),
                    Arc::clone(&scenes),
                    Arc::clone(&voice_profiles),
                    Arc::clone(&permissions),
                    Arc::new(skills()),
                    Arc::new(skill_device_permissions()),
                    Arc::new(group_permissions()),
                    Arc::new(access_logs()),
                    Arc::new(audit_logs()),
                ],
            )
            .strict(),
        ),
        Box::new(
            ManagerTool::new("manage_home_user", "Create or update household users.", users, ctx)
                .bundle("user_data"),
        ),
        Box::new(
            ManagerTool::new(
                "manage_device",
                "Register or update devices. Changes to connectivity, status or firmware are audited; removed devices cannot be restored.",
                devices,
                ctx,
            )
            .bundle("device_data"),
        ),
        Box::new(
            ManagerTool::new("manage_group", "Create or update device groups.", groups, ctx)
                .bundle("group_data"),
        ),
        Box::new(
            ManagerTool::new(
                "manage_routine",
                "Create or update routines. Time-triggered routines need a trigger_time.",
                routines,
                ctx,
            )
            .bundle("routine_data"),
        ),
        Box::new(
            ManagerTool::new(
                "manage_routine_device",
                "Add an active device to a routine, or change what it does there.",
                routine_devices,
                ctx,
            )
            .bundle("routine_device_data"),
        ),
        Box::new(
            ManagerTool::new("manage_scene", "Create or update scenes.", scenes, ctx)
                .bundle("scene_data"),
        ),
        Box::new(
            ManagerTool::new(
                "manage_voice_profile",
                "Create or update a user's voice profile. One profile per user.",
                voice_profiles,
                ctx,
            )
            .bundle("voice_profile_data"),
        ),
        Box::new(
            ManagerTool::new(
                "manage_device_permission",
                "Grant or change a user's access to a device. Only admins may grant access.",
                permissions,
                ctx,
            )
            .bundle("permission_data"),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use crate::clock::SMART_HOME_TIMESTAMP;
    use crate::suites::testing::{call, router, seed};
    use crate::suites::Suite;

    fn base() -> Value {
        json!({
            "users": {
                "1": {"role": "admin", "status": "active"},
                "2": {"role": "member", "status": "active"}
            },
            "devices": {
                "7": {"device_name": "Hall light", "device_type": "light", "owner_user_id": "1",
                      "connection_status": "online", "status": "active", "firmware_version": "1.0"}
            }
        })
    }

    fn update(data: Value) -> Value {
        json!({"action": "update", "device_id": "7", "device_data": data})
    }

    #[test]
    fn test_audited_device_update_appends_log() {
        let router = router(Suite::SmartHome);
        let mut db = seed(base());
        let out = call(
            &router,
            &mut db,
            "manage_device",
            update(json!({"connection_status": "offline", "firmware_version": "1.1", "location": "Hall"})),
        );
        assert_eq!(out["success"], json!(true), "{out}");
        let log = db.get("audit_logs", &"1".into()).unwrap();
        assert_eq!(log["entity_type"], json!("device"));
        assert_eq!(log["entity_id"], json!("7"));
        assert_eq!(log["changed_fields"], json!(["connection_status", "firmware_version"]));
        assert_eq!(log["old_values"]["connection_status"], json!("online"));
        assert_eq!(log["created_at"], json!(SMART_HOME_TIMESTAMP));
    }

    #[test]
    fn test_unaudited_or_failed_update_leaves_no_log() {
        let router = router(Suite::SmartHome);
        let mut db = seed(base());
        call(&router, &mut db, "manage_device", update(json!({"location": "Porch"})));
        assert!(db.table("audit_logs").is_none());

        let out = call(
            &router,
            &mut db,
            "manage_device",
            update(json!({"status": "inactive", "battery_level": 140})),
        );
        assert_eq!(out["error"], json!("Halt: battery_level must be between 0 and 100"));
        assert!(db.table("audit_logs").is_none());
    }

    #[test]
    fn test_removed_device_is_final() {
        let router = router(Suite::SmartHome);
        let mut db = seed(base());
        call(&router, &mut db, "manage_device", update(json!({"status": "removed"})));
        let out = call(&router, &mut db, "manage_device", update(json!({"status": "active"})));
        assert_eq!(out["error"], json!("Halt: Cannot restore a removed device"));
    }

    #[test]
    fn test_device_cannot_be_created_removed() {
        let router = router(Suite::SmartHome);
        let mut db = seed(base());
        let create = |status: &str| {
            json!({"action": "create", "device_data": {
                "device_name": "Porch cam", "device_type": "camera", "owner_user_id": "1",
                "serial_number": "SN-1", "status": status
            }})
        };
        let out = call(&router, &mut db, "manage_device", create("removed"));
        assert_eq!(out["error"], json!("Halt: Invalid status transition"));
        let out = call(&router, &mut db, "manage_device", create("inactive"));
        assert_eq!(out["success"], json!(true), "{out}");
        assert_eq!(out["device_data"]["status"], json!("inactive"));
    }

    #[test]
    fn test_permission_granted_by_admin_only() {
        let router = router(Suite::SmartHome);
        let mut db = seed(base());
        let grant = |by: &str| {
            json!({"action": "create", "permission_data": {
                "user_id": "2", "device_id": "7", "permission_level": "control", "granted_by": by
            }})
        };
        let out = call(&router, &mut db, "manage_device_permission", grant("2"));
        assert_eq!(
            out["error"],
            json!("Halt: User 2 does not have a required role (admin)")
        );
        let out = call(&router, &mut db, "manage_device_permission", grant("1"));
        assert_eq!(out["permission_id"], json!("1"));
    }

    #[test]
    fn test_routine_device_uses_device_action() {
        let router = router(Suite::SmartHome);
        let mut db = seed(base());
        let out = call(
            &router,
            &mut db,
            "manage_routine",
            json!({"action": "create", "routine_data": {
                "routine_name": "Morning", "trigger_type": "time", "owner_user_id": "1"
            }}),
        );
        assert_eq!(
            out["error"],
            json!("Halt: trigger_time is required for time-triggered routines")
        );
        call(
            &router,
            &mut db,
            "manage_routine",
            json!({"action": "create", "routine_data": {
                "routine_name": "Morning", "trigger_type": "time", "trigger_time": "07:00",
                "owner_user_id": "1"
            }}),
        );
        let out = call(
            &router,
            &mut db,
            "manage_routine_device",
            json!({"action": "create", "routine_device_data": {
                "routine_id": "1", "device_id": "7", "device_action": "turn_on"
            }}),
        );
        assert_eq!(out["routine_device_data"]["execution_order"], json!(1));
        assert_eq!(out["routine_device_data"]["device_action"], json!("turn_on"));
    }

    #[test]
    fn test_finder_reads_audit_logs() {
        let router = router(Suite::SmartHome);
        let mut db = seed(base());
        call(&router, &mut db, "manage_device", update(json!({"status": "inactive"})));
        let out = call(
            &router,
            &mut db,
            "discover_home_entities",
            json!({"entity_type": "audit_logs", "filters": {"entity_id": "7"}}),
        );
        assert_eq!(out["count"], json!(1));
        assert_eq!(out["results"][0]["audit_log_id"], json!("1"));
    }
}
