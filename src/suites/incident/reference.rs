//! Users, clients and configuration items.

use serde_json::json;

use crate::schema::{EntitySpec, FieldSpec, Reference};

pub const USER_ROLES: &[&str] = &[
    "incident_manager",
    "technical_support",
    "account_manager",
    "executive",
    "system_administrator",
    "client_contact",
    "change_manager",
];

pub fn users() -> EntitySpec {
    EntitySpec::new("users", "user", "user_id", "User")
        .field(FieldSpec::text("first_name", "Given name").required())
        .field(FieldSpec::text("last_name", "Family name").required())
        .field(FieldSpec::email("email", "Login email; unique, case-insensitive").required())
        .field(FieldSpec::choice("role", USER_ROLES, "Operational role").required())
        .field(FieldSpec::id("client_id", Reference::to("clients", "Client"), "Client the user belongs to"))
        .field(FieldSpec::text("department", "Team or department"))
        .field(FieldSpec::text("timezone", "IANA timezone name"))
        .field(
            FieldSpec::choice("status", &["active", "inactive"], "Account status")
                .default(json!("active")),
        )
        .unique_ci(&["email"])
}

pub fn clients() -> EntitySpec {
    EntitySpec::new("clients", "client", "client_id", "Client")
        .field(FieldSpec::text("client_name", "Legal name").required())
        .field(FieldSpec::text("registration_number", "Company registration number").required())
        .field(
            FieldSpec::choice(
                "client_type",
                &["enterprise", "mid_market", "small_business", "startup", "government"],
                "Segment",
            )
            .required(),
        )
        .field(FieldSpec::text("industry", "Industry"))
        .field(FieldSpec::text("country", "Country"))
        .field(FieldSpec::email("contact_email", "Primary contact email"))
        .field(
            FieldSpec::choice("status", &["active", "inactive", "suspended"], "Client status")
                .default(json!("active")),
        )
        .unique_ci(&["client_name"])
        .unique(&["registration_number"])
}

pub fn configuration_items() -> EntitySpec {
    EntitySpec::new("configuration_items", "ci", "ci_id", "Configuration item")
        .field(FieldSpec::text("ci_name", "Name of the component").required())
        .field(
            FieldSpec::choice(
                "ci_type",
                &["server", "application", "database", "network", "storage", "service"],
                "Kind of component",
            )
            .required(),
        )
        .field(FieldSpec::choice(
            "environment",
            &["production", "staging", "development", "test"],
            "Environment",
        ))
        .field(
            FieldSpec::choice(
                "operational_status",
                &["operational", "degraded", "down", "maintenance", "retired"],
                "Current health",
            )
            .default(json!("operational")),
        )
        .field(FieldSpec::id("client_id", Reference::to("clients", "Client"), "Owning client"))
        .field(FieldSpec::id("owner_id", Reference::user(), "Responsible user"))
        .unique_ci(&["ci_name"])
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::suites::testing::{call, router, seed};
    use crate::suites::Suite;

    #[test]
    fn test_client_registration_unique() {
        let router = router(Suite::Incident);
        let mut db = seed(json!({"clients": {"1": {"client_name": "Acme", "registration_number": "R-1"}}}));
        let out = call(
            &router,
            &mut db,
            "manage_client",
            json!({"action": "create", "client_data": {
                "client_name": "Globex", "registration_number": "R-1", "client_type": "enterprise"
            }}),
        );
        assert_eq!(
            out["error"],
            json!("Halt: Client with registration_number 'R-1' already exists")
        );
    }

    #[test]
    fn test_incident_user_roles_differ_from_hr() {
        let router = router(Suite::Incident);
        let mut db = seed(json!({}));
        let out = call(
            &router,
            &mut db,
            "manage_user",
            json!({"action": "create", "user_data": {
                "first_name": "Ana", "last_name": "Ng", "email": "ana@ops.io", "role": "hr_manager"
            }}),
        );
        assert!(out["error"]
            .as_str()
            .unwrap()
            .starts_with("Halt: Invalid role 'hr_manager'. Must be one of: incident_manager"));
    }
}
