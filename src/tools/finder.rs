//! Read-only lookup tools.
//!
//! A finder covers a fixed set of tables. The caller names one table with
//! `entity_type` and narrows it with `filters`: an object of exact-match
//! predicates, AND-combined. Range finders also accept `<date>_from`,
//! `<date>_to`, `<number>_min` and `<number>_max` on their fields.

use std::sync::Arc;

use serde_json::{json, Map, Value};

use super::Tool;
use crate::db::Database;
use crate::envelope::Envelope;
use crate::error::ToolError;
use crate::schema::{row_f64, row_str, EntitySpec, FieldKind};
use crate::validate::{display, loosely_equal};

#[derive(Debug, Clone, PartialEq)]
enum Predicate {
    Equals(String, Value),
    From(String, String),
    To(String, String),
    Min(String, f64),
    Max(String, f64),
}

impl Predicate {
    fn matches(&self, row: &Map<String, Value>) -> bool {
        match self {
            Predicate::Equals(field, expected) => {
                let actual = row.get(field).unwrap_or(&Value::Null);
                loosely_equal(actual, expected, false)
            }
            Predicate::From(field, bound) => {
                row_str(row, field).is_some_and(|v| v >= bound.as_str())
            }
            Predicate::To(field, bound) => row_str(row, field).is_some_and(|v| v <= bound.as_str()),
            Predicate::Min(field, bound) => row_f64(row, field).is_some_and(|v| v >= *bound),
            Predicate::Max(field, bound) => row_f64(row, field).is_some_and(|v| v <= *bound),
        }
    }
}

pub struct FinderTool {
    name: &'static str,
    description: &'static str,
    entities: Vec<Arc<EntitySpec>>,
    /// Reject filter keys that are not fields of the table.
    strict: bool,
    /// Accept range suffixes on date and numeric fields.
    ranged: bool,
}

impl FinderTool {
    pub fn new(
        name: &'static str,
        description: &'static str,
        entities: Vec<Arc<EntitySpec>>,
    ) -> Self {
        Self {
            name,
            description,
            entities,
            strict: false,
            ranged: false,
        }
    }

    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    /// Range filters; implies strict filtering.
    pub fn ranged(mut self) -> Self {
        self.strict = true;
        self.ranged = true;
        self
    }

    fn entity_types(&self) -> Vec<&'static str> {
        self.entities.iter().map(|e| e.table).collect()
    }

    fn parse_filters(
        &self,
        spec: &EntitySpec,
        filters: &Map<String, Value>,
    ) -> Result<Vec<Predicate>, ToolError> {
        let exact = spec.filterable();
        let mut predicates = Vec::new();
        let mut invalid = Vec::new();
        for (key, value) in filters {
            if exact.contains(&key.as_str()) {
                predicates.push(Predicate::Equals(key.clone(), value.clone()));
                continue;
            }
            if self.ranged {
                if let Some(predicate) = range_predicate(spec, key, value)? {
                    predicates.push(predicate);
                    continue;
                }
            }
            if self.strict {
                invalid.push(key.clone());
            } else {
                predicates.push(Predicate::Equals(key.clone(), value.clone()));
            }
        }
        if !invalid.is_empty() {
            return Err(ToolError::Lookup(format!(
                "Invalid filter fields for {}: {}",
                spec.table,
                invalid.join(", ")
            )));
        }
        Ok(predicates)
    }
}

fn range_predicate(
    spec: &EntitySpec,
    key: &str,
    value: &Value,
) -> Result<Option<Predicate>, ToolError> {
    let split = ["_from", "_to", "_min", "_max"]
        .iter()
        .find_map(|suffix| key.strip_suffix(suffix).map(|base| (base, *suffix)));
    let Some((base, suffix)) = split else {
        return Ok(None);
    };
    let kind = match base {
        "created_at" | "updated_at" => FieldKind::Date,
        _ => match spec.get_field(base) {
            Some(field) if !field.transient => field.kind,
            _ => return Ok(None),
        },
    };
    let field = base.to_string();
    match suffix {
        "_from" | "_to" if kind == FieldKind::Date => {
            let bound = value.as_str().ok_or_else(|| {
                ToolError::Lookup(format!("{key} must be a date string, got {}", display(Some(value))))
            })?;
            let bound = bound.to_string();
            Ok(Some(if suffix == "_from" {
                Predicate::From(field, bound)
            } else {
                Predicate::To(field, bound)
            }))
        }
        "_min" | "_max" if kind.is_numeric() => {
            let bound = match value {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            }
            .ok_or_else(|| {
                ToolError::Lookup(format!("{key} must be a number, got {}", display(Some(value))))
            })?;
            Ok(Some(if suffix == "_min" {
                Predicate::Min(field, bound)
            } else {
                Predicate::Max(field, bound)
            }))
        }
        _ => Ok(None),
    }
}

impl Tool for FinderTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn parameters_schema(&self) -> Value {
        let filters = if self.ranged {
            "Exact-match filters on the entity's fields, AND-combined. Date fields also \
             accept <field>_from / <field>_to and numeric fields <field>_min / <field>_max."
        } else {
            "Exact-match filters on the entity's fields, AND-combined."
        };
        json!({
            "type": "object",
            "properties": {
                "entity_type": {
                    "type": "string",
                    "description": "Table to search",
                    "enum": self.entity_types(),
                },
                "filters": {
                    "type": "object",
                    "description": filters,
                },
            },
            "required": ["entity_type"],
        })
    }

    fn execute(&self, db: &mut Database, params: &Value) -> Result<Envelope, ToolError> {
        let entity_type = params
            .get("entity_type")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ToolError::Lookup("entity_type is required".to_string()))?;
        let spec = self
            .entities
            .iter()
            .find(|e| e.table == entity_type)
            .ok_or_else(|| {
                ToolError::Lookup(format!(
                    "Invalid entity_type '{}'. Must be one of: {}",
                    entity_type,
                    self.entity_types().join(", ")
                ))
            })?;
        let predicates = match params.get("filters") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Object(filters)) => self.parse_filters(spec, filters)?,
            Some(_) => return Err(ToolError::Lookup("filters must be an object".to_string())),
        };

        let results: Vec<Value> = db
            .rows(spec.table)
            .filter_map(|(key, row)| {
                let mut row = row.clone();
                row.insert(spec.id_field.to_string(), Value::String(key.to_string()));
                predicates
                    .iter()
                    .all(|p| p.matches(&row))
                    .then_some(Value::Object(row))
            })
            .collect();

        Ok(Envelope::success()
            .with("entity_type", entity_type)
            .with("count", results.len())
            .with("results", results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldSpec;

    fn payroll() -> Arc<EntitySpec> {
        Arc::new(
            EntitySpec::new("payroll_records", "payroll", "payroll_id", "Payroll record")
                .field(FieldSpec::text("employee_id", "Employee"))
                .field(FieldSpec::date("pay_period_start", "Start"))
                .field(FieldSpec::number("gross_pay", "Gross"))
                .field(FieldSpec::boolean("finance_officer_approval", "Flag").transient()),
        )
    }

    fn db() -> Database {
        Database::from_json_str(
            r#"{"payroll_records": {
                "1": {"employee_id": "5", "pay_period_start": "2025-01-01", "gross_pay": 1000},
                "2": {"employee_id": "5", "pay_period_start": "2025-02-01", "gross_pay": 2500.5},
                "10": {"employee_id": "6", "pay_period_start": "2025-03-01", "gross_pay": 900}
            }}"#,
        )
        .unwrap()
    }

    fn run(tool: &FinderTool, db: &mut Database, params: Value) -> Value {
        tool.invoke(db, &params).parse::<Value>().unwrap()
    }

    #[test]
    fn test_exact_filters_inject_id_and_keep_order() {
        let tool = FinderTool::new("discover_payroll_entities", "Find", vec![payroll()]);
        let mut db = db();
        let out = run(
            &tool,
            &mut db,
            json!({"entity_type": "payroll_records", "filters": {"employee_id": 5}}),
        );
        assert_eq!(out["success"], json!(true));
        assert_eq!(out["count"], json!(2));
        assert_eq!(out["results"][0]["payroll_id"], json!("1"));
        assert_eq!(out["results"][1]["payroll_id"], json!("2"));

        let out = run(&tool, &mut db, json!({"entity_type": "payroll_records"}));
        let ids: Vec<&str> = out["results"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["payroll_id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["1", "2", "10"]);
    }

    #[test]
    fn test_filter_by_id_field() {
        let tool = FinderTool::new("f", "Find", vec![payroll()]).strict();
        let mut db = db();
        let out = run(
            &tool,
            &mut db,
            json!({"entity_type": "payroll_records", "filters": {"payroll_id": "10"}}),
        );
        assert_eq!(out["count"], json!(1));
    }

    #[test]
    fn test_range_filters() {
        let tool = FinderTool::new("f", "Find", vec![payroll()]).ranged();
        let mut db = db();
        let out = run(
            &tool,
            &mut db,
            json!({"entity_type": "payroll_records", "filters": {
                "pay_period_start_from": "2025-01-15",
                "gross_pay_min": "1000"
            }}),
        );
        assert_eq!(out["count"], json!(1));
        assert_eq!(out["results"][0]["payroll_id"], json!("2"));

        let out = run(
            &tool,
            &mut db,
            json!({"entity_type": "payroll_records", "filters": {"gross_pay_min": "lots"}}),
        );
        assert_eq!(out["error"], json!("gross_pay_min must be a number, got lots"));
    }

    #[test]
    fn test_strict_rejects_unknown_filters() {
        let tool = FinderTool::new("f", "Find", vec![payroll()]).ranged();
        let mut db = db();
        let out = run(
            &tool,
            &mut db,
            json!({"entity_type": "payroll_records", "filters": {
                "colour": "red", "employee_id_from": "1", "finance_officer_approval": true
            }}),
        );
        assert_eq!(out["success"], json!(false));
        assert_eq!(
            out["error"],
            json!("Invalid filter fields for payroll_records: colour, employee_id_from, finance_officer_approval")
        );
    }

    #[test]
    fn test_lenient_unknown_filter_matches_nothing() {
        let tool = FinderTool::new("f", "Find", vec![payroll()]);
        let mut db = db();
        let out = run(
            &tool,
            &mut db,
            json!({"entity_type": "payroll_records", "filters": {"colour": "red"}}),
        );
        assert_eq!(out["success"], json!(true));
        assert_eq!(out["count"], json!(0));
    }

    #[test]
    fn test_invalid_entity_type_is_bare_error() {
        let tool = FinderTool::new("f", "Find", vec![payroll()]);
        let mut db = db();
        let out = run(&tool, &mut db, json!({"entity_type": "rockets"}));
        assert_eq!(
            out,
            json!({"success": false, "error": "Invalid entity_type 'rockets'. Must be one of: payroll_records"})
        );
        let out = run(&tool, &mut db, json!({}));
        assert_eq!(out["error"], json!("entity_type is required"));
        let out = run(
            &tool,
            &mut db,
            json!({"entity_type": "payroll_records", "filters": [1]}),
        );
        assert_eq!(out["error"], json!("filters must be an object"));
    }

    #[test]
    fn test_finder_never_mutates() {
        let tool = FinderTool::new("f", "Find", vec![payroll()]);
        let mut db = db();
        let before = db.clone();
        run(&tool, &mut db, json!({"entity_type": "payroll_records"}));
        assert_eq!(db, before);
    }
}
