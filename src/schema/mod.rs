//! Declarative entity specs.
//!
//! Each table a manager writes is described once as an `EntitySpec`: its
//! fields (type, enum domain, bounds, references), uniqueness keys, date
//! ordering, status machine, approval gates and business rules. The
//! generic pipelines in `tools::manager` and `tools::finder` are driven
//! entirely by this data.

pub mod state;

use serde_json::{json, Map, Value};

use crate::clock::FrozenClock;
use crate::db::{Database, Row, RowKey};
use crate::error::ToolError;
use crate::ids::CodeFormat;
use state::StateMachine;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldKind {
    Text,
    /// Identifier of another row; integers are normalized to strings.
    Id,
    Email,
    /// `YYYY-MM-DD`
    Date,
    /// `HH:MM`
    Time,
    Integer,
    Number,
    Boolean,
    Enum(&'static [&'static str]),
}

impl FieldKind {
    fn json_type(self) -> &'static str {
        match self {
            FieldKind::Integer => "integer",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
            _ => "string",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, FieldKind::Integer | FieldKind::Number)
    }
}

/// Numeric range for `Integer` / `Number` fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub exclusive_min: bool,
}

impl Bounds {
    pub const fn non_negative() -> Self {
        Self {
            min: Some(0.0),
            max: None,
            exclusive_min: false,
        }
    }

    pub const fn positive() -> Self {
        Self {
            min: Some(0.0),
            max: None,
            exclusive_min: true,
        }
    }

    pub const fn at_least(min: f64) -> Self {
        Self {
            min: Some(min),
            max: None,
            exclusive_min: false,
        }
    }

    pub const fn between(min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
            exclusive_min: false,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        let above = match self.min {
            Some(min) if self.exclusive_min => value > min,
            Some(min) => value >= min,
            None => true,
        };
        let below = self.max.map_or(true, |max| value <= max);
        above && below
    }

    pub fn violation(&self, field: &str) -> String {
        match (self.min, self.max) {
            (Some(min), Some(max)) => format!(
                "{field} must be between {} and {}",
                trim_float(min),
                trim_float(max)
            ),
            (Some(min), None) if self.exclusive_min => {
                format!("{field} must be greater than {}", trim_float(min))
            }
            (Some(min), None) if min == 0.0 => format!("{field} must be non-negative"),
            (Some(min), None) => format!("{field} must be at least {}", trim_float(min)),
            (None, Some(max)) => format!("{field} must be at most {}", trim_float(max)),
            (None, None) => format!("{field} is out of range"),
        }
    }
}

fn trim_float(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateRule {
    Any,
    NotFuture,
    NotPast,
}

/// State precondition on a referenced row.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: &'static str,
    pub allowed: &'static [&'static str],
}

/// A foreign key plus what the referenced row must satisfy.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub table: &'static str,
    pub label: &'static str,
    pub conditions: Vec<Condition>,
    /// Set for references that resolve to a user acting in a role.
    pub actor: Option<ActorRule>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActorRule {
    pub roles: Option<&'static [&'static str]>,
}

impl Reference {
    pub fn to(table: &'static str, label: &'static str) -> Self {
        Self {
            table,
            label,
            conditions: Vec::new(),
            actor: None,
        }
    }

    /// A `users` reference that must be active.
    pub fn user() -> Self {
        Self::to("users", "User").active_user()
    }

    pub fn when(mut self, field: &'static str, allowed: &'static [&'static str]) -> Self {
        self.conditions.push(Condition { field, allowed });
        self
    }

    pub fn active_user(mut self) -> Self {
        if self.actor.is_none() {
            self.actor = Some(ActorRule { roles: None });
        }
        self
    }

    pub fn roles(mut self, roles: &'static [&'static str]) -> Self {
        self.actor = Some(ActorRule { roles: Some(roles) });
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub description: &'static str,
    pub required: bool,
    pub updatable: bool,
    /// Accepted as input, checked, never stored.
    pub transient: bool,
    /// Filled by business rules, never accepted as input.
    pub computed: bool,
    pub default: Option<Value>,
    pub bounds: Option<Bounds>,
    pub date_rule: DateRule,
    pub reference: Option<Reference>,
}

impl FieldSpec {
    pub fn new(name: &'static str, kind: FieldKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            description,
            required: false,
            updatable: true,
            transient: false,
            computed: false,
            default: None,
            bounds: None,
            date_rule: DateRule::Any,
            reference: None,
        }
    }

    pub fn text(name: &'static str, description: &'static str) -> Self {
        Self::new(name, FieldKind::Text, description)
    }

    pub fn id(name: &'static str, reference: Reference, description: &'static str) -> Self {
        Self::new(name, FieldKind::Id, description).references(reference)
    }

    pub fn email(name: &'static str, description: &'static str) -> Self {
        Self::new(name, FieldKind::Email, description)
    }

    pub fn date(name: &'static str, description: &'static str) -> Self {
        Self::new(name, FieldKind::Date, description)
    }

    pub fn time(name: &'static str, description: &'static str) -> Self {
        Self::new(name, FieldKind::Time, description)
    }

    pub fn integer(name: &'static str, description: &'static str) -> Self {
        Self::new(name, FieldKind::Integer, description)
    }

    pub fn number(name: &'static str, description: &'static str) -> Self {
        Self::new(name, FieldKind::Number, description)
    }

    pub fn boolean(name: &'static str, description: &'static str) -> Self {
        Self::new(name, FieldKind::Boolean, description)
    }

    pub fn choice(
        name: &'static str,
        values: &'static [&'static str],
        description: &'static str,
    ) -> Self {
        Self::new(name, FieldKind::Enum(values), description)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Identity or foreign-key field that cannot change after create.
    pub fn fixed(mut self) -> Self {
        self.updatable = false;
        self
    }

    pub fn transient(mut self) -> Self {
        self.transient = true;
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
        self.updatable = false;
        self
    }

    pub fn default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn not_future(mut self) -> Self {
        self.date_rule = DateRule::NotFuture;
        self
    }

    pub fn not_past(mut self) -> Self {
        self.date_rule = DateRule::NotPast;
        self
    }

    pub fn references(mut self, reference: Reference) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn accepts_on_create(&self) -> bool {
        !self.computed
    }

    pub fn accepts_on_update(&self) -> bool {
        !self.computed && self.updatable
    }

    /// Advisory JSON-Schema fragment for descriptors.
    pub fn json_schema(&self) -> Value {
        let mut schema = Map::new();
        schema.insert("type".to_string(), json!(self.kind.json_type()));
        schema.insert("description".to_string(), json!(self.description));
        match self.kind {
            FieldKind::Enum(values) => {
                schema.insert("enum".to_string(), json!(values));
            }
            FieldKind::Date => {
                schema.insert("format".to_string(), json!("date"));
            }
            FieldKind::Email => {
                schema.insert("format".to_string(), json!("email"));
            }
            _ => {}
        }
        if let Some(bounds) = self.bounds {
            if let Some(min) = bounds.min {
                let key = if bounds.exclusive_min {
                    "exclusiveMinimum"
                } else {
                    "minimum"
                };
                schema.insert(key.to_string(), json!(min));
            }
            if let Some(max) = bounds.max {
                schema.insert("maximum".to_string(), json!(max));
            }
        }
        Value::Object(schema)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UniqueKey {
    pub fields: &'static [&'static str],
    pub case_insensitive: bool,
}

/// When an approval gate applies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Trigger {
    Create,
    /// A create or update that moves `field` to `value`.
    FieldBecomes {
        field: &'static str,
        value: &'static str,
    },
}

impl Trigger {
    pub fn fires(&self, op: &Operation<'_>, candidate: &Row) -> bool {
        match self {
            Trigger::Create => matches!(op, Operation::Create),
            Trigger::FieldBecomes { field, value } => {
                let now = row_str(candidate, field) == Some(*value);
                let before = match op {
                    Operation::Create => false,
                    Operation::Update { prior, .. } => row_str(prior, field) == Some(*value),
                };
                now && !before
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Gate {
    /// A boolean carried in the input must be true.
    Flag {
        field: &'static str,
        message: &'static str,
        trigger: Trigger,
    },
    /// Approval rows must satisfy the named action's policy.
    Recorded {
        action: &'static str,
        trigger: Trigger,
    },
}

#[derive(Debug, Clone, Copy)]
pub enum Operation<'a> {
    Create,
    Update { key: &'a RowKey, prior: &'a Row },
}

impl Operation<'_> {
    pub fn is_create(&self) -> bool {
        matches!(self, Operation::Create)
    }

    pub fn key(&self) -> Option<&RowKey> {
        match self {
            Operation::Create => None,
            Operation::Update { key, .. } => Some(key),
        }
    }
}

pub struct RuleContext<'a> {
    pub db: &'a Database,
    pub spec: &'a EntitySpec,
    pub op: Operation<'a>,
    pub clock: &'a FrozenClock,
}

/// A write to another row, computed before anything is mutated and applied
/// in the same call as the main write.
#[derive(Debug, Clone, PartialEq)]
pub enum CoupledWrite {
    Patch {
        table: &'static str,
        key: RowKey,
        changes: Row,
    },
    Append {
        table: &'static str,
        id_field: &'static str,
        row: Row,
    },
}

/// Entity-specific business rule. May adjust the candidate row (derived
/// fields) and return coupled writes.
pub type RuleFn = fn(&RuleContext<'_>, &mut Row) -> Result<Vec<CoupledWrite>, ToolError>;

#[derive(Clone)]
pub struct EntitySpec {
    pub table: &'static str,
    /// Prefix of the `<entity>_data` key in envelopes.
    pub entity: &'static str,
    pub id_field: &'static str,
    /// Human label used in messages, e.g. "Payroll record".
    pub label: &'static str,
    pub code: Option<CodeFormat>,
    pub fields: Vec<FieldSpec>,
    pub unique: Vec<UniqueKey>,
    pub date_order: Vec<(&'static str, &'static str)>,
    pub machine: Option<StateMachine>,
    pub gates: Vec<Gate>,
    pub rules: Vec<RuleFn>,
}

impl EntitySpec {
    pub fn new(
        table: &'static str,
        entity: &'static str,
        id_field: &'static str,
        label: &'static str,
    ) -> Self {
        Self {
            table,
            entity,
            id_field,
            label,
            code: None,
            fields: Vec::new(),
            unique: Vec::new(),
            date_order: Vec::new(),
            machine: None,
            gates: Vec::new(),
            rules: Vec::new(),
        }
    }

    pub fn code(mut self, field: &'static str, prefix: &'static str, width: usize) -> Self {
        self.code = Some(CodeFormat::new(field, prefix, width));
        self
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn unique(mut self, fields: &'static [&'static str]) -> Self {
        self.unique.push(UniqueKey {
            fields,
            case_insensitive: false,
        });
        self
    }

    pub fn unique_ci(mut self, fields: &'static [&'static str]) -> Self {
        self.unique.push(UniqueKey {
            fields,
            case_insensitive: true,
        });
        self
    }

    /// `end` may not be earlier than `start`.
    pub fn ordered(mut self, start: &'static str, end: &'static str) -> Self {
        self.date_order.push((start, end));
        self
    }

    pub fn machine(mut self, machine: StateMachine) -> Self {
        self.machine = Some(machine);
        self
    }

    pub fn gate(mut self, gate: Gate) -> Self {
        self.gates.push(gate);
        self
    }

    pub fn rule(mut self, rule: RuleFn) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn data_key(&self) -> String {
        format!("{}_data", self.entity)
    }

    /// Every stored field at its create-time default.
    pub fn blank_row(&self) -> Row {
        self.fields
            .iter()
            .filter(|f| !f.transient)
            .map(|f| (f.name.to_string(), f.default.clone().unwrap_or(Value::Null)))
            .collect()
    }

    /// Fields a finder may filter on exactly.
    pub fn filterable(&self) -> Vec<&str> {
        let mut names = vec![self.id_field];
        if let Some(code) = &self.code {
            names.push(code.field);
        }
        names.extend(self.fields.iter().filter(|f| !f.transient).map(|f| f.name));
        names.extend(["created_at", "updated_at"]);
        names
    }
}

/// String view of a row field.
pub fn row_str<'r>(row: &'r Row, field: &str) -> Option<&'r str> {
    row.get(field).and_then(Value::as_str)
}

/// Numeric view of a row field.
pub fn row_f64(row: &Row, field: &str) -> Option<f64> {
    row.get(field).and_then(Value::as_f64)
}

/// Whether a field is absent, null, or a blank string.
pub fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_messages() {
        assert!(Bounds::positive().contains(0.5));
        assert!(!Bounds::positive().contains(0.0));
        assert!(Bounds::non_negative().contains(0.0));
        assert!(Bounds::between(0.0, 24.0).contains(24.0));
        assert!(!Bounds::between(0.0, 24.0).contains(24.5));
        assert_eq!(
            Bounds::between(0.0, 24.0).violation("total_hours"),
            "total_hours must be between 0 and 24"
        );
        assert_eq!(
            Bounds::positive().violation("hourly_rate"),
            "hourly_rate must be greater than 0"
        );
        assert_eq!(
            Bounds::non_negative().violation("budget"),
            "budget must be non-negative"
        );
    }

    #[test]
    fn test_field_schema_fragment() {
        let field = FieldSpec::choice("severity", &["P1", "P2"], "Severity").required();
        assert_eq!(
            field.json_schema(),
            json!({"type": "string", "description": "Severity", "enum": ["P1", "P2"]})
        );
        let field = FieldSpec::number("amount", "Amount").bounds(Bounds::positive());
        assert_eq!(field.json_schema()["exclusiveMinimum"], json!(0.0));
    }

    #[test]
    fn test_blank_row_skips_transient() {
        let spec = EntitySpec::new("payroll_records", "payroll", "payroll_id", "Payroll record")
            .field(FieldSpec::choice("status", &["draft"], "Status").default(json!("draft")))
            .field(FieldSpec::boolean("finance_officer_approval", "Flag").transient())
            .field(FieldSpec::number("gross_pay", "Gross").computed());
        let row = spec.blank_row();
        assert_eq!(row.get("status"), Some(&json!("draft")));
        assert_eq!(row.get("gross_pay"), Some(&Value::Null));
        assert!(!row.contains_key("finance_officer_approval"));
    }

    #[test]
    fn test_trigger_field_becomes() {
        let trigger = Trigger::FieldBecomes {
            field: "status",
            value: "approved",
        };
        let mut prior = Row::new();
        prior.insert("status".to_string(), json!("draft"));
        let mut candidate = prior.clone();
        candidate.insert("status".to_string(), json!("approved"));
        let key = RowKey::from("1");
        let op = Operation::Update {
            key: &key,
            prior: &prior,
        };
        assert!(trigger.fires(&op, &candidate));
        assert!(!trigger.fires(&op, &prior));
        let op = Operation::Update {
            key: &key,
            prior: &candidate,
        };
        assert!(!trigger.fires(&op, &candidate));
    }

    #[test]
    fn test_is_blank() {
        assert!(is_blank(None));
        assert!(is_blank(Some(&Value::Null)));
        assert!(is_blank(Some(&json!("   "))));
        assert!(!is_blank(Some(&json!(0))));
        assert!(!is_blank(Some(&json!(false))));
    }
}
