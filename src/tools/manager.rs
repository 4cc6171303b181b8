//! The generic manager tool.
//!
//! A manager owns one table. Its `action` argument selects a pipeline:
//!
//! - create: presence, allow-list, types, enums, references, actors,
//!   uniqueness, temporal checks, business rules, the machine's initial
//!   states, approval gates, then mint an id and write the row together
//!   with any coupled writes.
//! - update: the same checks against the merged row, with the status
//!   machine consulted after the business rules.
//! - transitions (`approve`, `reject`, ...) are updates with a fixed
//!   target status.
//! - related creates write a child row keyed by this tool's id argument.
//!
//! Every check runs before the first write, so a failed call leaves the
//! database untouched.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::info;

use super::{id_argument, Tool, ToolContext};
use crate::approval::ApprovalMatrix;
use crate::clock::FrozenClock;
use crate::db::{Database, Row, RowKey};
use crate::envelope::Envelope;
use crate::error::ToolError;
use crate::ids::SequenceId;
use crate::schema::{row_str, CoupledWrite, EntitySpec, Gate, Operation, RuleContext};
use crate::validate::{Stage, Validator};

/// Where the entity fields travel in the arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamStyle {
    /// Nested under one object argument, e.g. `payroll_data`.
    Bundle(&'static str),
    /// Directly beside `action`.
    Flat,
}

#[derive(Clone)]
pub enum ActionKind {
    Create,
    Update,
    /// Update that moves the status field to a fixed value.
    Transition(&'static str),
    /// Create a row of another table whose parent id is this tool's id
    /// argument.
    CreateRelated(Arc<EntitySpec>),
}

#[derive(Clone)]
pub struct ActionDef {
    pub name: &'static str,
    pub kind: ActionKind,
}

pub struct ManagerTool {
    name: &'static str,
    description: &'static str,
    spec: Arc<EntitySpec>,
    style: ParamStyle,
    actions: Vec<ActionDef>,
    clock: FrozenClock,
    approvals: Arc<ApprovalMatrix>,
}

impl ManagerTool {
    /// A manager with `create` and `update`, taking flat arguments.
    pub fn new(
        name: &'static str,
        description: &'static str,
        spec: Arc<EntitySpec>,
        ctx: &ToolContext,
    ) -> Self {
        Self {
            name,
            description,
            spec,
            style: ParamStyle::Flat,
            actions: vec![
                ActionDef {
                    name: "create",
                    kind: ActionKind::Create,
                },
                ActionDef {
                    name: "update",
                    kind: ActionKind::Update,
                },
            ],
            clock: ctx.clock.clone(),
            approvals: Arc::clone(&ctx.approvals),
        }
    }

    pub fn bundle(mut self, key: &'static str) -> Self {
        self.style = ParamStyle::Bundle(key);
        self
    }

    pub fn action(mut self, name: &'static str, kind: ActionKind) -> Self {
        self.actions.push(ActionDef { name, kind });
        self
    }

    /// Drop `update`, for append-only tables.
    pub fn create_only(mut self) -> Self {
        self.actions.retain(|a| !matches!(a.kind, ActionKind::Update));
        self
    }

    fn action_names(&self) -> Vec<&'static str> {
        self.actions.iter().map(|a| a.name).collect()
    }

    /// The entity fields carried by the call.
    fn input(&self, params: &Map<String, Value>, required: bool) -> Result<Row, ToolError> {
        match self.style {
            ParamStyle::Bundle(key) => match params.get(key) {
                None | Some(Value::Null) if required => {
                    Err(ToolError::Shape(format!("{key} is required")))
                }
                None | Some(Value::Null) => Ok(Row::new()),
                Some(Value::Object(map)) if map.is_empty() && required => {
                    Err(ToolError::Shape(format!("{key} cannot be empty")))
                }
                Some(Value::Object(map)) => Ok(map.clone()),
                Some(_) => Err(ToolError::Shape(format!("{key} must be an object"))),
            },
            ParamStyle::Flat => Ok(params
                .iter()
                .filter(|(k, _)| k.as_str() != "action" && k.as_str() != self.spec.id_field)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()),
        }
    }

    fn create(
        &self,
        db: &mut Database,
        spec: &EntitySpec,
        mut input: Row,
        action: &str,
    ) -> Result<Envelope, ToolError> {
        let (candidate, coupled) = {
            let v = Validator::new(spec, db, &self.clock);
            v.check_presence(&input, Stage::Create)?;
            v.check_allowed(&input, action, Stage::Create)?;
            v.normalize_types(&mut input)?;
            v.check_enums(&input)?;
            v.check_references(&input)?;
            v.check_actors(&input)?;
            let mut candidate = spec.blank_row();
            candidate.extend(input.clone());
            v.check_unique(&candidate, None)?;
            v.check_temporal(&input, &candidate)?;

            let op = Operation::Create;
            let coupled = self.run_rules(db, spec, op, &mut candidate)?;
            if let Some(machine) = &spec.machine {
                if let Some(state) = row_str(&candidate, machine.field) {
                    machine.check_initial(state)?;
                }
            }
            self.check_gates(db, spec, &op, &candidate)?;
            (candidate, coupled)
        };

        let id = SequenceId::next_after(db.table(spec.table));
        let mut row = Row::new();
        row.insert(spec.id_field.to_string(), json!(id.render()));
        if let Some(code) = &spec.code {
            row.insert(code.field.to_string(), json!(id.code(code)));
        }
        row.extend(strip_transient(spec, candidate));
        row.insert("created_at".to_string(), json!(self.clock.timestamp()));
        row.insert("updated_at".to_string(), json!(self.clock.timestamp()));

        db.insert(spec.table, RowKey::from(id), row.clone());
        self.apply(db, coupled);
        info!(tool = self.name, table = spec.table, id = %id, "row created");

        Ok(Envelope::success()
            .with("action", action)
            .with(spec.id_field, id.render())
            .with(&spec.data_key(), Value::Object(row))
            .with("message", format!("{} {} created successfully", spec.label, id)))
    }

    fn update(
        &self,
        db: &mut Database,
        params: &Map<String, Value>,
        mut input: Row,
        target: Option<&'static str>,
        action: &str,
    ) -> Result<Envelope, ToolError> {
        let spec = &*self.spec;
        if target.is_none() && input.is_empty() {
            return Err(ToolError::Shape("No fields provided for update".to_string()));
        }
        let id = id_argument(params.get(spec.id_field))
            .ok_or_else(|| ToolError::MissingFields(vec![spec.id_field.to_string()]))?;
        if let Some(target) = target {
            let field = spec.machine.as_ref().map_or("status", |m| m.field);
            input.insert(field.to_string(), json!(target));
        }
        let key = RowKey::from(id.as_str());
        let prior = db
            .get(spec.table, &key)
            .cloned()
            .ok_or_else(|| ToolError::NotFound(format!("{} {} not found", spec.label, id)))?;

        let (candidate, coupled) = {
            let v = Validator::new(spec, db, &self.clock);
            v.check_presence(&input, Stage::Update)?;
            v.check_allowed(&input, action, Stage::Update)?;
            v.normalize_types(&mut input)?;
            v.check_enums(&input)?;
            v.check_references(&input)?;
            v.check_actors(&input)?;
            let mut candidate = prior.clone();
            candidate.extend(input.clone());
            v.check_unique(&candidate, Some(&key))?;
            v.check_temporal(&input, &candidate)?;

            let op = Operation::Update {
                key: &key,
                prior: &prior,
            };
            let coupled = self.run_rules(db, spec, op, &mut candidate)?;
            if let Some(machine) = &spec.machine {
                let from = row_str(&prior, machine.field);
                let to = row_str(&candidate, machine.field);
                if let (Some(from), Some(to)) = (from, to) {
                    machine.check(from, to)?;
                }
            }
            self.check_gates(db, spec, &op, &candidate)?;
            (candidate, coupled)
        };

        let mut row = strip_transient(spec, candidate);
        row.insert("updated_at".to_string(), json!(self.clock.timestamp()));
        db.insert(spec.table, key, row.clone());
        self.apply(db, coupled);
        info!(tool = self.name, table = spec.table, id = %id, "row updated");

        Ok(Envelope::success()
            .with("action", action)
            .with(spec.id_field, id.clone())
            .with(&spec.data_key(), Value::Object(row))
            .with("message", format!("{} {} updated successfully", spec.label, id)))
    }

    fn run_rules(
        &self,
        db: &Database,
        spec: &EntitySpec,
        op: Operation<'_>,
        candidate: &mut Row,
    ) -> Result<Vec<CoupledWrite>, ToolError> {
        let ctx = RuleContext {
            db,
            spec,
            op,
            clock: &self.clock,
        };
        let mut writes = Vec::new();
        for rule in &spec.rules {
            writes.extend(rule(&ctx, candidate)?);
        }
        Ok(writes)
    }

    fn check_gates(
        &self,
        db: &Database,
        spec: &EntitySpec,
        op: &Operation<'_>,
        candidate: &Row,
    ) -> Result<(), ToolError> {
        for gate in &spec.gates {
            match gate {
                Gate::Flag {
                    field,
                    message,
                    trigger,
                } if trigger.fires(op, candidate) => {
                    if candidate.get(*field) != Some(&Value::Bool(true)) {
                        return Err(ToolError::Unauthorized((*message).to_string()));
                    }
                }
                Gate::Recorded { action, trigger } if trigger.fires(op, candidate) => {
                    self.approvals.verify(db, action)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn apply(&self, db: &mut Database, writes: Vec<CoupledWrite>) {
        let now = json!(self.clock.timestamp());
        for write in writes {
            match write {
                CoupledWrite::Patch {
                    table,
                    key,
                    changes,
                } => {
                    if let Some(row) = db.table_mut(table).get_mut(&key) {
                        row.extend(changes);
                        row.insert("updated_at".to_string(), now.clone());
                        info!(table, id = %key, "related row updated");
                    }
                }
                CoupledWrite::Append {
                    table,
                    id_field,
                    mut row,
                } => {
                    let id = SequenceId::next_after(db.table(table));
                    row.insert(id_field.to_string(), json!(id.render()));
                    row.entry("created_at").or_insert_with(|| now.clone());
                    info!(table, id = %id, "row appended");
                    db.insert(table, RowKey::from(id), row);
                }
            }
        }
    }

    fn field_properties(&self) -> Map<String, Value> {
        let mut properties = Map::new();
        let mut specs = vec![&*self.spec];
        for action in &self.actions {
            if let ActionKind::CreateRelated(related) = &action.kind {
                specs.push(related);
            }
        }
        for spec in specs {
            for field in spec.fields.iter().filter(|f| !f.computed) {
                if field.name == self.spec.id_field || properties.contains_key(field.name) {
                    continue;
                }
                properties.insert(field.name.to_string(), field.json_schema());
            }
        }
        properties
    }
}

fn strip_transient(spec: &EntitySpec, row: Row) -> Row {
    row.into_iter()
        .filter(|(k, _)| !spec.get_field(k).is_some_and(|f| f.transient))
        .collect()
}

impl Tool for ManagerTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn parameters_schema(&self) -> Value {
        let mut properties = Map::new();
        properties.insert(
            "action".to_string(),
            json!({
                "type": "string",
                "description": "Operation to perform",
                "enum": self.action_names(),
            }),
        );
        let keyed: Vec<&str> = self
            .actions
            .iter()
            .filter(|a| !matches!(a.kind, ActionKind::Create))
            .map(|a| a.name)
            .collect();
        if !keyed.is_empty() {
            properties.insert(
                self.spec.id_field.to_string(),
                json!({
                    "type": "string",
                    "description": format!(
                        "{} id; required for: {}",
                        self.spec.label,
                        keyed.join(", ")
                    ),
                }),
            );
        }
        let fields = self.field_properties();
        match self.style {
            ParamStyle::Bundle(key) => {
                properties.insert(
                    key.to_string(),
                    json!({
                        "type": "object",
                        "description": format!("{} fields", self.spec.label),
                        "properties": fields,
                    }),
                );
            }
            ParamStyle::Flat => properties.extend(fields),
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": ["action"],
        })
    }

    fn execute(&self, db: &mut Database, params: &Value) -> Result<Envelope, ToolError> {
        let params = params
            .as_object()
            .ok_or_else(|| ToolError::Shape("Arguments must be an object".to_string()))?;
        let requested = params.get("action").and_then(Value::as_str).unwrap_or_default();
        let action = self
            .actions
            .iter()
            .find(|a| a.name == requested)
            .ok_or_else(|| {
                ToolError::Shape(format!(
                    "Invalid action '{}'. Must be one of: {}",
                    requested,
                    self.action_names().join(", ")
                ))
            })?;

        match &action.kind {
            ActionKind::Create => {
                let input = self.input(params, true)?;
                self.create(db, &self.spec, input, action.name)
            }
            ActionKind::Update => {
                let input = self.input(params, true)?;
                self.update(db, params, input, None, action.name)
            }
            ActionKind::Transition(target) => {
                let input = self.input(params, false)?;
                self.update(db, params, input, Some(target), action.name)
            }
            ActionKind::CreateRelated(related) => {
                let mut input = self.input(params, true)?;
                if let Some(parent) = id_argument(params.get(self.spec.id_field)) {
                    input
                        .entry(self.spec.id_field)
                        .or_insert_with(|| Value::String(parent));
                }
                self.create(db, related, input, action.name)
            }
        }
    }
}
