//! The simulated database document.
//!
//! The whole back-office lives in one nested JSON object:
//! `table_name -> row_id -> row`. The store enforces nothing on its own;
//! integrity is the job of the tool pipelines that write to it.

use std::cmp::Ordering;
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::ids::SequenceId;

/// A single row: field name to JSON value.
pub type Row = Map<String, Value>;

/// A row key. Numeric keys sort numerically (minting order); any
/// non-numeric keys sort after them, lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowKey(String);

impl RowKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_number(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl Ord for RowKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.as_number(), other.as_number()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for RowKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RowKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RowKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<SequenceId> for RowKey {
    fn from(value: SequenceId) -> Self {
        Self(value.render())
    }
}

impl Serialize for RowKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for RowKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(RowKey)
    }
}

/// One table: row key to row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Table {
    rows: BTreeMap<RowKey, Row>,
}

impl Table {
    pub fn get(&self, key: &RowKey) -> Option<&Row> {
        self.rows.get(key)
    }

    pub fn get_mut(&mut self, key: &RowKey) -> Option<&mut Row> {
        self.rows.get_mut(key)
    }

    pub fn contains(&self, key: &RowKey) -> bool {
        self.rows.contains_key(key)
    }

    pub fn insert(&mut self, key: RowKey, row: Row) {
        self.rows.insert(key, row);
    }

    pub fn keys(&self) -> btree_map::Keys<'_, RowKey, Row> {
        self.rows.keys()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, RowKey, Row> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// The whole simulated database for one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Database {
    tables: BTreeMap<String, Table>,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a seed document (`{table: {id: row}}`).
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_value(&self) -> Value {
        let tables = self
            .tables
            .iter()
            .map(|(name, table)| {
                let rows = table
                    .iter()
                    .map(|(key, row)| (key.to_string(), Value::Object(row.clone())))
                    .collect::<Map<_, _>>();
                (name.clone(), Value::Object(rows))
            })
            .collect::<Map<_, _>>();
        Value::Object(tables)
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    /// Mutable access, creating the table on first write.
    pub fn table_mut(&mut self, name: &str) -> &mut Table {
        self.tables.entry(name.to_string()).or_default()
    }

    pub fn get(&self, table: &str, key: &RowKey) -> Option<&Row> {
        self.tables.get(table).and_then(|t| t.get(key))
    }

    pub fn contains(&self, table: &str, key: &RowKey) -> bool {
        self.get(table, key).is_some()
    }

    pub fn insert(&mut self, table: &str, key: RowKey, row: Row) {
        self.table_mut(table).insert(key, row);
    }

    /// Iterate the rows of `table` in key order; empty if the table is absent.
    pub fn rows<'a>(&'a self, table: &str) -> impl Iterator<Item = (&'a RowKey, &'a Row)> + 'a {
        self.tables.get(table).into_iter().flat_map(Table::iter)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Keyset of a table, used to assert that failed writes leave no trace.
    pub fn keyset(&self, table: &str) -> Vec<RowKey> {
        self.rows(table).map(|(k, _)| k.clone()).collect()
    }
}
