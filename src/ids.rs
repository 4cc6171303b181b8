//! Deterministic ID minting.
//!
//! Every table is keyed by decimal strings. The next id is one past the
//! largest numeric key; tables that also carry a human-readable number
//! render the same sequence as a zero-padded, prefixed code.

use std::fmt;

use crate::db::Table;

/// A minted row identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SequenceId(u64);

/// How a table renders its human-readable number, e.g. `INC0000042`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeFormat {
    /// Field that stores the code.
    pub field: &'static str,
    pub prefix: &'static str,
    /// Digits after the prefix.
    pub width: usize,
}

impl CodeFormat {
    pub const fn new(field: &'static str, prefix: &'static str, width: usize) -> Self {
        Self {
            field,
            prefix,
            width,
        }
    }
}

impl SequenceId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }

    /// Next id for `table`: `max(numeric keys) + 1`, or 1 for an empty or
    /// missing table. Non-numeric keys do not take part in the sequence.
    pub fn next_after(table: Option<&Table>) -> Self {
        let max = table
            .map(|t| t.keys().filter_map(|k| k.as_number()).max().unwrap_or(0))
            .unwrap_or(0);
        Self(max + 1)
    }

    /// Bare decimal rendering used as the row key.
    pub fn render(self) -> String {
        self.0.to_string()
    }

    /// Zero-padded prefixed rendering.
    pub fn code(self, format: &CodeFormat) -> String {
        format!("{}{:0width$}", format.prefix, self.0, width = format.width)
    }
}

impl fmt::Display for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Row, RowKey};

    fn table_with(keys: &[&str]) -> Table {
        let mut table = Table::default();
        for key in keys {
            table.insert(RowKey::from(*key), Row::new());
        }
        table
    }

    #[test]
    fn test_next_after_empty() {
        assert_eq!(SequenceId::next_after(None).render(), "1");
        assert_eq!(SequenceId::next_after(Some(&Table::default())).render(), "1");
    }

    #[test]
    fn test_next_after_uses_numeric_max() {
        let table = table_with(&["1", "2", "10", "9"]);
        assert_eq!(SequenceId::next_after(Some(&table)).render(), "11");
    }

    #[test]
    fn test_next_after_skips_non_numeric_keys() {
        let table = table_with(&["3", "APR-7"]);
        assert_eq!(SequenceId::next_after(Some(&table)).value(), 4);
    }

    #[test]
    fn test_code_padding() {
        let format = CodeFormat::new("incident_number", "INC", 7);
        assert_eq!(SequenceId::new(42).code(&format), "INC0000042");
        let format = CodeFormat::new("bridge_number", "BRG", 7);
        assert_eq!(SequenceId::new(1).code(&format), "BRG0000001");
    }
}
