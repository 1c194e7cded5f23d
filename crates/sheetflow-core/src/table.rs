//! In-memory tabular model shared by every pipeline stage
//!
//! A [`Table`] is created per run by extraction or merge and discarded at the
//! end of the run. Only cached copies outlive a run.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::hash::{Hash, Hasher};

use crate::error::{PipelineError, Result};

/// Capacity of a text column, in characters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextCapacity {
    Bounded(usize),
    Unbounded,
}

impl TextCapacity {
    pub fn limit(&self) -> Option<usize> {
        match self {
            TextCapacity::Bounded(n) => Some(*n),
            TextCapacity::Unbounded => None,
        }
    }
}

/// Dialect-independent destination column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    Integer,
    Float,
    Text(TextCapacity),
    DateTime,
}

impl SemanticType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, SemanticType::Integer | SemanticType::Float)
    }

    pub fn unbounded_text() -> Self {
        SemanticType::Text(TextCapacity::Unbounded)
    }
}

impl std::fmt::Display for SemanticType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SemanticType::Integer => write!(f, "integer"),
            SemanticType::Float => write!(f, "float"),
            SemanticType::Text(TextCapacity::Bounded(n)) => write!(f, "text({})", n),
            SemanticType::Text(TextCapacity::Unbounded) => write!(f, "text"),
            SemanticType::DateTime => write!(f, "datetime"),
        }
    }
}

/// Column metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub semantic_type: SemanticType,
    pub nullable: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, semantic_type: SemanticType) -> Self {
        Self {
            name: name.into(),
            semantic_type,
            nullable: true,
        }
    }

    /// Freshly extracted column: unbounded, nullable text
    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, SemanticType::unbounded_text())
    }
}

/// A single cell value
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    DateTime(NaiveDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the value kind, used in diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::DateTime(_) => "datetime",
        }
    }

    /// Textual rendering used for width measurement and text columns
    pub fn render(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Integer(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Text(s) => Some(s.clone()),
            Value::DateTime(dt) => Some(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
        }
    }
}

// Floats compare by bit pattern so rows can be hashed for deduplication.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {},
            Value::Integer(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Text(s) => s.hash(state),
            Value::DateTime(dt) => dt.hash(state),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

/// Values aligned 1:1 with the owning table's columns
pub type Row = Vec<Value>;

/// Named, ordered set of unique columns plus ordered rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    name: String,
    columns: Vec<Column>,
    rows: Vec<Row>,
}

impl Table {
    /// Build a table, checking column uniqueness and row arity
    pub fn new(name: impl Into<String>, columns: Vec<Column>, rows: Vec<Row>) -> Result<Self> {
        let name = name.into();

        let mut seen = HashSet::with_capacity(columns.len());
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(PipelineError::invalid_table(
                    &name,
                    format!("duplicate column '{}'", column.name),
                ));
            }
        }

        if let Some((index, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != columns.len())
        {
            return Err(PipelineError::invalid_table(
                &name,
                format!(
                    "row {} has {} values but the table has {} columns",
                    index,
                    row.len(),
                    columns.len()
                ),
            ));
        }

        Ok(Self {
            name,
            columns,
            rows,
        })
    }

    /// Reassemble parts that came from a valid table without re-checking them.
    /// Callers must keep column names unique and row width unchanged.
    pub(crate) fn from_checked_parts(name: String, columns: Vec<Column>, rows: Vec<Row>) -> Self {
        debug_assert!(rows.iter().all(|row| row.len() == columns.len()));
        Self {
            name,
            columns,
            rows,
        }
    }

    /// Convenience constructor for text-only tables, mostly used by tests and fakes
    pub fn from_text_rows(
        name: impl Into<String>,
        headers: &[&str],
        rows: &[&[&str]],
    ) -> Result<Self> {
        let columns = headers.iter().map(|h| Column::text(*h)).collect();
        let rows = rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| {
                        if cell.is_empty() {
                            Value::Null
                        } else {
                            Value::from(*cell)
                        }
                    })
                    .collect()
            })
            .collect();
        Self::new(name, columns, rows)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Iterate over the values of one column
    pub fn column_values(&self, index: usize) -> impl Iterator<Item = &Value> + Clone + '_ {
        self.rows.iter().map(move |row| &row[index])
    }

    /// Same data under a different name
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Decompose into parts; the inverse of [`Table::new`]
    pub fn into_parts(self) -> (String, Vec<Column>, Vec<Row>) {
        (self.name, self.columns, self.rows)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_columns_rejected() {
        let err = Table::new(
            "products",
            vec![Column::text("id"), Column::text("id")],
            vec![],
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidTable { .. }));
    }

    #[test]
    fn test_row_arity_enforced() {
        let err = Table::new(
            "products",
            vec![Column::text("id"), Column::text("name")],
            vec![vec![Value::from("1")]],
        )
        .unwrap_err();
        assert!(err.to_string().contains("row 0 has 1 values"));
    }

    #[test]
    fn test_from_text_rows_maps_empty_to_null() {
        let table = Table::from_text_rows("t", &["a", "b"], &[&["x", ""]]).unwrap();
        assert_eq!(table.rows()[0][1], Value::Null);
        assert_eq!(table.column_index("b"), Some(1));
    }

    #[test]
    fn test_float_values_hash_by_bits() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(Value::Float(1.5));
        assert!(set.contains(&Value::Float(1.5)));
        assert!(!set.contains(&Value::Integer(1)));
    }

    #[test]
    fn test_value_serde_roundtrip_keeps_kind() {
        let json = serde_json::to_string(&Value::Integer(7)).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Value::Integer(7));
    }
}
