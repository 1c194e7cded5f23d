//! Destination schema inference
//!
//! Inference is a pure function of the table and the [`SchemaConfig`]: the
//! same input always yields the same schema.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, instrument};

use crate::coerce::{self, NumericClass};
use crate::config::{SchemaConfig, WidthPolicy};
use crate::error::{PipelineError, Result};
use crate::table::{Column, SemanticType, Table, TextCapacity, Value};

/// Inferred per-column destination types, in table column order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub columns: Vec<Column>,
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct SchemaInferencer {
    config: SchemaConfig,
}

impl SchemaInferencer {
    pub fn new(config: SchemaConfig) -> Self {
        Self { config }
    }

    #[instrument(skip(self, table), fields(table = %table.name()))]
    pub fn infer(&self, table: &Table) -> Result<TableSchema> {
        let columns = table
            .columns()
            .iter()
            .enumerate()
            .map(|(index, column)| self.infer_column(table, index, &column.name))
            .collect::<Result<Vec<_>>>()?;

        debug!(
            columns = %columns
                .iter()
                .map(|c| format!("{}:{}", c.name, c.semantic_type))
                .collect::<Vec<_>>()
                .join(","),
            "Inferred schema"
        );

        Ok(TableSchema { columns })
    }

    fn infer_column(&self, table: &Table, index: usize, name: &str) -> Result<Column> {
        let nullable = table.is_empty() || table.column_values(index).any(Value::is_null);

        let semantic_type = match coerce::numeric_class(table.column_values(index)) {
            NumericClass::Integer => SemanticType::Integer,
            NumericClass::Float => SemanticType::Float,
            NumericClass::NotNumeric if all_datetimes(table, index) => SemanticType::DateTime,
            NumericClass::NotNumeric => {
                if self.config.strict_typing {
                    check_single_kind(table, index, name)?;
                }
                SemanticType::Text(self.text_capacity(table, index))
            },
        };

        Ok(Column {
            name: name.to_string(),
            semantic_type,
            nullable,
        })
    }

    fn text_capacity(&self, table: &Table, index: usize) -> TextCapacity {
        match self.config.width {
            WidthPolicy::Fixed(n) => TextCapacity::Bounded(n),
            WidthPolicy::Capped(cap) => {
                let observed = table
                    .column_values(index)
                    .filter_map(Value::render)
                    .map(|s| s.chars().count())
                    .max()
                    .unwrap_or(0);
                TextCapacity::Bounded(observed.min(cap).max(1))
            },
            WidthPolicy::Unbounded => TextCapacity::Unbounded,
        }
    }
}

fn all_datetimes(table: &Table, index: usize) -> bool {
    let mut values = table.column_values(index).filter(|v| !v.is_null()).peekable();
    values.peek().is_some() && values.all(|v| matches!(v, Value::DateTime(_)))
}

fn check_single_kind(table: &Table, index: usize, name: &str) -> Result<()> {
    let kinds: BTreeSet<&'static str> = table
        .column_values(index)
        .filter(|v| !v.is_null())
        .map(Value::kind_name)
        .collect();

    if kinds.len() > 1 {
        return Err(PipelineError::SchemaInferenceAmbiguous {
            column: name.to_string(),
            kinds: kinds.into_iter().collect::<Vec<_>>().join(", "),
        });
    }
    Ok(())
}
