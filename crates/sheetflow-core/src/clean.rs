//! Table cleaning: null filtering, numeric coercion, deduplication
//!
//! The steps always run in that order. Deduplication runs after coercion so
//! values that only become equal after coercion ("1" vs "1.0" in a float
//! column) collapse. Under a column-subset policy, coercion and dedup repeat
//! until no row is dropped, which keeps `clean(clean(t)) == clean(t)`.

use std::collections::HashSet;
use tracing::{debug, instrument, warn};

use crate::coerce::{self, NumericClass};
use crate::config::{CleanConfig, DedupPolicy, NullPolicy};
use crate::table::{Column, Row, SemanticType, Table, Value};

/// Counters reported by one cleaning pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanStats {
    pub null_rows_dropped: usize,
    pub duplicates_dropped: usize,
    pub columns_coerced: usize,
}

#[derive(Debug, Clone)]
pub struct Cleaner {
    config: CleanConfig,
}

impl Cleaner {
    pub fn new(config: CleanConfig) -> Self {
        Self { config }
    }

    pub fn clean(&self, table: Table) -> Table {
        self.clean_with_stats(table).0
    }

    #[instrument(skip(self, table), fields(table = %table.name(), rows = table.row_count()))]
    pub fn clean_with_stats(&self, table: Table) -> (Table, CleanStats) {
        let (name, mut columns, rows) = table.into_parts();
        let mut stats = CleanStats::default();

        let before = rows.len();
        let mut rows = filter_nulls(rows, self.config.null_policy);
        stats.null_rows_dropped = before - rows.len();

        // A subset dedup can drop the only row keeping a column non-numeric,
        // so coercion repeats until a dedup pass removes nothing
        loop {
            for index in 0..columns.len() {
                if self.coerce_column(&mut columns[index], &mut rows, index) {
                    stats.columns_coerced += 1;
                }
            }

            let before = rows.len();
            rows = self.deduplicate(&name, &columns, rows);
            let dropped = before - rows.len();
            stats.duplicates_dropped += dropped;
            if dropped == 0 || matches!(self.config.dedup, DedupPolicy::ExactRow) {
                break;
            }
        }

        debug!(
            null_rows_dropped = stats.null_rows_dropped,
            duplicates_dropped = stats.duplicates_dropped,
            columns_coerced = stats.columns_coerced,
            "Cleaned table"
        );

        // Column names and row width are unchanged, so the invariants still hold
        (Table::from_checked_parts(name, columns, rows), stats)
    }

    /// Coerce one column in place. Returns whether its type changed.
    fn coerce_column(&self, column: &mut Column, rows: &mut [Row], index: usize) -> bool {
        let class = coerce::numeric_class(rows.iter().map(|row| &row[index]));
        let target = match class {
            NumericClass::Integer => Some(SemanticType::Integer),
            NumericClass::Float => Some(SemanticType::Float),
            NumericClass::NotNumeric if self.config.coerce_datetimes && is_datetime_column(rows, index) => {
                Some(SemanticType::DateTime)
            },
            NumericClass::NotNumeric => None,
        };

        let Some(target) = target else {
            return false;
        };
        if column.semantic_type == target {
            return false;
        }

        let converted: Option<Vec<Value>> = rows
            .iter()
            .map(|row| convert(&row[index], target))
            .collect();

        match converted {
            Some(values) => {
                for (row, value) in rows.iter_mut().zip(values) {
                    row[index] = value;
                }
                column.semantic_type = target;
                true
            },
            None => {
                warn!(
                    column = %column.name,
                    target = %target,
                    "Column values cannot be reconciled, leaving column unchanged"
                );
                false
            },
        }
    }

    fn deduplicate(&self, table: &str, columns: &[Column], rows: Vec<Row>) -> Vec<Row> {
        let key_indices: Vec<usize> = match &self.config.dedup {
            DedupPolicy::ExactRow => (0..columns.len()).collect(),
            DedupPolicy::Columns(names) => names
                .iter()
                .filter_map(|name| {
                    let index = columns.iter().position(|c| &c.name == name);
                    if index.is_none() {
                        warn!(table = %table, column = %name, "Deduplication column not present, ignoring it");
                    }
                    index
                })
                .collect(),
        };

        // A subset policy with no surviving columns would collapse every row
        if key_indices.is_empty() && !columns.is_empty() {
            return rows;
        }

        let mut seen: HashSet<Vec<Value>> = HashSet::with_capacity(rows.len());
        rows.into_iter()
            .filter(|row| {
                let key: Vec<Value> = key_indices.iter().map(|&i| row[i].clone()).collect();
                seen.insert(key)
            })
            .collect()
    }
}

fn filter_nulls(rows: Vec<Row>, policy: NullPolicy) -> Vec<Row> {
    rows.into_iter()
        .filter(|row| match policy {
            NullPolicy::DropAnyNull => !row.iter().any(Value::is_null),
            NullPolicy::DropAllNull => row.is_empty() || !row.iter().all(Value::is_null),
        })
        .collect()
}

fn is_datetime_column(rows: &[Row], index: usize) -> bool {
    let mut values = rows.iter().map(|row| &row[index]).filter(|v| !v.is_null()).peekable();
    values.peek().is_some() && values.all(|v| coerce::to_datetime(v).is_some())
}

fn convert(value: &Value, target: SemanticType) -> Option<Value> {
    if value.is_null() {
        return Some(Value::Null);
    }
    match target {
        SemanticType::Integer => coerce::to_integer(value).map(Value::Integer),
        SemanticType::Float => coerce::to_float(value).map(Value::Float),
        SemanticType::DateTime => coerce::to_datetime(value).map(Value::DateTime),
        SemanticType::Text(_) => value.render().map(Value::Text),
    }
}
