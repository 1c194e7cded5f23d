//! In-memory warehouse backend
//!
//! Transactions work on a private copy of the tables and publish the tables
//! they touched on commit, so a rolled-back or dropped transaction leaves no
//! trace. Declared column types and text capacities are enforced the way a
//! real database would.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use crate::table::SemanticType;

use super::{
    ColumnDefinition, Dialect, InsertStatement, PostgresDialect, SqlValue, Statement,
    TableDefinition, Warehouse, WarehouseError, WarehouseTx,
};

#[derive(Debug, Clone)]
pub struct MemoryTable {
    pub definition: TableDefinition,
    pub rows: Vec<Vec<SqlValue>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: HashMap<String, MemoryTable>,
    statements: Vec<String>,
    commits: usize,
    rollbacks: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct FaultPlan {
    fail_on_batch: Option<usize>,
    batch_delay: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct MemoryWarehouse {
    state: Arc<Mutex<MemoryState>>,
    dialect: Arc<dyn Dialect>,
    faults: FaultPlan,
}

impl Default for MemoryWarehouse {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::with_dialect(Arc::new(PostgresDialect))
    }

    pub fn with_dialect(dialect: Arc<dyn Dialect>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            dialect,
            faults: FaultPlan::default(),
        }
    }

    /// Fail the `index`-th batch (0-based) of every transaction
    pub fn with_failure_on_batch(mut self, index: usize) -> Self {
        self.faults.fail_on_batch = Some(index);
        self
    }

    /// Sleep before applying each batch
    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.faults.batch_delay = Some(delay);
        self
    }

    /// Install a committed table directly, as if an earlier run had loaded it
    pub async fn seed(&self, definition: TableDefinition, rows: Vec<Vec<SqlValue>>) {
        let mut state = self.state.lock().await;
        state.tables.insert(
            definition.name.as_str().to_string(),
            MemoryTable { definition, rows },
        );
    }

    pub async fn rows(&self, table: &str) -> Option<Vec<Vec<SqlValue>>> {
        let state = self.state.lock().await;
        state.tables.get(table).map(|t| t.rows.clone())
    }

    pub async fn definition(&self, table: &str) -> Option<TableDefinition> {
        let state = self.state.lock().await;
        state.tables.get(table).map(|t| t.definition.clone())
    }

    pub async fn table_names(&self) -> Vec<String> {
        let state = self.state.lock().await;
        let mut names: Vec<String> = state.tables.keys().cloned().collect();
        names.sort();
        names
    }

    /// Rendered DDL of every committed transaction, in commit order
    pub async fn statements(&self) -> Vec<String> {
        self.state.lock().await.statements.clone()
    }

    pub async fn commit_count(&self) -> usize {
        self.state.lock().await.commits
    }

    pub async fn rollback_count(&self) -> usize {
        self.state.lock().await.rollbacks
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    async fn begin(&self) -> Result<Box<dyn WarehouseTx>, WarehouseError> {
        let working = self.state.lock().await.tables.clone();
        Ok(Box::new(MemoryTx {
            shared: self.state.clone(),
            dialect: self.dialect.clone(),
            faults: self.faults,
            working,
            touched: HashSet::new(),
            statements: Vec::new(),
            batches: 0,
        }))
    }
}

struct MemoryTx {
    shared: Arc<Mutex<MemoryState>>,
    dialect: Arc<dyn Dialect>,
    faults: FaultPlan,
    working: HashMap<String, MemoryTable>,
    touched: HashSet<String>,
    statements: Vec<String>,
    batches: usize,
}

#[async_trait]
impl WarehouseTx for MemoryTx {
    async fn execute(&mut self, statement: &Statement) -> Result<(), WarehouseError> {
        let sql = self.dialect.render(statement);
        debug!(sql = %sql, "Executing statement");

        match statement {
            Statement::DropTableIfExists { table } => {
                self.working.remove(table.as_str());
                self.touched.insert(table.as_str().to_string());
            },
            Statement::CreateTable {
                definition,
                if_not_exists,
            } => {
                let name = definition.name.as_str();
                if self.working.contains_key(name) {
                    if !*if_not_exists {
                        return Err(WarehouseError::rejected(format!(
                            "relation \"{}\" already exists",
                            name
                        )));
                    }
                } else {
                    self.working.insert(
                        name.to_string(),
                        MemoryTable {
                            definition: definition.clone(),
                            rows: Vec::new(),
                        },
                    );
                    self.touched.insert(name.to_string());
                }
            },
        }

        self.statements.push(sql);
        Ok(())
    }

    async fn execute_batch(
        &mut self,
        insert: &InsertStatement,
        rows: &[Vec<SqlValue>],
    ) -> Result<u64, WarehouseError> {
        let index = self.batches;
        self.batches += 1;

        if let Some(delay) = self.faults.batch_delay {
            tokio::time::sleep(delay).await;
        }
        if self.faults.fail_on_batch == Some(index) {
            return Err(WarehouseError::rejected(format!("injected failure on batch {}", index)));
        }

        let table = self
            .working
            .get_mut(insert.table.as_str())
            .ok_or_else(|| {
                WarehouseError::rejected(format!("relation \"{}\" does not exist", insert.table))
            })?;

        let positions = insert
            .columns
            .iter()
            .map(|column| {
                table
                    .definition
                    .columns
                    .iter()
                    .position(|c| c.name == *column)
                    .ok_or_else(|| {
                        WarehouseError::rejected(format!(
                            "column \"{}\" of relation \"{}\" does not exist",
                            column, insert.table
                        ))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut staged = Vec::with_capacity(rows.len());
        for row in rows {
            if row.len() != positions.len() {
                return Err(WarehouseError::rejected(format!(
                    "row has {} values for {} columns",
                    row.len(),
                    positions.len()
                )));
            }

            let mut stored: Vec<SqlValue> = table
                .definition
                .columns
                .iter()
                .map(|c| SqlValue::Null(c.semantic_type))
                .collect();
            for (value, &position) in row.iter().zip(&positions) {
                stored[position] = value.clone();
            }
            for (value, column) in stored.iter().zip(&table.definition.columns) {
                check_value(column, value)?;
            }
            staged.push(stored);
        }

        let count = staged.len() as u64;
        table.rows.extend(staged);
        self.touched.insert(insert.table.as_str().to_string());
        Ok(count)
    }

    async fn commit(self: Box<Self>) -> Result<(), WarehouseError> {
        let this = *self;
        let mut state = this.shared.lock().await;
        let mut working = this.working;
        for name in this.touched {
            match working.remove(&name) {
                Some(table) => {
                    state.tables.insert(name, table);
                },
                None => {
                    state.tables.remove(&name);
                },
            }
        }
        state.statements.extend(this.statements);
        state.commits += 1;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), WarehouseError> {
        self.shared.lock().await.rollbacks += 1;
        Ok(())
    }
}

fn check_value(column: &ColumnDefinition, value: &SqlValue) -> Result<(), WarehouseError> {
    let ok = match (value, column.semantic_type) {
        (SqlValue::Null(_), _) => column.nullable,
        (SqlValue::Integer(_), SemanticType::Integer | SemanticType::Float) => true,
        (SqlValue::Float(f), SemanticType::Float) => f.is_finite(),
        (SqlValue::Text(s), SemanticType::Text(capacity)) => match capacity.limit() {
            Some(limit) => s.chars().count() <= limit,
            None => true,
        },
        (SqlValue::DateTime(_), SemanticType::DateTime) => true,
        _ => false,
    };

    if ok {
        Ok(())
    } else {
        Err(WarehouseError::rejected(format!(
            "value {:?} does not fit column \"{}\" of type {}{}",
            value,
            column.name,
            column.semantic_type,
            if column.nullable { "" } else { " NOT NULL" }
        )))
    }
}
