//! Relational warehouse seam
//!
//! The loader and provisioner only talk to [`Warehouse`] and [`WarehouseTx`].
//! SQL text is produced by a [`Dialect`], so the same load plan runs against
//! PostgreSQL, SQL Server syntax checks, or the in-memory backend.

pub mod dialect;
pub mod identifier;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::table::SemanticType;

pub use dialect::{Dialect, PostgresDialect, SqlServerDialect};
pub use identifier::Identifier;
pub use memory::MemoryWarehouse;
pub use postgres::{create_pool, PgWarehouse, WarehouseConfig};

/// Errors raised by a warehouse backend
#[derive(Error, Debug)]
pub enum WarehouseError {
    #[error("Database query failed: {0}")]
    Database(#[from] sqlx::Error),

    /// The backend refused a statement or value
    #[error("Statement rejected: {0}")]
    Rejected(String),

    #[error("Statement timed out after {0:?}")]
    Timeout(Duration),

    #[error("Warehouse configuration error: {0}. Check DATABASE_URL or the db-* secrets.")]
    Config(String),
}

impl WarehouseError {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }
}

/// A bound parameter; nulls carry their column type so backends can bind them
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null(SemanticType),
    Integer(i64),
    Float(f64),
    Text(String),
    DateTime(NaiveDateTime),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: Identifier,
    pub semantic_type: SemanticType,
    pub nullable: bool,
}

/// A destination-ready table schema with sanitized identifiers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub name: Identifier,
    pub columns: Vec<ColumnDefinition>,
}

impl TableDefinition {
    pub fn column_names(&self) -> Vec<Identifier> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn insert_statement(&self) -> InsertStatement {
        InsertStatement {
            table: self.name.clone(),
            columns: self.column_names(),
        }
    }
}

/// DDL understood by every backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    DropTableIfExists { table: Identifier },
    CreateTable {
        definition: TableDefinition,
        if_not_exists: bool,
    },
}

/// Target of a multi-row insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertStatement {
    pub table: Identifier,
    pub columns: Vec<Identifier>,
}

/// A connection factory for one warehouse
#[async_trait]
pub trait Warehouse: Send + Sync {
    fn dialect(&self) -> &dyn Dialect;

    async fn begin(&self) -> Result<Box<dyn WarehouseTx>, WarehouseError>;
}

/// An open transaction. Dropping it without `commit` discards its work.
#[async_trait]
pub trait WarehouseTx: Send {
    async fn execute(&mut self, statement: &Statement) -> Result<(), WarehouseError>;

    /// Insert rows whose values line up with `insert.columns`
    async fn execute_batch(
        &mut self,
        insert: &InsertStatement,
        rows: &[Vec<SqlValue>],
    ) -> Result<u64, WarehouseError>;

    async fn commit(self: Box<Self>) -> Result<(), WarehouseError>;

    async fn rollback(self: Box<Self>) -> Result<(), WarehouseError>;
}
