//! Transactional bulk loading
//!
//! One publish is one transaction: provisioning and every insert batch either
//! commit together or not at all. Loads into the same destination are
//! serialized through a per-destination lock.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::coerce;
use crate::config::{LoadConfig, DEFAULT_BATCH_SIZE, DEFAULT_STATEMENT_TIMEOUT_SECS};
use crate::error::{PipelineError, Result};
use crate::provision::TableProvisioner;
use crate::schema::TableSchema;
use crate::table::{Column, SemanticType, Table, Value};
use crate::warehouse::{SqlValue, TableDefinition, Warehouse, WarehouseError, WarehouseTx};

/// Outcome of a committed load
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReport {
    pub table_name: String,
    pub rows_loaded: u64,
}

#[derive(Debug)]
pub struct BulkLoader {
    batch_size: usize,
    statement_timeout: Duration,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Default for BulkLoader {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE, Duration::from_secs(DEFAULT_STATEMENT_TIMEOUT_SECS))
    }
}

impl BulkLoader {
    pub fn new(batch_size: usize, statement_timeout: Duration) -> Self {
        Self {
            batch_size: batch_size.max(1),
            statement_timeout,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &LoadConfig) -> Self {
        Self::new(config.batch_size, config.statement_timeout())
    }

    /// Rows per INSERT, kept under the backend's bind parameter ceiling
    pub fn effective_batch_size(&self, columns: usize, max_bind_params: usize) -> usize {
        if columns == 0 {
            return self.batch_size;
        }
        self.batch_size.min(max_bind_params / columns).max(1)
    }

    /// Replace or fill `destination` with the rows of `table`.
    ///
    /// Nothing is visible in the warehouse unless this returns `Ok`.
    #[instrument(
        skip(self, warehouse, provisioner, table, schema, cancel),
        fields(destination = %destination, rows = table.row_count())
    )]
    pub async fn publish(
        &self,
        warehouse: &dyn Warehouse,
        provisioner: &TableProvisioner,
        table: &Table,
        schema: &TableSchema,
        destination: &str,
        cancel: &CancellationToken,
    ) -> Result<LoadReport> {
        check_schema_matches(table, schema)?;
        let definition = provisioner.plan(destination, schema, warehouse.dialect())?;
        if definition.columns.is_empty() {
            return Err(PipelineError::invalid_table(destination, "a destination table needs at least one column"));
        }

        let lock = self.lock_for(definition.name.as_str()).await;
        let result = {
            let _guard = lock.lock().await;
            self.publish_locked(warehouse, provisioner, table, schema, &definition, destination, cancel)
                .await
        };
        self.release_lock(definition.name.as_str(), lock).await;
        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn publish_locked(
        &self,
        warehouse: &dyn Warehouse,
        provisioner: &TableProvisioner,
        table: &Table,
        schema: &TableSchema,
        definition: &TableDefinition,
        destination: &str,
        cancel: &CancellationToken,
    ) -> Result<LoadReport> {
        let attempted_rows = table.row_count();
        let rows = convert_rows(table, schema)
            .map_err(|reason| PipelineError::load_failed(destination, attempted_rows, reason))?;

        let batch_size =
            self.effective_batch_size(definition.columns.len(), warehouse.dialect().max_bind_params());

        let mut tx = self
            .timed(warehouse.begin())
            .await
            .map_err(|e| PipelineError::load_failed(destination, attempted_rows, e))?;

        let written = self
            .write(tx.as_mut(), provisioner, definition, &rows, batch_size, cancel)
            .await;

        match written {
            Ok(rows_loaded) => {
                self.timed(tx.commit())
                    .await
                    .map_err(|e| PipelineError::load_failed(destination, attempted_rows, e))?;
                info!(table = %definition.name, rows_loaded, "Load committed");
                Ok(LoadReport {
                    table_name: definition.name.as_str().to_string(),
                    rows_loaded,
                })
            },
            Err(err) => {
                if let Err(rollback_err) = self.timed(tx.rollback()).await {
                    warn!(table = %definition.name, error = %rollback_err, "Rollback failed");
                }
                warn!(table = %definition.name, error = %err, "Load rolled back");
                match err {
                    PipelineError::Canceled => Err(PipelineError::Canceled),
                    other => Err(PipelineError::load_failed(destination, attempted_rows, other)),
                }
            },
        }
    }

    async fn write(
        &self,
        tx: &mut dyn WarehouseTx,
        provisioner: &TableProvisioner,
        definition: &TableDefinition,
        rows: &[Vec<SqlValue>],
        batch_size: usize,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        if cancel.is_cancelled() {
            return Err(PipelineError::Canceled);
        }

        self.timed_pipeline(provisioner.provision(tx, definition)).await?;

        let insert = definition.insert_statement();
        let mut rows_loaded = 0u64;
        for (batch_index, batch) in rows.chunks(batch_size).enumerate() {
            let inserted = tokio::select! {
                _ = cancel.cancelled() => return Err(PipelineError::Canceled),
                result = self.timed(tx.execute_batch(&insert, batch)) => result?,
            };
            rows_loaded += inserted;
            debug!(batch = batch_index, rows = batch.len(), "Batch inserted");
        }

        Ok(rows_loaded)
    }

    async fn lock_for(&self, destination: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(destination.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Forget the lock for `destination` once no other load holds a handle
    async fn release_lock(&self, destination: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        drop(lock);
        if locks.get(destination).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(destination);
        }
    }

    async fn timed<T>(
        &self,
        fut: impl Future<Output = std::result::Result<T, WarehouseError>>,
    ) -> std::result::Result<T, WarehouseError> {
        match tokio::time::timeout(self.statement_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(WarehouseError::Timeout(self.statement_timeout)),
        }
    }

    async fn timed_pipeline<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.statement_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(WarehouseError::Timeout(self.statement_timeout).into()),
        }
    }
}

fn check_schema_matches(table: &Table, schema: &TableSchema) -> Result<()> {
    let table_names: Vec<&str> = table.columns().iter().map(|c| c.name.as_str()).collect();
    let schema_names: Vec<&str> = schema.columns.iter().map(|c| c.name.as_str()).collect();
    if table_names != schema_names {
        return Err(PipelineError::invalid_table(
            table.name(),
            format!(
                "schema columns [{}] do not match table columns [{}]",
                schema_names.join(", "),
                table_names.join(", ")
            ),
        ));
    }
    Ok(())
}

/// Convert every row before any SQL runs; the first impossible value fails the load
fn convert_rows(table: &Table, schema: &TableSchema) -> std::result::Result<Vec<Vec<SqlValue>>, String> {
    table
        .rows()
        .iter()
        .enumerate()
        .map(|(row_index, row)| {
            row.iter()
                .zip(&schema.columns)
                .map(|(value, column)| {
                    convert_value(value, column).ok_or_else(|| {
                        format!(
                            "row {}: value {:?} cannot be stored in column '{}' of type {}",
                            row_index, value, column.name, column.semantic_type
                        )
                    })
                })
                .collect()
        })
        .collect()
}

fn convert_value(value: &Value, column: &Column) -> Option<SqlValue> {
    if value.is_null() {
        return Some(SqlValue::Null(column.semantic_type));
    }
    match column.semantic_type {
        SemanticType::Integer => coerce::to_integer(value).map(SqlValue::Integer),
        SemanticType::Float => coerce::to_float(value).map(SqlValue::Float),
        SemanticType::DateTime => coerce::to_datetime(value).map(SqlValue::DateTime),
        SemanticType::Text(capacity) => value.render().map(|text| match capacity.limit() {
            Some(limit) => SqlValue::Text(coerce::truncate_chars(&text, limit)),
            None => SqlValue::Text(text),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::table::TextCapacity;

    fn column(name: &str, semantic_type: SemanticType) -> Column {
        Column::new(name, semantic_type)
    }

    #[test]
    fn test_effective_batch_size_respects_bind_limit() {
        let loader = BulkLoader::new(500, Duration::from_secs(5));
        assert_eq!(loader.effective_batch_size(10, 65535), 500);
        assert_eq!(loader.effective_batch_size(200, 65535), 327);
        assert_eq!(loader.effective_batch_size(300, 2100), 7);
        assert_eq!(loader.effective_batch_size(5000, 2100), 1);
    }

    #[test]
    fn test_text_truncated_to_capacity() {
        let col = column("note", SemanticType::Text(TextCapacity::Bounded(3)));
        assert_eq!(
            convert_value(&Value::from("abcdef"), &col),
            Some(SqlValue::Text("abc".to_string()))
        );
    }

    #[test]
    fn test_numbers_render_into_text_columns() {
        let col = column("code", SemanticType::Text(TextCapacity::Bounded(10)));
        assert_eq!(
            convert_value(&Value::Integer(42), &col),
            Some(SqlValue::Text("42".to_string()))
        );
    }

    #[test]
    fn test_null_keeps_column_type() {
        let col = column("qty", SemanticType::Integer);
        assert_eq!(
            convert_value(&Value::Null, &col),
            Some(SqlValue::Null(SemanticType::Integer))
        );
    }

    #[tokio::test]
    async fn test_destination_locks_released_after_publish() {
        use crate::config::{ProvisionPolicy, SchemaConfig, WidthPolicy};
        use crate::schema::SchemaInferencer;
        use crate::warehouse::MemoryWarehouse;

        let table = Table::from_text_rows("orders", &["id"], &[&["1"]]).unwrap();
        let schema = SchemaInferencer::new(SchemaConfig {
            width: WidthPolicy::Unbounded,
            strict_typing: false,
        })
        .infer(&table)
        .unwrap();
        let warehouse = MemoryWarehouse::new();
        let provisioner = TableProvisioner::new(ProvisionPolicy::Destructive);
        let loader = BulkLoader::new(10, Duration::from_secs(5));
        let cancel = CancellationToken::new();

        for _ in 0..2 {
            loader
                .publish(&warehouse, &provisioner, &table, &schema, "orders", &cancel)
                .await
                .unwrap();
        }
        assert!(loader.locks.lock().await.is_empty());

        let failing = MemoryWarehouse::new().with_failure_on_batch(0);
        assert!(loader
            .publish(&failing, &provisioner, &table, &schema, "orders", &cancel)
            .await
            .is_err());
        assert!(loader.locks.lock().await.is_empty());
    }

    #[test]
    fn test_impossible_conversion() {
        let col = column("qty", SemanticType::Integer);
        assert_eq!(convert_value(&Value::from("twelve"), &col), None);
        assert_eq!(convert_value(&Value::Float(1.5), &col), None);
    }
}
