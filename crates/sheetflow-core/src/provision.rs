//! Destination table provisioning

use std::collections::HashMap;
use tracing::{info, instrument, warn};

use crate::config::ProvisionPolicy;
use crate::error::{PipelineError, Result};
use crate::schema::TableSchema;
use crate::warehouse::{
    ColumnDefinition, Dialect, Identifier, Statement, TableDefinition, WarehouseTx,
};

#[derive(Debug, Clone, Copy)]
pub struct TableProvisioner {
    policy: ProvisionPolicy,
}

impl TableProvisioner {
    pub fn new(policy: ProvisionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> ProvisionPolicy {
        self.policy
    }

    /// Sanitize the destination and every column name into a definition.
    ///
    /// Two raw names that sanitize to the same identifier are rejected rather
    /// than silently merged.
    pub fn plan(
        &self,
        destination: &str,
        schema: &TableSchema,
        dialect: &dyn Dialect,
    ) -> Result<TableDefinition> {
        let max_len = dialect.max_identifier_len();
        let name = Identifier::sanitize(destination, max_len)?;

        let mut seen: HashMap<String, &str> = HashMap::with_capacity(schema.columns.len());
        let mut columns = Vec::with_capacity(schema.columns.len());
        for column in &schema.columns {
            let identifier = Identifier::sanitize(&column.name, max_len)?;
            // Most warehouses fold identifier case
            let folded = identifier.as_str().to_lowercase();
            if let Some(previous) = seen.insert(folded, column.name.as_str()) {
                return Err(PipelineError::invalid_identifier(
                    &column.name,
                    format!("collides with column '{}' as '{}'", previous, identifier),
                ));
            }
            if identifier.as_str() != column.name {
                warn!(raw = %column.name, sanitized = %identifier, "Column name sanitized");
            }
            columns.push(ColumnDefinition {
                name: identifier,
                semantic_type: column.semantic_type,
                nullable: column.nullable,
            });
        }

        Ok(TableDefinition { name, columns })
    }

    /// DDL for the policy, without executing it
    pub fn statements(&self, definition: &TableDefinition) -> Vec<Statement> {
        match self.policy {
            ProvisionPolicy::Destructive => vec![
                Statement::DropTableIfExists {
                    table: definition.name.clone(),
                },
                Statement::CreateTable {
                    definition: definition.clone(),
                    if_not_exists: false,
                },
            ],
            ProvisionPolicy::Conditional => vec![Statement::CreateTable {
                definition: definition.clone(),
                if_not_exists: true,
            }],
        }
    }

    #[instrument(skip(self, tx, definition), fields(table = %definition.name, policy = ?self.policy))]
    pub async fn provision(
        &self,
        tx: &mut dyn WarehouseTx,
        definition: &TableDefinition,
    ) -> Result<()> {
        if self.policy == ProvisionPolicy::Destructive {
            warn!(table = %definition.name, "Dropping and recreating destination table; existing rows will be destroyed");
        }

        for statement in self.statements(definition) {
            tx.execute(&statement).await?;
        }

        info!(columns = definition.columns.len(), "Destination table provisioned");
        Ok(())
    }
}
