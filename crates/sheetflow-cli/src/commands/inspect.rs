//! `sheetflow inspect` command implementation

use colored::Colorize;
use sheetflow_core::warehouse::{Dialect, PostgresDialect};
use sheetflow_core::{
    EnvSecretProvider, MemoryWarehouse, Orchestrator, SourceDescriptor, TableProvisioner,
};
use std::path::Path;
use std::sync::Arc;

use crate::error::Result;
use crate::runfile::{resolve_config, RunFile};

use super::sheet_client;

/// Destination name the inspected sheet is planned under
const INSPECT_TABLE: &str = "inspected_sheet";

/// Fetch and clean one sheet, then print its schema and Postgres DDL
pub async fn run(base_url: &str, locator: &str, params: Option<&Path>) -> Result<()> {
    let config = match params {
        Some(path) => RunFile::load(path)?.resolve_config()?,
        None => resolve_config(None)?,
    };
    let secrets = EnvSecretProvider::new();
    let client = Arc::new(sheet_client(base_url, &secrets, &config)?);
    let orchestrator =
        Orchestrator::from_config(&config, client, Arc::new(MemoryWarehouse::new()))?;

    let table = orchestrator
        .extract(&SourceDescriptor::new(locator, INSPECT_TABLE))
        .await?;
    let schema = orchestrator.infer(&table)?;

    println!(
        "{} {} rows, {} columns",
        "Sheet:".cyan().bold(),
        table.row_count(),
        schema.len()
    );
    let width = schema.columns.iter().map(|c| c.name.len()).max().unwrap_or(0);
    for column in &schema.columns {
        println!(
            "  {:width$}  {:<12}  {}",
            column.name,
            column.semantic_type.to_string(),
            if column.nullable { "null" } else { "not null" },
            width = width
        );
    }

    if !schema.is_empty() {
        let provisioner = TableProvisioner::new(config.load.provision);
        let dialect = PostgresDialect;
        let definition = provisioner.plan(INSPECT_TABLE, &schema, &dialect)?;
        println!();
        println!("{}", "DDL:".cyan().bold());
        for statement in provisioner.statements(&definition) {
            println!("  {}", dialect.render(&statement));
        }
    }

    Ok(())
}
