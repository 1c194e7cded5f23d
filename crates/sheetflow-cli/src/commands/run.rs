//! `sheetflow run` command implementation

use colored::Colorize;
use sheetflow_core::{
    EnvSecretProvider, MemoryWarehouse, Orchestrator, OutcomeStatus, PgWarehouse, RunReport,
    SecretProvider, Warehouse, WarehouseConfig,
};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::Result;
use crate::runfile::RunFile;
use crate::DialectArg;

use super::sheet_client;

/// Execute a run file and print its report
pub async fn run(
    base_url: &str,
    params: &Path,
    dry_run: bool,
    dialect: DialectArg,
    output: Option<&Path>,
) -> Result<RunReport> {
    let run_file = RunFile::load(params)?;
    let config = run_file.resolve_config()?;
    let secrets = EnvSecretProvider::new();
    let client = Arc::new(sheet_client(base_url, &secrets, &config)?);

    let memory = dry_run.then(|| MemoryWarehouse::with_dialect(dialect.dialect()));
    let warehouse: Arc<dyn Warehouse> = match &memory {
        Some(memory) => Arc::new(memory.clone()),
        None => Arc::new(connect(&secrets).await?),
    };

    let orchestrator = Orchestrator::from_config(&config, client, warehouse)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, canceling run");
            on_signal.cancel();
        }
    });

    let report = orchestrator.run(&run_file.request, cancel).await?;
    print_report(&report);

    if let Some(memory) = &memory {
        println!();
        println!("{}", "Dry-run DDL:".cyan().bold());
        for statement in memory.statements().await {
            println!("  {}", statement);
        }
    }

    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&report)?)?;
        info!(path = %path.display(), "Run report written");
    }

    Ok(report)
}

/// `DATABASE_URL` when set, otherwise the `db-*` secrets
async fn connect(secrets: &dyn SecretProvider) -> Result<PgWarehouse> {
    let config = match WarehouseConfig::from_env() {
        Ok(config) => config,
        Err(_) => WarehouseConfig::from_secrets(secrets)?,
    };
    Ok(PgWarehouse::connect(&config).await?)
}

fn print_report(report: &RunReport) {
    println!("{}", "Run Report:".cyan().bold());
    for outcome in &report.outcomes {
        match &outcome.status {
            OutcomeStatus::Extracted { rows } => {
                println!("{} {} extracted ({} rows)", "✓".green(), outcome.table_name, rows);
            },
            OutcomeStatus::Loaded { rows_loaded } => {
                println!("{} {} loaded ({} rows)", "✓".green(), outcome.table_name, rows_loaded);
            },
            OutcomeStatus::Failed { kind, message } => {
                println!("{} {} failed [{:?}]: {}", "✗".red(), outcome.table_name, kind, message);
            },
        }
    }
    println!("  Duration: {:.2}s", report.duration_seconds);
}
