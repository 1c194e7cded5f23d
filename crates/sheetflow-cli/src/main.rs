//! SheetFlow CLI - Main entry point

use anyhow::Context;
use clap::Parser;
use sheetflow_cli::{Cli, CliError, Commands};
use sheetflow_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use std::process;
use tracing::error;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose { LogLevel::Debug } else { LogLevel::Warn };
    let log_config = LogConfig::builder()
        .level(level)
        .output(LogOutput::Console)
        .log_file_prefix("sheetflow")
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    // The CLI works without logging
    let _guard = init_logging(&log_config).ok();

    if let Err(e) = execute_command(&cli).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn execute_command(cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Run {
            params,
            dry_run,
            dialect,
            output,
        } => {
            let report = sheetflow_cli::commands::run::run(
                &cli.sheets_base_url,
                params,
                *dry_run,
                *dialect,
                output.as_deref(),
            )
            .await
            .with_context(|| format!("Run of {} failed", params.display()))?;

            let failures = report.failures().count();
            if failures > 0 {
                return Err(CliError::RunFailed { failures }.into());
            }
            Ok(())
        },

        Commands::Inspect { locator, params } => {
            sheetflow_cli::commands::inspect::run(&cli.sheets_base_url, locator, params.as_deref())
                .await
                .with_context(|| format!("Inspecting {} failed", locator))
        },
    }
}
