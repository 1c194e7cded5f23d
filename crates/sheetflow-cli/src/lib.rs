//! SheetFlow CLI Library
//!
//! Thin wiring around `sheetflow-core`:
//!
//! - **Run**: execute a run file against Postgres, or an in-memory warehouse with `--dry-run`
//! - **Inspect**: fetch and clean one sheet, then print its inferred schema

pub mod commands;
pub mod error;
pub mod runfile;

// Re-export commonly used types
pub use error::{CliError, Result};
pub use runfile::RunFile;

use clap::{Parser, Subcommand, ValueEnum};
use sheetflow_core::source::http::DEFAULT_BASE_URL;
use std::path::PathBuf;

/// SheetFlow - spreadsheet to warehouse pipelines
#[derive(Parser, Debug)]
#[command(name = "sheetflow")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Base URL of the spreadsheet export endpoint
    #[arg(long, env = "SHEETFLOW_SHEETS_BASE_URL", default_value = DEFAULT_BASE_URL, global = true)]
    pub sheets_base_url: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract, clean, merge and load everything a run file describes
    Run {
        /// Run file (JSON)
        #[arg(short, long, default_value = "parameters.json")]
        params: PathBuf,

        /// Load into an in-memory warehouse instead of the database
        #[arg(long)]
        dry_run: bool,

        /// SQL dialect of the in-memory warehouse
        #[arg(long, value_enum, default_value_t = DialectArg::Postgres, requires = "dry_run")]
        dialect: DialectArg,

        /// Also write the run report as JSON to this path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Fetch one sheet and print its inferred schema
    Inspect {
        /// Sheet URL or spreadsheet id (optionally with #gid=N)
        locator: String,

        /// Run file whose config section to use instead of the environment
        #[arg(short, long)]
        params: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DialectArg {
    Postgres,
    SqlServer,
}
