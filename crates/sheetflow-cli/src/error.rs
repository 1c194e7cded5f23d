//! Error types for the SheetFlow CLI

use sheetflow_core::{PipelineError, WarehouseError};
use thiserror::Error;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

/// User-facing CLI errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Run file is missing or unreadable
    #[error("File operation failed: {0}. Check the path and file permissions.")]
    Io(#[from] std::io::Error),

    /// Run file is not valid JSON or does not match the expected shape
    #[error("Failed to parse run file: {0}. Check the file syntax.")]
    JsonParse(#[from] serde_json::Error),

    /// Configuration is missing or invalid
    #[error("Configuration error: {0}. Set the SHEETFLOW_* variables or add a \"config\" section to the run file.")]
    Config(String),

    /// The pipeline refused to run at all
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// The warehouse could not be reached
    #[error("Warehouse error: {0}. Check DATABASE_URL or the db-* secrets.")]
    Warehouse(#[from] WarehouseError),

    /// The run finished but some destinations failed
    #[error("{failures} destination(s) failed")]
    RunFailed { failures: usize },
}

impl CliError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
