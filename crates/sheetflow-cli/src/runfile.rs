//! Run file loading
//!
//! A run file is the JSON form of a [`RunRequest`] with an optional
//! `config` section that replaces the `SHEETFLOW_*` environment settings.

use serde::{Deserialize, Serialize};
use sheetflow_core::{PipelineConfig, RunRequest};
use std::path::Path;
use tracing::debug;

use crate::error::{CliError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunFile {
    #[serde(flatten)]
    pub request: RunRequest,
    #[serde(default)]
    pub config: Option<PipelineConfig>,
}

impl RunFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let run_file: RunFile = serde_json::from_str(&content)?;
        debug!(path = %path.display(), sources = run_file.request.sources.len(), "Loaded run file");

        if run_file.request.sources.is_empty() {
            return Err(CliError::config(format!("{} lists no sources", path.display())));
        }
        Ok(run_file)
    }

    /// The file's own config, else the environment's
    pub fn resolve_config(&self) -> Result<PipelineConfig> {
        resolve_config(self.config.clone())
    }
}

pub fn resolve_config(config: Option<PipelineConfig>) -> Result<PipelineConfig> {
    match config {
        Some(config) => Ok(config),
        None => PipelineConfig::from_env().map_err(|e| CliError::config(e.to_string())),
    }
}
