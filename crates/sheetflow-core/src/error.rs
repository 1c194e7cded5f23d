//! Pipeline error taxonomy
//!
//! Only source failures are ever retried (see [`crate::retry`]). Everything
//! else is structural and surfaces immediately.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors raised by the pipeline stages
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The locator does not identify a stable spreadsheet
    #[error("Invalid locator '{locator}': {reason}")]
    InvalidLocator { locator: String, reason: String },

    /// Transient fetch failures persisted through every attempt
    #[error("Source '{source_name}' failed after {attempts} attempts: {last_error}")]
    RetryExhausted {
        source_name: String,
        attempts: u32,
        last_error: String,
    },

    /// The source answered with a permanent failure (not retried)
    #[error("Source '{source_name}' rejected the request: {reason}")]
    SourceRejected { source_name: String, reason: String },

    /// A join key is absent from one of the operands of a merge step
    #[error("Join key '{key}' is missing from table '{table}'")]
    MissingJoinKey { table: String, key: String },

    /// A merge step depends on a table that was not extracted
    #[error("Merge depends on table '{table}', which is not available")]
    UpstreamMissing { table: String },

    /// The load transaction was rolled back; nothing was written
    #[error("Load into '{table}' failed after attempting {attempted_rows} rows: {reason}")]
    LoadFailed {
        table: String,
        attempted_rows: usize,
        reason: String,
    },

    /// Strict typing found incompatible value kinds in one column
    #[error("Column '{column}' mixes incompatible value kinds: {kinds}")]
    SchemaInferenceAmbiguous { column: String, kinds: String },

    /// An identifier cannot be made safe for DDL
    #[error("Identifier '{raw}' cannot be used: {reason}")]
    InvalidIdentifier { raw: String, reason: String },

    /// A table violates the column-uniqueness or arity invariants
    #[error("Invalid table '{table}': {reason}")]
    InvalidTable { table: String, reason: String },

    #[error("Invalid merge specification: {0}")]
    InvalidMergeSpec(String),

    #[error("Warehouse error: {0}")]
    Warehouse(#[from] crate::warehouse::WarehouseError),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Configuration error: {0}. Check the SHEETFLOW_* environment variables or the run file.")]
    Config(String),

    #[error("Secret '{0}' is not available")]
    SecretMissing(String),

    #[error("Run was canceled")]
    Canceled,
}

/// Serializable discriminant of [`PipelineError`], used in run reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidLocator,
    RetryExhausted,
    SourceRejected,
    MissingJoinKey,
    UpstreamMissing,
    LoadFailed,
    SchemaInferenceAmbiguous,
    InvalidIdentifier,
    InvalidTable,
    InvalidMergeSpec,
    Warehouse,
    Cache,
    Config,
    SecretMissing,
    Canceled,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::InvalidLocator { .. } => ErrorKind::InvalidLocator,
            PipelineError::RetryExhausted { .. } => ErrorKind::RetryExhausted,
            PipelineError::SourceRejected { .. } => ErrorKind::SourceRejected,
            PipelineError::MissingJoinKey { .. } => ErrorKind::MissingJoinKey,
            PipelineError::UpstreamMissing { .. } => ErrorKind::UpstreamMissing,
            PipelineError::LoadFailed { .. } => ErrorKind::LoadFailed,
            PipelineError::SchemaInferenceAmbiguous { .. } => ErrorKind::SchemaInferenceAmbiguous,
            PipelineError::InvalidIdentifier { .. } => ErrorKind::InvalidIdentifier,
            PipelineError::InvalidTable { .. } => ErrorKind::InvalidTable,
            PipelineError::InvalidMergeSpec(_) => ErrorKind::InvalidMergeSpec,
            PipelineError::Warehouse(_) => ErrorKind::Warehouse,
            PipelineError::Cache(_) => ErrorKind::Cache,
            PipelineError::Config(_) => ErrorKind::Config,
            PipelineError::SecretMissing(_) => ErrorKind::SecretMissing,
            PipelineError::Canceled => ErrorKind::Canceled,
        }
    }

    pub fn invalid_locator(locator: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidLocator {
            locator: locator.into(),
            reason: reason.into(),
        }
    }

    pub fn missing_join_key(table: impl Into<String>, key: impl Into<String>) -> Self {
        Self::MissingJoinKey {
            table: table.into(),
            key: key.into(),
        }
    }

    pub fn upstream_missing(table: impl Into<String>) -> Self {
        Self::UpstreamMissing {
            table: table.into(),
        }
    }

    pub fn load_failed(
        table: impl Into<String>,
        attempted_rows: usize,
        reason: impl std::fmt::Display,
    ) -> Self {
        Self::LoadFailed {
            table: table.into(),
            attempted_rows,
            reason: reason.to_string(),
        }
    }

    pub fn invalid_table(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTable {
            table: table.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_identifier(raw: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            raw: raw.into(),
            reason: reason.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<sheetflow_common::CommonError> for PipelineError {
    fn from(err: sheetflow_common::CommonError) -> Self {
        PipelineError::Cache(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        let err = PipelineError::load_failed("orders", 12, "connection reset");
        assert_eq!(err.kind(), ErrorKind::LoadFailed);
        assert_eq!(
            err.to_string(),
            "Load into 'orders' failed after attempting 12 rows: connection reset"
        );
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::UpstreamMissing).unwrap();
        assert_eq!(json, "\"upstream_missing\"");
    }
}
