//! Command implementations

pub mod inspect;
pub mod run;

use sheetflow_core::warehouse::{Dialect, PostgresDialect, SqlServerDialect};
use sheetflow_core::{HttpSheetClient, PipelineConfig, SecretProvider};
use std::sync::Arc;

use crate::error::Result;
use crate::DialectArg;

pub(crate) fn sheet_client(
    base_url: &str,
    secrets: &dyn SecretProvider,
    config: &PipelineConfig,
) -> Result<HttpSheetClient> {
    Ok(HttpSheetClient::from_secrets(
        base_url,
        secrets,
        config.extract.fetch_timeout(),
    )?)
}

impl DialectArg {
    pub fn dialect(self) -> Arc<dyn Dialect> {
        match self {
            DialectArg::Postgres => Arc::new(PostgresDialect),
            DialectArg::SqlServer => Arc::new(SqlServerDialect),
        }
    }
}
