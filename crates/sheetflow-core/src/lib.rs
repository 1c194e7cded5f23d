//! SheetFlow Core
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Moves tabular data from published spreadsheets into a relational
//! warehouse:
//!
//! - **Source**: locator parsing, retried fetches, TTL-cached extractions
//! - **Clean**: null filtering, duplicate removal, numeric coercion
//! - **Schema**: per-column semantic type and text capacity inference
//! - **Warehouse**: dialect-aware provisioning and transactional bulk loads
//! - **Merge**: an ordered chain of inner joins over extracted tables
//! - **Orchestrator**: one run across many sources with per-source isolation
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use sheetflow_core::{
//!     HttpSheetClient, MemoryWarehouse, Orchestrator, PipelineConfig, RunRequest,
//!     SourceDescriptor,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> sheetflow_core::Result<()> {
//! let config = PipelineConfig::from_env()?;
//! let client = HttpSheetClient::new("https://docs.google.com", config.extract.fetch_timeout())?;
//! let orchestrator = Orchestrator::from_config(
//!     &config,
//!     Arc::new(client),
//!     Arc::new(MemoryWarehouse::default()),
//! )?;
//!
//! let request = RunRequest {
//!     sources: vec![SourceDescriptor::new("1TVk7_vQbl__q5a4sAgBf6cTv9as2mK1", "orders")],
//!     merge: None,
//!     load_individual: true,
//! };
//! let report = orchestrator.run(&request, CancellationToken::new()).await?;
//! println!("{} destinations", report.outcomes.len());
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod clean;
pub mod coerce;
pub mod config;
pub mod error;
pub mod load;
pub mod merge;
pub mod orchestrator;
pub mod provision;
pub mod retry;
pub mod schema;
pub mod secrets;
pub mod source;
pub mod table;
pub mod warehouse;

pub use cache::{CacheStore, FileCache, MemoryCache, TableCache};
pub use clean::{CleanStats, Cleaner};
pub use config::{
    CleanConfig, DedupPolicy, ExtractConfig, LoadConfig, NullPolicy, PipelineConfig,
    ProvisionPolicy, SchemaConfig, WidthPolicy,
};
pub use error::{ErrorKind, PipelineError, Result};
pub use load::{BulkLoader, LoadReport};
pub use merge::{MergeEngine, MergeSpec, MergeStep};
pub use orchestrator::{DestinationOutcome, Orchestrator, OutcomeStatus, RunReport, RunRequest};
pub use provision::TableProvisioner;
pub use retry::RetryPolicy;
pub use schema::{SchemaInferencer, TableSchema};
pub use secrets::{EnvSecretProvider, SecretProvider, StaticSecretProvider};
pub use source::{FetchError, HttpSheetClient, Locator, SheetClient, SheetRecord, SourceDescriptor, SourceReader};
pub use table::{Column, Row, SemanticType, Table, TextCapacity, Value};
pub use warehouse::{MemoryWarehouse, PgWarehouse, Warehouse, WarehouseConfig, WarehouseError};
