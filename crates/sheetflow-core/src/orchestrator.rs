//! One pipeline run: extract and clean every source concurrently, optionally
//! load each table, then merge and load the merged table.
//!
//! A source that fails is reported in the run report and skipped. It only
//! stops the merge when the merge reads it, which surfaces as
//! `UpstreamMissing` on the merged destination.

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::cache::{FileCache, MemoryCache, TableCache};
use crate::clean::Cleaner;
use crate::config::{ExtractConfig, PipelineConfig};
use crate::error::{ErrorKind, PipelineError, Result};
use crate::load::BulkLoader;
use crate::merge::{MergeEngine, MergeSpec};
use crate::provision::TableProvisioner;
use crate::schema::{SchemaInferencer, TableSchema};
use crate::source::{SheetClient, SourceDescriptor, SourceReader};
use crate::table::Table;
use crate::warehouse::Warehouse;

/// Everything one run needs to know
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunRequest {
    pub sources: Vec<SourceDescriptor>,
    #[serde(default)]
    pub merge: Option<MergeSpec>,
    /// Also load every cleaned source table under its own destination name
    #[serde(default)]
    pub load_individual: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Extracted { rows: usize },
    Loaded { rows_loaded: u64 },
    Failed { kind: ErrorKind, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationOutcome {
    pub table_name: String,
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

impl DestinationOutcome {
    fn failed(table_name: &str, err: &PipelineError) -> Self {
        Self {
            table_name: table_name.to_string(),
            status: OutcomeStatus::Failed {
                kind: err.kind(),
                message: err.to_string(),
            },
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.status, OutcomeStatus::Failed { .. })
    }
}

/// Per-destination results of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub outcomes: Vec<DestinationOutcome>,
    pub duration_seconds: f64,
}

impl RunReport {
    pub fn outcome(&self, table_name: &str) -> Option<&DestinationOutcome> {
        self.outcomes.iter().find(|o| o.table_name == table_name)
    }

    pub fn failures(&self) -> impl Iterator<Item = &DestinationOutcome> {
        self.outcomes.iter().filter(|o| o.is_failure())
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }
}

pub struct Orchestrator {
    reader: SourceReader,
    cleaner: Cleaner,
    inferencer: SchemaInferencer,
    provisioner: TableProvisioner,
    loader: BulkLoader,
    merge_engine: MergeEngine,
    warehouse: Arc<dyn Warehouse>,
    concurrency: usize,
}

/// File-backed cache when a cache directory is configured, in-memory otherwise
pub fn build_cache(config: &ExtractConfig) -> TableCache {
    match &config.cache_dir {
        Some(dir) => TableCache::new(Arc::new(FileCache::new(dir)), config.cache_ttl()),
        None => TableCache::new(Arc::new(MemoryCache::new()), config.cache_ttl()),
    }
}

impl Orchestrator {
    pub fn new(
        config: &PipelineConfig,
        client: Arc<dyn SheetClient>,
        cache: TableCache,
        warehouse: Arc<dyn Warehouse>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            reader: SourceReader::from_config(client, cache, &config.extract),
            cleaner: Cleaner::new(config.clean.clone()),
            inferencer: SchemaInferencer::new(config.schema.clone()),
            provisioner: TableProvisioner::new(config.load.provision),
            loader: BulkLoader::from_config(&config.load),
            merge_engine: MergeEngine::new(),
            warehouse,
            concurrency: config.extract.concurrency,
        })
    }

    /// Orchestrator whose cache follows `config.extract`
    pub fn from_config(
        config: &PipelineConfig,
        client: Arc<dyn SheetClient>,
        warehouse: Arc<dyn Warehouse>,
    ) -> Result<Self> {
        Self::new(config, client, build_cache(&config.extract), warehouse)
    }

    /// Extract and clean one source, without loading it
    pub async fn extract(&self, descriptor: &SourceDescriptor) -> Result<Table> {
        let raw = self.reader.read(descriptor).await?;
        let table = self.cleaner.clean(raw);

        if let Some(key) = &descriptor.join_key {
            if !table.has_column(key) {
                return Err(PipelineError::missing_join_key(&descriptor.destination_table, key));
            }
        }
        Ok(table)
    }

    pub fn infer(&self, table: &Table) -> Result<TableSchema> {
        self.inferencer.infer(table)
    }

    #[instrument(skip(self, request, cancel), fields(sources = request.sources.len()))]
    pub async fn run(&self, request: &RunRequest, cancel: CancellationToken) -> Result<RunReport> {
        let started = Instant::now();
        validate_request(request)?;

        if cancel.is_cancelled() {
            return Err(PipelineError::Canceled);
        }

        info!(
            sources = request.sources.len(),
            concurrency = self.concurrency,
            merge = request.merge.is_some(),
            "Starting run"
        );

        let extracted = self.extract_all(&request.sources, &cancel).await;
        if cancel.is_cancelled() {
            warn!("Run canceled during extraction");
            return Err(PipelineError::Canceled);
        }

        let mut outcomes = Vec::with_capacity(request.sources.len() + 1);
        let mut tables: HashMap<String, Table> = HashMap::new();

        for (descriptor, result) in request.sources.iter().zip(extracted) {
            let name = descriptor.destination_table.as_str();
            match result {
                Ok(table) => {
                    outcomes.push(DestinationOutcome {
                        table_name: name.to_string(),
                        status: OutcomeStatus::Extracted {
                            rows: table.row_count(),
                        },
                    });
                    tables.insert(name.to_string(), table);
                },
                Err(err) => {
                    error!(table = %name, error = %err, "Source failed");
                    outcomes.push(DestinationOutcome::failed(name, &err));
                },
            }
        }

        if request.load_individual {
            for outcome in outcomes.iter_mut() {
                let Some(table) = tables.get(&outcome.table_name) else {
                    continue;
                };
                let destination = outcome.table_name.clone();
                *outcome = self.load_table(table, &destination, &cancel).await?;
            }
        }

        if let Some(spec) = &request.merge {
            let destination = spec.destination.as_str();
            let merged = match self.merge_engine.merge(&tables, spec, destination) {
                Ok(merged) => self.load_table(&merged, destination, &cancel).await?,
                Err(err) => {
                    error!(table = %destination, error = %err, "Merge failed");
                    DestinationOutcome::failed(destination, &err)
                },
            };
            outcomes.push(merged);
        }

        let report = RunReport {
            outcomes,
            duration_seconds: started.elapsed().as_secs_f64(),
        };

        info!(
            destinations = report.outcomes.len(),
            failures = report.failures().count(),
            duration_seconds = report.duration_seconds,
            "Run complete"
        );

        Ok(report)
    }

    /// Results in the order of `sources`
    async fn extract_all(
        &self,
        sources: &[SourceDescriptor],
        cancel: &CancellationToken,
    ) -> Vec<Result<Table>> {
        let mut results: Vec<(usize, Result<Table>)> = stream::iter(sources.iter().enumerate())
            .map(|(index, descriptor)| async move {
                info!(
                    table = %descriptor.destination_table,
                    "Extracting source {} / {}",
                    index + 1,
                    sources.len()
                );
                let result = tokio::select! {
                    _ = cancel.cancelled() => Err(PipelineError::Canceled),
                    result = self.extract(descriptor) => result,
                };
                (index, result)
            })
            .buffer_unordered(self.concurrency.max(1))
            .collect()
            .await;

        results.sort_by_key(|(index, _)| *index);
        results.into_iter().map(|(_, result)| result).collect()
    }

    /// Infer and publish; structural failures become a failed outcome,
    /// cancellation aborts the run
    async fn load_table(
        &self,
        table: &Table,
        destination: &str,
        cancel: &CancellationToken,
    ) -> Result<DestinationOutcome> {
        let published = match self.inferencer.infer(table) {
            Ok(schema) => {
                self.loader
                    .publish(
                        self.warehouse.as_ref(),
                        &self.provisioner,
                        table,
                        &schema,
                        destination,
                        cancel,
                    )
                    .await
            },
            Err(err) => Err(err),
        };

        match published {
            Ok(report) => Ok(DestinationOutcome {
                table_name: destination.to_string(),
                status: OutcomeStatus::Loaded {
                    rows_loaded: report.rows_loaded,
                },
            }),
            Err(PipelineError::Canceled) => Err(PipelineError::Canceled),
            Err(err) => {
                error!(table = %destination, error = %err, "Load failed");
                Ok(DestinationOutcome::failed(destination, &err))
            },
        }
    }
}

fn validate_request(request: &RunRequest) -> Result<()> {
    let mut seen = HashSet::new();
    for source in &request.sources {
        if !seen.insert(source.destination_table.as_str()) {
            return Err(PipelineError::config(format!(
                "destination table '{}' is used by more than one source",
                source.destination_table
            )));
        }
    }

    if let Some(spec) = &request.merge {
        if request.load_individual && seen.contains(spec.destination.as_str()) {
            return Err(PipelineError::InvalidMergeSpec(format!(
                "merge destination '{}' is also a source destination",
                spec.destination
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_destinations_rejected() {
        let request = RunRequest {
            sources: vec![
                SourceDescriptor::new("a", "orders"),
                SourceDescriptor::new("b", "orders"),
            ],
            merge: None,
            load_individual: false,
        };
        assert!(validate_request(&request).is_err());
    }

    #[test]
    fn test_report_serializes_flat_status() {
        let report = RunReport {
            outcomes: vec![
                DestinationOutcome {
                    table_name: "orders".to_string(),
                    status: OutcomeStatus::Loaded { rows_loaded: 3 },
                },
                DestinationOutcome::failed("final_merged_table", &PipelineError::upstream_missing("orders")),
            ],
            duration_seconds: 0.5,
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcomes"][0]["status"], "loaded");
        assert_eq!(json["outcomes"][0]["rows_loaded"], 3);
        assert_eq!(json["outcomes"][1]["kind"], "upstream_missing");
        assert!(!report.is_success());
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let json = r#"{"sources": [{"locator": "x", "destination_table": "orders"}]}"#;
        let request: RunRequest = serde_json::from_str(json).unwrap();
        assert!(request.merge.is_none());
        assert!(!request.load_individual);
        assert!(request.sources[0].rename.is_empty());
    }
}
