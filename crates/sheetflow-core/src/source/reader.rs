//! Cached, retried extraction of one source into a [`Table`]

use serde::{Deserialize, Serialize};
use sheetflow_common::checksum::hash_serialized;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::cache::TableCache;
use crate::config::ExtractConfig;
use crate::error::{PipelineError, Result};
use crate::retry::RetryPolicy;
use crate::table::{Column, Table, Value};

use super::{Locator, SheetClient, SheetRecord};

/// One source of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub locator: String,
    pub destination_table: String,
    /// Column the merge is expected to join on; checked after cleaning
    #[serde(default)]
    pub join_key: Option<String>,
    /// Source header -> destination column name
    #[serde(default)]
    pub rename: BTreeMap<String, String>,
}

impl SourceDescriptor {
    pub fn new(locator: impl Into<String>, destination_table: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            destination_table: destination_table.into(),
            join_key: None,
            rename: BTreeMap::new(),
        }
    }

    pub fn with_join_key(mut self, key: impl Into<String>) -> Self {
        self.join_key = Some(key.into());
        self
    }

    pub fn with_rename(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.rename.insert(from.into(), to.into());
        self
    }
}

#[derive(Serialize)]
struct CacheKeyInput<'a> {
    locator: String,
    rename: &'a BTreeMap<String, String>,
}

/// Content hash of everything that determines the extracted table
pub fn cache_key(locator: &Locator, rename: &BTreeMap<String, String>) -> Result<String> {
    let input = CacheKeyInput {
        locator: locator.canonical(),
        rename,
    };
    Ok(hash_serialized(&input)?)
}

pub struct SourceReader {
    client: Arc<dyn SheetClient>,
    cache: TableCache,
    retry: RetryPolicy,
    fetch_timeout: Duration,
}

impl SourceReader {
    pub fn new(
        client: Arc<dyn SheetClient>,
        cache: TableCache,
        retry: RetryPolicy,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            client,
            cache,
            retry,
            fetch_timeout,
        }
    }

    pub fn from_config(client: Arc<dyn SheetClient>, cache: TableCache, config: &ExtractConfig) -> Self {
        Self::new(client, cache, config.retry_policy(), config.fetch_timeout())
    }

    #[instrument(skip(self, descriptor), fields(table = %descriptor.destination_table))]
    pub async fn read(&self, descriptor: &SourceDescriptor) -> Result<Table> {
        let locator = Locator::parse(&descriptor.locator)?;
        let key = cache_key(&locator, &descriptor.rename)?;
        let name = descriptor.destination_table.as_str();

        match self.cache.get(&key).await {
            Ok(Some(table)) => {
                info!(locator = %locator, rows = table.row_count(), "Serving source from cache");
                return Ok(table.renamed(name));
            },
            Ok(None) => {},
            Err(e) => warn!(error = %e, "Cache lookup failed, fetching"),
        }

        let records = self
            .retry
            .run(name, self.fetch_timeout, |attempt| {
                debug!(locator = %locator, attempt, "Fetching source");
                self.client.fetch_rows(&locator)
            })
            .await?;

        let table = records_to_table(name, &records, &descriptor.rename)?;
        info!(locator = %locator, rows = table.row_count(), columns = table.columns().len(), "Source extracted");

        if let Err(e) = self.cache.put(&key, &table).await {
            warn!(error = %e, "Failed to cache extracted table");
        }

        Ok(table)
    }
}

/// Build a text table from records. Headers keep first-seen order across
/// records; empty and missing cells become nulls.
pub fn records_to_table(
    name: &str,
    records: &[SheetRecord],
    rename: &BTreeMap<String, String>,
) -> Result<Table> {
    let mut headers: Vec<&str> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for (row_index, record) in records.iter().enumerate() {
        let mut in_record: HashSet<&str> = HashSet::with_capacity(record.fields.len());
        for header in record.headers() {
            if !in_record.insert(header) {
                return Err(PipelineError::invalid_table(
                    name,
                    format!("duplicate header '{}' in row {}", header, row_index + 1),
                ));
            }
            if !positions.contains_key(header) {
                positions.insert(header, headers.len());
                headers.push(header);
            }
        }
    }

    let rows = records
        .iter()
        .map(|record| {
            let mut row = vec![Value::Null; headers.len()];
            for (header, cell) in &record.fields {
                if let Some(&position) = positions.get(header.as_str()) {
                    if !cell.is_empty() {
                        row[position] = Value::Text(cell.clone());
                    }
                }
            }
            row
        })
        .collect();

    let columns = headers
        .iter()
        .map(|header| {
            let renamed = rename.get(*header).map(String::as_str).unwrap_or(*header);
            Column::text(renamed)
        })
        .collect();

    Table::new(name, columns, rows)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn record(fields: &[(&str, &str)]) -> SheetRecord {
        SheetRecord::new(fields.iter().copied())
    }

    #[test]
    fn test_records_to_table_applies_rename_and_nulls() {
        let records = vec![
            record(&[("CategoryID", "1"), ("Name", "Drinks")]),
            record(&[("CategoryID", "2"), ("Name", "")]),
        ];
        let rename = BTreeMap::from([("CategoryID".to_string(), "categoryId".to_string())]);
        let table = records_to_table("categories", &records, &rename).unwrap();

        assert_eq!(table.columns()[0].name, "categoryId");
        assert_eq!(table.rows()[1][1], Value::Null);
    }

    #[test]
    fn test_records_with_uneven_headers() {
        let records = vec![record(&[("a", "1")]), record(&[("a", "2"), ("b", "x")])];
        let table = records_to_table("t", &records, &BTreeMap::new()).unwrap();
        assert_eq!(table.columns().len(), 2);
        assert_eq!(table.rows()[0][1], Value::Null);
    }

    #[test]
    fn test_duplicate_headers_rejected() {
        let records = vec![record(&[("a", "1"), ("a", "2")])];
        let err = records_to_table("t", &records, &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidTable { .. }));
    }

    #[test]
    fn test_rename_collision_rejected() {
        let records = vec![record(&[("a", "1"), ("b", "2")])];
        let rename = BTreeMap::from([("a".to_string(), "b".to_string())]);
        assert!(records_to_table("t", &records, &rename).is_err());
    }

    #[test]
    fn test_cache_key_depends_on_rename() {
        let locator = Locator::parse("1BxiMVs0XRA5nFMdKvBdBZjgmUUqptlbs74OgvE2upms").unwrap();
        let plain = cache_key(&locator, &BTreeMap::new()).unwrap();
        let renamed = cache_key(
            &locator,
            &BTreeMap::from([("a".to_string(), "b".to_string())]),
        )
        .unwrap();
        assert_ne!(plain, renamed);
        assert_eq!(plain, cache_key(&locator, &BTreeMap::new()).unwrap());
        assert_eq!(plain.len(), 64);
    }
}
