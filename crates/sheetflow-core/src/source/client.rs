//! Tabular source client contract

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::Locator;

/// One source row as ordered (header, cell text) pairs
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SheetRecord {
    pub fields: Vec<(String, String)>,
}

impl SheetRecord {
    pub fn new<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(h, _)| h.as_str())
    }

    pub fn get(&self, header: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(h, _)| h == header)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Worth retrying: timeouts, throttling, server errors
    #[error("transient fetch failure: {0}")]
    Transient(String),

    /// Retrying cannot help: not found, forbidden, malformed payload
    #[error("permanent fetch failure: {0}")]
    Permanent(String),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }
}

#[async_trait]
pub trait SheetClient: Send + Sync {
    /// Rows of the selected sheet, in sheet order
    async fn fetch_rows(&self, locator: &Locator) -> Result<Vec<SheetRecord>, FetchError>;
}
