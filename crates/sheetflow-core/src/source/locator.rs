//! Spreadsheet locator parsing
//!
//! Accepted forms:
//! - `https://docs.google.com/spreadsheets/d/<id>/edit#gid=<n>`
//! - legacy `...?key=<id>` or `...?id=<id>` URLs
//! - a bare id, optionally followed by `#gid=<n>` (the canonical form)
//!
//! The sheet selector is read from the fragment first and the `gid` query
//! parameter second.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use crate::error::{PipelineError, Result};

const ID_PATTERN: &str = r"^[A-Za-z0-9_-]{20,}$";

/// A resolved spreadsheet plus optional sub-sheet
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator {
    spreadsheet_id: String,
    gid: Option<u64>,
}

impl Locator {
    pub fn new(spreadsheet_id: impl Into<String>, gid: Option<u64>) -> Result<Self> {
        let spreadsheet_id = spreadsheet_id.into();
        validate_id(&spreadsheet_id, &spreadsheet_id)?;
        Ok(Self { spreadsheet_id, gid })
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PipelineError::invalid_locator(raw, "locator is empty"));
        }

        if trimmed.contains("://") {
            Self::parse_url(raw, trimmed)
        } else {
            Self::parse_bare(raw, trimmed)
        }
    }

    fn parse_url(raw: &str, trimmed: &str) -> Result<Self> {
        let url = Url::parse(trimmed)
            .map_err(|e| PipelineError::invalid_locator(raw, format!("not a valid URL: {}", e)))?;

        let from_path = url.path_segments().and_then(|segments| {
            let segments: Vec<&str> = segments.collect();
            segments
                .iter()
                .position(|s| *s == "d")
                .and_then(|i| segments.get(i + 1))
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
        });

        let query = |name: &str| {
            url.query_pairs()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.into_owned())
        };

        let spreadsheet_id = from_path
            .or_else(|| query("key"))
            .or_else(|| query("id"))
            .ok_or_else(|| PipelineError::invalid_locator(raw, "no spreadsheet id in path or query"))?;
        validate_id(raw, &spreadsheet_id)?;

        let gid = match url.fragment().and_then(gid_from_fragment) {
            Some(value) => Some(parse_gid(raw, value)?),
            None => query("gid").map(|v| parse_gid(raw, &v)).transpose()?,
        };

        Ok(Self { spreadsheet_id, gid })
    }

    fn parse_bare(raw: &str, trimmed: &str) -> Result<Self> {
        let (id, fragment) = match trimmed.split_once('#') {
            Some((id, fragment)) => (id, Some(fragment)),
            None => (trimmed, None),
        };
        validate_id(raw, id)?;

        let gid = match fragment {
            Some(fragment) => {
                let value = gid_from_fragment(fragment)
                    .ok_or_else(|| PipelineError::invalid_locator(raw, "fragment is not a gid selector"))?;
                Some(parse_gid(raw, value)?)
            },
            None => None,
        };

        Ok(Self {
            spreadsheet_id: id.to_string(),
            gid,
        })
    }

    pub fn spreadsheet_id(&self) -> &str {
        &self.spreadsheet_id
    }

    pub fn gid(&self) -> Option<u64> {
        self.gid
    }

    /// `<id>` or `<id>#gid=<n>`
    pub fn canonical(&self) -> String {
        match self.gid {
            Some(gid) => format!("{}#gid={}", self.spreadsheet_id, gid),
            None => self.spreadsheet_id.clone(),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl std::str::FromStr for Locator {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn validate_id(raw: &str, id: &str) -> Result<()> {
    let pattern = Regex::new(ID_PATTERN)
        .map_err(|e| PipelineError::invalid_locator(raw, format!("id pattern failed to compile: {}", e)))?;
    if pattern.is_match(id) {
        Ok(())
    } else {
        Err(PipelineError::invalid_locator(
            raw,
            format!("'{}' is not a spreadsheet id (20+ of A-Z a-z 0-9 _ -)", id),
        ))
    }
}

/// Value of `gid=` inside a fragment such as `gid=0` or `gid=12&range=A1`
fn gid_from_fragment(fragment: &str) -> Option<&str> {
    fragment
        .split('&')
        .find_map(|part| part.strip_prefix("gid="))
}

fn parse_gid(raw: &str, value: &str) -> Result<u64> {
    value
        .parse::<u64>()
        .map_err(|_| PipelineError::invalid_locator(raw, format!("gid '{}' is not a number", value)))
}
