//! Pipeline configuration
//!
//! Three policies differ between deployments and are deliberately given no
//! default: the null-row policy, the text width policy and the provisioning
//! policy. Construct them through [`PipelineConfig::new`] or set them through
//! `SHEETFLOW_NULL_POLICY`, `SHEETFLOW_WIDTH_POLICY` and
//! `SHEETFLOW_PROVISION_POLICY`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{PipelineError, Result};
use crate::retry::RetryPolicy;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default cap on inferred text column width, in characters.
pub const DEFAULT_TEXT_CAP: usize = 4000;

/// Default number of fetch attempts per source.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay between fetch attempts in seconds.
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 10;

/// Default validity window of a cached extraction in seconds (1 hour).
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;

/// Default number of sources fetched concurrently.
pub const DEFAULT_FETCH_CONCURRENCY: usize = 4;

/// Default timeout for one fetch attempt in seconds.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 60;

/// Default rows per INSERT batch.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Default timeout for one warehouse statement in seconds.
pub const DEFAULT_STATEMENT_TIMEOUT_SECS: u64 = 300;

/// Which rows the cleaner discards for missing data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullPolicy {
    /// Drop a row when any of its fields is null
    DropAnyNull,
    /// Drop a row only when every field is null
    DropAllNull,
}

impl std::str::FromStr for NullPolicy {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "drop_any_null" | "any" => Ok(NullPolicy::DropAnyNull),
            "drop_all_null" | "all" => Ok(NullPolicy::DropAllNull),
            _ => Err(PipelineError::config(format!("Invalid null policy: {}", s))),
        }
    }
}

/// How wide inferred text columns are
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "width", rename_all = "snake_case")]
pub enum WidthPolicy {
    /// Every text column gets exactly this capacity
    Fixed(usize),
    /// Observed maximum length, never above the cap
    Capped(usize),
    /// No capacity constraint
    Unbounded,
}

impl std::str::FromStr for WidthPolicy {
    type Err = PipelineError;

    /// Accepts `fixed:<n>`, `capped`, `capped:<n>` and `unbounded`
    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_lowercase();
        let (mode, arg) = match lowered.split_once(':') {
            Some((mode, arg)) => (mode, Some(arg)),
            None => (lowered.as_str(), None),
        };
        let width = |arg: Option<&str>| -> Result<Option<usize>> {
            arg.map(|a| {
                a.trim()
                    .parse::<usize>()
                    .map_err(|_| PipelineError::config(format!("Invalid width in '{}'", s)))
            })
            .transpose()
        };

        match mode {
            "fixed" => width(arg)?
                .map(WidthPolicy::Fixed)
                .ok_or_else(|| PipelineError::config("Fixed width policy needs a width, e.g. fixed:255")),
            "capped" => Ok(WidthPolicy::Capped(width(arg)?.unwrap_or(DEFAULT_TEXT_CAP))),
            "unbounded" => Ok(WidthPolicy::Unbounded),
            _ => Err(PipelineError::config(format!("Invalid width policy: {}", s))),
        }
    }
}

/// What happens to an existing destination table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionPolicy {
    /// Drop and recreate; guarantees the schema, destroys prior rows
    Destructive,
    /// Create only when absent; keeps rows, may keep a stale schema
    Conditional,
}

impl std::str::FromStr for ProvisionPolicy {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "destructive" | "recreate" => Ok(ProvisionPolicy::Destructive),
            "conditional" | "if_absent" | "if-absent" => Ok(ProvisionPolicy::Conditional),
            _ => Err(PipelineError::config(format!("Invalid provision policy: {}", s))),
        }
    }
}

/// Which rows count as duplicates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", content = "columns", rename_all = "snake_case")]
pub enum DedupPolicy {
    /// Rows equal in every column
    #[default]
    ExactRow,
    /// Rows equal in the listed columns
    Columns(Vec<String>),
}

/// Source extraction settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_fetch_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Directory for the persistent extraction cache; in-memory when unset
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

/// Cleaner settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanConfig {
    pub null_policy: NullPolicy,
    #[serde(default)]
    pub dedup: DedupPolicy,
    /// Also coerce columns whose every value is a timestamp
    #[serde(default)]
    pub coerce_datetimes: bool,
}

/// Schema inference settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    pub width: WidthPolicy,
    /// Fail instead of falling back to text on mixed value kinds
    #[serde(default)]
    pub strict_typing: bool,
}

/// Provisioning and bulk load settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    pub provision: ProvisionPolicy,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_statement_timeout_secs")]
    pub statement_timeout_secs: u64,
}

/// Main pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub extract: ExtractConfig,
    pub clean: CleanConfig,
    pub schema: SchemaConfig,
    pub load: LoadConfig,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_retry_delay_secs() -> u64 {
    DEFAULT_RETRY_DELAY_SECS
}

fn default_fetch_timeout_secs() -> u64 {
    DEFAULT_FETCH_TIMEOUT_SECS
}

fn default_fetch_concurrency() -> usize {
    DEFAULT_FETCH_CONCURRENCY
}

fn default_cache_ttl_secs() -> u64 {
    DEFAULT_CACHE_TTL_SECS
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_statement_timeout_secs() -> u64 {
    DEFAULT_STATEMENT_TIMEOUT_SECS
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            concurrency: DEFAULT_FETCH_CONCURRENCY,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            cache_dir: None,
        }
    }
}

impl ExtractConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_secs(self.retry_delay_secs))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl LoadConfig {
    pub fn statement_timeout(&self) -> Duration {
        Duration::from_secs(self.statement_timeout_secs)
    }
}

impl PipelineConfig {
    /// Configuration with the three deployment policies chosen explicitly and
    /// every other setting at its default
    pub fn new(
        null_policy: NullPolicy,
        width: WidthPolicy,
        provision: ProvisionPolicy,
    ) -> Self {
        Self {
            extract: ExtractConfig::default(),
            clean: CleanConfig {
                null_policy,
                dedup: DedupPolicy::default(),
                coerce_datetimes: false,
            },
            schema: SchemaConfig {
                width,
                strict_typing: false,
            },
            load: LoadConfig {
                provision,
                batch_size: DEFAULT_BATCH_SIZE,
                statement_timeout_secs: DEFAULT_STATEMENT_TIMEOUT_SECS,
            },
        }
    }

    /// Load configuration from environment variables (after `.env`)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let null_policy = required_env("SHEETFLOW_NULL_POLICY")?.parse()?;
        let width = required_env("SHEETFLOW_WIDTH_POLICY")?.parse()?;
        let provision = required_env("SHEETFLOW_PROVISION_POLICY")?.parse()?;

        let mut config = Self::new(null_policy, width, provision);

        config.extract.max_attempts = env_or("SHEETFLOW_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?;
        config.extract.retry_delay_secs =
            env_or("SHEETFLOW_RETRY_DELAY_SECS", DEFAULT_RETRY_DELAY_SECS)?;
        config.extract.fetch_timeout_secs =
            env_or("SHEETFLOW_FETCH_TIMEOUT_SECS", DEFAULT_FETCH_TIMEOUT_SECS)?;
        config.extract.concurrency = env_or("SHEETFLOW_FETCH_CONCURRENCY", DEFAULT_FETCH_CONCURRENCY)?;
        config.extract.cache_ttl_secs = env_or("SHEETFLOW_CACHE_TTL_SECS", DEFAULT_CACHE_TTL_SECS)?;
        config.extract.cache_dir = std::env::var("SHEETFLOW_CACHE_DIR").ok().map(PathBuf::from);

        if let Ok(columns) = std::env::var("SHEETFLOW_DEDUP_COLUMNS") {
            let columns: Vec<String> = columns
                .split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect();
            if !columns.is_empty() {
                config.clean.dedup = DedupPolicy::Columns(columns);
            }
        }
        config.clean.coerce_datetimes = env_or("SHEETFLOW_COERCE_DATETIMES", false)?;
        config.schema.strict_typing = env_or("SHEETFLOW_STRICT_TYPING", false)?;
        config.load.batch_size = env_or("SHEETFLOW_BATCH_SIZE", DEFAULT_BATCH_SIZE)?;
        config.load.statement_timeout_secs =
            env_or("SHEETFLOW_STATEMENT_TIMEOUT_SECS", DEFAULT_STATEMENT_TIMEOUT_SECS)?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.extract.max_attempts == 0 {
            return Err(PipelineError::config("max_attempts must be greater than 0"));
        }
        if self.extract.concurrency == 0 {
            return Err(PipelineError::config("fetch concurrency must be greater than 0"));
        }
        if self.extract.fetch_timeout_secs == 0 {
            return Err(PipelineError::config("fetch timeout must be greater than 0"));
        }
        if self.load.batch_size == 0 {
            return Err(PipelineError::config("batch_size must be greater than 0"));
        }
        if self.load.statement_timeout_secs == 0 {
            return Err(PipelineError::config("statement timeout must be greater than 0"));
        }
        match self.schema.width {
            WidthPolicy::Fixed(0) | WidthPolicy::Capped(0) => {
                return Err(PipelineError::config("text width must be greater than 0"));
            },
            _ => {},
        }
        if let DedupPolicy::Columns(ref columns) = self.clean.dedup {
            if columns.is_empty() {
                return Err(PipelineError::config("dedup column list cannot be empty"));
            }
        }
        if self.load.provision == ProvisionPolicy::Destructive {
            tracing::warn!("Destructive provisioning enabled: destination tables are dropped and recreated on every load");
        }
        Ok(())
    }
}

fn required_env(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| PipelineError::config(format!("{} must be set explicitly", name)))
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| PipelineError::config(format!("{} has an invalid value: {}", name, raw))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    const POLICY_VARS: [&str; 3] = [
        "SHEETFLOW_NULL_POLICY",
        "SHEETFLOW_WIDTH_POLICY",
        "SHEETFLOW_PROVISION_POLICY",
    ];

    fn clear_env() {
        for var in POLICY_VARS {
            std::env::remove_var(var);
        }
        std::env::remove_var("SHEETFLOW_BATCH_SIZE");
        std::env::remove_var("SHEETFLOW_DEDUP_COLUMNS");
    }

    #[test]
    fn test_width_policy_parsing() {
        assert_eq!("fixed:255".parse::<WidthPolicy>().unwrap(), WidthPolicy::Fixed(255));
        assert_eq!("capped".parse::<WidthPolicy>().unwrap(), WidthPolicy::Capped(4000));
        assert_eq!("Capped:100".parse::<WidthPolicy>().unwrap(), WidthPolicy::Capped(100));
        assert_eq!("unbounded".parse::<WidthPolicy>().unwrap(), WidthPolicy::Unbounded);
        assert!("fixed".parse::<WidthPolicy>().is_err());
        assert!("capped:wide".parse::<WidthPolicy>().is_err());
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("drop-any-null".parse::<NullPolicy>().unwrap(), NullPolicy::DropAnyNull);
        assert_eq!("all".parse::<NullPolicy>().unwrap(), NullPolicy::DropAllNull);
        assert_eq!(
            "conditional".parse::<ProvisionPolicy>().unwrap(),
            ProvisionPolicy::Conditional
        );
        assert!("sometimes".parse::<ProvisionPolicy>().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let mut config = PipelineConfig::new(
            NullPolicy::DropAnyNull,
            WidthPolicy::Capped(DEFAULT_TEXT_CAP),
            ProvisionPolicy::Conditional,
        );
        assert!(config.validate().is_ok());
        config.load.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_from_env_requires_explicit_policies() {
        clear_env();
        let err = PipelineConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("SHEETFLOW_NULL_POLICY"));
    }

    #[test]
    #[serial]
    fn test_from_env_reads_overrides() {
        clear_env();
        std::env::set_var("SHEETFLOW_NULL_POLICY", "drop_all_null");
        std::env::set_var("SHEETFLOW_WIDTH_POLICY", "unbounded");
        std::env::set_var("SHEETFLOW_PROVISION_POLICY", "destructive");
        std::env::set_var("SHEETFLOW_BATCH_SIZE", "50");
        std::env::set_var("SHEETFLOW_DEDUP_COLUMNS", "name, category");

        let config = PipelineConfig::from_env().unwrap();
        clear_env();

        assert_eq!(config.clean.null_policy, NullPolicy::DropAllNull);
        assert_eq!(config.schema.width, WidthPolicy::Unbounded);
        assert_eq!(config.load.provision, ProvisionPolicy::Destructive);
        assert_eq!(config.load.batch_size, 50);
        assert_eq!(
            config.clean.dedup,
            DedupPolicy::Columns(vec!["name".to_string(), "category".to_string()])
        );
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_unparseable_override() {
        clear_env();
        std::env::set_var("SHEETFLOW_NULL_POLICY", "drop_all_null");
        std::env::set_var("SHEETFLOW_WIDTH_POLICY", "unbounded");
        std::env::set_var("SHEETFLOW_PROVISION_POLICY", "conditional");
        std::env::set_var("SHEETFLOW_BATCH_SIZE", "abc");

        let err = PipelineConfig::from_env().unwrap_err();
        clear_env();

        assert!(matches!(err, PipelineError::Config(_)));
        assert!(err.to_string().contains("SHEETFLOW_BATCH_SIZE"));
    }

    #[test]
    fn test_deserialize_uses_defaults() {
        let json = r#"{
            "extract": {},
            "clean": {"null_policy": "drop_any_null"},
            "schema": {"width": {"mode": "capped", "width": 4000}},
            "load": {"provision": "conditional"}
        }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.extract.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(config.load.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.clean.dedup, DedupPolicy::ExactRow);
    }
}
