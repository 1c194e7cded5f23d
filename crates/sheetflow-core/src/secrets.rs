//! Credential lookup
//!
//! Secret names use the deployment's kebab-case convention (`db-password`).
//! [`EnvSecretProvider`] maps them to upper snake case environment variables
//! (`DB_PASSWORD`), optionally behind a prefix.

use std::collections::HashMap;

use crate::error::{PipelineError, Result};

pub const DB_SERVER: &str = "db-server";
pub const DB_NAME: &str = "db-name";
pub const DB_USER: &str = "db-user";
pub const DB_PASSWORD: &str = "db-password";
pub const GOOGLE_ACCESS_TOKEN: &str = "google-access-token";

pub trait SecretProvider: Send + Sync {
    fn get(&self, name: &str) -> Result<String>;

    /// `Ok(None)` when the secret is simply not configured
    fn get_optional(&self, name: &str) -> Result<Option<String>> {
        match self.get(name) {
            Ok(value) => Ok(Some(value)),
            Err(PipelineError::SecretMissing(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EnvSecretProvider {
    prefix: Option<String>,
}

impl EnvSecretProvider {
    /// Provider over the process environment, after loading `.env`
    pub fn new() -> Self {
        dotenvy::dotenv().ok();
        Self { prefix: None }
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        dotenvy::dotenv().ok();
        Self {
            prefix: Some(prefix.into()),
        }
    }

    pub fn variable_name(&self, name: &str) -> String {
        let base = name.replace('-', "_").to_uppercase();
        match &self.prefix {
            Some(prefix) => format!("{}{}", prefix, base),
            None => base,
        }
    }
}

impl SecretProvider for EnvSecretProvider {
    fn get(&self, name: &str) -> Result<String> {
        let variable = self.variable_name(name);
        match std::env::var(&variable) {
            Ok(value) if !value.is_empty() => Ok(value),
            _ => Err(PipelineError::SecretMissing(format!("{} (expected in {})", name, variable))),
        }
    }
}

/// Fixed secrets, for tests and embedding
#[derive(Debug, Clone, Default)]
pub struct StaticSecretProvider {
    values: HashMap<String, String>,
}

impl StaticSecretProvider {
    pub fn new<K, V>(values: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: values
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl SecretProvider for StaticSecretProvider {
    fn get(&self, name: &str) -> Result<String> {
        self.values
            .get(name)
            .cloned()
            .ok_or_else(|| PipelineError::SecretMissing(name.to_string()))
    }
}
