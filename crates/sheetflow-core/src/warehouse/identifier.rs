//! SQL identifiers that are safe to splice into DDL

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{PipelineError, Result};

/// An identifier containing only `[A-Za-z0-9_]`, never starting with a digit
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    /// Sanitize a raw name: every other character becomes `_`, a leading
    /// digit gets a `_` prefix, and the result is cut to `max_len` characters.
    pub fn sanitize(raw: &str, max_len: usize) -> Result<Self> {
        let trimmed = raw.trim();
        let mut sanitized: String = trimmed
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
            .collect();

        if sanitized.starts_with(|c: char| c.is_ascii_digit()) {
            sanitized.insert(0, '_');
        }
        // Only ASCII remains, so byte and char lengths agree
        sanitized.truncate(max_len);

        if sanitized.is_empty() {
            return Err(PipelineError::invalid_identifier(raw, "nothing remains after sanitizing"));
        }
        if sanitized.chars().all(|c| c == '_') {
            return Err(PipelineError::invalid_identifier(
                raw,
                "name contains no letters or digits",
            ));
        }

        Ok(Self(sanitized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_replaces_unsafe_characters() {
        let id = Identifier::sanitize("unit price ($)", 63).unwrap();
        assert_eq!(id.as_str(), "unit_price____");
    }

    #[test]
    fn test_sanitize_prefixes_leading_digit() {
        assert_eq!(Identifier::sanitize("2024_sales", 63).unwrap().as_str(), "_2024_sales");
    }

    #[test]
    fn test_sanitize_truncates_to_limit() {
        let long = "a".repeat(100);
        assert_eq!(Identifier::sanitize(&long, 63).unwrap().as_str().len(), 63);
    }

    #[test]
    fn test_sanitize_blocks_injection() {
        let id = Identifier::sanitize("orders\"; DROP TABLE users; --", 63).unwrap();
        assert!(id.as_str().chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
    }

    #[test]
    fn test_sanitize_rejects_empty_names() {
        assert!(Identifier::sanitize("   ", 63).is_err());
        assert!(Identifier::sanitize("%%%", 63).is_err());
    }
}
