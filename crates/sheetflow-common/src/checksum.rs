//! SHA-256 content hashing for cache addressing

use crate::error::Result;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Hash an in-memory buffer and return the lowercase hex digest
pub fn content_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Hash the canonical JSON encoding of a serializable value.
///
/// Callers must use types with a stable field order (structs, `BTreeMap`) so
/// that equal inputs always produce equal digests.
pub fn hash_serialized<T: Serialize>(value: &T) -> Result<String> {
    let encoded = serde_json::to_vec(value)?;
    Ok(content_hash(&encoded))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_content_hash_sha256() {
        assert_eq!(
            content_hash(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_hash_serialized_is_order_stable() {
        let mut a = BTreeMap::new();
        a.insert("b", "2");
        a.insert("a", "1");
        let mut b = BTreeMap::new();
        b.insert("a", "1");
        b.insert("b", "2");

        assert_eq!(hash_serialized(&a).unwrap(), hash_serialized(&b).unwrap());
    }

    #[test]
    fn test_distinct_inputs_distinct_digests() {
        assert_ne!(hash_serialized(&("abc", 1)).unwrap(), hash_serialized(&("abc", 2)).unwrap());
    }
}
