//! Cache key derivation.
//!
//! A key is the hex SHA-256 of the query text plus the canonical JSON of its
//! parameters. Params are a `BTreeMap`, so serialization order is stable and
//! identical `(query, params)` pairs always land on the same key.

use sha2::{Digest, Sha256};

use crate::client::QueryParams;

/// Derive the deterministic cache key for a query and its parameters.
pub fn query_key(query: &str, params: &QueryParams) -> String {
    let mut hasher = Sha256::new();
    hasher.update(query.as_bytes());
    // Serializing a BTreeMap of Values cannot fail.
    let canonical = serde_json::to_string(params).unwrap_or_default();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}
