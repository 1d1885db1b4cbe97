//! Edge cache adapter.
//!
//! The server-side cache tier is owned by the hosting request-serving layer
//! and injected into the gateway; this crate only consumes it through the
//! [`EdgeCache`] trait. Lookups and stores are synchronous and never
//! suspend. Writes for a given key are idempotent within a TTL window, so
//! concurrent writers racing the same key need no locking: last writer wins
//! and both computed the same value from the same upstream query.

use bytes::Bytes;

/// A serialized query result held by the edge cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedQuery {
    pub body: Bytes,
}

impl CachedQuery {
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self { body: body.into() }
    }
}

/// Narrow interface over the injected edge-cache strategy.
pub trait EdgeCache: Send + Sync {
    fn lookup(&self, key: &str) -> Option<CachedQuery>;
    fn store(&self, key: &str, value: CachedQuery);
}
