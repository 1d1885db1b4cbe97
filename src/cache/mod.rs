//! Vetrina cache tiers.
//!
//! Two tiers, one per execution context:
//!
//! - **Edge cache** (server): an injected strategy owned by the hosting
//!   request-serving layer, consumed through the narrow [`EdgeCache`] trait.
//! - **Session store** (browser): an ephemeral TTL store over a bounded
//!   per-session key/value area with quota-exceeded recovery.
//!
//! Both tiers key entries on a deterministic hash of (query text, params),
//! so an entry's payload shape always matches the query that produced it.

mod edge;
mod keys;
mod lock;
mod session;

pub use edge::{CachedQuery, EdgeCache};
pub use keys::query_key;
pub use session::{
    Lookup, MemorySessionArea, NullSessionArea, QuotaExceeded, SessionArea, SessionStore,
    DEFAULT_TTL, RETENTION_WINDOW,
};
