//! Vetrina Content Resolution Gateway
//!
//! The layer between a storefront front end and its content backend. It
//! decides which backend client a request should use, how a query result is
//! cached, when cached data is stale, and whether a request is in privileged
//! live-preview mode.
//!
//! - **Config**: backend identity and secrets resolved once at startup, never
//!   read from ambient globals inside business logic.
//! - **Clients**: a CDN-backed standard client and a token-authenticated
//!   preview client that includes unpublished drafts.
//! - **Gateway**: [`query`] selects the cache tier for a request and returns
//!   the result or a typed [`QueryError`].
//! - **Caches**: an injected edge-cache strategy on the server, an ephemeral
//!   TTL store with quota recovery in the browser context.
//! - **Routes**: declarative per-path indexing policy with a global
//!   discoverability kill switch, plus robots.txt/sitemap.xml rendering.

pub mod cache;
pub mod client;
pub mod config;
pub mod gateway;
pub mod http;
pub mod preview;
pub mod routes;
pub mod seo;
pub mod telemetry;

pub use client::{ContentClient, ContentHttpClient, create_preview_client, create_standard_client};
pub use config::{BackendIdentity, ConfigError, Credential, ExecutionContext, GatewayConfig};
pub use gateway::{QueryError, QueryOptions, query, query_optional};
pub use preview::{PreviewSecret, is_preview};
pub use routes::{RouteDecision, RouteRules};
