//! Query gateway.
//!
//! The façade every caller goes through. Given a client, a query, and the
//! request's mode and context, [`query`] picks the cache tier, executes the
//! fetch when needed, and returns the typed result or a [`QueryError`]
//! carrying the failing query for diagnosability.
//!
//! Tier selection:
//!
//! 1. Preview mode executes directly; caching is disabled unconditionally so
//!    drafts are never cached, even momentarily.
//! 2. Standard mode with an edge-cache strategy uses it: read, fetch on
//!    miss, populate synchronously before returning.
//! 3. Standard mode in the browser consults the session store the same way.
//! 4. A failed or timed-out fetch never writes to any cache tier.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::{CachedQuery, EdgeCache, Lookup, SessionStore, query_key};
use crate::client::{ContentClient, FetchFailure, QueryParams};
use crate::telemetry::{
    METRIC_EDGE_HIT, METRIC_EDGE_MISS, METRIC_QUERY_FAILURE, METRIC_QUERY_FETCH,
};

/// Whether the request resolved to preview or standard traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    #[default]
    Standard,
    Preview,
}

/// Per-call options for [`query`].
#[derive(Clone, Default)]
pub struct QueryOptions {
    /// Display name for logs and errors, e.g. `"product-page"`.
    pub display_name: String,
    pub mode: RequestMode,
    /// TTL override for the session tier.
    pub ttl: Option<Duration>,
    /// Edge-cache strategy injected by the hosting layer (server context).
    pub edge: Option<Arc<dyn EdgeCache>>,
    /// Session store (browser context).
    pub session: Option<Arc<SessionStore>>,
}

impl QueryOptions {
    pub fn standard(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            ..Default::default()
        }
    }

    pub fn preview(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            mode: RequestMode::Preview,
            ..Default::default()
        }
    }

    pub fn with_edge(mut self, edge: Arc<dyn EdgeCache>) -> Self {
        self.edge = Some(edge);
        self
    }

    pub fn with_session(mut self, session: Arc<SessionStore>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    Backend,
    Timeout,
    Decode,
}

impl std::fmt::Display for QueryErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryErrorKind::Backend => f.write_str("backend"),
            QueryErrorKind::Timeout => f.write_str("timeout"),
            QueryErrorKind::Decode => f.write_str("decode"),
        }
    }
}

/// A content query failed; carries the query context for logs.
#[derive(Debug, Error)]
#[error("content query `{display_name}` failed ({kind}); query: {query}; params: {params}")]
pub struct QueryError {
    pub display_name: String,
    pub query: String,
    pub params: String,
    pub kind: QueryErrorKind,
    #[source]
    pub source: Option<FetchFailure>,
}

impl QueryError {
    fn decode(
        display_name: &str,
        query: &str,
        params: &QueryParams,
        err: serde_json::Error,
    ) -> Self {
        Self {
            display_name: display_name.to_string(),
            query: query.to_string(),
            params: serialize_params(params),
            kind: QueryErrorKind::Decode,
            source: Some(FetchFailure::Decode(err)),
        }
    }
}

fn serialize_params(params: &QueryParams) -> String {
    serde_json::to_string(params).unwrap_or_default()
}

/// Execute a content query through the appropriate cache tier.
pub async fn query<T: for<'de> Deserialize<'de>>(
    client: &dyn ContentClient,
    query_text: &str,
    params: &QueryParams,
    options: &QueryOptions,
) -> Result<T, QueryError> {
    if options.mode == RequestMode::Preview {
        // Freshness over everything: no tier is read or written for drafts.
        let value = fetch_backend(client, query_text, params, options).await?;
        return decode(&value, query_text, params, options);
    }

    if let Some(edge) = options.edge.as_ref() {
        return query_via_edge(client, query_text, params, options, edge.as_ref()).await;
    }

    if let Some(session) = options.session.as_ref() {
        return query_via_session(client, query_text, params, options, session).await;
    }

    let value = fetch_backend(client, query_text, params, options).await?;
    decode(&value, query_text, params, options)
}

/// Like [`query`], but for optional content: failures are logged as warnings
/// and degrade to `None` instead of failing the page.
pub async fn query_optional<T: for<'de> Deserialize<'de>>(
    client: &dyn ContentClient,
    query_text: &str,
    params: &QueryParams,
    options: &QueryOptions,
) -> Option<T> {
    match query(client, query_text, params, options).await {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(
                target: "vetrina::gateway",
                query = %err.display_name,
                kind = %err.kind,
                error = %err,
                "optional content unavailable, degrading"
            );
            None
        }
    }
}

async fn query_via_edge<T: for<'de> Deserialize<'de>>(
    client: &dyn ContentClient,
    query_text: &str,
    params: &QueryParams,
    options: &QueryOptions,
    edge: &dyn EdgeCache,
) -> Result<T, QueryError> {
    let key = query_key(query_text, params);

    if let Some(cached) = edge.lookup(&key) {
        match serde_json::from_slice::<T>(&cached.body) {
            Ok(typed) => {
                debug!(
                    target: "vetrina::gateway",
                    cache = "edge",
                    outcome = "hit",
                    query = %options.display_name,
                    "serving cached query result"
                );
                counter!(METRIC_EDGE_HIT).increment(1);
                return Ok(typed);
            }
            Err(err) => {
                // Malformed entries behave exactly like misses.
                debug!(
                    target: "vetrina::gateway",
                    cache = "edge",
                    outcome = "malformed",
                    query = %options.display_name,
                    error = %err,
                    "discarding undecodable edge entry"
                );
            }
        }
    }

    debug!(
        target: "vetrina::gateway",
        cache = "edge",
        outcome = "miss",
        query = %options.display_name,
        "cache miss, fetching from backend"
    );
    counter!(METRIC_EDGE_MISS).increment(1);

    let value = fetch_backend(client, query_text, params, options).await?;
    let typed: T = decode(&value, query_text, params, options)?;
    // Serializing a Value we just parsed cannot fail.
    if let Ok(body) = serde_json::to_vec(&value) {
        edge.store(&key, CachedQuery::new(body));
    }
    Ok(typed)
}

async fn query_via_session<T: for<'de> Deserialize<'de>>(
    client: &dyn ContentClient,
    query_text: &str,
    params: &QueryParams,
    options: &QueryOptions,
    session: &SessionStore,
) -> Result<T, QueryError> {
    let key = query_key(query_text, params);

    if let Lookup::Hit(value) = session.get(&key) {
        match T::deserialize(&value) {
            Ok(typed) => {
                debug!(
                    target: "vetrina::gateway",
                    cache = "session",
                    outcome = "hit",
                    query = %options.display_name,
                    "serving cached query result"
                );
                return Ok(typed);
            }
            Err(err) => {
                debug!(
                    target: "vetrina::gateway",
                    cache = "session",
                    outcome = "malformed",
                    query = %options.display_name,
                    error = %err,
                    "cached payload does not decode, refetching"
                );
            }
        }
    }

    let value = fetch_backend(client, query_text, params, options).await?;
    let typed: T = decode(&value, query_text, params, options)?;
    // Best-effort: a rejected write degrades to "no cache", never to an error.
    session.set(&key, &value, options.ttl);
    Ok(typed)
}

async fn fetch_backend(
    client: &dyn ContentClient,
    query_text: &str,
    params: &QueryParams,
    options: &QueryOptions,
) -> Result<Value, QueryError> {
    counter!(METRIC_QUERY_FETCH).increment(1);

    client.fetch(query_text, params).await.map_err(|err| {
        counter!(METRIC_QUERY_FAILURE).increment(1);
        let kind = match &err {
            FetchFailure::Timeout(_) => QueryErrorKind::Timeout,
            FetchFailure::Decode(_) => QueryErrorKind::Decode,
            _ => QueryErrorKind::Backend,
        };
        QueryError {
            display_name: options.display_name.clone(),
            query: query_text.to_string(),
            params: serialize_params(params),
            kind,
            source: Some(err),
        }
    })
}

fn decode<T: for<'de> Deserialize<'de>>(
    value: &Value,
    query_text: &str,
    params: &QueryParams,
    options: &QueryOptions,
) -> Result<T, QueryError> {
    T::deserialize(value)
        .map_err(|err| QueryError::decode(&options.display_name, query_text, params, err))
}
