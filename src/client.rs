//! Content backend clients.
//!
//! Two constructors, two modes: [`create_standard_client`] builds the
//! CDN-backed public reader, [`create_preview_client`] builds the direct,
//! token-authenticated reader that includes unpublished drafts. Requiring a
//! [`Credential`] argument makes a preview client without a token
//! structurally impossible.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::HeaderValue;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::config::{ConfigError, Credential, GatewayConfig};

/// Query parameters, canonically ordered so serialization is deterministic.
pub type QueryParams = BTreeMap<String, Value>;

/// Why a backend fetch failed.
#[derive(Debug, Error)]
pub enum FetchFailure {
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("backend fetch timed out after {0:?}")]
    Timeout(Duration),
    #[error("backend returned malformed JSON: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("API token contains non-header-safe bytes")]
    InvalidToken,
}

/// Opaque capability for executing content queries.
///
/// The gateway treats implementations as black boxes; test doubles stand in
/// for the HTTP client wherever fetch counting or failure injection matters.
#[async_trait]
pub trait ContentClient: Send + Sync {
    async fn fetch(&self, query: &str, params: &QueryParams) -> Result<Value, FetchFailure>;

    /// Whether this client serves draft-inclusive preview content.
    fn is_preview(&self) -> bool {
        false
    }
}

/// HTTP implementation of [`ContentClient`] against the content API.
#[derive(Debug)]
pub struct ContentHttpClient {
    http: Client,
    endpoint: Url,
    token: Option<Credential>,
    include_drafts: bool,
    timeout: Duration,
}

impl ContentHttpClient {
    fn new(
        config: &GatewayConfig,
        token: Option<Credential>,
        use_cdn: bool,
        include_drafts: bool,
    ) -> Result<Self, ConfigError> {
        let endpoint = query_endpoint(config, use_cdn)?;
        let http = Client::builder().user_agent(user_agent()).build()?;

        Ok(Self {
            http,
            endpoint,
            token,
            include_drafts,
            timeout: config.request_timeout,
        })
    }

    fn auth_header(token: &Credential) -> Result<HeaderValue, FetchFailure> {
        HeaderValue::from_str(&format!("Bearer {}", token.expose()))
            .map_err(|_| FetchFailure::InvalidToken)
    }
}

fn user_agent() -> &'static str {
    concat!("vetrina/", env!("CARGO_PKG_VERSION"))
}

fn query_endpoint(config: &GatewayConfig, use_cdn: bool) -> Result<Url, ConfigError> {
    let tier = if use_cdn { "apicdn" } else { "api" };
    let identity = &config.identity;
    let raw = format!(
        "https://{}.{}.{}/v{}/data/query/{}",
        identity.project_id, tier, config.api_host, identity.api_version, identity.dataset
    );
    Ok(Url::parse(&raw)?)
}

/// Response envelope returned by the query endpoint.
#[derive(Debug, Deserialize)]
struct QueryEnvelope {
    result: Value,
}

#[async_trait]
impl ContentClient for ContentHttpClient {
    async fn fetch(&self, query: &str, params: &QueryParams) -> Result<Value, FetchFailure> {
        let mut url = self.endpoint.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("query", query);
            for (name, value) in params {
                pairs.append_pair(&format!("${name}"), &value.to_string());
            }
            if self.include_drafts {
                pairs.append_pair("perspective", "drafts");
            }
        }

        let mut request = self.http.get(url);
        if let Some(token) = self.token.as_ref() {
            request = request.header(
                axum::http::header::AUTHORIZATION,
                Self::auth_header(token)?,
            );
        }

        let response = match tokio::time::timeout(self.timeout, request.send()).await {
            Ok(result) => result?,
            Err(_) => return Err(FetchFailure::Timeout(self.timeout)),
        };

        let status = response.status();
        let bytes = match tokio::time::timeout(self.timeout, response.bytes()).await {
            Ok(result) => result?,
            Err(_) => return Err(FetchFailure::Timeout(self.timeout)),
        };

        if !status.is_success() {
            return Err(FetchFailure::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        let envelope: QueryEnvelope = serde_json::from_slice(&bytes)?;
        debug!(
            target: "vetrina::client",
            drafts = self.include_drafts,
            bytes = bytes.len(),
            "content query fetched"
        );
        Ok(envelope.result)
    }

    fn is_preview(&self) -> bool {
        self.include_drafts
    }
}

/// Build the standard, public client.
///
/// CDN-backed when the configured environment allows it; a supplied token
/// grants elevated read access and forces the direct tier so private reads
/// never traverse the shared CDN.
pub fn create_standard_client(
    config: &GatewayConfig,
    credential: Option<&Credential>,
) -> Result<ContentHttpClient, ConfigError> {
    let token = credential.filter(|c| !c.is_empty()).cloned();
    let use_cdn = config.use_cdn && token.is_none();
    ContentHttpClient::new(config, token, use_cdn, false)
}

/// Build the preview client: direct, draft-inclusive, always authenticated.
///
/// Fails with [`ConfigError::MissingCredential`] when the credential is
/// empty — preview must never silently fall back to public data.
pub fn create_preview_client(
    config: &GatewayConfig,
    credential: &Credential,
) -> Result<ContentHttpClient, ConfigError> {
    if credential.is_empty() {
        return Err(ConfigError::MissingCredential);
    }
    ContentHttpClient::new(config, Some(credential.clone()), false, true)
}
