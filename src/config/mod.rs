//! Configuration layer: backend identity and gateway settings with layered
//! precedence (file → environment).
//!
//! All environment access goes through [`EnvSource`]; no other module reads
//! raw environment variables. Absent keys are `None`, never an error — only
//! an incomplete backend identity is reported, once, at startup.

use std::{collections::HashMap, path::Path, str::FromStr, time::Duration};

use config::{Config, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::preview::PreviewSecret;

const KEY_PROJECT_ID: &str = "VETRINA_PROJECT_ID";
const KEY_DATASET: &str = "VETRINA_DATASET";
const KEY_API_VERSION: &str = "VETRINA_API_VERSION";
const KEY_API_HOST: &str = "VETRINA_API_HOST";
const KEY_USE_CDN: &str = "VETRINA_USE_CDN";
const KEY_API_TOKEN: &str = "VETRINA_API_TOKEN";
const KEY_PREVIEW_SECRET: &str = "VETRINA_PREVIEW_SECRET";
const KEY_REQUEST_TIMEOUT_SECS: &str = "VETRINA_REQUEST_TIMEOUT_SECS";
const KEY_LOG_LEVEL: &str = "VETRINA_LOG_LEVEL";
const KEY_LOG_JSON: &str = "VETRINA_LOG_JSON";

const LOCAL_CONFIG_BASENAME: &str = "vetrina";
const DEFAULT_API_VERSION: &str = "2024-01-01";
const DEFAULT_API_HOST: &str = "sanity.io";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Where the gateway is executing; selects the environment source and the
/// cache tier available to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionContext {
    /// Privileged request-serving context with process environment access.
    Server,
    /// Unprivileged page context reading a runtime-injected variable map.
    Browser,
}

/// A flat, string-keyed source of configuration variables.
///
/// Implementations must never panic for an absent key.
pub trait EnvSource {
    fn get(&self, key: &str) -> Option<String>;
}

/// Server-side source backed by the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Browser-side source backed by a runtime-injected variable map.
#[derive(Debug, Clone, Default)]
pub struct RuntimeEnv {
    values: HashMap<String, String>,
}

impl RuntimeEnv {
    pub fn new(values: HashMap<String, String>) -> Self {
        Self { values }
    }
}

impl<const N: usize> From<[(&str, &str); N]> for RuntimeEnv {
    fn from(pairs: [(&str, &str); N]) -> Self {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

impl EnvSource for RuntimeEnv {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Identity of the content backend. Immutable, process-wide, never secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendIdentity {
    pub project_id: String,
    pub dataset: String,
    pub api_version: String,
}

/// Bearer token for elevated or draft-inclusive reads.
///
/// Lives for the duration of a request on the server; never written to the
/// browser-visible session store.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    pub(crate) fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Raw configuration as read from an environment source: every field is
/// optional so callers can apply defaults or report what is missing.
#[derive(Debug, Clone, Default)]
pub struct PartialConfig {
    pub project_id: Option<String>,
    pub dataset: Option<String>,
    pub api_version: Option<String>,
    pub api_host: Option<String>,
    pub use_cdn: Option<bool>,
    pub api_token: Option<String>,
    pub preview_secret: Option<String>,
    pub request_timeout_secs: Option<u64>,
}

impl PartialConfig {
    /// Read every known key from the source. Pure read, never raises for a
    /// missing variable.
    pub fn resolve(source: &dyn EnvSource) -> Self {
        Self {
            project_id: non_empty(source.get(KEY_PROJECT_ID)),
            dataset: non_empty(source.get(KEY_DATASET)),
            api_version: non_empty(source.get(KEY_API_VERSION)),
            api_host: non_empty(source.get(KEY_API_HOST)),
            use_cdn: source.get(KEY_USE_CDN).map(|v| parse_flag(&v)),
            api_token: non_empty(source.get(KEY_API_TOKEN)),
            preview_secret: non_empty(source.get(KEY_PREVIEW_SECRET)),
            request_timeout_secs: source
                .get(KEY_REQUEST_TIMEOUT_SECS)
                .and_then(|v| v.parse().ok()),
        }
    }

    /// Fold `overlay` on top of `self`; present overlay fields win.
    pub fn merged(self, overlay: PartialConfig) -> Self {
        Self {
            project_id: overlay.project_id.or(self.project_id),
            dataset: overlay.dataset.or(self.dataset),
            api_version: overlay.api_version.or(self.api_version),
            api_host: overlay.api_host.or(self.api_host),
            use_cdn: overlay.use_cdn.or(self.use_cdn),
            api_token: overlay.api_token.or(self.api_token),
            preview_secret: overlay.preview_secret.or(self.preview_secret),
            request_timeout_secs: overlay.request_timeout_secs.or(self.request_timeout_secs),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Fully-resolved gateway settings after validation.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub identity: BackendIdentity,
    pub api_host: String,
    pub use_cdn: bool,
    pub api_token: Option<Credential>,
    pub preview_secret: PreviewSecret,
    pub request_timeout: Duration,
}

impl GatewayConfig {
    /// Validate a resolved [`PartialConfig`] into usable settings.
    ///
    /// A missing backend identity is fatal; everything else defaults.
    pub fn from_partial(partial: PartialConfig) -> Result<Self, ConfigError> {
        let project_id = partial
            .project_id
            .ok_or_else(|| ConfigError::invalid("backend.project_id", "value is required"))?;
        let dataset = partial
            .dataset
            .ok_or_else(|| ConfigError::invalid("backend.dataset", "value is required"))?;

        let identity = BackendIdentity {
            project_id,
            dataset,
            api_version: partial
                .api_version
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
        };

        let timeout_secs = partial
            .request_timeout_secs
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "backend.request_timeout_secs",
                "must be greater than zero",
            ));
        }

        Ok(Self {
            identity,
            api_host: partial
                .api_host
                .unwrap_or_else(|| DEFAULT_API_HOST.to_string()),
            use_cdn: partial.use_cdn.unwrap_or(true),
            api_token: partial.api_token.map(Credential::new),
            preview_secret: PreviewSecret::new(partial.preview_secret),
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

/// Everything a server deployment loads at boot.
#[derive(Debug, Clone)]
pub struct Settings {
    pub gateway: GatewayConfig,
    pub logging: LoggingSettings,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("preview client requires a non-empty API token")]
    MissingCredential,
    #[error("invalid backend URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

impl ConfigError {
    pub(crate) fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load server settings using the configured precedence (file → environment).
///
/// The file layer is an optional `vetrina.toml`; the environment layer is
/// read through [`ProcessEnv`] so browser deployments can reuse the same
/// resolution against their injected runtime map.
pub fn load(file: Option<&Path>) -> Result<Settings, ConfigError> {
    let mut builder =
        Config::builder().add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = file {
        builder = builder.add_source(File::from(path).required(true));
    }

    let raw: RawSettings = builder.build()?.try_deserialize()?;

    let env = ProcessEnv;
    let partial = PartialConfig::from(raw.backend).merged(PartialConfig::resolve(&env));
    let gateway = GatewayConfig::from_partial(partial)?;
    let logging = build_logging_settings(raw.logging, &env)?;

    Ok(Settings { gateway, logging })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    backend: RawBackendSettings,
    logging: RawLoggingSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawBackendSettings {
    project_id: Option<String>,
    dataset: Option<String>,
    api_version: Option<String>,
    api_host: Option<String>,
    use_cdn: Option<bool>,
    api_token: Option<String>,
    preview_secret: Option<String>,
    request_timeout_secs: Option<u64>,
}

impl From<RawBackendSettings> for PartialConfig {
    fn from(raw: RawBackendSettings) -> Self {
        Self {
            project_id: non_empty(raw.project_id),
            dataset: non_empty(raw.dataset),
            api_version: non_empty(raw.api_version),
            api_host: non_empty(raw.api_host),
            use_cdn: raw.use_cdn,
            api_token: non_empty(raw.api_token),
            preview_secret: non_empty(raw.preview_secret),
            request_timeout_secs: raw.request_timeout_secs,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

fn build_logging_settings(
    logging: RawLoggingSettings,
    env: &dyn EnvSource,
) -> Result<LoggingSettings, ConfigError> {
    let level_str = non_empty(env.get(KEY_LOG_LEVEL)).or(logging.level);
    let level = match level_str {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            ConfigError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let json = env
        .get(KEY_LOG_JSON)
        .map(|v| parse_flag(&v))
        .or(logging.json)
        .unwrap_or(false);
    let format = if json {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}
