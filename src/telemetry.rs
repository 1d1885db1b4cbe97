//! Telemetry bootstrap: tracing subscriber installation and metric
//! descriptions for the gateway's counters.

use std::sync::Once;

use metrics::{Unit, describe_counter};
use thiserror::Error;
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

pub(crate) const METRIC_EDGE_HIT: &str = "vetrina_edge_cache_hit_total";
pub(crate) const METRIC_EDGE_MISS: &str = "vetrina_edge_cache_miss_total";
pub(crate) const METRIC_SESSION_HIT: &str = "vetrina_session_cache_hit_total";
pub(crate) const METRIC_SESSION_MISS: &str = "vetrina_session_cache_miss_total";
pub(crate) const METRIC_SESSION_EVICT: &str = "vetrina_session_cache_evict_total";
pub(crate) const METRIC_SESSION_DROP: &str = "vetrina_session_cache_drop_total";
pub(crate) const METRIC_QUERY_FETCH: &str = "vetrina_query_fetch_total";
pub(crate) const METRIC_QUERY_FAILURE: &str = "vetrina_query_failure_total";

static METRIC_DESCRIPTIONS: Once = Once::new();

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to install tracing subscriber: {0}")]
    Init(String),
}

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), TelemetryError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| TelemetryError::Init(err.to_string()))
}

/// Register metric descriptions once per process.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_EDGE_HIT,
            Unit::Count,
            "Total number of edge-cache hits."
        );
        describe_counter!(
            METRIC_EDGE_MISS,
            Unit::Count,
            "Total number of edge-cache misses."
        );
        describe_counter!(
            METRIC_SESSION_HIT,
            Unit::Count,
            "Total number of session-store hits."
        );
        describe_counter!(
            METRIC_SESSION_MISS,
            Unit::Count,
            "Total number of session-store misses."
        );
        describe_counter!(
            METRIC_SESSION_EVICT,
            Unit::Count,
            "Total number of session entries removed by retention cleanup."
        );
        describe_counter!(
            METRIC_SESSION_DROP,
            Unit::Count,
            "Total number of session writes abandoned after quota recovery failed."
        );
        describe_counter!(
            METRIC_QUERY_FETCH,
            Unit::Count,
            "Total number of backend content fetches."
        );
        describe_counter!(
            METRIC_QUERY_FAILURE,
            Unit::Count,
            "Total number of failed backend content fetches."
        );
    });
}
