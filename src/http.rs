//! Route-policy middleware.
//!
//! Classifies every request path against the rule table, exposes the
//! [`RouteDecision`] to downstream handlers as a request extension, and
//! stamps `X-Robots-Tag` on non-indexable responses so crawler policy holds
//! even for responses cached by outer layers.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use tracing::instrument;

use crate::routes::{RouteDecision, RouteRules};

static X_ROBOTS_TAG: HeaderName = HeaderName::from_static("x-robots-tag");

/// Shared policy state for the middleware.
#[derive(Clone)]
pub struct PolicyState {
    pub rules: Arc<RouteRules>,
    /// The global discoverability flag; `false` is the kill switch.
    pub discoverable: bool,
}

/// Middleware applying route policy to every request.
#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn route_policy_layer(
    State(policy): State<PolicyState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let decision = policy.rules.classify(request.uri().path(), policy.discoverable);
    let header = robots_header(&decision);

    request.extensions_mut().insert(decision);
    let mut response = next.run(request).await;

    if let Some(value) = header {
        response.headers_mut().insert(X_ROBOTS_TAG.clone(), value);
    }
    response
}

fn robots_header(decision: &RouteDecision) -> Option<HeaderValue> {
    if !decision.no_index {
        return None;
    }
    let directives = if decision.robots.is_empty() {
        "noindex".to_string()
    } else {
        decision
            .robots
            .iter()
            .map(|directive| directive.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };
    HeaderValue::from_str(&directives).ok()
}
