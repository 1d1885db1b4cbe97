//! Preview mode detection.
//!
//! A request is in preview when it proves knowledge of the shared preview
//! secret, either via the `preview` query parameter or via the cookie issued
//! by a prior preview-entry action. Detection is a pure function of the
//! request; the flag is recomputed every time and never stored.

use axum::http::{Request, header};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

const PREVIEW_PARAM: &str = "preview";
const PREVIEW_COOKIE: &str = "vetrina-preview";

/// The configured preview secret.
///
/// An absent or empty secret means preview is never active: detection fails
/// closed rather than open.
#[derive(Clone, Default)]
pub struct PreviewSecret(Option<String>);

impl PreviewSecret {
    pub fn new(secret: Option<String>) -> Self {
        Self(secret.and_then(|s| {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }))
    }

    pub fn disabled() -> Self {
        Self(None)
    }

    pub fn is_enabled(&self) -> bool {
        self.0.is_some()
    }

    /// Hex SHA-256 of the secret; this digest, not the secret itself, is
    /// what the preview cookie carries.
    fn cookie_digest(&self) -> Option<String> {
        self.0.as_deref().map(|secret| {
            let mut hasher = Sha256::new();
            hasher.update(secret.as_bytes());
            hex::encode(hasher.finalize())
        })
    }
}

impl std::fmt::Debug for PreviewSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some(_) => f.write_str("PreviewSecret(***)"),
            None => f.write_str("PreviewSecret(disabled)"),
        }
    }
}

/// Decide whether a request is in preview mode.
///
/// Checks, in order: a `preview` query parameter equal to the secret, then
/// the preview cookie set by [`enter_preview`]. Both comparisons are
/// constant-time.
pub fn is_preview<B>(request: &Request<B>, secret: &PreviewSecret) -> bool {
    let Some(expected) = secret.0.as_deref() else {
        return false;
    };

    if let Some(query) = request.uri().query() {
        for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
            if name == PREVIEW_PARAM && ct_eq(&value, expected) {
                return true;
            }
        }
    }

    let Some(digest) = secret.cookie_digest() else {
        return false;
    };
    cookie_value(request, PREVIEW_COOKIE).is_some_and(|value| ct_eq(&value, &digest))
}

/// Build the `Set-Cookie` value that marks a session as previewing.
///
/// Returns `None` when preview is disabled. The cookie holds the SHA-256
/// digest of the secret, so the raw secret never enters the cookie jar.
pub fn enter_preview(secret: &PreviewSecret) -> Option<String> {
    secret.cookie_digest().map(|digest| {
        format!("{PREVIEW_COOKIE}={digest}; Path=/; HttpOnly; SameSite=Lax")
    })
}

/// Build the `Set-Cookie` value that clears the preview cookie.
pub fn exit_preview() -> String {
    format!("{PREVIEW_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

fn ct_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn cookie_value<B>(request: &Request<B>, name: &str) -> Option<String> {
    let header = request.headers().get(header::COOKIE)?.to_str().ok()?;
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

#[cfg(test)]
mod tests {
    use axum::body::Body;

    use super::*;

    fn request(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).expect("request builds")
    }

    fn secret(value: &str) -> PreviewSecret {
        PreviewSecret::new(Some(value.to_string()))
    }

    #[test]
    fn plain_request_is_not_preview() {
        let req = request("/products/hat", None);
        assert!(!is_preview(&req, &secret("abc")));
    }

    #[test]
    fn matching_query_param_enables_preview() {
        let req = request("/products/hat?preview=abc", None);
        assert!(is_preview(&req, &secret("abc")));
    }

    #[test]
    fn wrong_query_param_is_rejected() {
        let req = request("/products/hat?preview=nope", None);
        assert!(!is_preview(&req, &secret("abc")));
    }

    #[test]
    fn absent_secret_fails_closed() {
        let req = request("/products/hat?preview=", None);
        assert!(!is_preview(&req, &PreviewSecret::disabled()));
        assert!(!is_preview(&req, &PreviewSecret::new(Some("  ".into()))));
    }

    #[test]
    fn entry_cookie_round_trips() {
        let secret = secret("abc");
        let set_cookie = enter_preview(&secret).expect("cookie issued");
        let value = set_cookie
            .split_once(';')
            .map(|(pair, _)| pair)
            .expect("cookie pair");

        let req = request("/products/hat", Some(value));
        assert!(is_preview(&req, &secret));
    }

    #[test]
    fn cookie_never_contains_raw_secret() {
        let set_cookie = enter_preview(&secret("abc")).expect("cookie issued");
        assert!(!set_cookie.contains("abc"));
    }

    #[test]
    fn stale_cookie_from_other_secret_is_rejected() {
        let old = enter_preview(&secret("old")).expect("cookie issued");
        let value = old.split_once(';').map(|(pair, _)| pair).expect("pair");

        let req = request("/products/hat", Some(value));
        assert!(!is_preview(&req, &secret("new")));
    }

    #[test]
    fn exit_cookie_expires_immediately() {
        let cleared = exit_preview();
        assert!(cleared.contains("Max-Age=0"));
        assert!(cleared.starts_with("vetrina-preview=;"));
    }

    #[test]
    fn enter_preview_disabled_issues_nothing() {
        assert!(enter_preview(&PreviewSecret::disabled()).is_none());
    }
}
