//! Session cookie handling and the `/app` guard middleware.

use super::ApiState;
use crate::{
    guard::{self, GuardDecision},
    model::Session,
};
use axum::{
    extract::{Extension, Request},
    http::{
        header::{AUTHORIZATION, COOKIE, RETRY_AFTER, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;
use tracing::{debug, error};
use url::Url;

pub const SESSION_COOKIE_NAME: &str = "lessonhub_session";

const DEFAULT_SESSION_TTL_SECONDS: i64 = 60 * 60;
const PENDING_RETRY_AFTER_SECONDS: &str = "1";

#[derive(Clone, Debug)]
pub struct CookieConfig {
    public_url: String,
    session_ttl_seconds: i64,
}

impl CookieConfig {
    #[must_use]
    pub fn new(public_url: String) -> Self {
        Self {
            public_url,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn public_url(&self) -> &str {
        &self.public_url
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    /// Only mark cookies secure when the site is served over HTTPS.
    #[must_use]
    pub fn session_cookie_secure(&self) -> bool {
        Url::parse(&self.public_url).is_ok_and(|url| url.scheme() == "https")
    }
}

/// Build the `HttpOnly` cookie carrying the session token. It never
/// outlives the session's own expiry.
pub(crate) fn session_cookie(config: &CookieConfig, session: &Session, now: i64) -> Option<HeaderValue> {
    let ttl_seconds = session
        .remaining_seconds(now)
        .map_or(config.session_ttl_seconds(), |remaining| {
            remaining.min(config.session_ttl_seconds())
        });
    let token = session.token();
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}"
    );
    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
        .map_err(|err| error!("Failed to build session cookie: {err}"))
        .ok()
}

pub(crate) fn clear_session_cookie(config: &CookieConfig) -> Option<HeaderValue> {
    let mut cookie = format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).ok()
}

/// Session token from a bearer header or, failing that, the session cookie.
pub(crate) fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = extract_bearer_token(headers) {
        return Some(token);
    }
    let value = headers.get(COOKIE)?.to_str().ok()?;
    for pair in value.split(';') {
        let mut parts = pair.trim().splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == SESSION_COOKIE_NAME && !val.is_empty() {
            return Some(val.to_string());
        }
    }
    None
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Guard every `/app` request: resolve the caller's snapshot, then allow,
/// redirect, or ask the client to retry while the session is loading.
/// Allowed requests carry the caller's `Snapshot` as an extension.
pub(crate) async fn require_session(
    Extension(state): Extension<Arc<ApiState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = extract_session_token(request.headers());
    let snapshot = state.sessions.snapshot_for(token.as_deref()).await;
    let path = request.uri().path().to_string();

    match guard::evaluate(&path, &snapshot) {
        GuardDecision::Allow => {
            request.extensions_mut().insert(snapshot);
            next.run(request).await
        }
        GuardDecision::Pending => {
            debug!(%path, "session still loading");
            let mut response =
                (StatusCode::SERVICE_UNAVAILABLE, "Loading your workspace").into_response();
            response.headers_mut().insert(
                RETRY_AFTER,
                HeaderValue::from_static(PENDING_RETRY_AFTER_SECONDS),
            );
            response
        }
        GuardDecision::Redirect(location) => {
            debug!(%path, location, "guard redirect");
            let mut response = Redirect::temporary(location).into_response();
            // A cookie that no longer resolves to a session is dropped.
            if token.is_some() && snapshot.session.is_none() {
                if let Some(cookie) = clear_session_cookie(&state.cookies) {
                    response.headers_mut().insert(SET_COOKIE, cookie);
                }
            }
            response
        }
    }
}
