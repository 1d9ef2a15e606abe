//! Sign-up, sign-in, sign-out and session lookup.

use super::{error_response, ErrorResponse};
use crate::{
    api::{
        session::{clear_session_cookie, extract_session_token, session_cookie},
        ApiState,
    },
    auth::{AuthSuccess, SignInRequest, SignUpRequest},
    model::{Profile, Role},
};
use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use chrono::Utc;
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(ToSchema, Deserialize, Debug)]
pub struct SignUpBody {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub password_confirmation: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
}

impl From<SignUpBody> for SignUpRequest {
    fn from(body: SignUpBody) -> Self {
        Self {
            email: body.email,
            password: SecretString::from(body.password),
            password_confirmation: body.password_confirmation.map(SecretString::from),
            first_name: body.first_name,
            last_name: body.last_name,
            role: body.role,
        }
    }
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct SignInBody {
    pub email: String,
    pub password: String,
}

impl From<SignInBody> for SignInRequest {
    fn from(body: SignInBody) -> Self {
        Self {
            email: body.email,
            password: SecretString::from(body.password),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AuthResponse {
    pub user_id: Uuid,
    pub email: String,
    pub profile: Profile,
    /// Unix seconds; absent when the provider did not report an expiry.
    pub expires_at: Option<i64>,
    /// Where the client should go next.
    pub redirect_to: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    pub user_id: Uuid,
    pub email: String,
    pub profile: Option<Profile>,
}

async fn signed_in(state: &ApiState, status: StatusCode, success: AuthSuccess) -> Response {
    let mut headers = HeaderMap::new();
    if let Some(cookie) = session_cookie(&state.cookies, &success.session, Utc::now().timestamp()) {
        headers.insert(SET_COOKIE, cookie);
    }
    let response = AuthResponse {
        user_id: success.identity.id,
        email: success.identity.email.clone(),
        profile: success.profile.clone(),
        expires_at: success.session.expires_at,
        redirect_to: crate::guard::dashboard_path(Some(success.profile.role)).to_string(),
    };
    state.sessions.establish(success).await;
    (status, headers, Json(response)).into_response()
}

#[utoipa::path(
    post,
    path = "/v1/auth/signup",
    request_body = SignUpBody,
    responses(
        (status = 201, description = "Account created and signed in", body = AuthResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse),
        (status = 502, description = "Backend failure", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn signup(
    state: Extension<Arc<ApiState>>,
    Json(body): Json<SignUpBody>,
) -> impl IntoResponse {
    match state.auth.sign_up(&body.into()).await {
        Ok(success) => signed_in(&state, StatusCode::CREATED, success).await,
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/signin",
    request_body = SignInBody,
    responses(
        (status = 200, description = "Signed in", body = AuthResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 401, description = "Invalid login credentials", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn signin(
    state: Extension<Arc<ApiState>>,
    Json(body): Json<SignInBody>,
) -> impl IntoResponse {
    match state.auth.sign_in(&body.into()).await {
        Ok(success) => signed_in(&state, StatusCode::OK, success).await,
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/signout",
    responses(
        (status = 204, description = "Session cleared"),
        (status = 502, description = "The provider did not revoke the session", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn signout(headers: HeaderMap, state: Extension<Arc<ApiState>>) -> impl IntoResponse {
    let revoked = match extract_session_token(&headers) {
        Some(token) => {
            let secret = SecretString::from(token.clone());
            let revoked = state.auth.sign_out(&secret).await;
            if revoked.is_ok() {
                if let Some(context) = state.sessions.remove(&token).await {
                    context.clear();
                }
            }
            revoked
        }
        None => Ok(()),
    };

    // The cookie is cleared either way; the token stays valid at the
    // provider only when revocation failed.
    let mut response = match revoked {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            error!("Failed to sign out: {err}");
            error_response(&err)
        }
    };
    if let Some(cookie) = clear_session_cookie(&state.cookies) {
        response.headers_mut().insert(SET_COOKIE, cookie);
    }
    response
}

#[utoipa::path(
    get,
    path = "/v1/auth/session",
    responses(
        (status = 200, description = "Session is active", body = SessionResponse),
        (status = 204, description = "No active session")
    ),
    tag = "auth"
)]
pub async fn session(headers: HeaderMap, state: Extension<Arc<ApiState>>) -> impl IntoResponse {
    let token = extract_session_token(&headers);
    let snapshot = state.sessions.snapshot_for(token.as_deref()).await;
    match (snapshot.identity, snapshot.session) {
        (Some(identity), Some(_)) => {
            let response = SessionResponse {
                user_id: identity.id,
                email: identity.email,
                profile: snapshot.profile,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        _ => StatusCode::NO_CONTENT.into_response(),
    }
}
