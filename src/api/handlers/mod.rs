//! HTTP handlers. Failures are returned as `{"error": "..."}` with a status
//! derived from the [`AuthError`] variant.

pub mod app;
pub mod auth;
pub mod health;
pub mod pages;
pub mod teachers;

use crate::auth::AuthError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct ErrorResponse {
    pub error: String,
}

pub(crate) fn status_for(err: &AuthError) -> StatusCode {
    match err {
        AuthError::Validation(_) => StatusCode::BAD_REQUEST,
        AuthError::InvalidCredentials | AuthError::NotAuthenticated => StatusCode::UNAUTHORIZED,
        AuthError::Conflict => StatusCode::CONFLICT,
        AuthError::NotFound => StatusCode::NOT_FOUND,
        AuthError::Forbidden => StatusCode::FORBIDDEN,
        AuthError::Backend(_) => StatusCode::BAD_GATEWAY,
    }
}

pub(crate) fn error_response(err: &AuthError) -> Response {
    let status = status_for(err);
    if status.is_server_error() {
        error!("Backend failure: {err}");
    }
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses() {
        assert_eq!(
            status_for(&AuthError::validation("bad")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&AuthError::InvalidCredentials),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(status_for(&AuthError::Conflict), StatusCode::CONFLICT);
        assert_eq!(status_for(&AuthError::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&AuthError::Forbidden), StatusCode::FORBIDDEN);
        assert_eq!(
            status_for(&AuthError::Backend("down".to_string())),
            StatusCode::BAD_GATEWAY
        );
    }
}
