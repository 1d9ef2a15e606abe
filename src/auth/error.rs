//! Failures surfaced to callers of [`super::AuthService`].
//!
//! `Display` is the message shown next to the form that triggered the call.

use crate::backend::{IdentityError, StoreError};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid login credentials")]
    InvalidCredentials,
    #[error("User already registered")]
    Conflict,
    #[error("{0}")]
    Validation(String),
    #[error("Not signed in")]
    NotAuthenticated,
    #[error("Not found")]
    NotFound,
    #[error("Not allowed for this account")]
    Forbidden,
    #[error("{0}")]
    Backend(String),
}

impl AuthError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

impl From<IdentityError> for AuthError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::InvalidCredentials => Self::InvalidCredentials,
            IdentityError::AlreadyRegistered => Self::Conflict,
            IdentityError::InvalidSession => Self::NotAuthenticated,
            // 4xx rejections carry a user-facing reason such as a weak password.
            IdentityError::Rejected { status, message } if (400..500).contains(&status) => {
                Self::Validation(message)
            }
            IdentityError::Rejected { message, .. } => Self::Backend(message),
            IdentityError::Transport(message) => Self::Backend(message),
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound,
            StoreError::UniqueViolation => Self::Conflict,
            StoreError::Backend(message) => Self::Backend(message),
        }
    }
}
