use crate::model::Session;
use secrecy::{ExposeSecret, SecretString};
use uuid::Uuid;

/// Auth state changes published by [`super::AuthService`].
#[derive(Debug, Clone)]
pub enum AuthEvent {
    /// A session was issued and the account's rows are in place.
    SignedIn(Session),
    SignedOut {
        user_id: Uuid,
        access_token: SecretString,
    },
    /// Profile columns changed for this identity.
    UserUpdated { user_id: Uuid },
}

impl AuthEvent {
    #[must_use]
    pub fn user_id(&self) -> Uuid {
        match self {
            Self::SignedIn(session) => session.identity.id,
            Self::SignedOut { user_id, .. } | Self::UserUpdated { user_id } => *user_id,
        }
    }

    /// Session token the event is bound to, if any.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        match self {
            Self::SignedIn(session) => Some(session.token()),
            Self::SignedOut { access_token, .. } => Some(access_token.expose_secret()),
            Self::UserUpdated { .. } => None,
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SignedIn(_) => "SIGNED_IN",
            Self::SignedOut { .. } => "SIGNED_OUT",
            Self::UserUpdated { .. } => "USER_UPDATED",
        }
    }
}
