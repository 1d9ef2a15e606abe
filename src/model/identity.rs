use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::profile::Role;

/// Sign-up metadata stored on the identity record by the provider.
///
/// The provider keeps it as free-form JSON, so the role stays a string until
/// it is read through [`UserMetadata::role`].
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct UserMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl UserMetadata {
    #[must_use]
    pub fn new(first_name: &str, last_name: &str, role: Role) -> Self {
        Self {
            first_name: Some(first_name.to_string()),
            last_name: Some(last_name.to_string()),
            role: Some(role.as_str().to_string()),
        }
    }

    #[must_use]
    pub fn role(&self) -> Option<Role> {
        self.role.as_deref().and_then(|role| role.parse().ok())
    }
}

/// Authentication record issued by the identity provider.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
    #[serde(default)]
    pub metadata: UserMetadata,
}

/// Authenticated session. The access token never leaves the process except
/// in the session cookie.
#[derive(Debug, Clone)]
pub struct Session {
    access_token: SecretString,
    pub identity: Identity,
    pub expires_at: Option<i64>,
}

impl Session {
    #[must_use]
    pub fn new(access_token: SecretString, identity: Identity, expires_at: Option<i64>) -> Self {
        Self {
            access_token,
            identity,
            expires_at,
        }
    }

    #[must_use]
    pub fn access_token(&self) -> &SecretString {
        &self.access_token
    }

    #[must_use]
    pub fn token(&self) -> &str {
        self.access_token.expose_secret()
    }

    #[must_use]
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    /// Seconds until expiry, if the provider reported one.
    #[must_use]
    pub fn remaining_seconds(&self, now: i64) -> Option<i64> {
        self.expires_at.map(|expires_at| (expires_at - now).max(0))
    }
}
