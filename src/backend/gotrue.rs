//! HTTP client for a GoTrue-compatible identity API (the auth half of the
//! managed backend). Every request carries the project's anon key in the
//! `apikey` header; user-scoped calls add the session's bearer token.

use super::{IdentityError, IdentityProvider};
use crate::model::{Identity, Session, UserMetadata};
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::Utc;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;
use uuid::Uuid;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct UserDto {
    id: Uuid,
    email: Option<String>,
    #[serde(default)]
    user_metadata: UserMetadata,
    identities: Option<Vec<Value>>,
}

impl UserDto {
    fn into_identity(self, fallback_email: &str) -> Identity {
        Identity {
            id: self.id,
            email: self.email.unwrap_or_else(|| fallback_email.to_string()),
            metadata: self.user_metadata,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SessionDto {
    access_token: String,
    expires_in: Option<i64>,
    expires_at: Option<i64>,
    user: UserDto,
}

/// The only access-token claim read locally.
#[derive(Debug, Deserialize)]
struct AccessClaims {
    exp: Option<i64>,
}

/// `exp` of a JWT access token. The provider has already accepted the token
/// when this is read, so the signature is not checked here.
fn token_expiry(access_token: &str) -> Option<i64> {
    let payload = access_token.split('.').nth(1)?;
    let bytes = Base64UrlUnpadded::decode_vec(payload).ok()?;
    serde_json::from_slice::<AccessClaims>(&bytes).ok()?.exp
}

/// The API has used several error shapes over time; read whichever is present.
#[derive(Debug, Default, Deserialize)]
struct ErrorDto {
    msg: Option<String>,
    message: Option<String>,
    error_description: Option<String>,
    error: Option<String>,
    error_code: Option<String>,
}

impl ErrorDto {
    fn text(&self) -> String {
        self.msg
            .as_ref()
            .or(self.message.as_ref())
            .or(self.error_description.as_ref())
            .or(self.error.as_ref())
            .cloned()
            .unwrap_or_default()
    }

    fn is_invalid_credentials(&self) -> bool {
        self.error_code.as_deref() == Some("invalid_credentials")
            || self.error.as_deref() == Some("invalid_grant")
            || self.text().contains("Invalid login credentials")
    }

    fn is_already_registered(&self) -> bool {
        matches!(
            self.error_code.as_deref(),
            Some("user_already_exists" | "email_exists")
        ) || self.text().contains("already registered")
    }
}

#[derive(Debug, Clone)]
pub struct GoTrueProvider {
    client: Client,
    base_url: String,
    anon_key: SecretString,
}

impl GoTrueProvider {
    /// Build a client for the project at `base_url` (e.g. `https://xyz.supabase.co`).
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be built.
    pub fn new(base_url: &str, anon_key: SecretString) -> Result<Self> {
        let parsed =
            Url::parse(base_url).with_context(|| format!("Invalid auth URL: {base_url}"))?;
        if parsed.host_str().is_none() {
            anyhow::bail!("Auth URL must include a host: {base_url}");
        }

        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build identity HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.base_url)
    }

    fn with_key(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header("apikey", self.anon_key.expose_secret())
    }

    async fn send(builder: RequestBuilder) -> Result<Response, IdentityError> {
        builder
            .send()
            .await
            .map_err(|err| IdentityError::Transport(err.to_string()))
    }

    async fn read_error(response: Response) -> (StatusCode, ErrorDto) {
        let status = response.status();
        let body = response.json::<ErrorDto>().await.unwrap_or_default();
        (status, body)
    }

    fn rejected(status: StatusCode, body: &ErrorDto) -> IdentityError {
        let text = body.text();
        IdentityError::Rejected {
            status: status.as_u16(),
            message: if text.is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("Request failed")
                    .to_string()
            } else {
                text
            },
        }
    }

    fn session_from(dto: SessionDto, fallback_email: &str) -> Session {
        let expires_at = dto
            .expires_at
            .or_else(|| token_expiry(&dto.access_token))
            .or_else(|| {
                dto.expires_in
                    .map(|seconds| Utc::now().timestamp().saturating_add(seconds))
            });
        Session::new(
            SecretString::from(dto.access_token),
            dto.user.into_identity(fallback_email),
            expires_at,
        )
    }
}

#[async_trait]
impl IdentityProvider for GoTrueProvider {
    #[instrument(skip(self, password, metadata))]
    async fn sign_up(
        &self,
        email: &str,
        password: &SecretString,
        metadata: &UserMetadata,
    ) -> Result<Identity, IdentityError> {
        let payload = json!({
            "email": email,
            "password": password.expose_secret(),
            "data": metadata,
        });
        let response =
            Self::send(self.with_key(self.client.post(self.endpoint("signup")).json(&payload)))
                .await?;

        if !response.status().is_success() {
            let (status, body) = Self::read_error(response).await;
            if body.is_already_registered() {
                return Err(IdentityError::AlreadyRegistered);
            }
            return Err(Self::rejected(status, &body));
        }

        // Auto-confirming projects answer with a session wrapping the user;
        // others answer with the bare user.
        let mut body: Value = response
            .json()
            .await
            .map_err(|err| IdentityError::Transport(err.to_string()))?;
        let user = if body.get("user").is_some() {
            body["user"].take()
        } else {
            body
        };
        let user: UserDto = serde_json::from_value(user).map_err(|err| {
            IdentityError::Transport(format!("Unexpected sign-up response: {err}"))
        })?;

        // With email confirmation on, an existing address yields an obfuscated
        // user without identities instead of an error.
        if user.identities.as_ref().is_some_and(Vec::is_empty) {
            return Err(IdentityError::AlreadyRegistered);
        }

        debug!(user_id = %user.id, "identity created");
        Ok(user.into_identity(email))
    }

    #[instrument(skip(self, password))]
    async fn sign_in(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<Session, IdentityError> {
        let payload = json!({
            "email": email,
            "password": password.expose_secret(),
        });
        let response = Self::send(self.with_key(
            self.client
                .post(self.endpoint("token"))
                .query(&[("grant_type", "password")])
                .json(&payload),
        ))
        .await?;

        if !response.status().is_success() {
            let (status, body) = Self::read_error(response).await;
            if body.is_invalid_credentials() {
                return Err(IdentityError::InvalidCredentials);
            }
            return Err(Self::rejected(status, &body));
        }

        let session: SessionDto = response
            .json()
            .await
            .map_err(|err| IdentityError::Transport(err.to_string()))?;
        Ok(Self::session_from(session, email))
    }

    #[instrument(skip_all)]
    async fn sign_out(&self, access_token: &SecretString) -> Result<(), IdentityError> {
        let response = Self::send(
            self.with_key(
                self.client
                    .post(self.endpoint("logout"))
                    .bearer_auth(access_token.expose_secret()),
            ),
        )
        .await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(IdentityError::InvalidSession),
            _ => {
                let (status, body) = Self::read_error(response).await;
                Err(Self::rejected(status, &body))
            }
        }
    }

    #[instrument(skip_all)]
    async fn get_session(&self, access_token: &SecretString) -> Result<Session, IdentityError> {
        let response = Self::send(
            self.with_key(
                self.client
                    .get(self.endpoint("user"))
                    .bearer_auth(access_token.expose_secret()),
            ),
        )
        .await?;

        match response.status() {
            status if status.is_success() => {
                let user: UserDto = response
                    .json()
                    .await
                    .map_err(|err| IdentityError::Transport(err.to_string()))?;
                Ok(Session::new(
                    access_token.clone(),
                    user.into_identity(""),
                    token_expiry(access_token.expose_secret()),
                ))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(IdentityError::InvalidSession),
            _ => {
                let (status, body) = Self::read_error(response).await;
                Err(Self::rejected(status, &body))
            }
        }
    }
}
