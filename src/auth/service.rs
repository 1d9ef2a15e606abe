use super::{
    validate::{SignInRequest, SignUpRequest},
    AuthError, AuthEvent,
};
use crate::{
    backend::{IdentityError, IdentityProvider, Store},
    model::{Identity, NewProfile, Profile, ProfileChanges, Role, Session},
};
use secrecy::SecretString;
use std::{sync::Arc, time::Duration};
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Pause between the explicit sign-in and the profile upsert during sign-up.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(1000);

const EVENT_CAPACITY: usize = 256;

/// Result of a successful sign-up or sign-in.
#[derive(Debug, Clone)]
pub struct AuthSuccess {
    pub identity: Identity,
    pub profile: Profile,
    pub session: Session,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub identity: Identity,
    pub profile: Option<Profile>,
}

pub struct AuthService {
    pub(super) identity: Arc<dyn IdentityProvider>,
    pub(super) store: Arc<dyn Store>,
    events: broadcast::Sender<AuthEvent>,
    pub(super) settle_delay: Duration,
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("settle_delay", &self.settle_delay)
            .field("listeners", &self.events.receiver_count())
            .finish_non_exhaustive()
    }
}

impl AuthService {
    #[must_use]
    pub fn new(identity: Arc<dyn IdentityProvider>, store: Arc<dyn Store>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            identity,
            store,
            events,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }

    #[must_use]
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    #[must_use]
    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Subscribe to auth state changes. Events published before the call are
    /// not replayed.
    #[must_use]
    pub fn on_auth_state_change(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    pub(super) fn publish(&self, event: AuthEvent) {
        let name = event.name();
        match self.events.send(event) {
            Ok(listeners) => debug!(event = name, listeners, "auth event published"),
            Err(_) => debug!(event = name, "auth event dropped, no listeners"),
        }
    }

    /// Create an account and sign it in; see [`Self::reconcile_sign_up`].
    ///
    /// # Errors
    /// Returns [`AuthError::Validation`] for bad input, [`AuthError::Conflict`]
    /// for an existing email, and any backend failure along the way.
    #[instrument(skip_all, fields(role = %request.role))]
    pub async fn sign_up(&self, request: &SignUpRequest) -> Result<AuthSuccess, AuthError> {
        let valid = request.validate()?;
        self.reconcile_sign_up(valid).await
    }

    /// Password sign-in. A missing profile row is recreated from the
    /// identity's sign-up metadata.
    ///
    /// # Errors
    /// Returns [`AuthError::InvalidCredentials`] for unknown emails and wrong
    /// passwords alike.
    #[instrument(skip_all)]
    pub async fn sign_in(&self, request: &SignInRequest) -> Result<AuthSuccess, AuthError> {
        let email = request.validate()?;
        let session = self.identity.sign_in(&email, &request.password).await?;
        let identity = session.identity.clone();

        let profile = match self.store.profile(identity.id).await? {
            Some(profile) => profile,
            None => {
                warn!(user_id = %identity.id, "profile missing at sign-in, recreating");
                let metadata = &identity.metadata;
                let new_profile = NewProfile {
                    id: identity.id,
                    email: identity.email.clone(),
                    first_name: metadata.first_name.clone().unwrap_or_default(),
                    last_name: metadata.last_name.clone().unwrap_or_default(),
                    role: metadata.role().unwrap_or(Role::Parent),
                };
                self.store.upsert_profile(&new_profile).await?
            }
        };

        info!(user_id = %identity.id, role = %profile.role, "signed in");
        self.publish(AuthEvent::SignedIn(session.clone()));
        Ok(AuthSuccess {
            identity,
            profile,
            session,
        })
    }

    /// Revoke the session. A token the provider no longer knows counts as
    /// already signed out.
    ///
    /// # Errors
    /// Returns a backend error when the provider cannot be reached.
    #[instrument(skip_all)]
    pub async fn sign_out(&self, access_token: &SecretString) -> Result<(), AuthError> {
        let user_id = match self.identity.get_session(access_token).await {
            Ok(session) => session.identity.id,
            Err(IdentityError::InvalidSession) => {
                debug!("sign-out with unknown session");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        match self.identity.sign_out(access_token).await {
            Ok(()) | Err(IdentityError::InvalidSession) => {}
            Err(err) => return Err(err.into()),
        }

        info!(%user_id, "signed out");
        self.publish(AuthEvent::SignedOut {
            user_id,
            access_token: access_token.clone(),
        });
        Ok(())
    }

    /// Resolve a token to its session, or `None` when it is missing or no
    /// longer valid.
    ///
    /// # Errors
    /// Returns a backend error when the provider cannot be reached.
    pub async fn current_session(
        &self,
        access_token: &SecretString,
    ) -> Result<Option<Session>, AuthError> {
        match self.identity.get_session(access_token).await {
            Ok(session) => Ok(Some(session)),
            Err(IdentityError::InvalidSession) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Identity plus profile row for a token.
    ///
    /// # Errors
    /// Returns a backend error when either backend fails.
    pub async fn current_user(
        &self,
        access_token: &SecretString,
    ) -> Result<Option<CurrentUser>, AuthError> {
        let Some(session) = self.current_session(access_token).await? else {
            return Ok(None);
        };
        let profile = self.store.profile(session.identity.id).await?;
        Ok(Some(CurrentUser {
            identity: session.identity,
            profile,
        }))
    }

    /// # Errors
    /// Returns a backend error when the store fails.
    pub async fn profile(&self, user_id: Uuid) -> Result<Option<Profile>, AuthError> {
        Ok(self.store.profile(user_id).await?)
    }

    /// Update the signed-in user's profile columns.
    ///
    /// # Errors
    /// Returns [`AuthError::NotAuthenticated`] without a valid session and
    /// [`AuthError::Validation`] when no column is set.
    #[instrument(skip_all)]
    pub async fn update_profile(
        &self,
        access_token: &SecretString,
        changes: &ProfileChanges,
    ) -> Result<Profile, AuthError> {
        if changes.is_empty() {
            return Err(AuthError::validation("Nothing to update"));
        }
        let Some(session) = self.current_session(access_token).await? else {
            return Err(AuthError::NotAuthenticated);
        };
        let user_id = session.identity.id;
        let profile = self.store.update_profile(user_id, changes).await?;

        info!(%user_id, "profile updated");
        self.publish(AuthEvent::UserUpdated { user_id });
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory;

    fn service() -> AuthService {
        let (identity, store) = memory::pair(Duration::from_secs(60), None);
        AuthService::new(identity, store).with_settle_delay(Duration::ZERO)
    }

    fn secret(value: &str) -> SecretString {
        SecretString::from(value.to_string())
    }

    fn sign_up_request(email: &str, role: Role) -> SignUpRequest {
        SignUpRequest {
            email: email.to_string(),
            password: secret("correct horse"),
            password_confirmation: None,
            first_name: "Pat".to_string(),
            last_name: "Doe".to_string(),
            role,
        }
    }

    fn sign_in_request(email: &str, password: &str) -> SignInRequest {
        SignInRequest {
            email: email.to_string(),
            password: secret(password),
        }
    }

    #[tokio::test]
    async fn sign_in_returns_latest_profile_fields() -> Result<(), AuthError> {
        let auth = service();
        let created = auth
            .sign_up(&sign_up_request("p@x.com", Role::Parent))
            .await?;
        auth.update_profile(
            created.session.access_token(),
            &ProfileChanges {
                city: Some("Austin".to_string()),
                first_name: Some("Patricia".to_string()),
                ..ProfileChanges::default()
            },
        )
        .await?;

        let again = auth
            .sign_in(&sign_in_request("p@x.com", "correct horse"))
            .await?;
        assert_eq!(again.profile.first_name, "Patricia");
        assert_eq!(again.profile.city.as_deref(), Some("Austin"));
        Ok(())
    }

    #[tokio::test]
    async fn sign_in_recreates_missing_profile() -> Result<(), AuthError> {
        let (identity, store) = memory::pair(Duration::from_secs(60), None);
        let auth =
            AuthService::new(identity, store.clone()).with_settle_delay(Duration::ZERO);
        let created = auth
            .sign_up(&sign_up_request("t@x.com", Role::Teacher))
            .await?;
        assert!(store.delete_profile(created.identity.id).await);

        let signed_in = auth
            .sign_in(&sign_in_request("t@x.com", "correct horse"))
            .await?;
        assert_eq!(signed_in.profile.id, created.identity.id);
        assert_eq!(signed_in.profile.role, Role::Teacher);
        assert_eq!(signed_in.profile.last_name, "Doe");
        Ok(())
    }

    #[tokio::test]
    async fn wrong_password_is_invalid_credentials() -> Result<(), AuthError> {
        let auth = service();
        auth.sign_up(&sign_up_request("p@x.com", Role::Parent))
            .await?;
        let err = auth
            .sign_in(&sign_in_request("p@x.com", "wrong"))
            .await
            .err();
        assert_eq!(err, Some(AuthError::InvalidCredentials));
        Ok(())
    }

    #[tokio::test]
    async fn sign_out_publishes_and_invalidates() -> Result<(), AuthError> {
        let auth = service();
        let created = auth
            .sign_up(&sign_up_request("p@x.com", Role::Parent))
            .await?;
        let mut events = auth.on_auth_state_change();
        let token = created.session.access_token().clone();

        auth.sign_out(&token).await?;
        match events.recv().await {
            Ok(AuthEvent::SignedOut { user_id, .. }) => {
                assert_eq!(user_id, created.identity.id);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(auth.current_user(&token).await?, None);

        // A second sign-out with the dead token is a no-op.
        auth.sign_out(&token).await?;
        Ok(())
    }

    #[tokio::test]
    async fn current_user_includes_profile() -> Result<(), AuthError> {
        let auth = service();
        let created = auth
            .sign_up(&sign_up_request("p@x.com", Role::Parent))
            .await?;
        let user = auth
            .current_user(created.session.access_token())
            .await?
            .ok_or(AuthError::NotAuthenticated)?;
        assert_eq!(user.identity.id, created.identity.id);
        assert_eq!(user.profile.map(|p| p.role), Some(Role::Parent));

        assert_eq!(auth.current_user(&secret("garbage")).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn current_session_keeps_provider_expiry() -> Result<(), AuthError> {
        let auth = service();
        let created = auth
            .sign_up(&sign_up_request("p@x.com", Role::Parent))
            .await?;
        let session = auth
            .current_session(created.session.access_token())
            .await?
            .ok_or(AuthError::NotAuthenticated)?;
        assert!(session.expires_at.is_some());
        assert_eq!(session.expires_at, created.session.expires_at);
        Ok(())
    }

    #[tokio::test]
    async fn update_profile_requires_session_and_changes() -> Result<(), AuthError> {
        let auth = service();
        let created = auth
            .sign_up(&sign_up_request("p@x.com", Role::Parent))
            .await?;

        let empty = auth
            .update_profile(created.session.access_token(), &ProfileChanges::default())
            .await;
        assert!(matches!(empty, Err(AuthError::Validation(_))));

        let changes = ProfileChanges {
            bio: Some("hi".to_string()),
            ..ProfileChanges::default()
        };
        let anonymous = auth.update_profile(&secret("nope"), &changes).await;
        assert_eq!(anonymous.err(), Some(AuthError::NotAuthenticated));

        let mut events = auth.on_auth_state_change();
        let updated = auth
            .update_profile(created.session.access_token(), &changes)
            .await?;
        assert_eq!(updated.bio.as_deref(), Some("hi"));
        assert!(matches!(
            events.recv().await,
            Ok(AuthEvent::UserUpdated { user_id }) if user_id == created.identity.id
        ));
        Ok(())
    }
}
