use super::{SessionContext, Snapshot};
use crate::auth::{AuthEvent, AuthService};
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use std::{
    collections::HashMap,
    sync::{Arc, Weak},
    time::Duration,
};
use tokio::{
    sync::{broadcast::error::RecvError, RwLock},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

/// How long a request waits for a fresh context to finish loading.
pub const DEFAULT_READY_WAIT: Duration = Duration::from_secs(2);

/// One [`SessionContext`] per session token held by this process.
pub struct SessionRegistry {
    auth: Arc<AuthService>,
    contexts: RwLock<HashMap<String, Arc<SessionContext>>>,
    ready_wait: Duration,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("ready_wait", &self.ready_wait)
            .finish_non_exhaustive()
    }
}

impl SessionRegistry {
    #[must_use]
    pub fn new(auth: Arc<AuthService>) -> Self {
        Self {
            auth,
            contexts: RwLock::new(HashMap::new()),
            ready_wait: DEFAULT_READY_WAIT,
        }
    }

    #[must_use]
    pub fn with_ready_wait(mut self, wait: Duration) -> Self {
        self.ready_wait = wait;
        self
    }

    #[must_use]
    pub fn auth(&self) -> &Arc<AuthService> {
        &self.auth
    }

    pub async fn len(&self) -> usize {
        self.contexts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.contexts.read().await.is_empty()
    }

    /// Context for `token`, created on first sight. A new context starts
    /// resolving the token in the background right away.
    pub async fn resolve(&self, token: &str) -> Arc<SessionContext> {
        if let Some(context) = self.contexts.read().await.get(token) {
            return Arc::clone(context);
        }

        let (context, created) = {
            let mut contexts = self.contexts.write().await;
            match contexts.get(token) {
                Some(context) => (Arc::clone(context), false),
                None => {
                    let context = Arc::new(SessionContext::new(Arc::clone(&self.auth)));
                    contexts.insert(token.to_string(), Arc::clone(&context));
                    (context, true)
                }
            }
        };

        if created {
            let background = Arc::clone(&context);
            let secret = SecretString::from(token.to_string());
            tokio::spawn(async move {
                background.initialize(&secret).await;
            });
        }
        context
    }

    /// Snapshot for a request carrying `token`, waiting briefly for a new
    /// context to load. A context whose session has passed its expiry is
    /// dropped and the token resolved again, so the provider decides whether
    /// it is still valid.
    pub async fn snapshot_for(&self, token: Option<&str>) -> Snapshot {
        let Some(token) = token else {
            return Snapshot::signed_out();
        };
        let snapshot = self.resolve(token).await.ready(self.ready_wait).await;
        let now = Utc::now().timestamp();
        if !snapshot
            .session
            .as_ref()
            .is_some_and(|session| session.is_expired(now))
        {
            return snapshot;
        }

        debug!(user_id = ?snapshot.user_id(), "session expired, resolving token again");
        self.remove(token).await;
        self.resolve(token).await.ready(self.ready_wait).await
    }

    /// Seed the context for a token issued by a local sign-in or sign-up.
    pub async fn establish(&self, success: crate::auth::AuthSuccess) {
        let context = Arc::new(SessionContext::new(Arc::clone(&self.auth)));
        let token = success.session.token().to_string();
        context.establish(success);
        self.contexts.write().await.insert(token, context);
    }

    pub async fn remove(&self, token: &str) -> Option<Arc<SessionContext>> {
        self.contexts.write().await.remove(token)
    }

    /// Route one auth event to the contexts it concerns.
    pub async fn route(&self, event: AuthEvent) {
        match &event {
            AuthEvent::SignedIn(session) => {
                let existing = self.contexts.read().await.get(session.token()).cloned();
                match existing {
                    Some(context) => context.apply(event).await,
                    None => {
                        let context = Arc::new(SessionContext::new(Arc::clone(&self.auth)));
                        let token = session.token().to_string();
                        context.apply(event).await;
                        self.contexts
                            .write()
                            .await
                            .entry(token)
                            .or_insert(context);
                    }
                }
            }
            AuthEvent::SignedOut { access_token, .. } => {
                if let Some(context) = self.remove(access_token.expose_secret()).await {
                    context.apply(event).await;
                }
            }
            AuthEvent::UserUpdated { user_id } => {
                let affected: Vec<Arc<SessionContext>> = self
                    .contexts
                    .read()
                    .await
                    .values()
                    .filter(|context| context.snapshot().user_id() == Some(*user_id))
                    .cloned()
                    .collect();
                for context in affected {
                    context.apply(event.clone()).await;
                }
            }
        }
    }

    /// Drop contexts whose session expired or that resolved to nobody.
    pub async fn evict_expired(&self) -> usize {
        let now = Utc::now().timestamp();
        let mut contexts = self.contexts.write().await;
        let before = contexts.len();
        contexts.retain(|_, context| {
            let snapshot = context.snapshot();
            if snapshot.loading {
                return true;
            }
            snapshot
                .session
                .as_ref()
                .is_some_and(|session| !session.is_expired(now))
        });
        before - contexts.len()
    }

    /// Feed auth events into the registry until the registry or the auth
    /// service goes away.
    pub fn spawn_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let mut events = self.auth.on_auth_state_change();
        let registry: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let Some(registry) = registry.upgrade() else {
                            break;
                        };
                        debug!(event = event.name(), "routing auth event");
                        registry.route(event).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "session registry lagged behind auth events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("session registry listener stopped");
        })
    }

    /// Periodically run [`Self::evict_expired`].
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let registry: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                let evicted = registry.evict_expired().await;
                if evicted > 0 {
                    info!(evicted, "evicted session contexts");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::{AuthError, AuthSuccess, SignInRequest, SignUpRequest},
        backend::memory,
        model::{ProfileChanges, Role},
    };

    fn registry(ttl: Duration) -> Arc<SessionRegistry> {
        let (identity, store) = memory::pair(ttl, None);
        let auth = Arc::new(AuthService::new(identity, store).with_settle_delay(Duration::ZERO));
        Arc::new(SessionRegistry::new(auth).with_ready_wait(Duration::from_secs(1)))
    }

    async fn sign_up(registry: &SessionRegistry) -> Result<AuthSuccess, AuthError> {
        registry
            .auth()
            .sign_up(&SignUpRequest {
                email: "p@x.com".to_string(),
                password: SecretString::from("correct horse".to_string()),
                password_confirmation: None,
                first_name: "Pat".to_string(),
                last_name: "Doe".to_string(),
                role: Role::Parent,
            })
            .await
    }

    async fn wait_for<F>(mut check: F)
    where
        F: FnMut() -> bool,
    {
        for _ in 0..100 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn missing_token_is_signed_out() {
        let registry = registry(Duration::from_secs(60));
        assert!(registry.snapshot_for(None).await.is_signed_out());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn resolve_loads_existing_session() -> Result<(), AuthError> {
        let registry = registry(Duration::from_secs(60));
        let success = sign_up(&registry).await?;

        let snapshot = registry
            .snapshot_for(Some(success.session.token()))
            .await;
        assert_eq!(snapshot.user_id(), Some(success.identity.id));
        assert_eq!(snapshot.role(), Some(Role::Parent));

        let again = registry.resolve(success.session.token()).await;
        assert_eq!(registry.len().await, 1);
        assert!(!again.snapshot().loading);
        Ok(())
    }

    #[tokio::test]
    async fn listener_routes_sign_in_and_sign_out() -> Result<(), AuthError> {
        let registry = registry(Duration::from_secs(60));
        let listener = registry.spawn_listener();
        sign_up(&registry).await?;

        let signed_in = registry
            .auth()
            .sign_in(&SignInRequest {
                email: "p@x.com".to_string(),
                password: SecretString::from("correct horse".to_string()),
            })
            .await?;
        let token = signed_in.session.token().to_string();

        // Sign-up and sign-in each publish SignedIn for their own token.
        let mut routed = false;
        for _ in 0..100 {
            if registry.contexts.read().await.contains_key(&token) {
                routed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(routed);
        let context = registry.resolve(&token).await;
        let mut watcher = context.subscribe();

        registry
            .auth()
            .sign_out(signed_in.session.access_token())
            .await?;
        let mut cleared = watcher.current().is_signed_out();
        while !cleared {
            match watcher.next().await {
                Some(snapshot) => cleared = snapshot.is_signed_out(),
                None => break,
            }
        }
        assert!(cleared);
        assert!(!registry.contexts.read().await.contains_key(&token));

        listener.abort();
        Ok(())
    }

    #[tokio::test]
    async fn user_updated_reaches_every_session_of_the_user() -> Result<(), AuthError> {
        let registry = registry(Duration::from_secs(60));
        let first = sign_up(&registry).await?;
        registry.establish(first.clone()).await;
        let second = registry
            .auth()
            .sign_in(&SignInRequest {
                email: "p@x.com".to_string(),
                password: SecretString::from("correct horse".to_string()),
            })
            .await?;
        registry.establish(second.clone()).await;

        registry
            .auth()
            .update_profile(
                first.session.access_token(),
                &ProfileChanges {
                    bio: Some("Cellist".to_string()),
                    ..ProfileChanges::default()
                },
            )
            .await?;
        registry
            .route(AuthEvent::UserUpdated {
                user_id: first.identity.id,
            })
            .await;

        for token in [first.session.token(), second.session.token()] {
            let snapshot = registry.resolve(token).await.snapshot();
            assert_eq!(
                snapshot.profile.and_then(|p| p.bio),
                Some("Cellist".to_string())
            );
        }
        Ok(())
    }

    #[tokio::test]
    async fn resolved_session_expires_with_the_provider() -> Result<(), AuthError> {
        let registry = registry(Duration::from_secs(2));
        let success = sign_up(&registry).await?;
        let token = success.session.token().to_string();

        let before = registry.snapshot_for(Some(&token)).await;
        let session = before.session.ok_or(AuthError::NotAuthenticated)?;
        assert_eq!(session.expires_at, success.session.expires_at);
        assert_eq!(registry.evict_expired().await, 0);

        tokio::time::sleep(Duration::from_millis(2100)).await;

        assert!(registry.snapshot_for(Some(&token)).await.is_signed_out());
        assert_eq!(registry.evict_expired().await, 1);
        assert!(registry.is_empty().await);
        Ok(())
    }

    #[tokio::test]
    async fn eviction_drops_resolved_sessions_past_expiry() -> Result<(), AuthError> {
        let registry = registry(Duration::from_secs(2));
        let success = sign_up(&registry).await?;
        let context = registry.resolve(success.session.token()).await;
        wait_for(|| !context.snapshot().loading).await;
        assert!(context.snapshot().session.is_some());

        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert_eq!(registry.evict_expired().await, 1);
        assert!(registry.is_empty().await);
        Ok(())
    }

    #[tokio::test]
    async fn eviction_drops_expired_and_anonymous_contexts() -> Result<(), AuthError> {
        let registry = registry(Duration::ZERO);
        let success = sign_up(&registry).await?;
        registry.establish(success).await;

        let anonymous = registry.resolve("garbage").await;
        wait_for(|| !anonymous.snapshot().loading).await;

        assert_eq!(registry.len().await, 2);
        assert_eq!(registry.evict_expired().await, 2);
        assert!(registry.is_empty().await);
        Ok(())
    }
}
