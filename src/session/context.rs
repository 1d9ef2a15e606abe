use crate::{
    auth::{AuthEvent, AuthService, AuthSuccess},
    model::{Identity, Profile, Role, Session},
};
use secrecy::{ExposeSecret, SecretString};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::{watch, OnceCell};
use tracing::{debug, error};
use uuid::Uuid;

/// What a request handler knows about the caller.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub identity: Option<Identity>,
    pub profile: Option<Profile>,
    pub session: Option<Session>,
    pub loading: bool,
}

impl Snapshot {
    #[must_use]
    pub fn loading() -> Self {
        Self {
            loading: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn signed_out() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_signed_out(&self) -> bool {
        !self.loading && self.identity.is_none() && self.profile.is_none() && self.session.is_none()
    }

    #[must_use]
    pub fn role(&self) -> Option<Role> {
        self.profile.as_ref().map(|profile| profile.role)
    }

    #[must_use]
    pub fn user_id(&self) -> Option<Uuid> {
        self.identity.as_ref().map(|identity| identity.id)
    }
}

#[derive(Debug, Clone, Default)]
struct Published {
    generation: u64,
    snapshot: Snapshot,
}

/// Receiver side of a context's snapshot channel.
#[derive(Debug, Clone)]
pub struct SnapshotWatcher {
    rx: watch::Receiver<Published>,
}

impl SnapshotWatcher {
    /// Latest snapshot, marking it seen.
    pub fn current(&mut self) -> Snapshot {
        self.rx.borrow_and_update().snapshot.clone()
    }

    /// Wait for the next published snapshot. `None` once the context is gone.
    pub async fn next(&mut self) -> Option<Snapshot> {
        self.rx.changed().await.ok()?;
        Some(self.current())
    }
}

/// Snapshot holder for one session.
///
/// Every write takes a ticket before doing any I/O and publishes only if no
/// write with a newer ticket has been published in the meantime, so a slow
/// profile fetch can never overwrite a later sign-out.
pub struct SessionContext {
    auth: Arc<AuthService>,
    state: watch::Sender<Published>,
    tickets: AtomicU64,
    initialized: OnceCell<()>,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

impl SessionContext {
    #[must_use]
    pub fn new(auth: Arc<AuthService>) -> Self {
        let (state, _) = watch::channel(Published {
            generation: 0,
            snapshot: Snapshot::loading(),
        });
        Self {
            auth,
            state,
            tickets: AtomicU64::new(0),
            initialized: OnceCell::new(),
        }
    }

    fn ticket(&self) -> u64 {
        self.tickets.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn publish(&self, ticket: u64, snapshot: Snapshot) -> bool {
        self.state.send_if_modified(|state| {
            if ticket <= state.generation {
                debug!(
                    ticket,
                    generation = state.generation,
                    "discarding superseded snapshot"
                );
                return false;
            }
            state.generation = ticket;
            state.snapshot = snapshot;
            true
        })
    }

    /// Generation of the last published snapshot.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.state.borrow().generation
    }

    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.state.borrow().snapshot.clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> SnapshotWatcher {
        SnapshotWatcher {
            rx: self.state.subscribe(),
        }
    }

    /// Resolve `token` once and leave the loading state. Later calls return
    /// immediately.
    pub async fn initialize(&self, token: &SecretString) {
        self.initialized
            .get_or_init(|| async {
                let ticket = self.ticket();
                let snapshot = self.load(token).await;
                self.publish(ticket, snapshot);
            })
            .await;
    }

    async fn load(&self, token: &SecretString) -> Snapshot {
        let session = match self.auth.current_session(token).await {
            Ok(Some(session)) => session,
            Ok(None) => return Snapshot::signed_out(),
            Err(err) => {
                error!("Failed to resolve session: {err}");
                return Snapshot::signed_out();
            }
        };
        let profile = self.fetch_profile(session.identity.id).await;
        Snapshot {
            identity: Some(session.identity.clone()),
            profile,
            session: Some(session),
            loading: false,
        }
    }

    async fn fetch_profile(&self, user_id: Uuid) -> Option<Profile> {
        match self.auth.profile(user_id).await {
            Ok(profile) => profile,
            Err(err) => {
                error!(%user_id, "Failed to load profile: {err}");
                None
            }
        }
    }

    /// Wait up to `wait` for the context to leave the loading state and
    /// return whatever is current by then.
    pub async fn ready(&self, wait: Duration) -> Snapshot {
        let mut rx = self.state.subscribe();
        let snapshot =
            match tokio::time::timeout(wait, rx.wait_for(|state| !state.snapshot.loading)).await {
                Ok(Ok(state)) => state.snapshot.clone(),
                _ => self.snapshot(),
            };
        snapshot
    }

    /// Apply an auth notification. This is the only path by which external
    /// events change the snapshot.
    pub async fn apply(&self, event: AuthEvent) {
        match event {
            AuthEvent::SignedIn(session) => {
                let ticket = self.ticket();
                let profile = self.fetch_profile(session.identity.id).await;
                self.publish(
                    ticket,
                    Snapshot {
                        identity: Some(session.identity.clone()),
                        profile,
                        session: Some(session),
                        loading: false,
                    },
                );
            }
            AuthEvent::SignedOut { access_token, .. } => {
                let current = self.snapshot();
                let matches = current
                    .session
                    .as_ref()
                    .is_some_and(|session| session.token() == access_token.expose_secret());
                if matches || current.loading {
                    self.clear();
                }
            }
            AuthEvent::UserUpdated { user_id } => {
                let ticket = self.ticket();
                let current = self.snapshot();
                if current.user_id() != Some(user_id) {
                    return;
                }
                let profile = self.fetch_profile(user_id).await;
                self.publish(
                    ticket,
                    Snapshot {
                        profile,
                        loading: false,
                        ..current
                    },
                );
            }
        }
    }

    /// Adopt the result of a local sign-up or sign-in.
    pub fn establish(&self, success: AuthSuccess) {
        let ticket = self.ticket();
        self.publish(
            ticket,
            Snapshot {
                identity: Some(success.identity),
                profile: Some(success.profile),
                session: Some(success.session),
                loading: false,
            },
        );
    }

    /// Drop to the signed-out state after a local sign-out.
    pub fn clear(&self) {
        let ticket = self.ticket();
        self.publish(ticket, Snapshot::signed_out());
    }
}
