//! In-process identity provider and store.
//!
//! Used by `--backend memory` and by the test suite. [`MemoryIdentity`] can
//! simulate the database trigger that creates a profile row some time after
//! sign-up, which is what the reconciliation workflow has to cope with.

use super::{IdentityError, IdentityProvider, Store, StoreError};
use crate::model::{
    Identity, NewProfile, NewStudent, NewTeacher, Profile, ProfileChanges, Role,
    Session, Student, TeacherChanges, TeacherListing, TeacherRow, UserMetadata,
};
use async_trait::async_trait;
use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::Utc;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

const TOKEN_BYTES: usize = 32;

#[derive(Debug)]
struct Account {
    identity: Identity,
    password: SecretString,
}

#[derive(Debug, Clone, Copy)]
struct IssuedSession {
    user_id: Uuid,
    expires_at: i64,
}

#[derive(Debug, Clone)]
struct ProfileTrigger {
    store: Arc<MemoryStore>,
    delay: Duration,
}

#[derive(Debug)]
pub struct MemoryIdentity {
    accounts: RwLock<HashMap<String, Account>>,
    sessions: RwLock<HashMap<String, IssuedSession>>,
    session_ttl: Duration,
    trigger: Option<ProfileTrigger>,
}

impl MemoryIdentity {
    #[must_use]
    pub fn new(session_ttl: Duration) -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            session_ttl,
            trigger: None,
        }
    }

    /// Insert a profile row from sign-up metadata `delay` after each new
    /// identity, unless a row already exists by then.
    #[must_use]
    pub fn with_profile_trigger(mut self, store: Arc<MemoryStore>, delay: Duration) -> Self {
        self.trigger = Some(ProfileTrigger { store, delay });
        self
    }

    /// Number of live session tokens, expired ones included until touched.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    fn ttl_seconds(&self) -> i64 {
        i64::try_from(self.session_ttl.as_secs()).unwrap_or(i64::MAX)
    }

    fn fire_trigger(&self, identity: &Identity) {
        let Some(trigger) = self.trigger.clone() else {
            return;
        };
        let profile = NewProfile {
            id: identity.id,
            email: identity.email.clone(),
            first_name: identity.metadata.first_name.clone().unwrap_or_default(),
            last_name: identity.metadata.last_name.clone().unwrap_or_default(),
            role: identity.metadata.role().unwrap_or(Role::Parent),
        };
        tokio::spawn(async move {
            tokio::time::sleep(trigger.delay).await;
            let inserted = trigger.store.insert_profile_if_absent(profile).await;
            debug!(inserted, "simulated profile trigger ran");
        });
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    Base64UrlUnpadded::encode_string(&bytes)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[async_trait]
impl IdentityProvider for MemoryIdentity {
    async fn sign_up(
        &self,
        email: &str,
        password: &SecretString,
        metadata: &UserMetadata,
    ) -> Result<Identity, IdentityError> {
        let email = normalize_email(email);
        let identity = {
            let mut accounts = self.accounts.write().await;
            if accounts.contains_key(&email) {
                return Err(IdentityError::AlreadyRegistered);
            }
            let identity = Identity {
                id: Uuid::new_v4(),
                email: email.clone(),
                metadata: metadata.clone(),
            };
            accounts.insert(
                email,
                Account {
                    identity: identity.clone(),
                    password: password.clone(),
                },
            );
            identity
        };

        self.fire_trigger(&identity);
        Ok(identity)
    }

    async fn sign_in(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<Session, IdentityError> {
        let identity = {
            let accounts = self.accounts.read().await;
            let account = accounts
                .get(&normalize_email(email))
                .ok_or(IdentityError::InvalidCredentials)?;
            if account.password.expose_secret() != password.expose_secret() {
                return Err(IdentityError::InvalidCredentials);
            }
            account.identity.clone()
        };

        let token = generate_token();
        let expires_at = Utc::now().timestamp().saturating_add(self.ttl_seconds());
        self.sessions.write().await.insert(
            token.clone(),
            IssuedSession {
                user_id: identity.id,
                expires_at,
            },
        );
        Ok(Session::new(
            SecretString::from(token),
            identity,
            Some(expires_at),
        ))
    }

    async fn sign_out(&self, access_token: &SecretString) -> Result<(), IdentityError> {
        match self
            .sessions
            .write()
            .await
            .remove(access_token.expose_secret())
        {
            Some(_) => Ok(()),
            None => Err(IdentityError::InvalidSession),
        }
    }

    async fn get_session(&self, access_token: &SecretString) -> Result<Session, IdentityError> {
        let issued = self
            .sessions
            .read()
            .await
            .get(access_token.expose_secret())
            .copied()
            .ok_or(IdentityError::InvalidSession)?;

        if issued.expires_at <= Utc::now().timestamp() {
            self.sessions
                .write()
                .await
                .remove(access_token.expose_secret());
            return Err(IdentityError::InvalidSession);
        }

        let identity = self
            .accounts
            .read()
            .await
            .values()
            .find(|account| account.identity.id == issued.user_id)
            .map(|account| account.identity.clone())
            .ok_or_else(|| {
                warn!(user_id = %issued.user_id, "session refers to a missing account");
                IdentityError::InvalidSession
            })?;
        Ok(Session::new(
            access_token.clone(),
            identity,
            Some(issued.expires_at),
        ))
    }
}

#[derive(Debug, Default)]
struct Tables {
    profiles: HashMap<Uuid, Profile>,
    teachers: HashMap<Uuid, TeacherRow>,
    students: Vec<Student>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert only when no row with this id exists; returns whether it did.
    pub async fn insert_profile_if_absent(&self, profile: NewProfile) -> bool {
        let mut tables = self.tables.write().await;
        if tables.profiles.contains_key(&profile.id) {
            return false;
        }
        tables
            .profiles
            .insert(profile.id, profile.into_profile(Utc::now()));
        true
    }

    pub async fn delete_profile(&self, id: Uuid) -> bool {
        self.tables.write().await.profiles.remove(&id).is_some()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn profile(&self, id: Uuid) -> Result<Option<Profile>, StoreError> {
        Ok(self.tables.read().await.profiles.get(&id).cloned())
    }

    async fn upsert_profile(&self, profile: &NewProfile) -> Result<Profile, StoreError> {
        let now = Utc::now();
        let mut tables = self.tables.write().await;
        let row = tables
            .profiles
            .entry(profile.id)
            .and_modify(|existing| {
                existing.email.clone_from(&profile.email);
                existing.first_name.clone_from(&profile.first_name);
                existing.last_name.clone_from(&profile.last_name);
                existing.role = profile.role;
                existing.updated_at = now;
            })
            .or_insert_with(|| profile.clone().into_profile(now));
        Ok(row.clone())
    }

    async fn update_profile(
        &self,
        id: Uuid,
        changes: &ProfileChanges,
    ) -> Result<Profile, StoreError> {
        let mut tables = self.tables.write().await;
        let row = tables.profiles.get_mut(&id).ok_or(StoreError::NotFound)?;
        changes.apply(row, Utc::now());
        Ok(row.clone())
    }

    async fn insert_teacher(&self, teacher: &NewTeacher) -> Result<TeacherRow, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.teachers.contains_key(&teacher.id) {
            return Err(StoreError::UniqueViolation);
        }
        let row = teacher.into_row(Utc::now());
        tables.teachers.insert(teacher.id, row.clone());
        Ok(row)
    }

    async fn teacher(&self, id: Uuid) -> Result<Option<TeacherRow>, StoreError> {
        Ok(self.tables.read().await.teachers.get(&id).cloned())
    }

    async fn update_teacher(
        &self,
        id: Uuid,
        changes: &TeacherChanges,
    ) -> Result<TeacherRow, StoreError> {
        let mut tables = self.tables.write().await;
        let row = tables.teachers.get_mut(&id).ok_or(StoreError::NotFound)?;
        changes.apply(row);
        Ok(row.clone())
    }

    async fn active_teachers(&self) -> Result<Vec<TeacherListing>, StoreError> {
        let tables = self.tables.read().await;
        let mut listings: Vec<TeacherListing> = tables
            .profiles
            .values()
            .filter(|profile| profile.role == Role::Teacher)
            .filter_map(|profile| {
                let teacher = tables.teachers.get(&profile.id)?;
                teacher.is_active.then(|| TeacherListing {
                    profile: profile.clone(),
                    teacher: teacher.clone(),
                })
            })
            .collect();
        listings.sort_by(|a, b| {
            (&a.profile.last_name, &a.profile.first_name)
                .cmp(&(&b.profile.last_name, &b.profile.first_name))
        });
        Ok(listings)
    }

    async fn teacher_listing(&self, id: Uuid) -> Result<Option<TeacherListing>, StoreError> {
        let tables = self.tables.read().await;
        let listing = tables.profiles.get(&id).and_then(|profile| {
            tables.teachers.get(&id).map(|teacher| TeacherListing {
                profile: profile.clone(),
                teacher: teacher.clone(),
            })
        });
        Ok(listing)
    }

    async fn students_for_parent(&self, parent_id: Uuid) -> Result<Vec<Student>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .students
            .iter()
            .filter(|student| student.parent_id == parent_id)
            .cloned()
            .collect())
    }

    async fn insert_student(&self, student: &NewStudent) -> Result<Student, StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.profiles.contains_key(&student.parent_id) {
            return Err(StoreError::Backend(
                "insert or update on table \"students\" violates foreign key constraint"
                    .to_string(),
            ));
        }
        let row = student.clone().into_student(Uuid::new_v4(), Utc::now());
        tables.students.push(row.clone());
        Ok(row)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Build a connected identity/store pair. `trigger_delay` enables the
/// simulated profile trigger.
#[must_use]
pub fn pair(
    session_ttl: Duration,
    trigger_delay: Option<Duration>,
) -> (Arc<MemoryIdentity>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let identity = MemoryIdentity::new(session_ttl);
    let identity = match trigger_delay {
        Some(delay) => identity.with_profile_trigger(Arc::clone(&store), delay),
        None => identity,
    };
    (Arc::new(identity), store)
}
