//! Boundaries to the managed auth/database service.
//!
//! [`IdentityProvider`] covers the identity API (sign-up, sign-in, sign-out,
//! session lookup) and [`Store`] covers row access to the relational tables.
//! Production wiring uses [`GoTrueProvider`] and [`PgStore`]; the in-memory
//! pair from [`memory`] backs local development and tests, including a
//! simulated profile trigger.

mod gotrue;
pub mod memory;
mod postgres;

pub use gotrue::GoTrueProvider;
pub use postgres::PgStore;

use crate::model::{
    Identity, NewProfile, NewStudent, NewTeacher, Profile, ProfileChanges, Session, Student,
    TeacherChanges, TeacherListing, TeacherRow, UserMetadata,
};
use async_trait::async_trait;
use secrecy::SecretString;
use thiserror::Error;
use uuid::Uuid;

/// Failures reported by the identity API.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Invalid login credentials")]
    InvalidCredentials,
    #[error("User already registered")]
    AlreadyRegistered,
    #[error("Session is missing or expired")]
    InvalidSession,
    #[error("{message}")]
    Rejected { status: u16, message: String },
    #[error("Identity service unavailable: {0}")]
    Transport(String),
}

/// Failures reported by the relational store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("row not found")]
    NotFound,
    #[error("duplicate key value violates unique constraint")]
    UniqueViolation,
    #[error("database error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create an identity. Does not guarantee an authenticated session.
    async fn sign_up(
        &self,
        email: &str,
        password: &SecretString,
        metadata: &UserMetadata,
    ) -> Result<Identity, IdentityError>;

    async fn sign_in(&self, email: &str, password: &SecretString)
        -> Result<Session, IdentityError>;

    async fn sign_out(&self, access_token: &SecretString) -> Result<(), IdentityError>;

    /// Resolve an access token to the session it belongs to, including the
    /// expiry the provider assigned to it.
    async fn get_session(&self, access_token: &SecretString) -> Result<Session, IdentityError>;
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn profile(&self, id: Uuid) -> Result<Option<Profile>, StoreError>;

    /// Insert-or-update keyed by `profile.id`; returns the stored row.
    async fn upsert_profile(&self, profile: &NewProfile) -> Result<Profile, StoreError>;

    async fn update_profile(&self, id: Uuid, changes: &ProfileChanges)
        -> Result<Profile, StoreError>;

    /// Plain insert; an existing row yields [`StoreError::UniqueViolation`].
    async fn insert_teacher(&self, teacher: &NewTeacher) -> Result<TeacherRow, StoreError>;

    async fn teacher(&self, id: Uuid) -> Result<Option<TeacherRow>, StoreError>;

    async fn update_teacher(
        &self,
        id: Uuid,
        changes: &TeacherChanges,
    ) -> Result<TeacherRow, StoreError>;

    /// Teacher profiles joined with an active extension row.
    async fn active_teachers(&self) -> Result<Vec<TeacherListing>, StoreError>;

    async fn teacher_listing(&self, id: Uuid) -> Result<Option<TeacherListing>, StoreError>;

    async fn students_for_parent(&self, parent_id: Uuid) -> Result<Vec<Student>, StoreError>;

    async fn insert_student(&self, student: &NewStudent) -> Result<Student, StoreError>;

    /// Liveness check used by `/health`.
    async fn ping(&self) -> Result<(), StoreError>;
}
