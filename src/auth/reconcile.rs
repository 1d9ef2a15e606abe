//! Sign-up reconciliation.
//!
//! The identity provider creates the account, but the profile row normally
//! comes from a database trigger that may not have run yet (or may have run
//! with incomplete data). After signing in, the workflow writes the profile
//! with a single idempotent upsert so trigger and workflow converge on the
//! sign-up data regardless of which ran first.

use super::{service::AuthSuccess, validate::ValidSignUp, AuthError, AuthEvent, AuthService};
use crate::{
    backend::StoreError,
    model::{NewProfile, NewTeacher, Role, UserMetadata},
};
use tracing::{debug, info, instrument};

impl AuthService {
    /// Steps, each aborting on a hard error:
    ///
    /// 1. create the identity
    /// 2. sign in with the same credentials
    /// 3. wait the settle delay
    /// 4. upsert the profile keyed by identity id
    /// 5. for teachers, insert the default extension row (existing row is fine)
    /// 6. publish `SignedIn`
    ///
    /// An identity created before a later step fails is left in place.
    #[instrument(skip_all, fields(role = %input.role))]
    pub(super) async fn reconcile_sign_up(
        &self,
        input: ValidSignUp,
    ) -> Result<AuthSuccess, AuthError> {
        let metadata = UserMetadata::new(&input.first_name, &input.last_name, input.role);
        let created = self
            .identity
            .sign_up(&input.email, &input.password, &metadata)
            .await?;
        debug!(user_id = %created.id, "identity created");

        let session = self.identity.sign_in(&input.email, &input.password).await?;
        if session.identity.id != created.id {
            return Err(AuthError::Backend(
                "sign-in returned a different account".to_string(),
            ));
        }

        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }

        let profile = self
            .store
            .upsert_profile(&NewProfile {
                id: created.id,
                email: input.email,
                first_name: input.first_name,
                last_name: input.last_name,
                role: input.role,
            })
            .await?;

        if input.role == Role::Teacher {
            match self
                .store
                .insert_teacher(&NewTeacher::with_defaults(created.id))
                .await
            {
                Ok(_) => debug!(user_id = %created.id, "teacher row created"),
                Err(StoreError::UniqueViolation) => {
                    debug!(user_id = %created.id, "teacher row already present");
                }
                Err(err) => return Err(err.into()),
            }
        }

        info!(user_id = %created.id, role = %profile.role, "account created");
        self.publish(AuthEvent::SignedIn(session.clone()));
        Ok(AuthSuccess {
            identity: session.identity.clone(),
            profile,
            session,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::SignUpRequest,
        backend::{
            memory::{self, MemoryStore},
            IdentityError, IdentityProvider, Store,
        },
        model::{
            Identity, NewStudent, Profile, ProfileChanges, Session, Student, TeacherChanges,
            TeacherListing, TeacherRow,
        },
    };
    use async_trait::async_trait;
    use secrecy::SecretString;
    use std::{sync::Arc, time::Duration};
    use uuid::Uuid;

    fn request(email: &str, role: Role) -> SignUpRequest {
        SignUpRequest {
            email: email.to_string(),
            password: SecretString::from("correct horse".to_string()),
            password_confirmation: Some(SecretString::from("correct horse".to_string())),
            first_name: "Sarah".to_string(),
            last_name: "Johnson".to_string(),
            role,
        }
    }

    /// Store wrapper whose teacher insert can be forced to fail.
    struct FlakyTeachers {
        inner: MemoryStore,
        fail_teacher_insert: bool,
    }

    #[async_trait]
    impl Store for FlakyTeachers {
        async fn profile(&self, id: Uuid) -> Result<Option<Profile>, StoreError> {
            self.inner.profile(id).await
        }
        async fn upsert_profile(&self, profile: &NewProfile) -> Result<Profile, StoreError> {
            self.inner.upsert_profile(profile).await
        }
        async fn update_profile(
            &self,
            id: Uuid,
            changes: &ProfileChanges,
        ) -> Result<Profile, StoreError> {
            self.inner.update_profile(id, changes).await
        }
        async fn insert_teacher(&self, teacher: &NewTeacher) -> Result<TeacherRow, StoreError> {
            if self.fail_teacher_insert {
                return Err(StoreError::Backend("connection reset".to_string()));
            }
            self.inner.insert_teacher(teacher).await
        }
        async fn teacher(&self, id: Uuid) -> Result<Option<TeacherRow>, StoreError> {
            self.inner.teacher(id).await
        }
        async fn update_teacher(
            &self,
            id: Uuid,
            changes: &TeacherChanges,
        ) -> Result<TeacherRow, StoreError> {
            self.inner.update_teacher(id, changes).await
        }
        async fn active_teachers(&self) -> Result<Vec<TeacherListing>, StoreError> {
            self.inner.active_teachers().await
        }
        async fn teacher_listing(&self, id: Uuid) -> Result<Option<TeacherListing>, StoreError> {
            self.inner.teacher_listing(id).await
        }
        async fn students_for_parent(&self, parent_id: Uuid) -> Result<Vec<Student>, StoreError> {
            self.inner.students_for_parent(parent_id).await
        }
        async fn insert_student(&self, student: &NewStudent) -> Result<Student, StoreError> {
            self.inner.insert_student(student).await
        }
        async fn ping(&self) -> Result<(), StoreError> {
            self.inner.ping().await
        }
    }

    /// Identity provider that also creates the teacher row on sign-up, the
    /// way a database trigger would.
    struct TeacherRowTrigger {
        inner: memory::MemoryIdentity,
        store: Arc<MemoryStore>,
    }

    #[async_trait]
    impl IdentityProvider for TeacherRowTrigger {
        async fn sign_up(
            &self,
            email: &str,
            password: &SecretString,
            metadata: &UserMetadata,
        ) -> Result<Identity, IdentityError> {
            let identity = self.inner.sign_up(email, password, metadata).await?;
            self.store
                .insert_teacher(&NewTeacher::with_defaults(identity.id))
                .await
                .map_err(|err| IdentityError::Transport(err.to_string()))?;
            Ok(identity)
        }
        async fn sign_in(
            &self,
            email: &str,
            password: &SecretString,
        ) -> Result<Session, IdentityError> {
            self.inner.sign_in(email, password).await
        }
        async fn sign_out(&self, access_token: &SecretString) -> Result<(), IdentityError> {
            self.inner.sign_out(access_token).await
        }
        async fn get_session(&self, access_token: &SecretString) -> Result<Session, IdentityError> {
            self.inner.get_session(access_token).await
        }
    }

    /// Identity provider that accepts sign-up but refuses every sign-in.
    struct NoSignIn(memory::MemoryIdentity);

    #[async_trait]
    impl IdentityProvider for NoSignIn {
        async fn sign_up(
            &self,
            email: &str,
            password: &SecretString,
            metadata: &UserMetadata,
        ) -> Result<Identity, IdentityError> {
            self.0.sign_up(email, password, metadata).await
        }
        async fn sign_in(
            &self,
            _email: &str,
            _password: &SecretString,
        ) -> Result<Session, IdentityError> {
            Err(IdentityError::Rejected {
                status: 400,
                message: "Email not confirmed".to_string(),
            })
        }
        async fn sign_out(&self, access_token: &SecretString) -> Result<(), IdentityError> {
            self.0.sign_out(access_token).await
        }
        async fn get_session(&self, access_token: &SecretString) -> Result<Session, IdentityError> {
            self.0.get_session(access_token).await
        }
    }

    #[tokio::test]
    async fn parent_sign_up_creates_matching_profile() -> Result<(), AuthError> {
        let (identity, store) = memory::pair(Duration::from_secs(60), None);
        let auth = AuthService::new(identity, store.clone()).with_settle_delay(Duration::ZERO);

        let success = auth.sign_up(&request("Parent@X.com", Role::Parent)).await?;
        assert_eq!(success.profile.id, success.identity.id);
        assert_eq!(success.profile.role, Role::Parent);
        assert_eq!(success.profile.email, "parent@x.com");
        assert_eq!(success.session.identity.id, success.identity.id);
        assert!(store.teacher(success.identity.id).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn teacher_sign_up_creates_default_extension_row() -> Result<(), AuthError> {
        let (identity, store) = memory::pair(Duration::from_secs(60), None);
        let auth = AuthService::new(identity, store.clone()).with_settle_delay(Duration::ZERO);

        let success = auth.sign_up(&request("t@x.com", Role::Teacher)).await?;
        let row = store
            .teacher(success.identity.id)
            .await?
            .ok_or(AuthError::NotFound)?;
        assert!(row.is_active);
        assert!(!row.verified);
        Ok(())
    }

    #[tokio::test]
    async fn upsert_wins_over_a_trigger_that_ran_first() -> Result<(), AuthError> {
        // The trigger fires immediately and writes the metadata-derived row;
        // the settle delay lets it land before the upsert.
        let (identity, store) = memory::pair(Duration::from_secs(60), Some(Duration::ZERO));
        let auth = AuthService::new(identity, store.clone())
            .with_settle_delay(Duration::from_millis(20));

        let success = auth.sign_up(&request("t@x.com", Role::Teacher)).await?;
        let stored = store
            .profile(success.identity.id)
            .await?
            .ok_or(AuthError::NotFound)?;
        assert_eq!(stored.role, Role::Teacher);
        assert_eq!(stored.first_name, "Sarah");
        Ok(())
    }

    #[tokio::test]
    async fn late_trigger_does_not_clobber_upsert() -> Result<(), AuthError> {
        let (identity, store) =
            memory::pair(Duration::from_secs(60), Some(Duration::from_millis(30)));
        let auth = AuthService::new(identity, store.clone()).with_settle_delay(Duration::ZERO);

        let success = auth.sign_up(&request("p@x.com", Role::Parent)).await?;
        tokio::time::sleep(Duration::from_millis(60)).await;
        let stored = store
            .profile(success.identity.id)
            .await?
            .ok_or(AuthError::NotFound)?;
        assert_eq!(stored, success.profile);
        Ok(())
    }

    #[tokio::test]
    async fn existing_teacher_row_is_not_an_error() -> Result<(), AuthError> {
        let store = Arc::new(MemoryStore::new());
        let identity = Arc::new(TeacherRowTrigger {
            inner: memory::MemoryIdentity::new(Duration::from_secs(60)),
            store: store.clone(),
        });
        let auth = AuthService::new(identity, store.clone()).with_settle_delay(Duration::ZERO);

        let success = auth.sign_up(&request("t@x.com", Role::Teacher)).await?;
        assert!(store.teacher(success.identity.id).await?.is_some());
        assert_eq!(success.profile.role, Role::Teacher);
        Ok(())
    }

    #[tokio::test]
    async fn teacher_row_failure_aborts_after_profile() -> Result<(), AuthError> {
        let identity = Arc::new(memory::MemoryIdentity::new(Duration::from_secs(60)));
        let store = Arc::new(FlakyTeachers {
            inner: MemoryStore::new(),
            fail_teacher_insert: true,
        });
        let auth =
            AuthService::new(identity.clone(), store.clone()).with_settle_delay(Duration::ZERO);
        let mut events = auth.on_auth_state_change();

        let err = auth.sign_up(&request("t@x.com", Role::Teacher)).await.err();
        assert_eq!(err, Some(AuthError::Backend("connection reset".to_string())));
        assert!(events.try_recv().is_err());

        // Earlier steps are not rolled back.
        let password = SecretString::from("correct horse".to_string());
        let session = identity.sign_in("t@x.com", &password).await?;
        let profile = store.profile(session.identity.id).await?;
        assert_eq!(profile.map(|p| p.role), Some(Role::Teacher));
        assert!(store.teacher(session.identity.id).await?.is_none());

        Ok(())
    }

    #[tokio::test]
    async fn sign_in_failure_leaves_identity_without_profile() -> Result<(), AuthError> {
        let store = Arc::new(MemoryStore::new());
        let identity = Arc::new(NoSignIn(memory::MemoryIdentity::new(Duration::from_secs(
            60,
        ))));
        let auth = AuthService::new(identity, store).with_settle_delay(Duration::ZERO);

        let err = auth.sign_up(&request("p@x.com", Role::Parent)).await.err();
        assert_eq!(
            err,
            Some(AuthError::Validation("Email not confirmed".to_string()))
        );

        // The identity exists, so a retry reports the duplicate.
        let retry = auth.sign_up(&request("p@x.com", Role::Parent)).await.err();
        assert_eq!(retry, Some(AuthError::Conflict));
        Ok(())
    }

    #[tokio::test]
    async fn signed_in_is_published_after_rows_exist() -> Result<(), AuthError> {
        let (identity, store) = memory::pair(Duration::from_secs(60), None);
        let auth = AuthService::new(identity, store.clone()).with_settle_delay(Duration::ZERO);
        let mut events = auth.on_auth_state_change();

        let success = auth.sign_up(&request("t@x.com", Role::Teacher)).await?;
        match events.recv().await {
            Ok(AuthEvent::SignedIn(session)) => {
                assert_eq!(session.identity.id, success.identity.id);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(store.profile(success.identity.id).await?.is_some());
        assert!(store.teacher(success.identity.id).await?.is_some());
        Ok(())
    }
}
