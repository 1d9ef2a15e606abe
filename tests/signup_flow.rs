//! End-to-end account flows against the in-memory backend.

use lessonhub::{
    auth::{AuthError, AuthService, SignInRequest, SignUpRequest},
    backend::{memory, IdentityProvider, Store},
    model::{ProfileChanges, Role},
    session::SessionRegistry,
};
use secrecy::SecretString;
use std::{sync::Arc, time::Duration};

fn secret(value: &str) -> SecretString {
    SecretString::from(value.to_string())
}

fn sign_up_request(email: &str, role: Role) -> SignUpRequest {
    SignUpRequest {
        email: email.to_string(),
        password: secret("Password123!"),
        password_confirmation: Some(secret("Password123!")),
        first_name: "Jane".to_string(),
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

/// Service over a memory backend whose profile trigger fires after
/// `trigger_delay`.
fn service(trigger_delay: Option<Duration>) -> (Arc<AuthService>, Arc<memory::MemoryStore>) {
    let (identity, store) = memory::pair(Duration::from_secs(3600), trigger_delay);
    let identity: Arc<dyn IdentityProvider> = identity;
    let backing: Arc<dyn Store> = store.clone();
    let auth = AuthService::new(identity, backing).with_settle_delay(Duration::ZERO);
    (Arc::new(auth), store)
}

#[tokio::test]
async fn parent_sign_up_creates_matching_profile() {
    let (auth, store) = service(None);

    let success = auth
        .sign_up(&sign_up_request("Parent@Example.com", Role::Parent))
        .await
        .expect("sign up");

    assert_eq!(success.profile.id, success.identity.id);
    assert_eq!(success.profile.role, Role::Parent);
    assert_eq!(success.profile.email, "parent@example.com");

    let stored = store
        .profile(success.identity.id)
        .await
        .expect("profile query")
        .expect("profile row");
    assert_eq!(stored.first_name, "Jane");
    assert_eq!(stored.last_name, "Doe");
    assert!(store
        .teacher(success.identity.id)
        .await
        .expect("teacher query")
        .is_none());
}

#[tokio::test]
async fn teacher_sign_up_creates_active_unverified_row() {
    let (auth, store) = service(None);

    let success = auth
        .sign_up(&sign_up_request("teacher@example.com", Role::Teacher))
        .await
        .expect("sign up");

    assert_eq!(success.profile.role, Role::Teacher);
    let teacher = store
        .teacher(success.identity.id)
        .await
        .expect("teacher query")
        .expect("teacher row");
    assert!(teacher.is_active);
    assert!(!teacher.verified);

    let listed = store.active_teachers().await.expect("active teachers");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].profile.id, success.identity.id);
}

#[tokio::test]
async fn racing_trigger_still_yields_requested_role() {
    // The trigger inserts its row before the upsert runs; the two writes
    // must settle into one row with the submitted fields.
    let (identity, store) = memory::pair(Duration::from_secs(3600), Some(Duration::ZERO));
    let auth = AuthService::new(identity, store.clone())
        .with_settle_delay(Duration::from_millis(20));

    let success = auth
        .sign_up(&sign_up_request("race@example.com", Role::Teacher))
        .await
        .expect("sign up");

    let stored = store
        .profile(success.identity.id)
        .await
        .expect("profile query")
        .expect("profile row");
    assert_eq!(stored.role, Role::Teacher);
    assert_eq!(stored.first_name, "Jane");
}

#[tokio::test]
async fn sign_in_returns_latest_profile_fields() {
    let (auth, _store) = service(None);
    let success = auth
        .sign_up(&sign_up_request("latest@example.com", Role::Parent))
        .await
        .expect("sign up");

    let changes = ProfileChanges {
        first_name: Some("Janet".to_string()),
        city: Some("Denver".to_string()),
        ..ProfileChanges::default()
    };
    auth.update_profile(success.session.access_token(), &changes)
        .await
        .expect("update profile");

    let signed_in = auth
        .sign_in(&sign_in_request("latest@example.com", "Password123!"))
        .await
        .expect("sign in");
    assert_eq!(signed_in.profile.first_name, "Janet");
    assert_eq!(signed_in.profile.city.as_deref(), Some("Denver"));
    assert_eq!(signed_in.profile.last_name, "Doe");
}

#[tokio::test]
async fn duplicate_email_is_a_conflict() {
    let (auth, _store) = service(None);
    auth.sign_up(&sign_up_request("dup@example.com", Role::Parent))
        .await
        .expect("first sign up");

    let err = auth
        .sign_up(&sign_up_request("DUP@example.com", Role::Teacher))
        .await
        .expect_err("second sign up");
    assert_eq!(err, AuthError::Conflict);
}

#[tokio::test]
async fn concurrent_wrong_passwords_both_fail() {
    let (auth, _store) = service(None);
    auth.sign_up(&sign_up_request("locked@example.com", Role::Parent))
        .await
        .expect("sign up");

    let first = sign_in_request("locked@example.com", "wrong-one");
    let second = sign_in_request("locked@example.com", "wrong-two");
    let (a, b) = tokio::join!(auth.sign_in(&first), auth.sign_in(&second));

    assert_eq!(a.expect_err("first"), AuthError::InvalidCredentials);
    assert_eq!(b.expect_err("second"), AuthError::InvalidCredentials);
}

#[tokio::test]
async fn unknown_email_and_wrong_password_look_the_same() {
    let (auth, _store) = service(None);
    auth.sign_up(&sign_up_request("known@example.com", Role::Parent))
        .await
        .expect("sign up");

    let unknown = auth
        .sign_in(&sign_in_request("nobody@example.com", "Password123!"))
        .await
        .expect_err("unknown email");
    let wrong = auth
        .sign_in(&sign_in_request("known@example.com", "nope"))
        .await
        .expect_err("wrong password");
    assert_eq!(unknown, wrong);
    assert_eq!(unknown.to_string(), "Invalid login credentials");
}

#[tokio::test]
async fn sign_out_clears_the_session_snapshot() {
    let (auth, _store) = service(None);
    let registry = Arc::new(SessionRegistry::new(Arc::clone(&auth)));
    let _listener = registry.spawn_listener();

    let success = auth
        .sign_up(&sign_up_request("bye@example.com", Role::Parent))
        .await
        .expect("sign up");
    let token = success.session.token().to_string();
    let access_token = success.session.access_token().clone();
    registry.establish(success).await;

    let context = registry.resolve(&token).await;
    assert!(context.snapshot().session.is_some());
    let mut watcher = context.subscribe();

    auth.sign_out(&access_token).await.expect("sign out");

    let cleared = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let snapshot = watcher.current();
            if snapshot.is_signed_out() {
                return snapshot;
            }
            if watcher.next().await.is_none() {
                return watcher.current();
            }
        }
    })
    .await
    .expect("snapshot cleared in time");

    assert!(cleared.identity.is_none());
    assert!(cleared.profile.is_none());
    assert!(cleared.session.is_none());
    assert!(!cleared.loading);

    let after = registry.snapshot_for(Some(&token)).await;
    assert!(after.is_signed_out());
}

#[tokio::test]
async fn profile_update_reaches_every_context_of_the_user() {
    let (auth, _store) = service(None);
    let registry = Arc::new(SessionRegistry::new(Arc::clone(&auth)));
    let _listener = registry.spawn_listener();

    let first = auth
        .sign_up(&sign_up_request("multi@example.com", Role::Parent))
        .await
        .expect("sign up");
    let second = auth
        .sign_in(&sign_in_request("multi@example.com", "Password123!"))
        .await
        .expect("sign in");
    let second_token = second.session.token().to_string();
    let access_token = first.session.access_token().clone();
    registry.establish(first).await;
    registry.establish(second).await;

    let other = registry.resolve(&second_token).await;
    let mut watcher = other.subscribe();

    let changes = ProfileChanges {
        bio: Some("Two kids learning piano".to_string()),
        ..ProfileChanges::default()
    };
    auth.update_profile(&access_token, &changes)
        .await
        .expect("update profile");

    let updated = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let snapshot = watcher.current();
            if snapshot
                .profile
                .as_ref()
                .and_then(|profile| profile.bio.as_deref())
                .is_some()
            {
                return snapshot;
            }
            if watcher.next().await.is_none() {
                return watcher.current();
            }
        }
    })
    .await
    .expect("update delivered in time");

    assert_eq!(
        updated.profile.and_then(|profile| profile.bio).as_deref(),
        Some("Two kids learning piano")
    );
}
