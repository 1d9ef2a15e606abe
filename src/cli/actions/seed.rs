//! Sample teacher accounts for local development and demos.
//!
//! Each teacher goes through the regular sign-up workflow, so the profile
//! and extension rows are created exactly as for a real registration.
//! Running the seed twice signs the existing accounts in and refreshes
//! their listings.

use crate::{
    auth::{AuthError, AuthService, AuthSuccess, SignInRequest, SignUpRequest},
    backend::StoreError,
    cli::{
        actions::connect,
        commands::{auth, backend},
    },
    model::{NewTeacher, ProfileChanges, Role, TeacherChanges},
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug)]
pub struct Args {
    pub backend: backend::Options,
    pub auth: auth::Options,
}

#[derive(Debug, Clone, Copy)]
pub struct SampleTeacher {
    pub email: &'static str,
    pub password: &'static str,
    pub first_name: &'static str,
    pub last_name: &'static str,
    pub city: &'static str,
    pub state: &'static str,
    pub bio: &'static str,
    pub instruments: &'static [&'static str],
    pub age_groups: &'static [&'static str],
    pub teaching_method: &'static str,
    pub hourly_rate: f64,
    pub years_experience: i32,
    pub online_lessons: bool,
    pub in_person_lessons: bool,
}

pub const SAMPLE_TEACHERS: &[SampleTeacher] = &[
    SampleTeacher {
        email: "sarah.johnson@music.com",
        password: "Teacher123!",
        first_name: "Sarah",
        last_name: "Johnson",
        city: "Austin",
        state: "TX",
        bio: "Classically trained pianist with over 10 years of teaching experience. I help beginners build a strong foundation while keeping lessons fun.",
        instruments: &["Piano", "Keyboard"],
        age_groups: &["Children", "Teens", "Adults"],
        teaching_method: "Classical technique, music theory and sight reading",
        hourly_rate: 75.0,
        years_experience: 10,
        online_lessons: true,
        in_person_lessons: true,
    },
    SampleTeacher {
        email: "mike.williams@music.com",
        password: "Teacher123!",
        first_name: "Michael",
        last_name: "Williams",
        city: "Nashville",
        state: "TN",
        bio: "Professional guitarist and session musician teaching rock, blues and jazz guitar to students of all levels.",
        instruments: &["Guitar", "Bass", "Ukulele"],
        age_groups: &["Teens", "Adults"],
        teaching_method: "Practical skills, improvisation and playing along with real songs",
        hourly_rate: 45.0,
        years_experience: 8,
        online_lessons: true,
        in_person_lessons: false,
    },
    SampleTeacher {
        email: "emma.davis@music.com",
        password: "Teacher123!",
        first_name: "Emma",
        last_name: "Davis",
        city: "Chicago",
        state: "IL",
        bio: "Violin instructor with a passion for classical and contemporary music. I focus on proper technique while exploring each student's interests.",
        instruments: &["Violin", "Viola"],
        age_groups: &["Children", "Teens"],
        teaching_method: "Suzuki-inspired foundations with orchestra preparation",
        hourly_rate: 110.0,
        years_experience: 12,
        online_lessons: false,
        in_person_lessons: true,
    },
];

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(ToString::to_string).collect()
}

async fn register(auth: &AuthService, sample: &SampleTeacher) -> Result<AuthSuccess, AuthError> {
    let password = SecretString::from(sample.password.to_string());
    let request = SignUpRequest {
        email: sample.email.to_string(),
        password: password.clone(),
        password_confirmation: None,
        first_name: sample.first_name.to_string(),
        last_name: sample.last_name.to_string(),
        role: Role::Teacher,
    };

    match auth.sign_up(&request).await {
        Err(AuthError::Conflict) => {
            info!(email = sample.email, "already registered, signing in");
            auth.sign_in(&SignInRequest {
                email: sample.email.to_string(),
                password,
            })
            .await
        }
        other => other,
    }
}

/// Register one sample teacher (or sign in if it exists) and fill in its
/// listing. Returns the teacher's user id.
///
/// # Errors
/// Returns an error if sign-up, sign-in or any row update fails.
pub async fn seed_teacher(auth: &AuthService, sample: &SampleTeacher) -> Result<Uuid> {
    let success = register(auth, sample)
        .await
        .with_context(|| format!("failed to register {}", sample.email))?;
    let user_id = success.identity.id;

    let profile_changes = ProfileChanges {
        city: Some(sample.city.to_string()),
        state: Some(sample.state.to_string()),
        bio: Some(sample.bio.to_string()),
        ..ProfileChanges::default()
    };
    auth.update_profile(success.session.access_token(), &profile_changes)
        .await
        .with_context(|| format!("failed to update profile for {}", sample.email))?;

    let teacher_changes = TeacherChanges {
        instruments_taught: Some(to_strings(sample.instruments)),
        age_groups_taught: Some(to_strings(sample.age_groups)),
        years_experience: Some(sample.years_experience),
        hourly_rate: Some(sample.hourly_rate),
        online_lessons: Some(sample.online_lessons),
        in_person_lessons: Some(sample.in_person_lessons),
        teaching_method: Some(sample.teaching_method.to_string()),
        introduction: Some(sample.bio.to_string()),
        is_active: Some(true),
        verified: Some(true),
    };

    let store = auth.store();
    match store.update_teacher(user_id, &teacher_changes).await {
        Ok(_) => {}
        Err(StoreError::NotFound) => {
            warn!(%user_id, "teacher row missing, creating it");
            store
                .insert_teacher(&NewTeacher::with_defaults(user_id))
                .await
                .context("failed to create teacher row")?;
            store
                .update_teacher(user_id, &teacher_changes)
                .await
                .context("failed to update teacher row")?;
        }
        Err(err) => return Err(err).context("failed to update teacher row"),
    }

    if let Err(err) = auth.sign_out(success.session.access_token()).await {
        warn!(%user_id, "sign-out after seeding failed: {err}");
    }

    Ok(user_id)
}

/// Execute the seed action.
/// # Errors
/// Returns an error if the backend is unreachable; individual teachers that
/// fail are logged and skipped.
pub async fn execute(args: Args) -> Result<()> {
    let (identity, store) = connect(&args.backend, args.auth.session_ttl()).await?;
    let auth = Arc::new(AuthService::new(identity, store).with_settle_delay(args.auth.settle_delay));

    let mut seeded = 0_usize;
    for sample in SAMPLE_TEACHERS {
        match seed_teacher(&auth, sample).await {
            Ok(user_id) => {
                info!(%user_id, email = sample.email, "teacher seeded");
                seeded += 1;
            }
            Err(err) => warn!(email = sample.email, "could not seed teacher: {err:#}"),
        }
    }

    let listed = auth
        .store()
        .active_teachers()
        .await
        .context("failed to list active teachers")?;
    info!(seeded, listed = listed.len(), "seeding finished");
    for listing in &listed {
        println!(
            "{} <{}> {} ${}/h",
            listing.profile.full_name(),
            listing.profile.email,
            listing.teacher.instruments_taught.join(", "),
            listing.teacher.hourly_rate.unwrap_or_default()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory;
    use std::time::Duration;

    fn service() -> AuthService {
        let (identity, store) = memory::pair(Duration::from_secs(3600), None);
        AuthService::new(identity, store).with_settle_delay(Duration::ZERO)
    }

    #[tokio::test]
    async fn seeds_active_verified_listing() {
        let auth = service();
        let sample = &SAMPLE_TEACHERS[0];

        let user_id = seed_teacher(&auth, sample).await.expect("seeded");

        let listing = auth
            .store()
            .teacher_listing(user_id)
            .await
            .expect("listing query")
            .expect("listing");
        assert_eq!(listing.profile.role, Role::Teacher);
        assert_eq!(listing.profile.city.as_deref(), Some("Austin"));
        assert!(listing.teacher.is_active);
        assert!(listing.teacher.verified);
        assert_eq!(listing.teacher.hourly_rate, Some(75.0));
        assert_eq!(listing.teacher.instruments_taught, vec!["Piano", "Keyboard"]);
    }

    #[tokio::test]
    async fn seeding_twice_reuses_the_account() {
        let auth = service();
        let sample = &SAMPLE_TEACHERS[1];

        let first = seed_teacher(&auth, sample).await.expect("first run");
        let second = seed_teacher(&auth, sample).await.expect("second run");

        assert_eq!(first, second);
        let teachers = auth.store().active_teachers().await.expect("teachers");
        assert_eq!(teachers.len(), 1);
    }

    #[tokio::test]
    async fn all_samples_are_listed() {
        let auth = service();
        for sample in SAMPLE_TEACHERS {
            seed_teacher(&auth, sample).await.expect("seeded");
        }
        let teachers = auth.store().active_teachers().await.expect("teachers");
        assert_eq!(teachers.len(), SAMPLE_TEACHERS.len());
    }
}
