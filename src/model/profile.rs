use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use utoipa::ToSchema;
use uuid::Uuid;

/// Account role; decides dashboard routing and which extension rows exist.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Parent,
    Teacher,
    Student,
    Admin,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Parent => "parent",
            Self::Teacher => "teacher",
            Self::Student => "student",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "parent" => Ok(Self::Parent),
            "teacher" => Ok(Self::Teacher),
            "student" => Ok(Self::Student),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Application-level user record keyed by the identity id.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub phone: Option<String>,
    pub street_address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub profile_picture_url: Option<String>,
    pub bio: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Columns written when a profile is created or reconciled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProfile {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
}

impl NewProfile {
    /// Materialise the row a store would hold right after creation.
    #[must_use]
    pub fn into_profile(self, now: DateTime<Utc>) -> Profile {
        Profile {
            id: self.id,
            email: self.email,
            first_name: self.first_name,
            last_name: self.last_name,
            role: self.role,
            phone: None,
            street_address: None,
            city: None,
            state: None,
            zip_code: None,
            profile_picture_url: None,
            bio: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial profile update; `None` leaves a column untouched.
///
/// Email and role are owned by the identity record and cannot be changed here.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub street_address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub profile_picture_url: Option<String>,
    pub bio: Option<String>,
}

impl ProfileChanges {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Apply the set fields in place and bump `updated_at`.
    pub fn apply(&self, profile: &mut Profile, now: DateTime<Utc>) {
        fn set(target: &mut String, value: Option<&String>) {
            if let Some(value) = value {
                target.clone_from(value);
            }
        }
        fn set_opt(target: &mut Option<String>, value: Option<&String>) {
            if let Some(value) = value {
                *target = Some(value.clone());
            }
        }

        set(&mut profile.first_name, self.first_name.as_ref());
        set(&mut profile.last_name, self.last_name.as_ref());
        set_opt(&mut profile.phone, self.phone.as_ref());
        set_opt(&mut profile.street_address, self.street_address.as_ref());
        set_opt(&mut profile.city, self.city.as_ref());
        set_opt(&mut profile.state, self.state.as_ref());
        set_opt(&mut profile.zip_code, self.zip_code.as_ref());
        set_opt(
            &mut profile.profile_picture_url,
            self.profile_picture_url.as_ref(),
        );
        set_opt(&mut profile.bio, self.bio.as_ref());
        profile.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(seconds, 0).expect("valid timestamp")
    }

    fn profile() -> Profile {
        NewProfile {
            id: Uuid::new_v4(),
            email: "a@x.com".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            role: Role::Parent,
        }
        .into_profile(at(100))
    }

    #[test]
    fn role_round_trips_through_str() {
        for role in [Role::Parent, Role::Teacher, Role::Student, Role::Admin] {
            assert_eq!(role.as_str().parse::<Role>(), Ok(role));
        }
        assert_eq!(" Teacher ".parse::<Role>(), Ok(Role::Teacher));
        assert!("owner".parse::<Role>().is_err());
    }

    #[test]
    fn role_serializes_lowercase() -> Result<(), serde_json::Error> {
        assert_eq!(serde_json::to_string(&Role::Teacher)?, "\"teacher\"");
        Ok(())
    }

    #[test]
    fn full_name_joins_and_trims() {
        let mut profile = profile();
        assert_eq!(profile.full_name(), "Ada Lovelace");
        profile.last_name.clear();
        assert_eq!(profile.full_name(), "Ada");
    }

    #[test]
    fn changes_apply_only_set_fields() {
        let mut profile = profile();
        let changes = ProfileChanges {
            city: Some("Austin".to_string()),
            first_name: Some("Augusta".to_string()),
            ..ProfileChanges::default()
        };
        changes.apply(&mut profile, at(200));

        assert_eq!(profile.first_name, "Augusta");
        assert_eq!(profile.last_name, "Lovelace");
        assert_eq!(profile.city.as_deref(), Some("Austin"));
        assert_eq!(profile.bio, None);
        assert_eq!(profile.created_at, at(100));
        assert_eq!(profile.updated_at, at(200));
    }

    #[test]
    fn empty_changes_are_detected() {
        assert!(ProfileChanges::default().is_empty());
        let changes = ProfileChanges {
            bio: Some(String::new()),
            ..ProfileChanges::default()
        };
        assert!(!changes.is_empty());
    }
}
