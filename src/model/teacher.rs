use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::profile::Profile;

/// Teacher extension row, one-to-one with a teacher profile.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TeacherRow {
    pub id: Uuid,
    pub instruments_taught: Vec<String>,
    pub age_groups_taught: Vec<String>,
    pub years_experience: i32,
    pub hourly_rate: Option<f64>,
    pub online_lessons: bool,
    pub in_person_lessons: bool,
    pub teaching_method: Option<String>,
    pub introduction: Option<String>,
    pub is_active: bool,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for the extension row created at sign-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewTeacher {
    pub id: Uuid,
    pub is_active: bool,
    pub verified: bool,
}

impl NewTeacher {
    /// Defaults for a freshly registered teacher: listed, not yet verified.
    #[must_use]
    pub const fn with_defaults(id: Uuid) -> Self {
        Self {
            id,
            is_active: true,
            verified: false,
        }
    }

    #[must_use]
    pub fn into_row(self, now: DateTime<Utc>) -> TeacherRow {
        TeacherRow {
            id: self.id,
            instruments_taught: Vec::new(),
            age_groups_taught: Vec::new(),
            years_experience: 0,
            hourly_rate: None,
            online_lessons: true,
            in_person_lessons: false,
            teaching_method: None,
            introduction: None,
            is_active: self.is_active,
            verified: self.verified,
            created_at: now,
        }
    }
}

/// Partial teacher update; `None` leaves a column untouched.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct TeacherChanges {
    pub instruments_taught: Option<Vec<String>>,
    pub age_groups_taught: Option<Vec<String>>,
    pub years_experience: Option<i32>,
    pub hourly_rate: Option<f64>,
    pub online_lessons: Option<bool>,
    pub in_person_lessons: Option<bool>,
    pub teaching_method: Option<String>,
    pub introduction: Option<String>,
    pub is_active: Option<bool>,
    pub verified: Option<bool>,
}

impl TeacherChanges {
    pub fn apply(&self, row: &mut TeacherRow) {
        if let Some(instruments) = &self.instruments_taught {
            row.instruments_taught.clone_from(instruments);
        }
        if let Some(groups) = &self.age_groups_taught {
            row.age_groups_taught.clone_from(groups);
        }
        if let Some(years) = self.years_experience {
            row.years_experience = years;
        }
        if let Some(rate) = self.hourly_rate {
            row.hourly_rate = Some(rate);
        }
        if let Some(online) = self.online_lessons {
            row.online_lessons = online;
        }
        if let Some(in_person) = self.in_person_lessons {
            row.in_person_lessons = in_person;
        }
        if let Some(method) = &self.teaching_method {
            row.teaching_method = Some(method.clone());
        }
        if let Some(introduction) = &self.introduction {
            row.introduction = Some(introduction.clone());
        }
        if let Some(active) = self.is_active {
            row.is_active = active;
        }
        if let Some(verified) = self.verified {
            row.verified = verified;
        }
    }
}

/// A teacher profile joined with its extension row.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TeacherListing {
    pub profile: Profile,
    pub teacher: TeacherRow,
}

impl TeacherListing {
    /// Hourly rate used for price filtering; unknown rates count as zero.
    #[must_use]
    pub fn rate_or_zero(&self) -> f64 {
        self.teacher.hourly_rate.unwrap_or(0.0)
    }
}
