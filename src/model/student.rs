use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlayingLevel {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
    Professional,
}

impl PlayingLevel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
            Self::Professional => "professional",
        }
    }

    /// Parse a stored column value, falling back to `beginner`.
    #[must_use]
    pub fn from_column(value: &str) -> Self {
        match value {
            "intermediate" => Self::Intermediate,
            "advanced" => Self::Advanced,
            "professional" => Self::Professional,
            _ => Self::Beginner,
        }
    }
}

/// A learner managed by a parent account.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Student {
    pub id: Uuid,
    pub parent_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub date_of_birth: NaiveDate,
    pub instruments_of_interest: Vec<String>,
    pub playing_level: PlayingLevel,
    pub learning_goals: Option<String>,
    pub time_zone: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStudent {
    pub parent_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub date_of_birth: NaiveDate,
    pub instruments_of_interest: Vec<String>,
    pub playing_level: PlayingLevel,
    pub learning_goals: Option<String>,
    pub time_zone: String,
}

impl NewStudent {
    #[must_use]
    pub fn into_student(self, id: Uuid, now: DateTime<Utc>) -> Student {
        Student {
            id,
            parent_id: self.parent_id,
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            date_of_birth: self.date_of_birth,
            instruments_of_interest: self.instruments_of_interest,
            playing_level: self.playing_level,
            learning_goals: self.learning_goals,
            time_zone: self.time_zone,
            created_at: now,
            updated_at: now,
        }
    }
}
