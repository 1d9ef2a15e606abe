//! Teacher directory: active listings and the search filters applied to them.

use crate::{
    backend::{Store, StoreError},
    model::TeacherListing,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PriceBand {
    #[default]
    #[serde(rename = "all")]
    All,
    #[serde(rename = "0-50")]
    UpTo50,
    #[serde(rename = "50-100")]
    From50To100,
    #[serde(rename = "100+")]
    Over100,
}

impl PriceBand {
    #[must_use]
    pub fn contains(self, rate: f64) -> bool {
        match self {
            Self::All => true,
            Self::UpTo50 => rate <= 50.0,
            Self::From50To100 => rate > 50.0 && rate <= 100.0,
            Self::Over100 => rate > 100.0,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LessonType {
    #[default]
    All,
    Online,
    InPerson,
}

/// Directory filters; every field is optional in the query string.
#[derive(IntoParams, ToSchema, Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[into_params(parameter_in = Query)]
#[serde(default)]
pub struct TeacherQuery {
    /// Case-insensitive match on name, any instrument, or city.
    pub search: Option<String>,
    /// Exact instrument name; `all` or empty means any.
    pub instrument: Option<String>,
    pub price: PriceBand,
    pub lesson_type: LessonType,
}

impl TeacherQuery {
    fn search_term(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .map(str::to_lowercase)
    }

    fn instrument(&self) -> Option<&str> {
        self.instrument
            .as_deref()
            .filter(|instrument| !instrument.is_empty() && *instrument != "all")
    }

    #[must_use]
    pub fn matches(&self, listing: &TeacherListing) -> bool {
        if let Some(term) = self.search_term() {
            let profile = &listing.profile;
            let name = format!("{} {}", profile.first_name, profile.last_name).to_lowercase();
            let hit = name.contains(&term)
                || listing
                    .teacher
                    .instruments_taught
                    .iter()
                    .any(|instrument| instrument.to_lowercase().contains(&term))
                || profile
                    .city
                    .as_deref()
                    .is_some_and(|city| city.to_lowercase().contains(&term));
            if !hit {
                return false;
            }
        }

        if let Some(instrument) = self.instrument() {
            if !listing
                .teacher
                .instruments_taught
                .iter()
                .any(|taught| taught == instrument)
            {
                return false;
            }
        }

        if !self.price.contains(listing.rate_or_zero()) {
            return false;
        }

        match self.lesson_type {
            LessonType::All => true,
            LessonType::Online => listing.teacher.online_lessons,
            LessonType::InPerson => listing.teacher.in_person_lessons,
        }
    }

    #[must_use]
    pub fn apply(&self, listings: Vec<TeacherListing>) -> Vec<TeacherListing> {
        listings
            .into_iter()
            .filter(|listing| self.matches(listing))
            .collect()
    }
}

/// Teachers with an active extension row.
///
/// # Errors
/// Returns the store error unchanged.
pub async fn list_active_teachers(store: &dyn Store) -> Result<Vec<TeacherListing>, StoreError> {
    store.active_teachers().await
}

/// Distinct instruments across `listings`, in first-seen order.
#[must_use]
pub fn instruments(listings: &[TeacherListing]) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for instrument in listings
        .iter()
        .flat_map(|listing| listing.teacher.instruments_taught.iter())
    {
        if !seen.contains(instrument) {
            seen.push(instrument.clone());
        }
    }
    seen
}

/// # Errors
/// Returns [`StoreError::NotFound`] when no teacher has this id.
pub async fn teacher_detail(store: &dyn Store, id: Uuid) -> Result<TeacherListing, StoreError> {
    store.teacher_listing(id).await?.ok_or(StoreError::NotFound)
}
