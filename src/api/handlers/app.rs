//! Signed-in area: dashboards, students and profile edits. Every handler
//! here runs behind the session guard, which supplies the caller's
//! [`Snapshot`].

use super::{error_response, ErrorResponse};
use crate::{
    api::ApiState,
    auth::AuthError,
    guard::dashboard_path,
    model::{NewStudent, PlayingLevel, Profile, ProfileChanges, Role, Student, TeacherRow},
    session::Snapshot,
};
use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Json, Redirect, Response},
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Greeting {
    pub name: String,
    pub email: String,
    pub role: Option<Role>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct DashboardResponse {
    pub greeting: Greeting,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub students: Option<Vec<Student>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teacher: Option<TeacherRow>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct NewStudentBody {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    /// `YYYY-MM-DD`
    pub date_of_birth: String,
    #[serde(default)]
    pub instruments_of_interest: Vec<String>,
    #[serde(default)]
    pub playing_level: PlayingLevel,
    #[serde(default)]
    pub learning_goals: Option<String>,
    pub time_zone: String,
}

fn greeting(snapshot: &Snapshot) -> Greeting {
    match (&snapshot.profile, &snapshot.identity) {
        (Some(profile), _) => Greeting {
            name: profile.full_name(),
            email: profile.email.clone(),
            role: Some(profile.role),
        },
        (None, Some(identity)) => Greeting {
            name: String::new(),
            email: identity.email.clone(),
            role: None,
        },
        (None, None) => Greeting {
            name: String::new(),
            email: String::new(),
            role: None,
        },
    }
}

fn require_role(snapshot: &Snapshot, role: Role) -> Result<Uuid, AuthError> {
    let user_id = snapshot.user_id().ok_or(AuthError::NotAuthenticated)?;
    if snapshot.role() == Some(role) {
        Ok(user_id)
    } else {
        Err(AuthError::Forbidden)
    }
}

/// A calendar date no later than `today`.
fn date_of_birth(value: &str, today: NaiveDate) -> Result<NaiveDate, AuthError> {
    let date = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| AuthError::validation("Date of birth must be a valid YYYY-MM-DD date"))?;
    if date > today {
        return Err(AuthError::validation("Date of birth cannot be in the future"));
    }
    Ok(date)
}

impl NewStudentBody {
    fn into_new_student(self, parent_id: Uuid) -> Result<NewStudent, AuthError> {
        let first_name = crate::model::non_blank(Some(&self.first_name))
            .ok_or_else(|| AuthError::validation("First name is required"))?;
        let last_name = crate::model::non_blank(Some(&self.last_name))
            .ok_or_else(|| AuthError::validation("Last name is required"))?;
        let date_of_birth = date_of_birth(&self.date_of_birth, Utc::now().date_naive())?;
        let time_zone = crate::model::non_blank(Some(&self.time_zone))
            .ok_or_else(|| AuthError::validation("Time zone is required"))?;
        Ok(NewStudent {
            parent_id,
            first_name,
            last_name,
            email: crate::model::non_blank(self.email.as_deref()),
            date_of_birth,
            instruments_of_interest: self.instruments_of_interest,
            playing_level: self.playing_level,
            learning_goals: crate::model::non_blank(self.learning_goals.as_deref()),
            time_zone,
        })
    }
}

/// `/app` is always redirected by the guard; this only answers if it is
/// reached some other way.
pub async fn root(Extension(snapshot): Extension<Snapshot>) -> Redirect {
    Redirect::temporary(dashboard_path(snapshot.role()))
}

#[utoipa::path(
    get,
    path = "/app/dashboard",
    responses(
        (status = 200, description = "Greeting for any signed-in account", body = DashboardResponse),
        (status = 307, description = "Not signed in, redirected to /")
    ),
    tag = "app"
)]
pub async fn dashboard(Extension(snapshot): Extension<Snapshot>) -> impl IntoResponse {
    Json(DashboardResponse {
        greeting: greeting(&snapshot),
        students: None,
        teacher: None,
    })
}

#[utoipa::path(
    get,
    path = "/app/parent/dashboard",
    responses(
        (status = 200, description = "Parent greeting and students", body = DashboardResponse),
        (status = 403, description = "Not a parent account", body = ErrorResponse)
    ),
    tag = "app"
)]
pub async fn parent_dashboard(
    state: Extension<Arc<ApiState>>,
    Extension(snapshot): Extension<Snapshot>,
) -> Response {
    let parent_id = match require_role(&snapshot, Role::Parent) {
        Ok(id) => id,
        Err(err) => return error_response(&err),
    };
    match state.auth.store().students_for_parent(parent_id).await {
        Ok(students) => Json(DashboardResponse {
            greeting: greeting(&snapshot),
            students: Some(students),
            teacher: None,
        })
        .into_response(),
        Err(err) => error_response(&err.into()),
    }
}

#[utoipa::path(
    get,
    path = "/app/teacher/dashboard",
    responses(
        (status = 200, description = "Teacher greeting and teaching profile", body = DashboardResponse),
        (status = 403, description = "Not a teacher account", body = ErrorResponse)
    ),
    tag = "app"
)]
pub async fn teacher_dashboard(
    state: Extension<Arc<ApiState>>,
    Extension(snapshot): Extension<Snapshot>,
) -> Response {
    let teacher_id = match require_role(&snapshot, Role::Teacher) {
        Ok(id) => id,
        Err(err) => return error_response(&err),
    };
    match state.auth.store().teacher(teacher_id).await {
        Ok(teacher) => Json(DashboardResponse {
            greeting: greeting(&snapshot),
            students: None,
            teacher,
        })
        .into_response(),
        Err(err) => error_response(&err.into()),
    }
}

#[utoipa::path(
    get,
    path = "/app/parent/students",
    responses(
        (status = 200, description = "The parent's students", body = [Student]),
        (status = 403, description = "Not a parent account", body = ErrorResponse)
    ),
    tag = "app"
)]
pub async fn list_students(
    state: Extension<Arc<ApiState>>,
    Extension(snapshot): Extension<Snapshot>,
) -> Response {
    let parent_id = match require_role(&snapshot, Role::Parent) {
        Ok(id) => id,
        Err(err) => return error_response(&err),
    };
    match state.auth.store().students_for_parent(parent_id).await {
        Ok(students) => Json(students).into_response(),
        Err(err) => error_response(&err.into()),
    }
}

#[utoipa::path(
    post,
    path = "/app/parent/students",
    request_body = NewStudentBody,
    responses(
        (status = 201, description = "Student added", body = Student),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 403, description = "Not a parent account", body = ErrorResponse)
    ),
    tag = "app"
)]
pub async fn add_student(
    state: Extension<Arc<ApiState>>,
    Extension(snapshot): Extension<Snapshot>,
    Json(body): Json<NewStudentBody>,
) -> Response {
    let result = async {
        let parent_id = require_role(&snapshot, Role::Parent)?;
        let student = body.into_new_student(parent_id)?;
        Ok::<_, AuthError>(state.auth.store().insert_student(&student).await?)
    }
    .await;
    match result {
        Ok(student) => (StatusCode::CREATED, Json(student)).into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    patch,
    path = "/app/profile",
    request_body = ProfileChanges,
    responses(
        (status = 200, description = "Updated profile", body = Profile),
        (status = 400, description = "Nothing to update", body = ErrorResponse)
    ),
    tag = "app"
)]
pub async fn update_profile(
    state: Extension<Arc<ApiState>>,
    Extension(snapshot): Extension<Snapshot>,
    Json(changes): Json<ProfileChanges>,
) -> Response {
    let Some(session) = snapshot.session else {
        return error_response(&AuthError::NotAuthenticated);
    };
    match state
        .auth
        .update_profile(session.access_token(), &changes)
        .await
    {
        Ok(profile) => Json(profile).into_response(),
        Err(err) => error_response(&err),
    }
}
