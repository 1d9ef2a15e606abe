use super::{error_response, ErrorResponse};
use crate::{
    api::ApiState,
    directory::{self, TeacherQuery},
    model::TeacherListing,
};
use axum::{
    extract::{Extension, Path, Query},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TeacherDirectory {
    pub teachers: Vec<TeacherListing>,
    /// Every instrument taught by an active teacher, for the filter menu.
    pub instruments: Vec<String>,
}

#[utoipa::path(
    get,
    path = "/app/find-teachers",
    params(TeacherQuery),
    responses(
        (status = 200, description = "Active teachers matching the filters", body = TeacherDirectory),
        (status = 502, description = "Backend failure", body = ErrorResponse)
    ),
    tag = "teachers"
)]
pub async fn find_teachers(
    state: Extension<Arc<ApiState>>,
    Query(query): Query<TeacherQuery>,
) -> Response {
    match directory::list_active_teachers(state.auth.store().as_ref()).await {
        Ok(listings) => {
            let instruments = directory::instruments(&listings);
            Json(TeacherDirectory {
                teachers: query.apply(listings),
                instruments,
            })
            .into_response()
        }
        Err(err) => error_response(&err.into()),
    }
}

#[utoipa::path(
    get,
    path = "/app/teacher/{id}",
    params(("id" = Uuid, Path, description = "Teacher id")),
    responses(
        (status = 200, description = "Teacher profile", body = TeacherListing),
        (status = 404, description = "No such teacher", body = ErrorResponse)
    ),
    tag = "teachers"
)]
pub async fn teacher_detail(state: Extension<Arc<ApiState>>, Path(id): Path<Uuid>) -> Response {
    match directory::teacher_detail(state.auth.store().as_ref(), id).await {
        Ok(listing) => Json(listing).into_response(),
        Err(err) => error_response(&err.into()),
    }
}
