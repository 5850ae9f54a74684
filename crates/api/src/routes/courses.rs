use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use course_core::model::CourseId;
use http::StatusCode;
use serde::Deserialize;
use services::Receipt;

use crate::AppState;
use crate::error::ApiError;
use crate::session::CurrentUser;
use crate::views::{CourseDetail, CourseSummary};

pub(crate) fn create_router() -> Router<AppState> {
    Router::new()
        .route("/courses", get(list_courses))
        .route("/courses/{course_id}", get(get_course))
        .route("/courses/{course_id}/purchase", post(purchase))
}

async fn list_courses(State(state): State<AppState>) -> Result<Json<Vec<CourseSummary>>, ApiError> {
    let courses = state.services.catalog().list_published().await?;
    Ok(Json(courses.iter().map(CourseSummary::from).collect()))
}

async fn get_course(
    State(state): State<AppState>,
    Path(course_id): Path<CourseId>,
) -> Result<Json<CourseDetail>, ApiError> {
    let course = state.services.catalog().get_published(course_id).await?;
    Ok(Json(CourseDetail::from(&course)))
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PurchaseRequest {
    #[serde(default)]
    promo_code: Option<String>,
}

async fn purchase(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(course_id): Path<CourseId>,
    Json(request): Json<PurchaseRequest>,
) -> Result<(StatusCode, Json<Receipt>), ApiError> {
    let receipt = state
        .services
        .purchases()
        .purchase(user.id(), course_id, request.promo_code.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}
