use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use course_core::model::CourseId;
use serde::Deserialize;
use services::{PromoQuote, Redemption};

use crate::AppState;
use crate::error::ApiError;
use crate::session::CurrentUser;

pub(crate) fn create_router() -> Router<AppState> {
    Router::new()
        .route("/promo-codes/validate", post(validate))
        .route("/promo-codes/redeem", post(redeem))
}

#[derive(Debug, Deserialize)]
pub(crate) struct PromoRequest {
    code: String,
    #[serde(default)]
    course_id: Option<CourseId>,
}

async fn validate(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Json(request): Json<PromoRequest>,
) -> Result<Json<PromoQuote>, ApiError> {
    let quote = state
        .services
        .promos()
        .validate(&request.code, request.course_id)
        .await?;
    Ok(Json(quote))
}

async fn redeem(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<PromoRequest>,
) -> Result<Json<Redemption>, ApiError> {
    let redemption = state
        .services
        .promos()
        .redeem(user.id(), &request.code, request.course_id)
        .await?;
    Ok(Json(redemption))
}
