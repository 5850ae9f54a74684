use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use course_core::model::{Notification, NotificationId};
use http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;
use crate::session::CurrentUser;

pub(crate) fn create_router() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(list))
        .route("/notifications/{notification_id}/read", post(mark_read))
        .route("/notifications/read-all", post(mark_all_read))
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListParams {
    limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub(crate) struct NotificationList {
    unread_count: u32,
    notifications: Vec<Notification>,
}

async fn list(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<ListParams>,
) -> Result<Json<NotificationList>, ApiError> {
    let service = state.services.notifications();
    let notifications = service.list(user.id(), params.limit).await?;
    let unread_count = service.unread_count(user.id()).await?;
    Ok(Json(NotificationList {
        unread_count,
        notifications,
    }))
}

async fn mark_read(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(notification_id): Path<NotificationId>,
) -> Result<StatusCode, ApiError> {
    state
        .services
        .notifications()
        .mark_read(user.id(), notification_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub(crate) struct MarkedRead {
    updated: u64,
}

async fn mark_all_read(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<MarkedRead>, ApiError> {
    let updated = state
        .services
        .notifications()
        .mark_all_read(user.id())
        .await?;
    Ok(Json(MarkedRead { updated }))
}
