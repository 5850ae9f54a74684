use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};

use crate::AppState;

mod admin;
mod auth;
mod courses;
mod learning;
mod notifications;
mod promo;

pub(crate) fn create_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .merge(auth::create_router())
        .merge(courses::create_router())
        .merge(learning::create_router())
        .merge(promo::create_router())
        .merge(notifications::create_router())
        .nest("/admin", admin::create_router())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
