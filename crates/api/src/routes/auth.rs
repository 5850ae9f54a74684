use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::CookieJar;
use chrono::{DateTime, Utc};
use http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;
use crate::session::{CurrentUser, cleared_cookie, session_cookie};
use crate::views::UserView;

pub(crate) fn create_router() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
}

#[derive(Debug, Deserialize)]
pub(crate) struct RegisterRequest {
    email: String,
    name: String,
    password: String,
}

async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserView>), ApiError> {
    let user = state
        .services
        .auth()
        .register(&request.email, &request.name, &request.password)
        .await?;
    Ok((StatusCode::CREATED, Json(UserView::from(&user))))
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct LoginResponse {
    token: String,
    expires_at: DateTime<Utc>,
    user: UserView,
}

async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), ApiError> {
    let session = state
        .services
        .auth()
        .login(&request.email, &request.password)
        .await?;
    let jar = jar.add(session_cookie(session.token.clone(), state.secure_cookies));
    Ok((
        jar,
        Json(LoginResponse {
            token: session.token,
            expires_at: session.expires_at,
            user: UserView::from(&session.user),
        }),
    ))
}

async fn logout(jar: CookieJar) -> (CookieJar, StatusCode) {
    (jar.remove(cleared_cookie()), StatusCode::NO_CONTENT)
}

async fn me(CurrentUser(user): CurrentUser) -> Json<UserView> {
    Json(UserView::from(&user))
}
