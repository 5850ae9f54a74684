use axum::RequestPartsExt;
use axum::extract::FromRequestParts;
use axum_extra::TypedHeader;
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use axum_extra::headers::Authorization;
use axum_extra::headers::authorization::Bearer;
use course_core::model::User;
use http::request::Parts;

use crate::AppState;
use crate::error::ApiError;

pub const SESSION_COOKIE: &str = "session";

/// The signed-in account behind a request.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// A signed-in account holding the admin role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

async fn session_token(parts: &mut Parts) -> Option<String> {
    if let Ok(TypedHeader(Authorization(bearer))) =
        parts.extract::<TypedHeader<Authorization<Bearer>>>().await
    {
        return Some(bearer.token().to_string());
    }
    CookieJar::from_headers(&parts.headers)
        .get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = session_token(parts)
            .await
            .ok_or_else(ApiError::unauthenticated)?;
        let user = state
            .services
            .auth()
            .authenticate(&token)
            .await
            .inspect_err(|error| tracing::warn!(target: "security", %error, "session rejected"))?;
        Ok(Self(user))
    }
}

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = session_token(parts)
            .await
            .ok_or_else(ApiError::unauthenticated)?;
        let user = state
            .services
            .auth()
            .authenticate_admin(&token)
            .await
            .inspect_err(|error| tracing::debug!(target: "security", %error, "admin session rejected"))?;
        Ok(Self(user))
    }
}

/// Browser-session cookie; the token inside carries its own expiry.
pub(crate) fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

pub(crate) fn cleared_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, "")).path("/").build()
}
