use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use course_core::model::{CourseDraft, CourseId, PromoCodeDraft, PromoCodeId, Role, UserId};
use http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;
use crate::session::AdminUser;
use crate::views::{AdminCourseView, PromoView, UserView};

pub(crate) fn create_router() -> Router<AppState> {
    Router::new()
        .route("/courses", get(list_courses).post(create_course))
        .route(
            "/courses/{course_id}",
            get(get_course).put(update_course).delete(delete_course),
        )
        .route("/courses/{course_id}/publish", post(publish_course))
        .route("/promo-codes", get(list_promos).post(create_promo))
        .route(
            "/promo-codes/{promo_id}",
            put(update_promo).delete(delete_promo),
        )
        .route("/promo-codes/{promo_id}/deactivate", post(deactivate_promo))
        .route("/users", get(list_users))
        .route("/users/{user_id}", get(get_user).delete(delete_user))
        .route("/users/{user_id}/role", put(set_role))
        .route(
            "/users/{user_id}/courses/{course_id}",
            post(assign_course).delete(unassign_course),
        )
}

//
// ─── COURSES ───────────────────────────────────────────────────────────────────
//

async fn list_courses(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Vec<AdminCourseView>>, ApiError> {
    let courses = state.services.catalog().list_all().await?;
    Ok(Json(courses.iter().map(AdminCourseView::from).collect()))
}

async fn create_course(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(draft): Json<CourseDraft>,
) -> Result<(StatusCode, Json<AdminCourseView>), ApiError> {
    let course = state.services.catalog().create(draft).await?;
    Ok((StatusCode::CREATED, Json(AdminCourseView::from(&course))))
}

async fn get_course(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(course_id): Path<CourseId>,
) -> Result<Json<AdminCourseView>, ApiError> {
    let course = state.services.catalog().get(course_id).await?;
    Ok(Json(AdminCourseView::from(&course)))
}

async fn update_course(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(course_id): Path<CourseId>,
    Json(draft): Json<CourseDraft>,
) -> Result<Json<AdminCourseView>, ApiError> {
    let course = state.services.catalog().update(course_id, draft).await?;
    Ok(Json(AdminCourseView::from(&course)))
}

async fn delete_course(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(course_id): Path<CourseId>,
) -> Result<StatusCode, ApiError> {
    state.services.catalog().delete(course_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub(crate) struct PublishRequest {
    published: bool,
}

async fn publish_course(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(course_id): Path<CourseId>,
    Json(request): Json<PublishRequest>,
) -> Result<Json<AdminCourseView>, ApiError> {
    let course = state
        .services
        .catalog()
        .set_published(course_id, request.published)
        .await?;
    Ok(Json(AdminCourseView::from(&course)))
}

//
// ─── PROMO CODES ───────────────────────────────────────────────────────────────
//

async fn list_promos(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Vec<PromoView>>, ApiError> {
    let listings = state.services.promos().list().await?;
    Ok(Json(listings.iter().map(PromoView::from).collect()))
}

async fn create_promo(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(draft): Json<PromoCodeDraft>,
) -> Result<(StatusCode, Json<PromoView>), ApiError> {
    let promo = state.services.promos().create(draft).await?;
    let status = promo.status(state.clock.now());
    Ok((StatusCode::CREATED, Json(PromoView::new(&promo, status))))
}

async fn update_promo(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(promo_id): Path<PromoCodeId>,
    Json(draft): Json<PromoCodeDraft>,
) -> Result<Json<PromoView>, ApiError> {
    let promo = state.services.promos().update(promo_id, draft).await?;
    let status = promo.status(state.clock.now());
    Ok(Json(PromoView::new(&promo, status)))
}

async fn deactivate_promo(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(promo_id): Path<PromoCodeId>,
) -> Result<Json<PromoView>, ApiError> {
    let promo = state.services.promos().deactivate(promo_id).await?;
    let status = promo.status(state.clock.now());
    Ok(Json(PromoView::new(&promo, status)))
}

async fn delete_promo(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(promo_id): Path<PromoCodeId>,
) -> Result<StatusCode, ApiError> {
    state.services.promos().delete(promo_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

//
// ─── USERS ─────────────────────────────────────────────────────────────────────
//

async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Vec<UserView>>, ApiError> {
    let users = state.services.user_admin().list().await?;
    Ok(Json(users.iter().map(UserView::from).collect()))
}

async fn get_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(user_id): Path<UserId>,
) -> Result<Json<UserView>, ApiError> {
    let user = state.services.user_admin().get(user_id).await?;
    Ok(Json(UserView::from(&user)))
}

async fn delete_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(user_id): Path<UserId>,
) -> Result<StatusCode, ApiError> {
    state
        .services
        .user_admin()
        .delete(admin.id(), user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub(crate) struct RoleRequest {
    role: Role,
}

async fn set_role(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(user_id): Path<UserId>,
    Json(request): Json<RoleRequest>,
) -> Result<Json<UserView>, ApiError> {
    let user = state
        .services
        .user_admin()
        .set_role(admin.id(), user_id, request.role)
        .await?;
    Ok(Json(UserView::from(&user)))
}

#[derive(Debug, Serialize)]
pub(crate) struct AccessChange {
    changed: bool,
}

async fn assign_course(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path((user_id, course_id)): Path<(UserId, CourseId)>,
) -> Result<Json<AccessChange>, ApiError> {
    let changed = state
        .services
        .user_admin()
        .assign_course(user_id, course_id)
        .await?;
    Ok(Json(AccessChange { changed }))
}

async fn unassign_course(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path((user_id, course_id)): Path<(UserId, CourseId)>,
) -> Result<Json<AccessChange>, ApiError> {
    let changed = state
        .services
        .user_admin()
        .unassign_course(user_id, course_id)
        .await?;
    Ok(Json(AccessChange { changed }))
}
