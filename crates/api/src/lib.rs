#![forbid(unsafe_code)]

use axum::Router;
use http::{HeaderValue, Method, header};
use services::{AppServices, Clock};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod error;
mod routes;
pub mod session;
pub mod views;

pub use error::{ApiError, ErrorData};
pub use session::{AdminUser, CurrentUser, SESSION_COOKIE};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub services: AppServices,
    pub clock: Clock,
    /// Mark the session cookie `Secure`; enable behind HTTPS.
    pub secure_cookies: bool,
}

impl AppState {
    #[must_use]
    pub fn new(services: AppServices, clock: Clock) -> Self {
        Self {
            services,
            clock,
            secure_cookies: false,
        }
    }
}

fn cors_layer(origins: Vec<HeaderValue>) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

/// The full HTTP surface under `/api`.
pub fn router(state: AppState, cors_origins: Vec<HeaderValue>) -> Router {
    Router::new()
        .nest("/api", routes::create_router())
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
