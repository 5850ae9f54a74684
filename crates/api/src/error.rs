use std::borrow::Cow;

use axum::Json;
use axum::response::{IntoResponse, Response};
use http::{HeaderValue, StatusCode, header};
use serde::Serialize;
use services::{Classify, ErrorKind};

/// JSON error body shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorData {
    pub error: &'static str,
    pub error_description: Cow<'static, str>,
}

/// A failed request, classified for the response status.
#[derive(Debug)]
pub struct ApiError {
    kind: ErrorKind,
    message: Cow<'static, str>,
    retry_after_secs: Option<i64>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after_secs: None,
        }
    }

    #[must_use]
    pub fn unauthenticated() -> Self {
        Self::new(ErrorKind::Unauthorized, "authentication required")
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl<E: Classify> From<E> for ApiError {
    fn from(err: E) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string().into(),
            retry_after_secs: err.retry_after_secs(),
        }
    }
}

fn status_code(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let description = if self.kind == ErrorKind::Internal {
            tracing::error!(error = %self.message, "request failed");
            Cow::Borrowed("internal server error")
        } else {
            self.message
        };
        let body = ErrorData {
            error: self.kind.as_str(),
            error_description: description,
        };
        let mut response = (status_code(self.kind), Json(body)).into_response();
        if let Some(secs) = self.retry_after_secs {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs.max(1)));
        }
        response
    }
}
