//! Shared error types for the services crate.

use thiserror::Error;

use course_core::CompletionError;
use course_core::model::{CourseError, PromoError, UserError};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Coarse failure class shared by every service error.
///
/// Transport layers map each class to one response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Unauthorized,
    Forbidden,
    Validation,
    Conflict,
    RateLimited,
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::Validation => "validation",
            ErrorKind::Conflict => "conflict",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Implemented by every service error.
pub trait Classify: std::error::Error {
    fn kind(&self) -> ErrorKind;

    /// Seconds until a rate-limited request may be retried.
    fn retry_after_secs(&self) -> Option<i64> {
        None
    }
}

fn storage_kind(err: &StorageError) -> ErrorKind {
    match err {
        StorageError::NotFound => ErrorKind::NotFound,
        StorageError::Conflict => ErrorKind::Conflict,
        _ => ErrorKind::Internal,
    }
}

/// Errors emitted by `AuthService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    #[error(transparent)]
    User(#[from] UserError),
    #[error("password is too weak: {0}")]
    WeakPassword(&'static str),
    #[error("an account with this email already exists")]
    EmailTaken,
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("too many login attempts, retry in {retry_after_secs}s")]
    TooManyAttempts { retry_after_secs: i64 },
    #[error("session is invalid or expired")]
    InvalidSession,
    #[error("admin role required")]
    AdminRequired,
    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
    #[error("session signing failed: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl Classify for AuthError {
    fn kind(&self) -> ErrorKind {
        match self {
            AuthError::User(_) | AuthError::WeakPassword(_) => ErrorKind::Validation,
            AuthError::EmailTaken => ErrorKind::Conflict,
            AuthError::InvalidCredentials | AuthError::InvalidSession => ErrorKind::Unauthorized,
            AuthError::TooManyAttempts { .. } => ErrorKind::RateLimited,
            AuthError::AdminRequired => ErrorKind::Forbidden,
            AuthError::Hash(_) | AuthError::Token(_) => ErrorKind::Internal,
            AuthError::Storage(e) => storage_kind(e),
        }
    }

    fn retry_after_secs(&self) -> Option<i64> {
        match self {
            AuthError::TooManyAttempts { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

/// Errors emitted by `CatalogService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CatalogError {
    #[error("course not found")]
    NotFound,
    #[error(transparent)]
    Course(#[from] CourseError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl Classify for CatalogError {
    fn kind(&self) -> ErrorKind {
        match self {
            CatalogError::NotFound => ErrorKind::NotFound,
            CatalogError::Course(_) => ErrorKind::Validation,
            CatalogError::Storage(e) => storage_kind(e),
        }
    }
}

/// Errors emitted by `ProgressService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("course not found")]
    CourseNotFound,
    #[error("chapter not found")]
    ChapterNotFound,
    #[error("quiz not found")]
    QuizNotFound,
    #[error("certificate not found")]
    CertificateNotFound,
    #[error("user not found")]
    UserNotFound,
    #[error("course has not been purchased")]
    NotEnrolled,
    #[error("score must be between 0 and 100, got {0}")]
    InvalidScore(u8),
    #[error(transparent)]
    Completion(#[from] CompletionError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl Classify for ProgressError {
    fn kind(&self) -> ErrorKind {
        match self {
            ProgressError::CourseNotFound
            | ProgressError::ChapterNotFound
            | ProgressError::QuizNotFound
            | ProgressError::CertificateNotFound
            | ProgressError::UserNotFound => ErrorKind::NotFound,
            ProgressError::NotEnrolled => ErrorKind::Forbidden,
            ProgressError::InvalidScore(_) | ProgressError::Completion(_) => ErrorKind::Validation,
            ProgressError::Storage(e) => storage_kind(e),
        }
    }
}

/// Errors emitted by `PromoService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PromoServiceError {
    #[error("promo code not found")]
    NotFound,
    #[error("course not found")]
    CourseNotFound,
    #[error("user not found")]
    UserNotFound,
    #[error("promo code already exists")]
    DuplicateCode,
    #[error("promo code already redeemed by this user")]
    AlreadyRedeemed,
    #[error("course already owned")]
    AlreadyOwned,
    #[error("a course must be chosen for this promo code")]
    CourseRequired,
    #[error(transparent)]
    Promo(#[from] PromoError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl Classify for PromoServiceError {
    fn kind(&self) -> ErrorKind {
        match self {
            PromoServiceError::NotFound
            | PromoServiceError::CourseNotFound
            | PromoServiceError::UserNotFound => ErrorKind::NotFound,
            PromoServiceError::DuplicateCode
            | PromoServiceError::AlreadyRedeemed
            | PromoServiceError::AlreadyOwned => ErrorKind::Conflict,
            PromoServiceError::CourseRequired | PromoServiceError::Promo(_) => {
                ErrorKind::Validation
            }
            PromoServiceError::Storage(e) => storage_kind(e),
        }
    }
}

/// Errors returned by a `PaymentGateway`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PaymentError {
    #[error("payment declined: {0}")]
    Declined(String),
    #[error("payment provider unavailable: {0}")]
    Unavailable(String),
}

/// Errors emitted by `PurchaseService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PurchaseError {
    #[error("course not found")]
    CourseNotFound,
    #[error("user not found")]
    UserNotFound,
    #[error("course already owned")]
    AlreadyOwned,
    #[error(transparent)]
    Promo(#[from] PromoServiceError),
    #[error(transparent)]
    Payment(#[from] PaymentError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl Classify for PurchaseError {
    fn kind(&self) -> ErrorKind {
        match self {
            PurchaseError::CourseNotFound | PurchaseError::UserNotFound => ErrorKind::NotFound,
            PurchaseError::AlreadyOwned => ErrorKind::Conflict,
            PurchaseError::Promo(e) => e.kind(),
            PurchaseError::Payment(PaymentError::Declined(_)) => ErrorKind::Validation,
            PurchaseError::Payment(_) => ErrorKind::Internal,
            PurchaseError::Storage(e) => storage_kind(e),
        }
    }
}

/// Errors emitted by `UserAdminService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum UserAdminError {
    #[error("user not found")]
    NotFound,
    #[error("course not found")]
    CourseNotFound,
    #[error("admins cannot delete their own account")]
    CannotDeleteSelf,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl Classify for UserAdminError {
    fn kind(&self) -> ErrorKind {
        match self {
            UserAdminError::NotFound | UserAdminError::CourseNotFound => ErrorKind::NotFound,
            UserAdminError::CannotDeleteSelf => ErrorKind::Validation,
            UserAdminError::Storage(e) => storage_kind(e),
        }
    }
}

/// Errors emitted by `NotificationService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NotificationError {
    #[error("notification not found")]
    NotFound,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl Classify for NotificationError {
    fn kind(&self) -> ErrorKind {
        match self {
            NotificationError::NotFound => ErrorKind::NotFound,
            NotificationError::Storage(e) => storage_kind(e),
        }
    }
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
