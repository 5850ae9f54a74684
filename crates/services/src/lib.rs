#![forbid(unsafe_code)]

pub mod app_services;
pub mod auth_service;
pub mod catalog_service;
mod enrollment;
pub mod error;
pub mod notification_service;
pub mod progress_service;
pub mod promo_service;
pub mod purchase_service;
pub mod user_admin_service;

pub use course_core::Clock;

pub use app_services::{AppServices, ServiceConfig};
pub use auth_service::{
    AuthService, AuthSettings, LoginRateLimiter, LoginSession, PasswordPolicy, SessionClaims,
    SessionTokens,
};
pub use catalog_service::CatalogService;
pub use error::{
    AppServicesError, AuthError, CatalogError, Classify, ErrorKind, NotificationError,
    PaymentError, ProgressError, PromoServiceError, PurchaseError, UserAdminError,
};
pub use notification_service::NotificationService;
pub use progress_service::{
    AccessPolicy, CertificateRecord, ChapterCompletion, EnrolledCourse, LearnerQuiz,
    ProgressService, ProgressSettings, QuizSubmission,
};
pub use promo_service::{PromoListing, PromoQuote, PromoService, Redemption};
pub use purchase_service::{
    MockPaymentGateway, PaymentGateway, PaymentRequest, PurchaseService, Receipt,
};
pub use user_admin_service::UserAdminService;
