use std::sync::Arc;

use chrono::Duration;
use storage::repository::Storage;

use crate::Clock;
use crate::auth_service::{
    AuthService, AuthSettings, DEFAULT_SESSION_TTL_HOURS, LoginRateLimiter, SessionTokens,
};
use crate::catalog_service::CatalogService;
use crate::error::AppServicesError;
use crate::notification_service::NotificationService;
use crate::progress_service::{ProgressService, ProgressSettings};
use crate::promo_service::PromoService;
use crate::purchase_service::{MockPaymentGateway, PaymentGateway, PurchaseService};
use crate::user_admin_service::UserAdminService;

/// Everything needed to wire the services together.
#[derive(Clone)]
pub struct ServiceConfig {
    pub clock: Clock,
    pub jwt_secret: Vec<u8>,
    pub session_ttl: Duration,
    pub auth: AuthSettings,
    pub progress: ProgressSettings,
    pub gateway: Arc<dyn PaymentGateway>,
}

impl ServiceConfig {
    /// Defaults with the given signing secret.
    #[must_use]
    pub fn new(jwt_secret: impl Into<Vec<u8>>) -> Self {
        Self {
            clock: Clock::default(),
            jwt_secret: jwt_secret.into(),
            session_ttl: Duration::hours(DEFAULT_SESSION_TTL_HOURS),
            auth: AuthSettings::default(),
            progress: ProgressSettings::default(),
            gateway: Arc::new(MockPaymentGateway),
        }
    }
}

/// Assembles app-facing services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    auth: Arc<AuthService>,
    catalog: Arc<CatalogService>,
    progress: Arc<ProgressService>,
    promos: Arc<PromoService>,
    purchases: Arc<PurchaseService>,
    user_admin: Arc<UserAdminService>,
    notifications: Arc<NotificationService>,
}

impl AppServices {
    #[must_use]
    pub fn new(storage: &Storage, config: ServiceConfig) -> Self {
        let clock = config.clock;
        let notifications =
            NotificationService::new(clock, Arc::clone(&storage.notifications));
        let auth = AuthService::new(
            clock,
            Arc::clone(&storage.users),
            SessionTokens::new(&config.jwt_secret, config.session_ttl),
            Arc::new(LoginRateLimiter::default()),
            config.auth,
        );
        let catalog = CatalogService::new(
            clock,
            Arc::clone(&storage.courses),
            Arc::clone(&storage.progress),
        );
        let progress = ProgressService::new(
            clock,
            Arc::clone(&storage.courses),
            Arc::clone(&storage.users),
            Arc::clone(&storage.progress),
            notifications.clone(),
            config.progress,
        );
        let promos = PromoService::new(
            clock,
            Arc::clone(&storage.promo_codes),
            Arc::clone(&storage.courses),
            Arc::clone(&storage.users),
            Arc::clone(&storage.progress),
            notifications.clone(),
        );
        let purchases = PurchaseService::new(
            clock,
            Arc::clone(&storage.courses),
            Arc::clone(&storage.users),
            Arc::clone(&storage.progress),
            promos.clone(),
            config.gateway,
            notifications.clone(),
        );
        let user_admin = UserAdminService::new(
            clock,
            Arc::clone(&storage.users),
            Arc::clone(&storage.courses),
            Arc::clone(&storage.progress),
        );

        Self {
            auth: Arc::new(auth),
            catalog: Arc::new(catalog),
            progress: Arc::new(progress),
            promos: Arc::new(promos),
            purchases: Arc::new(purchases),
            user_admin: Arc::new(user_admin),
            notifications: Arc::new(notifications),
        }
    }

    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(db_url: &str, config: ServiceConfig) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::new(&storage, config))
    }

    #[must_use]
    pub fn in_memory(config: ServiceConfig) -> Self {
        Self::new(&Storage::in_memory(), config)
    }

    #[must_use]
    pub fn auth(&self) -> Arc<AuthService> {
        Arc::clone(&self.auth)
    }

    #[must_use]
    pub fn catalog(&self) -> Arc<CatalogService> {
        Arc::clone(&self.catalog)
    }

    #[must_use]
    pub fn progress(&self) -> Arc<ProgressService> {
        Arc::clone(&self.progress)
    }

    #[must_use]
    pub fn promos(&self) -> Arc<PromoService> {
        Arc::clone(&self.promos)
    }

    #[must_use]
    pub fn purchases(&self) -> Arc<PurchaseService> {
        Arc::clone(&self.purchases)
    }

    #[must_use]
    pub fn user_admin(&self) -> Arc<UserAdminService> {
        Arc::clone(&self.user_admin)
    }

    #[must_use]
    pub fn notifications(&self) -> Arc<NotificationService> {
        Arc::clone(&self.notifications)
    }
}
