use std::sync::Arc;

use async_trait::async_trait;
use course_core::model::{Course, CourseId, NotificationKind, UserId};
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::Serialize;
use storage::repository::{CourseRepository, ProgressRepository, UserRepository};

use crate::Clock;
use crate::enrollment::Enrollment;
use crate::error::{PaymentError, PurchaseError};
use crate::notification_service::NotificationService;
use crate::promo_service::PromoService;

//
// ─── PAYMENTS ──────────────────────────────────────────────────────────────────
//

/// A charge to be collected for one course.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    pub user_id: UserId,
    pub course_id: CourseId,
    pub amount_cents: u64,
    pub description: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Collect the payment and return the provider's reference.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError` when the payment is declined or the provider
    /// cannot be reached.
    async fn charge(&self, request: &PaymentRequest) -> Result<String, PaymentError>;
}

/// Approves every charge. No money moves.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockPaymentGateway;

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn charge(&self, request: &PaymentRequest) -> Result<String, PaymentError> {
        let suffix: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(16)
            .map(char::from)
            .collect();
        tracing::debug!(
            user = %request.user_id,
            amount_cents = request.amount_cents,
            "mock payment approved"
        );
        Ok(format!("mock_{suffix}"))
    }
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Receipt {
    pub course_id: CourseId,
    pub list_price_cents: u64,
    pub discount_percent: u8,
    pub amount_cents: u64,
    pub promo_code: Option<String>,
    pub payment_reference: String,
}

/// Course checkout.
#[derive(Clone)]
pub struct PurchaseService {
    courses: Arc<dyn CourseRepository>,
    users: Arc<dyn UserRepository>,
    enrollment: Enrollment,
    promos: PromoService,
    gateway: Arc<dyn PaymentGateway>,
    notifications: NotificationService,
}

impl PurchaseService {
    #[must_use]
    pub fn new(
        clock: Clock,
        courses: Arc<dyn CourseRepository>,
        users: Arc<dyn UserRepository>,
        progress: Arc<dyn ProgressRepository>,
        promos: PromoService,
        gateway: Arc<dyn PaymentGateway>,
        notifications: NotificationService,
    ) -> Self {
        let enrollment = Enrollment::new(clock, Arc::clone(&users), progress);
        Self {
            courses,
            users,
            enrollment,
            promos,
            gateway,
            notifications,
        }
    }

    /// Buy a published course, optionally with a promo code.
    ///
    /// The code is consumed only after the payment succeeds.
    ///
    /// # Errors
    ///
    /// Returns `PurchaseError::CourseNotFound` for missing or unpublished
    /// courses, `PurchaseError::AlreadyOwned` on repeat purchases,
    /// `PurchaseError::Promo` for unusable codes and `PurchaseError::Payment`
    /// when the gateway refuses.
    pub async fn purchase(
        &self,
        user_id: UserId,
        course_id: CourseId,
        promo_code: Option<&str>,
    ) -> Result<Receipt, PurchaseError> {
        let course = self
            .courses
            .get_course(course_id)
            .await?
            .filter(Course::is_published)
            .ok_or(PurchaseError::CourseNotFound)?;
        let mut user = self
            .users
            .get_user(user_id)
            .await?
            .ok_or(PurchaseError::UserNotFound)?;
        if user.owns_course(course_id) {
            return Err(PurchaseError::AlreadyOwned);
        }

        let mut promo = match promo_code {
            Some(code) => Some(
                self.promos
                    .redeemable_for(&user, code, Some(course_id))
                    .await?,
            ),
            None => None,
        };
        let list_price_cents = course.price_cents();
        let amount_cents = promo
            .as_ref()
            .map_or(list_price_cents, |p| p.discounted_price(list_price_cents));

        let payment_reference = self
            .gateway
            .charge(&PaymentRequest {
                user_id,
                course_id,
                amount_cents,
                description: course.title().to_string(),
            })
            .await?;

        if let Some(promo) = promo.as_mut() {
            self.promos.consume(promo, &mut user).await?;
        }
        self.enrollment.grant(&mut user, course_id).await?;
        tracing::info!(
            user = %user_id,
            course = %course_id,
            amount_cents,
            reference = %payment_reference,
            "course purchased"
        );
        self.notifications
            .notify_best_effort(
                user_id,
                NotificationKind::Purchase,
                "Purchase complete",
                format!("You now have access to \"{}\".", course.title()),
            )
            .await;

        Ok(Receipt {
            course_id,
            list_price_cents,
            discount_percent: promo.as_ref().map_or(0, |p| p.discount_percent()),
            amount_cents,
            promo_code: promo.map(|p| p.code().to_string()),
            payment_reference,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use course_core::model::{ChapterDraft, CourseDraft, PromoCodeDraft, Role, User};
    use course_core::time::{fixed_clock, fixed_now};
    use storage::repository::{InMemoryRepository, PromoCodeRepository};

    struct DecliningGateway;

    #[async_trait]
    impl PaymentGateway for DecliningGateway {
        async fn charge(&self, _request: &PaymentRequest) -> Result<String, PaymentError> {
            Err(PaymentError::Declined("insufficient funds".into()))
        }
    }

    async fn setup(
        gateway: Arc<dyn PaymentGateway>,
        published: bool,
    ) -> (InMemoryRepository, PurchaseService, UserId, CourseId) {
        let repo = InMemoryRepository::new();
        let course = Course::new(
            CourseId::new(0),
            CourseDraft {
                title: "Rust".into(),
                price_cents: 1_999,
                published,
                chapters: vec![ChapterDraft {
                    title: "One".into(),
                    ..ChapterDraft::default()
                }],
                ..CourseDraft::default()
            },
            fixed_now(),
        )
        .unwrap();
        let course_id = repo.insert_course(&course).await.unwrap();
        let user =
            User::new(UserId::new(0), "p@example.com", "P", "h".into(), Role::User, fixed_now())
                .unwrap();
        let user_id = repo.insert_user(&user).await.unwrap();

        let notifications = NotificationService::new(fixed_clock(), Arc::new(repo.clone()));
        let promos = PromoService::new(
            fixed_clock(),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            notifications.clone(),
        );
        let service = PurchaseService::new(
            fixed_clock(),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            promos,
            gateway,
            notifications,
        );
        (repo, service, user_id, course_id)
    }

    #[tokio::test]
    async fn purchase_grants_course_and_rejects_repeat() {
        let (repo, service, user, course) = setup(Arc::new(MockPaymentGateway), true).await;
        let receipt = service.purchase(user, course, None).await.unwrap();
        assert_eq!(receipt.amount_cents, 1_999);
        assert!(receipt.payment_reference.starts_with("mock_"));
        assert!(repo.get_progress(user, course).await.unwrap().is_some());

        assert!(matches!(
            service.purchase(user, course, None).await,
            Err(PurchaseError::AlreadyOwned)
        ));
    }

    #[tokio::test]
    async fn promo_discount_is_applied_and_consumed() {
        let (repo, service, user, course) = setup(Arc::new(MockPaymentGateway), true).await;
        let promo = course_core::model::PromoCode::new(
            course_core::model::PromoCodeId::new(0),
            PromoCodeDraft {
                code: "QUARTER".into(),
                discount_percent: 25,
                course_id: None,
                max_uses: Some(5),
                expires_at: None,
                is_active: true,
            },
            fixed_now(),
        )
        .unwrap();
        let promo_id = repo.insert_promo(&promo).await.unwrap();

        let receipt = service
            .purchase(user, course, Some("quarter"))
            .await
            .unwrap();
        assert_eq!(receipt.discount_percent, 25);
        assert_eq!(receipt.amount_cents, 1_499);
        assert_eq!(
            repo.get_promo(promo_id).await.unwrap().unwrap().current_uses(),
            1
        );
        assert!(repo.get_user(user).await.unwrap().unwrap().has_redeemed(promo_id));
    }

    #[tokio::test]
    async fn declined_payment_leaves_user_without_course() {
        let (repo, service, user, course) = setup(Arc::new(DecliningGateway), true).await;
        assert!(matches!(
            service.purchase(user, course, None).await,
            Err(PurchaseError::Payment(PaymentError::Declined(_)))
        ));
        assert!(!repo.get_user(user).await.unwrap().unwrap().owns_course(course));
    }

    #[tokio::test]
    async fn unpublished_course_cannot_be_bought() {
        let (_repo, service, user, course) = setup(Arc::new(MockPaymentGateway), false).await;
        assert!(matches!(
            service.purchase(user, course, None).await,
            Err(PurchaseError::CourseNotFound)
        ));
    }
}
