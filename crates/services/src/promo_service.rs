use std::sync::Arc;

use course_core::model::{
    Course, CourseId, NotificationKind, PromoCode, PromoCodeDraft, PromoCodeId, PromoStatus, User,
    UserId,
};
use serde::Serialize;
use storage::repository::{
    CourseRepository, ProgressRepository, PromoCodeRepository, StorageError, UserRepository,
};

use crate::Clock;
use crate::enrollment::Enrollment;
use crate::error::PromoServiceError;
use crate::notification_service::NotificationService;

/// Result of checking a code without redeeming it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromoQuote {
    pub code: String,
    pub discount_percent: u8,
    pub course_id: Option<CourseId>,
    /// Present when a course was given or the code is tied to one.
    pub price_cents: Option<u64>,
    pub discounted_price_cents: Option<u64>,
}

/// Result of a successful redemption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Redemption {
    pub code: String,
    pub course_id: CourseId,
    pub discount_percent: u8,
}

/// A promo code with its status at listing time.
#[derive(Debug, Clone)]
pub struct PromoListing {
    pub promo: PromoCode,
    pub status: PromoStatus,
}

/// Promo code validation, redemption and admin management.
#[derive(Clone)]
pub struct PromoService {
    clock: Clock,
    promos: Arc<dyn PromoCodeRepository>,
    courses: Arc<dyn CourseRepository>,
    users: Arc<dyn UserRepository>,
    enrollment: Enrollment,
    notifications: NotificationService,
}

impl PromoService {
    #[must_use]
    pub fn new(
        clock: Clock,
        promos: Arc<dyn PromoCodeRepository>,
        courses: Arc<dyn CourseRepository>,
        users: Arc<dyn UserRepository>,
        progress: Arc<dyn ProgressRepository>,
        notifications: NotificationService,
    ) -> Self {
        let enrollment = Enrollment::new(clock, Arc::clone(&users), progress);
        Self {
            clock,
            promos,
            courses,
            users,
            enrollment,
            notifications,
        }
    }

    async fn find(&self, code: &str) -> Result<PromoCode, PromoServiceError> {
        self.promos
            .find_promo_by_code(code)
            .await?
            .ok_or(PromoServiceError::NotFound)
    }

    async fn ensure_course(&self, course: CourseId) -> Result<u64, PromoServiceError> {
        self.courses
            .get_course(course)
            .await?
            .map(|c| c.price_cents())
            .ok_or(PromoServiceError::CourseNotFound)
    }

    /// Price of a course learners can see; drafts count as missing.
    async fn published_price(&self, course: CourseId) -> Result<u64, PromoServiceError> {
        self.courses
            .get_course(course)
            .await?
            .filter(Course::is_published)
            .map(|c| c.price_cents())
            .ok_or(PromoServiceError::CourseNotFound)
    }

    /// Look up a code and check it is usable by `user` for `course`.
    pub(crate) async fn redeemable_for(
        &self,
        user: &User,
        code: &str,
        course: Option<CourseId>,
    ) -> Result<PromoCode, PromoServiceError> {
        let promo = self.find(code).await?;
        promo.check_redeemable(course, self.clock.now())?;
        if user.has_redeemed(promo.id()) {
            return Err(PromoServiceError::AlreadyRedeemed);
        }
        Ok(promo)
    }

    /// Count one use of `promo` and record it on `user`.
    ///
    /// The user is not persisted here; callers save it with the course grant.
    pub(crate) async fn consume(
        &self,
        promo: &mut PromoCode,
        user: &mut User,
    ) -> Result<(), PromoServiceError> {
        promo.consume(self.clock.now())?;
        self.promos.update_promo(promo).await?;
        user.record_redemption(promo.id());
        Ok(())
    }

    /// Check a code without using it.
    ///
    /// # Errors
    ///
    /// Returns `PromoServiceError::NotFound` for unknown codes and
    /// `PromoServiceError::Promo` when the code is inactive, expired,
    /// exhausted or tied to another course.
    pub async fn validate(
        &self,
        code: &str,
        course: Option<CourseId>,
    ) -> Result<PromoQuote, PromoServiceError> {
        let promo = self.find(code).await?;
        promo.check_redeemable(course, self.clock.now())?;
        let priced = match course.or(promo.course_id()) {
            Some(id) => Some(self.published_price(id).await?),
            None => None,
        };
        Ok(PromoQuote {
            code: promo.code().to_string(),
            discount_percent: promo.discount_percent(),
            course_id: promo.course_id(),
            price_cents: priced,
            discounted_price_cents: priced.map(|p| promo.discounted_price(p)),
        })
    }

    /// Redeem a code for course access.
    ///
    /// The target course is the one the code is tied to, or `course` for
    /// codes valid on any course. The steps are not atomic.
    ///
    /// # Errors
    ///
    /// Returns `PromoServiceError::AlreadyRedeemed` or
    /// `PromoServiceError::AlreadyOwned` on repeat use,
    /// `PromoServiceError::CourseRequired` when no course can be determined,
    /// and the errors of [`Self::validate`].
    pub async fn redeem(
        &self,
        user_id: UserId,
        code: &str,
        course: Option<CourseId>,
    ) -> Result<Redemption, PromoServiceError> {
        let mut user = self
            .users
            .get_user(user_id)
            .await?
            .ok_or(PromoServiceError::UserNotFound)?;
        let mut promo = self.redeemable_for(&user, code, course).await?;
        let target = promo
            .course_id()
            .or(course)
            .ok_or(PromoServiceError::CourseRequired)?;
        self.published_price(target).await?;
        if user.owns_course(target) {
            return Err(PromoServiceError::AlreadyOwned);
        }

        self.consume(&mut promo, &mut user).await?;
        self.enrollment.grant(&mut user, target).await?;
        tracing::info!(
            user = %user_id,
            course = %target,
            code = promo.code(),
            uses = promo.current_uses(),
            "promo code redeemed"
        );
        self.notifications
            .notify_best_effort(
                user_id,
                NotificationKind::Promo,
                "Promo code redeemed",
                format!("Code {} unlocked a new course for you.", promo.code()),
            )
            .await;

        Ok(Redemption {
            code: promo.code().to_string(),
            course_id: target,
            discount_percent: promo.discount_percent(),
        })
    }

    //
    // ─── ADMIN ─────────────────────────────────────────────────────────────────
    //

    /// # Errors
    ///
    /// Returns `PromoServiceError::Storage` if repository access fails.
    pub async fn list(&self) -> Result<Vec<PromoListing>, PromoServiceError> {
        let now = self.clock.now();
        Ok(self
            .promos
            .list_promos()
            .await?
            .into_iter()
            .map(|promo| PromoListing {
                status: promo.status(now),
                promo,
            })
            .collect())
    }

    /// # Errors
    ///
    /// Returns `PromoServiceError::Promo` for invalid drafts,
    /// `PromoServiceError::CourseNotFound` for an unknown linked course and
    /// `PromoServiceError::DuplicateCode` if the code exists.
    pub async fn create(&self, draft: PromoCodeDraft) -> Result<PromoCode, PromoServiceError> {
        let promo = PromoCode::new(PromoCodeId::new(0), draft, self.clock.now())?;
        if let Some(course) = promo.course_id() {
            self.ensure_course(course).await?;
        }
        let id = match self.promos.insert_promo(&promo).await {
            Ok(id) => id,
            Err(StorageError::Conflict) => return Err(PromoServiceError::DuplicateCode),
            Err(e) => return Err(e.into()),
        };
        tracing::info!(promo = %id, code = promo.code(), "promo code created");
        Ok(promo.with_id(id))
    }

    /// Replace editable fields, keeping the usage count.
    ///
    /// # Errors
    ///
    /// Same as [`Self::create`], plus `PromoServiceError::NotFound`.
    pub async fn update(
        &self,
        id: PromoCodeId,
        draft: PromoCodeDraft,
    ) -> Result<PromoCode, PromoServiceError> {
        let current = self
            .promos
            .get_promo(id)
            .await?
            .ok_or(PromoServiceError::NotFound)?;
        let revised = current.revise(draft)?;
        if let Some(course) = revised.course_id() {
            self.ensure_course(course).await?;
        }
        match self.promos.update_promo(&revised).await {
            Ok(()) => Ok(revised),
            Err(StorageError::Conflict) => Err(PromoServiceError::DuplicateCode),
            Err(StorageError::NotFound) => Err(PromoServiceError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// # Errors
    ///
    /// Returns `PromoServiceError::NotFound` for unknown ids.
    pub async fn deactivate(&self, id: PromoCodeId) -> Result<PromoCode, PromoServiceError> {
        let mut promo = self
            .promos
            .get_promo(id)
            .await?
            .ok_or(PromoServiceError::NotFound)?;
        promo.deactivate();
        self.promos.update_promo(&promo).await?;
        tracing::info!(promo = %id, "promo code deactivated");
        Ok(promo)
    }

    /// # Errors
    ///
    /// Returns `PromoServiceError::NotFound` for unknown ids.
    pub async fn delete(&self, id: PromoCodeId) -> Result<(), PromoServiceError> {
        match self.promos.delete_promo(id).await {
            Ok(()) => Ok(()),
            Err(StorageError::NotFound) => Err(PromoServiceError::NotFound),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use course_core::model::{ChapterDraft, Course, CourseDraft, PromoError, Role};
    use course_core::time::{fixed_clock, fixed_now};
    use storage::repository::InMemoryRepository;

    async fn setup() -> (InMemoryRepository, PromoService, CourseId) {
        let repo = InMemoryRepository::new();
        let course = Course::new(
            CourseId::new(0),
            CourseDraft {
                title: "Rust".into(),
                price_cents: 5_000,
                published: true,
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
        let service = PromoService::new(
            fixed_clock(),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            NotificationService::new(fixed_clock(), Arc::new(repo.clone())),
        );
        (repo, service, course_id)
    }

    async fn learner(repo: &InMemoryRepository, email: &str) -> UserId {
        let user = User::new(UserId::new(0), email, "L", "h".into(), Role::User, fixed_now())
            .unwrap();
        repo.insert_user(&user).await.unwrap()
    }

    fn draft(code: &str, course: Option<CourseId>, max_uses: Option<u32>) -> PromoCodeDraft {
        PromoCodeDraft {
            code: code.into(),
            discount_percent: 100,
            course_id: course,
            max_uses,
            expires_at: None,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn single_use_code_redeems_once() {
        let (repo, service, course) = setup().await;
        service
            .create(draft("ONCE", Some(course), Some(1)))
            .await
            .unwrap();
        let a = learner(&repo, "a@example.com").await;
        let b = learner(&repo, "b@example.com").await;

        let redemption = service.redeem(a, "once", None).await.unwrap();
        assert_eq!(redemption.course_id, course);
        assert!(repo.get_user(a).await.unwrap().unwrap().owns_course(course));
        assert!(repo.get_progress(a, course).await.unwrap().is_some());

        let err = service.redeem(b, "ONCE", None).await.unwrap_err();
        assert!(matches!(
            err,
            PromoServiceError::Promo(PromoError::NotRedeemable(PromoStatus::Exhausted))
        ));
    }

    #[tokio::test]
    async fn same_user_cannot_redeem_twice() {
        let (repo, service, course) = setup().await;
        service.create(draft("ANY", None, Some(10))).await.unwrap();
        let a = learner(&repo, "a@example.com").await;

        assert!(matches!(
            service.redeem(a, "ANY", None).await,
            Err(PromoServiceError::CourseRequired)
        ));
        service.redeem(a, "ANY", Some(course)).await.unwrap();
        assert!(matches!(
            service.redeem(a, "ANY", Some(course)).await,
            Err(PromoServiceError::AlreadyRedeemed)
        ));
    }

    #[tokio::test]
    async fn open_code_cannot_unlock_a_draft_course() {
        let (repo, service, _course) = setup().await;
        let draft_course = Course::new(
            CourseId::new(0),
            CourseDraft {
                title: "Unreleased".into(),
                published: false,
                ..CourseDraft::default()
            },
            fixed_now(),
        )
        .unwrap();
        let hidden = repo.insert_course(&draft_course).await.unwrap();
        let open = service.create(draft("OPEN", None, None)).await.unwrap();
        let a = learner(&repo, "a@example.com").await;

        assert!(matches!(
            service.redeem(a, "OPEN", Some(hidden)).await,
            Err(PromoServiceError::CourseNotFound)
        ));
        assert!(matches!(
            service.validate("OPEN", Some(hidden)).await,
            Err(PromoServiceError::CourseNotFound)
        ));
        assert!(!repo.get_user(a).await.unwrap().unwrap().owns_course(hidden));
        assert_eq!(
            repo.get_promo(open.id()).await.unwrap().unwrap().current_uses(),
            0
        );
    }

    #[tokio::test]
    async fn expired_and_deactivated_codes_are_rejected() {
        let (_repo, service, course) = setup().await;
        let mut expired = draft("OLD", Some(course), None);
        expired.expires_at = Some(fixed_now() - Duration::days(1));
        service.create(expired).await.unwrap();
        let off = service.create(draft("OFF", None, None)).await.unwrap();
        service.deactivate(off.id()).await.unwrap();

        assert!(matches!(
            service.validate("OLD", None).await,
            Err(PromoServiceError::Promo(PromoError::NotRedeemable(PromoStatus::Expired)))
        ));
        assert!(matches!(
            service.validate("off", Some(course)).await,
            Err(PromoServiceError::Promo(PromoError::NotRedeemable(
                PromoStatus::Deactivated
            )))
        ));
        let statuses: Vec<PromoStatus> =
            service.list().await.unwrap().iter().map(|l| l.status).collect();
        assert_eq!(statuses, vec![PromoStatus::Expired, PromoStatus::Deactivated]);
    }

    #[tokio::test]
    async fn validate_quotes_discounted_price() {
        let (_repo, service, course) = setup().await;
        let mut half = draft("HALF", None, None);
        half.discount_percent = 50;
        service.create(half).await.unwrap();
        let quote = service.validate("half", Some(course)).await.unwrap();
        assert_eq!(quote.price_cents, Some(5_000));
        assert_eq!(quote.discounted_price_cents, Some(2_500));
    }

    #[tokio::test]
    async fn duplicate_codes_conflict_and_bad_discounts_fail() {
        let (_repo, service, _course) = setup().await;
        service.create(draft("DUP", None, None)).await.unwrap();
        assert!(matches!(
            service.create(draft("dup", None, None)).await,
            Err(PromoServiceError::DuplicateCode)
        ));
        let mut zero = draft("ZERO", None, None);
        zero.discount_percent = 0;
        assert!(matches!(
            service.create(zero).await,
            Err(PromoServiceError::Promo(PromoError::InvalidDiscount(0)))
        ));
    }
}
