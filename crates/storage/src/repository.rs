use async_trait::async_trait;
use chrono::{DateTime, Utc};
use course_core::model::{
    CertificateId, Course, CourseId, Notification, NotificationId, NotificationKind, Progress,
    PromoCode, PromoCodeId, User, UserId, normalize_code,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Notification fields before an id is assigned.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl NewNotification {
    fn with_id(self, id: NotificationId) -> Notification {
        Notification {
            id,
            user_id: self.user_id,
            kind: self.kind,
            title: self.title,
            message: self.message,
            read: false,
            created_at: self.created_at,
        }
    }
}

//
// ─── CONTRACTS ─────────────────────────────────────────────────────────────────
//

#[async_trait]
pub trait CourseRepository: Send + Sync {
    /// Store a new course, ignoring its id, and return the assigned id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the course cannot be stored.
    async fn insert_course(&self, course: &Course) -> Result<CourseId, StorageError>;

    /// Persist or replace a course.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the course cannot be stored.
    async fn upsert_course(&self, course: &Course) -> Result<(), StorageError>;

    /// Fetch a course by ID, `None` when missing.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend or decoding failures.
    async fn get_course(&self, id: CourseId) -> Result<Option<Course>, StorageError>;

    /// List courses ordered by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend or decoding failures.
    async fn list_courses(&self, published_only: bool) -> Result<Vec<Course>, StorageError>;

    /// Delete a course.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the course does not exist.
    async fn delete_course(&self, id: CourseId) -> Result<(), StorageError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Store a new user and return the assigned id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the email is already registered.
    async fn insert_user(&self, user: &User) -> Result<UserId, StorageError>;

    async fn get_user(&self, id: UserId) -> Result<Option<User>, StorageError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StorageError>;

    async fn list_users(&self) -> Result<Vec<User>, StorageError>;

    /// Replace a user document, including owned courses and redemptions.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for unknown users and
    /// `StorageError::Conflict` if the new email is taken.
    async fn update_user(&self, user: &User) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the user does not exist.
    async fn delete_user(&self, id: UserId) -> Result<(), StorageError>;
}

#[async_trait]
pub trait ProgressRepository: Send + Sync {
    async fn get_progress(
        &self,
        user: UserId,
        course: CourseId,
    ) -> Result<Option<Progress>, StorageError>;

    /// Persist the whole record; last write wins.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be stored.
    async fn upsert_progress(&self, progress: &Progress) -> Result<(), StorageError>;

    async fn list_progress_for_user(&self, user: UserId) -> Result<Vec<Progress>, StorageError>;

    async fn find_by_certificate(
        &self,
        certificate: CertificateId,
    ) -> Result<Option<Progress>, StorageError>;

    /// Remove one record. Returns whether a record existed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn delete_progress(&self, user: UserId, course: CourseId) -> Result<bool, StorageError>;

    /// Remove every record of a course. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn delete_progress_for_course(&self, course: CourseId) -> Result<u64, StorageError>;
}

#[async_trait]
pub trait PromoCodeRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the code already exists.
    async fn insert_promo(&self, promo: &PromoCode) -> Result<PromoCodeId, StorageError>;

    async fn get_promo(&self, id: PromoCodeId) -> Result<Option<PromoCode>, StorageError>;

    /// Case-insensitive lookup by code.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend or decoding failures.
    async fn find_promo_by_code(&self, code: &str) -> Result<Option<PromoCode>, StorageError>;

    async fn list_promos(&self) -> Result<Vec<PromoCode>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for unknown ids and
    /// `StorageError::Conflict` if the code collides with another one.
    async fn update_promo(&self, promo: &PromoCode) -> Result<(), StorageError>;

    async fn delete_promo(&self, id: PromoCodeId) -> Result<(), StorageError>;
}

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn insert_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, StorageError>;

    /// Newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend or decoding failures.
    async fn list_notifications(
        &self,
        user: UserId,
        limit: u32,
    ) -> Result<Vec<Notification>, StorageError>;

    /// Mark one notification read. Returns `false` if it does not belong to `user`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn mark_read(&self, user: UserId, id: NotificationId) -> Result<bool, StorageError>;

    async fn mark_all_read(&self, user: UserId) -> Result<u64, StorageError>;

    async fn count_unread(&self, user: UserId) -> Result<u32, StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

#[derive(Default)]
struct MemoryState {
    courses: BTreeMap<CourseId, Course>,
    users: BTreeMap<UserId, User>,
    progress: HashMap<(UserId, CourseId), Progress>,
    promos: BTreeMap<PromoCodeId, PromoCode>,
    notifications: Vec<Notification>,
    next_course: u64,
    next_user: u64,
    next_promo: u64,
    next_notification: u64,
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

fn next_id(counter: &mut u64, taken_max: Option<u64>) -> u64 {
    *counter = (*counter).max(taken_max.unwrap_or(0)) + 1;
    *counter
}

#[async_trait]
impl CourseRepository for InMemoryRepository {
    async fn insert_course(&self, course: &Course) -> Result<CourseId, StorageError> {
        let mut guard = self.lock()?;
        let max = guard.courses.keys().next_back().map(CourseId::value);
        let id = CourseId::new(next_id(&mut guard.next_course, max));
        guard.courses.insert(id, course.clone().with_id(id));
        Ok(id)
    }

    async fn upsert_course(&self, course: &Course) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard.courses.insert(course.id(), course.clone());
        Ok(())
    }

    async fn get_course(&self, id: CourseId) -> Result<Option<Course>, StorageError> {
        Ok(self.lock()?.courses.get(&id).cloned())
    }

    async fn list_courses(&self, published_only: bool) -> Result<Vec<Course>, StorageError> {
        Ok(self
            .lock()?
            .courses
            .values()
            .filter(|c| !published_only || c.is_published())
            .cloned()
            .collect())
    }

    async fn delete_course(&self, id: CourseId) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard.courses.remove(&id).ok_or(StorageError::NotFound)?;
        guard.promos.retain(|_, p| p.course_id() != Some(id));
        guard.progress.retain(|(_, course), _| *course != id);
        for user in guard.users.values_mut() {
            user.revoke_course(id);
        }
        Ok(())
    }
}

#[async_trait]
impl UserRepository for InMemoryRepository {
    async fn insert_user(&self, user: &User) -> Result<UserId, StorageError> {
        let mut guard = self.lock()?;
        if guard.users.values().any(|u| u.email() == user.email()) {
            return Err(StorageError::Conflict);
        }
        let max = guard.users.keys().next_back().map(UserId::value);
        let id = UserId::new(next_id(&mut guard.next_user, max));
        guard.users.insert(id, user.clone().with_id(id));
        Ok(id)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, StorageError> {
        Ok(self.lock()?.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StorageError> {
        let email = email.trim().to_lowercase();
        Ok(self
            .lock()?
            .users
            .values()
            .find(|u| u.email() == email)
            .cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, StorageError> {
        Ok(self.lock()?.users.values().cloned().collect())
    }

    async fn update_user(&self, user: &User) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        if !guard.users.contains_key(&user.id()) {
            return Err(StorageError::NotFound);
        }
        if guard
            .users
            .values()
            .any(|u| u.id() != user.id() && u.email() == user.email())
        {
            return Err(StorageError::Conflict);
        }
        guard.users.insert(user.id(), user.clone());
        Ok(())
    }

    async fn delete_user(&self, id: UserId) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard.users.remove(&id).ok_or(StorageError::NotFound)?;
        guard.progress.retain(|(user, _), _| *user != id);
        guard.notifications.retain(|n| n.user_id != id);
        Ok(())
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn get_progress(
        &self,
        user: UserId,
        course: CourseId,
    ) -> Result<Option<Progress>, StorageError> {
        Ok(self.lock()?.progress.get(&(user, course)).cloned())
    }

    async fn upsert_progress(&self, progress: &Progress) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard
            .progress
            .insert((progress.user_id(), progress.course_id()), progress.clone());
        Ok(())
    }

    async fn list_progress_for_user(&self, user: UserId) -> Result<Vec<Progress>, StorageError> {
        let guard = self.lock()?;
        let mut out: Vec<Progress> = guard
            .progress
            .values()
            .filter(|p| p.user_id() == user)
            .cloned()
            .collect();
        out.sort_by_key(Progress::course_id);
        Ok(out)
    }

    async fn find_by_certificate(
        &self,
        certificate: CertificateId,
    ) -> Result<Option<Progress>, StorageError> {
        Ok(self
            .lock()?
            .progress
            .values()
            .find(|p| p.certificate().is_some_and(|c| c.id == certificate))
            .cloned())
    }

    async fn delete_progress(&self, user: UserId, course: CourseId) -> Result<bool, StorageError> {
        Ok(self.lock()?.progress.remove(&(user, course)).is_some())
    }

    async fn delete_progress_for_course(&self, course: CourseId) -> Result<u64, StorageError> {
        let mut guard = self.lock()?;
        let before = guard.progress.len();
        guard.progress.retain(|(_, c), _| *c != course);
        Ok((before - guard.progress.len()) as u64)
    }
}

#[async_trait]
impl PromoCodeRepository for InMemoryRepository {
    async fn insert_promo(&self, promo: &PromoCode) -> Result<PromoCodeId, StorageError> {
        let mut guard = self.lock()?;
        if guard.promos.values().any(|p| p.code() == promo.code()) {
            return Err(StorageError::Conflict);
        }
        let max = guard.promos.keys().next_back().map(PromoCodeId::value);
        let id = PromoCodeId::new(next_id(&mut guard.next_promo, max));
        guard.promos.insert(id, promo.clone().with_id(id));
        Ok(id)
    }

    async fn get_promo(&self, id: PromoCodeId) -> Result<Option<PromoCode>, StorageError> {
        Ok(self.lock()?.promos.get(&id).cloned())
    }

    async fn find_promo_by_code(&self, code: &str) -> Result<Option<PromoCode>, StorageError> {
        let Ok(code) = normalize_code(code) else {
            return Ok(None);
        };
        Ok(self
            .lock()?
            .promos
            .values()
            .find(|p| p.code() == code)
            .cloned())
    }

    async fn list_promos(&self) -> Result<Vec<PromoCode>, StorageError> {
        Ok(self.lock()?.promos.values().cloned().collect())
    }

    async fn update_promo(&self, promo: &PromoCode) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        if !guard.promos.contains_key(&promo.id()) {
            return Err(StorageError::NotFound);
        }
        if guard
            .promos
            .values()
            .any(|p| p.id() != promo.id() && p.code() == promo.code())
        {
            return Err(StorageError::Conflict);
        }
        guard.promos.insert(promo.id(), promo.clone());
        Ok(())
    }

    async fn delete_promo(&self, id: PromoCodeId) -> Result<(), StorageError> {
        self.lock()?
            .promos
            .remove(&id)
            .map(|_| ())
            .ok_or(StorageError::NotFound)
    }
}

#[async_trait]
impl NotificationRepository for InMemoryRepository {
    async fn insert_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, StorageError> {
        let mut guard = self.lock()?;
        guard.next_notification += 1;
        let stored = notification.with_id(NotificationId::new(guard.next_notification));
        guard.notifications.push(stored.clone());
        Ok(stored)
    }

    async fn list_notifications(
        &self,
        user: UserId,
        limit: u32,
    ) -> Result<Vec<Notification>, StorageError> {
        let guard = self.lock()?;
        let mut out: Vec<Notification> = guard
            .notifications
            .iter()
            .filter(|n| n.user_id == user)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        out.truncate(limit as usize);
        Ok(out)
    }

    async fn mark_read(&self, user: UserId, id: NotificationId) -> Result<bool, StorageError> {
        let mut guard = self.lock()?;
        match guard
            .notifications
            .iter_mut()
            .find(|n| n.id == id && n.user_id == user)
        {
            Some(n) => {
                n.read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_all_read(&self, user: UserId) -> Result<u64, StorageError> {
        let mut guard = self.lock()?;
        let mut changed = 0;
        for n in guard
            .notifications
            .iter_mut()
            .filter(|n| n.user_id == user && !n.read)
        {
            n.read = true;
            changed += 1;
        }
        Ok(changed)
    }

    async fn count_unread(&self, user: UserId) -> Result<u32, StorageError> {
        let count = self
            .lock()?
            .notifications
            .iter()
            .filter(|n| n.user_id == user && !n.read)
            .count();
        u32::try_from(count).map_err(|_| StorageError::Serialization("unread overflow".into()))
    }
}

//
// ─── AGGREGATE ─────────────────────────────────────────────────────────────────
//

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub courses: Arc<dyn CourseRepository>,
    pub users: Arc<dyn UserRepository>,
    pub progress: Arc<dyn ProgressRepository>,
    pub promo_codes: Arc<dyn PromoCodeRepository>,
    pub notifications: Arc<dyn NotificationRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        Self {
            courses: Arc::new(repo.clone()),
            users: Arc::new(repo.clone()),
            progress: Arc::new(repo.clone()),
            promo_codes: Arc::new(repo.clone()),
            notifications: Arc::new(repo),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use course_core::model::{ChapterDraft, CourseDraft, PromoCodeDraft, Role};
    use course_core::time::fixed_now;

    fn course() -> Course {
        let draft = CourseDraft {
            title: "Async Rust".into(),
            chapters: vec![ChapterDraft {
                title: "Futures".into(),
                ..ChapterDraft::default()
            }],
            ..CourseDraft::default()
        };
        Course::new(CourseId::new(0), draft, fixed_now()).unwrap()
    }

    fn user(email: &str) -> User {
        User::new(UserId::new(0), email, "Learner", "hash".into(), Role::User, fixed_now())
            .unwrap()
    }

    #[tokio::test]
    async fn insert_course_assigns_increasing_ids() {
        let repo = InMemoryRepository::new();
        let a = repo.insert_course(&course()).await.unwrap();
        let b = repo.insert_course(&course()).await.unwrap();
        assert_eq!(a, CourseId::new(1));
        assert_eq!(b, CourseId::new(2));
        assert_eq!(repo.get_course(b).await.unwrap().unwrap().id(), b);
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let repo = InMemoryRepository::new();
        repo.insert_user(&user("a@example.com")).await.unwrap();
        assert!(matches!(
            repo.insert_user(&user("a@example.com")).await,
            Err(StorageError::Conflict)
        ));
    }

    #[tokio::test]
    async fn promo_lookup_ignores_case() {
        let repo = InMemoryRepository::new();
        let promo = PromoCode::new(
            PromoCodeId::new(0),
            PromoCodeDraft {
                code: "SPRING".into(),
                discount_percent: 20,
                course_id: None,
                max_uses: None,
                expires_at: None,
                is_active: true,
            },
            fixed_now(),
        )
        .unwrap();
        let id = repo.insert_promo(&promo).await.unwrap();
        let found = repo.find_promo_by_code("spring").await.unwrap().unwrap();
        assert_eq!(found.id(), id);
        assert!(repo.find_promo_by_code("?").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn mark_read_is_scoped_to_owner() {
        let repo = InMemoryRepository::new();
        let n = repo
            .insert_notification(NewNotification {
                user_id: UserId::new(1),
                kind: NotificationKind::System,
                title: "Hi".into(),
                message: "Welcome".into(),
                created_at: fixed_now(),
            })
            .await
            .unwrap();
        assert!(!repo.mark_read(UserId::new(2), n.id).await.unwrap());
        assert_eq!(repo.count_unread(UserId::new(1)).await.unwrap(), 1);
        assert!(repo.mark_read(UserId::new(1), n.id).await.unwrap());
        assert_eq!(repo.count_unread(UserId::new(1)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn deleting_user_drops_their_progress() {
        let repo = InMemoryRepository::new();
        let uid = repo.insert_user(&user("b@example.com")).await.unwrap();
        let cid = repo.insert_course(&course()).await.unwrap();
        repo.upsert_progress(&Progress::new(uid, cid, fixed_now()))
            .await
            .unwrap();
        repo.delete_user(uid).await.unwrap();
        assert!(repo.get_progress(uid, cid).await.unwrap().is_none());
    }
}
