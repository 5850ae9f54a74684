use std::sync::Arc;

use course_core::model::{CourseId, Progress, User};
use storage::repository::{ProgressRepository, StorageError, UserRepository};

use crate::Clock;

/// Grants and revokes course access, keeping progress records in step.
#[derive(Clone)]
pub(crate) struct Enrollment {
    clock: Clock,
    users: Arc<dyn UserRepository>,
    progress: Arc<dyn ProgressRepository>,
}

impl Enrollment {
    pub(crate) fn new(
        clock: Clock,
        users: Arc<dyn UserRepository>,
        progress: Arc<dyn ProgressRepository>,
    ) -> Self {
        Self {
            clock,
            users,
            progress,
        }
    }

    /// Add `course` to the user's library and create the zero progress record.
    ///
    /// Persists `user` as given, so pending changes such as recorded promo
    /// redemptions are saved together with the grant. Returns whether the
    /// course was newly granted.
    pub(crate) async fn grant(&self, user: &mut User, course: CourseId) -> Result<bool, StorageError> {
        let granted = user.grant_course(course);
        self.users.update_user(user).await?;
        if self.progress.get_progress(user.id(), course).await?.is_none() {
            let record = Progress::new(user.id(), course, self.clock.now());
            self.progress.upsert_progress(&record).await?;
        }
        Ok(granted)
    }

    /// Remove `course` from the library and delete its progress record.
    pub(crate) async fn revoke(&self, user: &mut User, course: CourseId) -> Result<bool, StorageError> {
        let revoked = user.revoke_course(course);
        if revoked {
            self.users.update_user(user).await?;
        }
        self.progress.delete_progress(user.id(), course).await?;
        Ok(revoked)
    }
}
