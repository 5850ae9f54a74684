use std::sync::Arc;

use course_core::model::{CourseId, Role, User, UserId};
use storage::repository::{CourseRepository, ProgressRepository, StorageError, UserRepository};

use crate::Clock;
use crate::enrollment::Enrollment;
use crate::error::UserAdminError;

/// Admin management of accounts, roles and course access.
#[derive(Clone)]
pub struct UserAdminService {
    users: Arc<dyn UserRepository>,
    courses: Arc<dyn CourseRepository>,
    enrollment: Enrollment,
}

impl UserAdminService {
    #[must_use]
    pub fn new(
        clock: Clock,
        users: Arc<dyn UserRepository>,
        courses: Arc<dyn CourseRepository>,
        progress: Arc<dyn ProgressRepository>,
    ) -> Self {
        let enrollment = Enrollment::new(clock, Arc::clone(&users), progress);
        Self {
            users,
            courses,
            enrollment,
        }
    }

    /// # Errors
    ///
    /// Returns `UserAdminError::Storage` if repository access fails.
    pub async fn list(&self) -> Result<Vec<User>, UserAdminError> {
        Ok(self.users.list_users().await?)
    }

    /// # Errors
    ///
    /// Returns `UserAdminError::NotFound` for unknown users.
    pub async fn get(&self, id: UserId) -> Result<User, UserAdminError> {
        self.users
            .get_user(id)
            .await?
            .ok_or(UserAdminError::NotFound)
    }

    /// # Errors
    ///
    /// Returns `UserAdminError::NotFound` for unknown users.
    pub async fn set_role(
        &self,
        actor: UserId,
        id: UserId,
        role: Role,
    ) -> Result<User, UserAdminError> {
        let mut user = self.get(id).await?;
        let previous = user.role();
        user.set_role(role);
        self.users.update_user(&user).await?;
        tracing::info!(
            target: "security",
            actor = %actor,
            user = %id,
            from = previous.as_str(),
            to = role.as_str(),
            "role changed"
        );
        Ok(user)
    }

    /// Give a user access to a course. Returns `false` if they already had it.
    ///
    /// # Errors
    ///
    /// Returns `UserAdminError::NotFound` or `UserAdminError::CourseNotFound`
    /// for unknown ids.
    pub async fn assign_course(&self, id: UserId, course: CourseId) -> Result<bool, UserAdminError> {
        let mut user = self.get(id).await?;
        if self.courses.get_course(course).await?.is_none() {
            return Err(UserAdminError::CourseNotFound);
        }
        let granted = self.enrollment.grant(&mut user, course).await?;
        tracing::info!(user = %id, course = %course, granted, "course assigned by admin");
        Ok(granted)
    }

    /// Remove course access and the user's progress on it.
    ///
    /// Returns `false` if the user did not own the course.
    ///
    /// # Errors
    ///
    /// Returns `UserAdminError::NotFound` for unknown users.
    pub async fn unassign_course(
        &self,
        id: UserId,
        course: CourseId,
    ) -> Result<bool, UserAdminError> {
        let mut user = self.get(id).await?;
        let revoked = self.enrollment.revoke(&mut user, course).await?;
        tracing::info!(user = %id, course = %course, revoked, "course unassigned by admin");
        Ok(revoked)
    }

    /// # Errors
    ///
    /// Returns `UserAdminError::CannotDeleteSelf` when `actor == id` and
    /// `UserAdminError::NotFound` for unknown users.
    pub async fn delete(&self, actor: UserId, id: UserId) -> Result<(), UserAdminError> {
        if actor == id {
            return Err(UserAdminError::CannotDeleteSelf);
        }
        match self.users.delete_user(id).await {
            Ok(()) => {
                tracing::info!(target: "security", actor = %actor, user = %id, "user deleted");
                Ok(())
            }
            Err(StorageError::NotFound) => Err(UserAdminError::NotFound),
            Err(e) => Err(e.into()),
        }
    }
}
