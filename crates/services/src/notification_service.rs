use std::sync::Arc;

use course_core::model::{Notification, NotificationId, NotificationKind, UserId};
use storage::repository::{NewNotification, NotificationRepository};

use crate::Clock;
use crate::error::NotificationError;

/// Page size used when the caller gives none.
pub const DEFAULT_NOTIFICATION_LIMIT: u32 = 50;
const MAX_NOTIFICATION_LIMIT: u32 = 200;

/// In-app notification inbox.
#[derive(Clone)]
pub struct NotificationService {
    clock: Clock,
    notifications: Arc<dyn NotificationRepository>,
}

impl NotificationService {
    #[must_use]
    pub fn new(clock: Clock, notifications: Arc<dyn NotificationRepository>) -> Self {
        Self {
            clock,
            notifications,
        }
    }

    /// Newest notifications first. The limit is clamped to `1..=200`.
    ///
    /// # Errors
    ///
    /// Returns `NotificationError::Storage` if repository access fails.
    pub async fn list(
        &self,
        user: UserId,
        limit: Option<u32>,
    ) -> Result<Vec<Notification>, NotificationError> {
        let limit = limit
            .unwrap_or(DEFAULT_NOTIFICATION_LIMIT)
            .clamp(1, MAX_NOTIFICATION_LIMIT);
        Ok(self.notifications.list_notifications(user, limit).await?)
    }

    /// # Errors
    ///
    /// Returns `NotificationError::Storage` if repository access fails.
    pub async fn unread_count(&self, user: UserId) -> Result<u32, NotificationError> {
        Ok(self.notifications.count_unread(user).await?)
    }

    /// Mark one of the user's notifications read.
    ///
    /// # Errors
    ///
    /// Returns `NotificationError::NotFound` when the notification does not
    /// exist or belongs to someone else.
    pub async fn mark_read(
        &self,
        user: UserId,
        id: NotificationId,
    ) -> Result<(), NotificationError> {
        if self.notifications.mark_read(user, id).await? {
            Ok(())
        } else {
            Err(NotificationError::NotFound)
        }
    }

    /// Returns how many notifications changed.
    ///
    /// # Errors
    ///
    /// Returns `NotificationError::Storage` if repository access fails.
    pub async fn mark_all_read(&self, user: UserId) -> Result<u64, NotificationError> {
        Ok(self.notifications.mark_all_read(user).await?)
    }

    /// Deliver a notification to one user.
    ///
    /// # Errors
    ///
    /// Returns `NotificationError::Storage` if the notification cannot be stored.
    pub async fn notify(
        &self,
        user: UserId,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<Notification, NotificationError> {
        let notification = self
            .notifications
            .insert_notification(NewNotification {
                user_id: user,
                kind,
                title: title.into(),
                message: message.into(),
                created_at: self.clock.now(),
            })
            .await?;
        tracing::debug!(user = %user, kind = kind.as_str(), "notification stored");
        Ok(notification)
    }

    /// Like [`Self::notify`], but a failure is logged instead of returned.
    ///
    /// Used after the primary state change has already been persisted.
    pub(crate) async fn notify_best_effort(
        &self,
        user: UserId,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) {
        if let Err(error) = self.notify(user, kind, title, message).await {
            tracing::warn!(user = %user, kind = kind.as_str(), %error, "failed to store notification");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use course_core::time::fixed_clock;
    use storage::repository::InMemoryRepository;

    fn service() -> NotificationService {
        NotificationService::new(fixed_clock(), Arc::new(InMemoryRepository::new()))
    }

    #[tokio::test]
    async fn mark_read_rejects_foreign_notifications() {
        let service = service();
        let owner = UserId::new(1);
        let n = service
            .notify(owner, NotificationKind::System, "Welcome", "Hello there")
            .await
            .unwrap();

        let err = service.mark_read(UserId::new(2), n.id).await.unwrap_err();
        assert!(matches!(err, NotificationError::NotFound));
        service.mark_read(owner, n.id).await.unwrap();
        assert_eq!(service.unread_count(owner).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn list_clamps_zero_limit_to_one() {
        let service = service();
        let owner = UserId::new(1);
        for i in 0..3 {
            service
                .notify(owner, NotificationKind::Promo, format!("n{i}"), "body")
                .await
                .unwrap();
        }
        assert_eq!(service.list(owner, Some(0)).await.unwrap().len(), 1);
        assert_eq!(service.list(owner, None).await.unwrap().len(), 3);
        assert_eq!(service.mark_all_read(owner).await.unwrap(), 3);
    }
}
