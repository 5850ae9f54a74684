use course_core::model::{Notification, NotificationId, NotificationKind, UserId};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use super::SqliteRepository;
use super::mapping::{
    db_err, id_to_i64, notification_id_from_i64, ser, u32_from_i64, user_id_from_i64,
};
use crate::repository::{NewNotification, NotificationRepository, StorageError};

#[async_trait::async_trait]
impl NotificationRepository for SqliteRepository {
    async fn insert_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, StorageError> {
        let res = sqlx::query(
            r"
            INSERT INTO notifications (user_id, kind, title, message, is_read, created_at)
            VALUES (?1, ?2, ?3, ?4, 0, ?5)
            ",
        )
        .bind(id_to_i64("user_id", notification.user_id.value())?)
        .bind(notification.kind.as_str())
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(Notification {
            id: notification_id_from_i64(res.last_insert_rowid())?,
            user_id: notification.user_id,
            kind: notification.kind,
            title: notification.title,
            message: notification.message,
            read: false,
            created_at: notification.created_at,
        })
    }

    async fn list_notifications(
        &self,
        user: UserId,
        limit: u32,
    ) -> Result<Vec<Notification>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, user_id, kind, title, message, is_read, created_at
            FROM notifications
            WHERE user_id = ?1
            ORDER BY created_at DESC, id DESC
            LIMIT ?2
            ",
        )
        .bind(id_to_i64("user_id", user.value())?)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(notification_from_row).collect()
    }

    async fn mark_read(&self, user: UserId, id: NotificationId) -> Result<bool, StorageError> {
        let res = sqlx::query("UPDATE notifications SET is_read = 1 WHERE id = ?1 AND user_id = ?2")
            .bind(id_to_i64("notification_id", id.value())?)
            .bind(id_to_i64("user_id", user.value())?)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(res.rows_affected() > 0)
    }

    async fn mark_all_read(&self, user: UserId) -> Result<u64, StorageError> {
        let res =
            sqlx::query("UPDATE notifications SET is_read = 1 WHERE user_id = ?1 AND is_read = 0")
                .bind(id_to_i64("user_id", user.value())?)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(res.rows_affected())
    }

    async fn count_unread(&self, user: UserId) -> Result<u32, StorageError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS unread FROM notifications WHERE user_id = ?1 AND is_read = 0",
        )
        .bind(id_to_i64("user_id", user.value())?)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        u32_from_i64("unread", row.try_get::<i64, _>("unread").map_err(ser)?)
    }
}

fn notification_from_row(row: &SqliteRow) -> Result<Notification, StorageError> {
    let kind: NotificationKind = row
        .try_get::<String, _>("kind")
        .map_err(ser)?
        .parse()
        .map_err(StorageError::Serialization)?;

    Ok(Notification {
        id: notification_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        user_id: user_id_from_i64(row.try_get::<i64, _>("user_id").map_err(ser)?)?,
        kind,
        title: row.try_get("title").map_err(ser)?,
        message: row.try_get("message").map_err(ser)?,
        read: row.try_get::<i64, _>("is_read").map_err(ser)? != 0,
        created_at: row.try_get("created_at").map_err(ser)?,
    })
}
