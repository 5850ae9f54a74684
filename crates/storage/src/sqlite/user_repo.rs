use course_core::model::{CourseId, PromoCodeId, Role, User, UserId, normalize_email};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, Transaction};

use super::SqliteRepository;
use super::mapping::{
    course_id_from_i64, db_err, id_to_i64, promo_id_from_i64, ser, user_id_from_i64,
};
use crate::repository::{StorageError, UserRepository};

async fn write_memberships(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: i64,
    user: &User,
) -> Result<(), StorageError> {
    sqlx::query("DELETE FROM user_courses WHERE user_id = ?1")
        .bind(user_id)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;
    sqlx::query("DELETE FROM user_promo_redemptions WHERE user_id = ?1")
        .bind(user_id)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;

    for course in user.purchased_courses() {
        sqlx::query("INSERT INTO user_courses (user_id, course_id) VALUES (?1, ?2)")
            .bind(user_id)
            .bind(id_to_i64("course_id", course.value())?)
            .execute(&mut **tx)
            .await
            .map_err(db_err)?;
    }
    for code in user.redeemed_promo_codes() {
        sqlx::query("INSERT INTO user_promo_redemptions (user_id, promo_code_id) VALUES (?1, ?2)")
            .bind(user_id)
            .bind(id_to_i64("promo_code_id", code.value())?)
            .execute(&mut **tx)
            .await
            .map_err(db_err)?;
    }
    Ok(())
}

impl SqliteRepository {
    async fn hydrate_user(&self, row: &SqliteRow) -> Result<User, StorageError> {
        let id = row.try_get::<i64, _>("id").map_err(ser)?;

        let course_rows =
            sqlx::query("SELECT course_id FROM user_courses WHERE user_id = ?1 ORDER BY course_id")
                .bind(id)
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;
        let courses = course_rows
            .iter()
            .map(|r| course_id_from_i64(r.try_get::<i64, _>("course_id").map_err(ser)?))
            .collect::<Result<Vec<CourseId>, _>>()?;

        let code_rows = sqlx::query(
            "SELECT promo_code_id FROM user_promo_redemptions WHERE user_id = ?1 ORDER BY promo_code_id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        let codes = code_rows
            .iter()
            .map(|r| promo_id_from_i64(r.try_get::<i64, _>("promo_code_id").map_err(ser)?))
            .collect::<Result<Vec<PromoCodeId>, _>>()?;

        let role: Role = row
            .try_get::<String, _>("role")
            .map_err(ser)?
            .parse()
            .map_err(ser)?;

        Ok(User::from_persisted(
            user_id_from_i64(id)?,
            row.try_get("email").map_err(ser)?,
            row.try_get("name").map_err(ser)?,
            row.try_get("password_hash").map_err(ser)?,
            role,
            courses,
            codes,
            row.try_get("created_at").map_err(ser)?,
        ))
    }
}

#[async_trait::async_trait]
impl UserRepository for SqliteRepository {
    async fn insert_user(&self, user: &User) -> Result<UserId, StorageError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let res = sqlx::query(
            r"
            INSERT INTO users (email, name, password_hash, role, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
        )
        .bind(user.email())
        .bind(user.name())
        .bind(user.password_hash())
        .bind(user.role().as_str())
        .bind(user.created_at())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let id = res.last_insert_rowid();
        write_memberships(&mut tx, id, user).await?;
        tx.commit().await.map_err(db_err)?;
        user_id_from_i64(id)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, StorageError> {
        let row = sqlx::query(
            "SELECT id, email, name, password_hash, role, created_at FROM users WHERE id = ?1",
        )
        .bind(id_to_i64("user_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        match row {
            Some(row) => self.hydrate_user(&row).await.map(Some),
            None => Ok(None),
        }
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StorageError> {
        let Ok(email) = normalize_email(email) else {
            return Ok(None);
        };
        let row = sqlx::query(
            "SELECT id, email, name, password_hash, role, created_at FROM users WHERE email = ?1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        match row {
            Some(row) => self.hydrate_user(&row).await.map(Some),
            None => Ok(None),
        }
    }

    async fn list_users(&self) -> Result<Vec<User>, StorageError> {
        let rows = sqlx::query(
            "SELECT id, email, name, password_hash, role, created_at FROM users ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut users = Vec::with_capacity(rows.len());
        for row in rows {
            users.push(self.hydrate_user(&row).await?);
        }
        Ok(users)
    }

    async fn update_user(&self, user: &User) -> Result<(), StorageError> {
        let id = id_to_i64("user_id", user.id().value())?;
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let res = sqlx::query(
            r"
            UPDATE users
            SET email = ?2, name = ?3, password_hash = ?4, role = ?5
            WHERE id = ?1
            ",
        )
        .bind(id)
        .bind(user.email())
        .bind(user.name())
        .bind(user.password_hash())
        .bind(user.role().as_str())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        write_memberships(&mut tx, id, user).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn delete_user(&self, id: UserId) -> Result<(), StorageError> {
        let res = sqlx::query("DELETE FROM users WHERE id = ?1")
            .bind(id_to_i64("user_id", id.value())?)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}
