use course_core::model::{PromoCode, PromoCodeDraft, PromoCodeId, normalize_code};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use super::SqliteRepository;
use super::mapping::{
    bool_to_i64, course_id_from_i64, db_err, id_to_i64, promo_id_from_i64, ser, u8_from_i64,
    u32_from_i64,
};
use crate::repository::{PromoCodeRepository, StorageError};

const PROMO_COLUMNS: &str = r"
    id, code, discount_percent, course_id, max_uses, current_uses, expires_at,
    is_active, created_at
";

fn optional_course(promo: &PromoCode) -> Result<Option<i64>, StorageError> {
    promo
        .course_id()
        .map(|c| id_to_i64("course_id", c.value()))
        .transpose()
}

#[async_trait::async_trait]
impl PromoCodeRepository for SqliteRepository {
    async fn insert_promo(&self, promo: &PromoCode) -> Result<PromoCodeId, StorageError> {
        let res = sqlx::query(
            r"
            INSERT INTO promo_codes (
                code, discount_percent, course_id, max_uses, current_uses,
                expires_at, is_active, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
        )
        .bind(promo.code())
        .bind(i64::from(promo.discount_percent()))
        .bind(optional_course(promo)?)
        .bind(promo.max_uses().map(i64::from))
        .bind(i64::from(promo.current_uses()))
        .bind(promo.expires_at())
        .bind(bool_to_i64(promo.is_active()))
        .bind(promo.created_at())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        promo_id_from_i64(res.last_insert_rowid())
    }

    async fn get_promo(&self, id: PromoCodeId) -> Result<Option<PromoCode>, StorageError> {
        let row = sqlx::query(&format!("SELECT {PROMO_COLUMNS} FROM promo_codes WHERE id = ?1"))
            .bind(id_to_i64("promo_code_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.as_ref().map(promo_from_row).transpose()
    }

    async fn find_promo_by_code(&self, code: &str) -> Result<Option<PromoCode>, StorageError> {
        let Ok(code) = normalize_code(code) else {
            return Ok(None);
        };
        let row = sqlx::query(&format!(
            "SELECT {PROMO_COLUMNS} FROM promo_codes WHERE code = ?1"
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(promo_from_row).transpose()
    }

    async fn list_promos(&self) -> Result<Vec<PromoCode>, StorageError> {
        let rows = sqlx::query(&format!("SELECT {PROMO_COLUMNS} FROM promo_codes ORDER BY id ASC"))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.iter().map(promo_from_row).collect()
    }

    async fn update_promo(&self, promo: &PromoCode) -> Result<(), StorageError> {
        let res = sqlx::query(
            r"
            UPDATE promo_codes
            SET code = ?2, discount_percent = ?3, course_id = ?4, max_uses = ?5,
                current_uses = ?6, expires_at = ?7, is_active = ?8
            WHERE id = ?1
            ",
        )
        .bind(id_to_i64("promo_code_id", promo.id().value())?)
        .bind(promo.code())
        .bind(i64::from(promo.discount_percent()))
        .bind(optional_course(promo)?)
        .bind(promo.max_uses().map(i64::from))
        .bind(i64::from(promo.current_uses()))
        .bind(promo.expires_at())
        .bind(bool_to_i64(promo.is_active()))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn delete_promo(&self, id: PromoCodeId) -> Result<(), StorageError> {
        let res = sqlx::query("DELETE FROM promo_codes WHERE id = ?1")
            .bind(id_to_i64("promo_code_id", id.value())?)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}

fn promo_from_row(row: &SqliteRow) -> Result<PromoCode, StorageError> {
    let course_id = row
        .try_get::<Option<i64>, _>("course_id")
        .map_err(ser)?
        .map(course_id_from_i64)
        .transpose()?;
    let max_uses = row
        .try_get::<Option<i64>, _>("max_uses")
        .map_err(ser)?
        .map(|v| u32_from_i64("max_uses", v))
        .transpose()?;

    let draft = PromoCodeDraft {
        code: row.try_get("code").map_err(ser)?,
        discount_percent: u8_from_i64(
            "discount_percent",
            row.try_get::<i64, _>("discount_percent").map_err(ser)?,
        )?,
        course_id,
        max_uses,
        expires_at: row.try_get("expires_at").map_err(ser)?,
        is_active: row.try_get::<i64, _>("is_active").map_err(ser)? != 0,
    };

    PromoCode::from_persisted(
        promo_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        draft,
        u32_from_i64(
            "current_uses",
            row.try_get::<i64, _>("current_uses").map_err(ser)?,
        )?,
        row.try_get("created_at").map_err(ser)?,
    )
    .map_err(ser)
}
