use chrono::{DateTime, Utc};
use course_core::model::{
    Certificate, CertificateId, ChapterId, CourseId, Progress, QuizResult, UserId,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use super::SqliteRepository;
use super::mapping::{
    bool_to_i64, course_id_from_i64, db_err, from_json_lenient, id_to_i64, ser, to_json,
    u8_from_i64, user_id_from_i64,
};
use crate::repository::{ProgressRepository, StorageError};

const PROGRESS_COLUMNS: &str = r"
    user_id, course_id, completed_chapters, quiz_results, completion_percentage,
    is_completed, certificate_id, certificate_issued_at, certificate_url,
    started_at, last_accessed_at, completed_at
";

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn get_progress(
        &self,
        user: UserId,
        course: CourseId,
    ) -> Result<Option<Progress>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {PROGRESS_COLUMNS} FROM progress WHERE user_id = ?1 AND course_id = ?2"
        ))
        .bind(id_to_i64("user_id", user.value())?)
        .bind(id_to_i64("course_id", course.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(progress_from_row).transpose()
    }

    async fn upsert_progress(&self, progress: &Progress) -> Result<(), StorageError> {
        let chapters: Vec<ChapterId> = progress.completed_chapters().iter().copied().collect();
        let results: Vec<&QuizResult> = progress.quiz_results().collect();
        let certificate = progress.certificate();

        sqlx::query(
            r"
            INSERT INTO progress (
                user_id, course_id, completed_chapters, quiz_results, completion_percentage,
                is_completed, certificate_id, certificate_issued_at, certificate_url,
                started_at, last_accessed_at, completed_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(user_id, course_id) DO UPDATE SET
                completed_chapters = excluded.completed_chapters,
                quiz_results = excluded.quiz_results,
                completion_percentage = excluded.completion_percentage,
                is_completed = excluded.is_completed,
                certificate_id = excluded.certificate_id,
                certificate_issued_at = excluded.certificate_issued_at,
                certificate_url = excluded.certificate_url,
                last_accessed_at = excluded.last_accessed_at,
                completed_at = excluded.completed_at
            ",
        )
        .bind(id_to_i64("user_id", progress.user_id().value())?)
        .bind(id_to_i64("course_id", progress.course_id().value())?)
        .bind(to_json(&chapters)?)
        .bind(to_json(&results)?)
        .bind(i64::from(progress.completion_percentage()))
        .bind(bool_to_i64(progress.is_completed()))
        .bind(certificate.map(|c| c.id.to_string()))
        .bind(certificate.map(|c| c.issued_at))
        .bind(certificate.map(|c| c.url.clone()))
        .bind(progress.started_at())
        .bind(progress.last_accessed_at())
        .bind(progress.completed_at())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn list_progress_for_user(&self, user: UserId) -> Result<Vec<Progress>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {PROGRESS_COLUMNS} FROM progress WHERE user_id = ?1 ORDER BY course_id ASC"
        ))
        .bind(id_to_i64("user_id", user.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(progress_from_row).collect()
    }

    async fn find_by_certificate(
        &self,
        certificate: CertificateId,
    ) -> Result<Option<Progress>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {PROGRESS_COLUMNS} FROM progress WHERE certificate_id = ?1"
        ))
        .bind(certificate.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(progress_from_row).transpose()
    }

    async fn delete_progress(&self, user: UserId, course: CourseId) -> Result<bool, StorageError> {
        let res = sqlx::query("DELETE FROM progress WHERE user_id = ?1 AND course_id = ?2")
            .bind(id_to_i64("user_id", user.value())?)
            .bind(id_to_i64("course_id", course.value())?)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(res.rows_affected() > 0)
    }

    async fn delete_progress_for_course(&self, course: CourseId) -> Result<u64, StorageError> {
        let res = sqlx::query("DELETE FROM progress WHERE course_id = ?1")
            .bind(id_to_i64("course_id", course.value())?)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(res.rows_affected())
    }
}

fn certificate_from_row(row: &SqliteRow) -> Result<Option<Certificate>, StorageError> {
    let Some(raw_id) = row.try_get::<Option<String>, _>("certificate_id").map_err(ser)? else {
        return Ok(None);
    };
    let id: CertificateId = raw_id.parse().map_err(ser)?;
    let issued_at: Option<DateTime<Utc>> = row.try_get("certificate_issued_at").map_err(ser)?;
    let url: Option<String> = row.try_get("certificate_url").map_err(ser)?;
    match (issued_at, url) {
        (Some(issued_at), Some(url)) => Ok(Some(Certificate { id, issued_at, url })),
        _ => Err(StorageError::Serialization(format!(
            "certificate {id} is missing issue data"
        ))),
    }
}

fn progress_from_row(row: &SqliteRow) -> Result<Progress, StorageError> {
    let chapters: Vec<ChapterId> = from_json_lenient(
        "completed_chapters",
        row.try_get("completed_chapters").map_err(ser)?,
    );
    let results: Vec<QuizResult> =
        from_json_lenient("quiz_results", row.try_get("quiz_results").map_err(ser)?);

    Ok(Progress::from_persisted(
        user_id_from_i64(row.try_get::<i64, _>("user_id").map_err(ser)?)?,
        course_id_from_i64(row.try_get::<i64, _>("course_id").map_err(ser)?)?,
        chapters,
        results,
        u8_from_i64(
            "completion_percentage",
            row.try_get::<i64, _>("completion_percentage").map_err(ser)?,
        )?,
        row.try_get::<i64, _>("is_completed").map_err(ser)? != 0,
        certificate_from_row(row)?,
        row.try_get("started_at").map_err(ser)?,
        row.try_get("last_accessed_at").map_err(ser)?,
        row.try_get("completed_at").map_err(ser)?,
    ))
}
