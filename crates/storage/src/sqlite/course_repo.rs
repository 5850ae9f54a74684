use course_core::model::{ChapterDraft, Course, CourseDraft, CourseId, CourseLevel, QuizDraft};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use super::SqliteRepository;
use super::mapping::{bool_to_i64, course_id_from_i64, db_err, from_json, id_to_i64, ser, to_json};
use crate::repository::{CourseRepository, StorageError};

const COURSE_COLUMNS: &str = r"
    id, title, description, price_cents, category, level, instructor, thumbnail_url,
    published, chapters, quizzes, created_at, updated_at
";

struct CourseRow {
    title: String,
    description: String,
    price_cents: i64,
    category: String,
    level: &'static str,
    instructor: String,
    thumbnail_url: Option<String>,
    published: i64,
    chapters: String,
    quizzes: String,
}

impl CourseRow {
    fn encode(course: &Course) -> Result<Self, StorageError> {
        let draft = course.to_draft();
        Ok(Self {
            title: draft.title,
            description: draft.description,
            price_cents: i64::try_from(draft.price_cents)
                .map_err(|_| StorageError::Serialization("price_cents overflow".into()))?,
            category: draft.category,
            level: draft.level.as_str(),
            instructor: draft.instructor,
            thumbnail_url: draft.thumbnail_url,
            published: bool_to_i64(draft.published),
            chapters: to_json(&draft.chapters)?,
            quizzes: to_json(&draft.quizzes)?,
        })
    }
}

#[async_trait::async_trait]
impl CourseRepository for SqliteRepository {
    async fn insert_course(&self, course: &Course) -> Result<CourseId, StorageError> {
        let row = CourseRow::encode(course)?;
        let res = sqlx::query(
            r"
            INSERT INTO courses (
                title, description, price_cents, category, level, instructor,
                thumbnail_url, published, chapters, quizzes, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ",
        )
        .bind(row.title)
        .bind(row.description)
        .bind(row.price_cents)
        .bind(row.category)
        .bind(row.level)
        .bind(row.instructor)
        .bind(row.thumbnail_url)
        .bind(row.published)
        .bind(row.chapters)
        .bind(row.quizzes)
        .bind(course.created_at())
        .bind(course.updated_at())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        course_id_from_i64(res.last_insert_rowid())
    }

    async fn upsert_course(&self, course: &Course) -> Result<(), StorageError> {
        let row = CourseRow::encode(course)?;
        sqlx::query(
            r"
            INSERT INTO courses (
                id, title, description, price_cents, category, level, instructor,
                thumbnail_url, published, chapters, quizzes, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                price_cents = excluded.price_cents,
                category = excluded.category,
                level = excluded.level,
                instructor = excluded.instructor,
                thumbnail_url = excluded.thumbnail_url,
                published = excluded.published,
                chapters = excluded.chapters,
                quizzes = excluded.quizzes,
                updated_at = excluded.updated_at
            ",
        )
        .bind(id_to_i64("course_id", course.id().value())?)
        .bind(row.title)
        .bind(row.description)
        .bind(row.price_cents)
        .bind(row.category)
        .bind(row.level)
        .bind(row.instructor)
        .bind(row.thumbnail_url)
        .bind(row.published)
        .bind(row.chapters)
        .bind(row.quizzes)
        .bind(course.created_at())
        .bind(course.updated_at())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn get_course(&self, id: CourseId) -> Result<Option<Course>, StorageError> {
        let row = sqlx::query(&format!("SELECT {COURSE_COLUMNS} FROM courses WHERE id = ?1"))
            .bind(id_to_i64("course_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.as_ref().map(course_from_row).transpose()
    }

    async fn list_courses(&self, published_only: bool) -> Result<Vec<Course>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {COURSE_COLUMNS} FROM courses WHERE (?1 = 0 OR published = 1) ORDER BY id ASC"
        ))
        .bind(bool_to_i64(published_only))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(course_from_row).collect()
    }

    async fn delete_course(&self, id: CourseId) -> Result<(), StorageError> {
        let res = sqlx::query("DELETE FROM courses WHERE id = ?1")
            .bind(id_to_i64("course_id", id.value())?)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}

fn course_from_row(row: &SqliteRow) -> Result<Course, StorageError> {
    let level: CourseLevel = row
        .try_get::<String, _>("level")
        .map_err(ser)?
        .parse()
        .map_err(ser)?;
    let chapters: Vec<ChapterDraft> =
        from_json(row.try_get::<Option<String>, _>("chapters").map_err(ser)?)?;
    let quizzes: Vec<QuizDraft> =
        from_json(row.try_get::<Option<String>, _>("quizzes").map_err(ser)?)?;

    let draft = CourseDraft {
        title: row.try_get("title").map_err(ser)?,
        description: row.try_get("description").map_err(ser)?,
        price_cents: u64::try_from(row.try_get::<i64, _>("price_cents").map_err(ser)?)
            .map_err(|_| StorageError::Serialization("price_cents sign overflow".into()))?,
        category: row.try_get("category").map_err(ser)?,
        level,
        instructor: row.try_get("instructor").map_err(ser)?,
        thumbnail_url: row.try_get("thumbnail_url").map_err(ser)?,
        published: row.try_get::<i64, _>("published").map_err(ser)? != 0,
        chapters,
        quizzes,
    };

    Course::from_persisted(
        course_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        draft,
        row.try_get("created_at").map_err(ser)?,
        row.try_get("updated_at").map_err(ser)?,
    )
    .map_err(ser)
}
