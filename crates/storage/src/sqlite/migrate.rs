use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs the versioned migrations for the current schema.
///
/// Version 1 creates courses, users with their owned courses and promo
/// redemptions, progress, promo codes, notifications, and indexes.
#[allow(clippy::too_many_lines)]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    if is_applied(pool, 1).await? {
        return Ok(());
    }

    let mut tx = pool.begin().await?;

    let statements = [
        r"
            CREATE TABLE IF NOT EXISTS courses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                price_cents INTEGER NOT NULL CHECK (price_cents >= 0),
                category TEXT NOT NULL DEFAULT '',
                level TEXT NOT NULL,
                instructor TEXT NOT NULL DEFAULT '',
                thumbnail_url TEXT,
                published INTEGER NOT NULL DEFAULT 0,
                chapters TEXT NOT NULL DEFAULT '[]',
                quizzes TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
        ",
        r"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
        ",
        r"
            CREATE TABLE IF NOT EXISTS user_courses (
                user_id INTEGER NOT NULL,
                course_id INTEGER NOT NULL,
                PRIMARY KEY (user_id, course_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE
            );
        ",
        r"
            CREATE TABLE IF NOT EXISTS promo_codes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                code TEXT NOT NULL UNIQUE,
                discount_percent INTEGER NOT NULL CHECK (discount_percent BETWEEN 1 AND 100),
                course_id INTEGER,
                max_uses INTEGER CHECK (max_uses IS NULL OR max_uses > 0),
                current_uses INTEGER NOT NULL DEFAULT 0 CHECK (current_uses >= 0),
                expires_at TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE
            );
        ",
        r"
            CREATE TABLE IF NOT EXISTS user_promo_redemptions (
                user_id INTEGER NOT NULL,
                promo_code_id INTEGER NOT NULL,
                PRIMARY KEY (user_id, promo_code_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (promo_code_id) REFERENCES promo_codes(id) ON DELETE CASCADE
            );
        ",
        r"
            CREATE TABLE IF NOT EXISTS progress (
                user_id INTEGER NOT NULL,
                course_id INTEGER NOT NULL,
                completed_chapters TEXT,
                quiz_results TEXT,
                completion_percentage INTEGER NOT NULL DEFAULT 0
                    CHECK (completion_percentage BETWEEN 0 AND 100),
                is_completed INTEGER NOT NULL DEFAULT 0,
                certificate_id TEXT UNIQUE,
                certificate_issued_at TEXT,
                certificate_url TEXT,
                started_at TEXT NOT NULL,
                last_accessed_at TEXT NOT NULL,
                completed_at TEXT,
                PRIMARY KEY (user_id, course_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE
            );
        ",
        r"
            CREATE TABLE IF NOT EXISTS notifications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                kind TEXT NOT NULL,
                title TEXT NOT NULL,
                message TEXT NOT NULL,
                is_read INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
        ",
        r"
            CREATE INDEX IF NOT EXISTS idx_courses_published
                ON courses(published, id);
        ",
        r"
            CREATE INDEX IF NOT EXISTS idx_progress_course
                ON progress(course_id);
        ",
        r"
            CREATE INDEX IF NOT EXISTS idx_notifications_user_created
                ON notifications(user_id, created_at);
        ",
    ];

    for statement in statements {
        sqlx::query(statement).execute(&mut *tx).await?;
    }

    sqlx::query(
        r"
            INSERT INTO schema_migrations (version, applied_at)
            VALUES (?1, ?2)
            ON CONFLICT(version) DO NOTHING
        ",
    )
    .bind(1_i64)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    tracing::info!(version = 1, "applied sqlite migration");

    Ok(())
}
