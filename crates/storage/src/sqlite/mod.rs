//! `SQLite` backend for every coursehub repository.
//!
//! One pool serves courses, users (with their owned courses and promo
//! redemptions), progress, promo codes and notifications. Each connection
//! enforces foreign keys so deleting a course or user cascades to its
//! progress and notifications.

use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnection, SqlitePoolOptions};
use sqlx::{Executor, SqlitePool};
use thiserror::Error;

use crate::repository::Storage;

mod course_repo;
mod mapping;
mod migrate;
mod notification_repo;
mod progress_repo;
mod promo_repo;
mod user_repo;

const MAX_CONNECTIONS: u32 = 5;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Run on every pooled connection.
const CONNECTION_PRAGMAS: &str = "
    PRAGMA foreign_keys = ON;
    PRAGMA journal_mode = WAL;
    PRAGMA busy_timeout = 5000;
";

#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SqliteInitError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

async fn configure(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    conn.execute(CONNECTION_PRAGMAS).await?;
    Ok(())
}

impl SqliteRepository {
    /// Open a pool on `database_url`, e.g. `sqlite:coursehub.sqlite3?mode=rwc`.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` when the database cannot be opened or a
    /// connection rejects the pragmas.
    pub async fn connect(database_url: &str) -> Result<Self, SqliteInitError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .after_connect(|conn, _meta| Box::pin(configure(conn)))
            .connect(database_url)
            .await?;
        tracing::debug!(database_url, "connected to sqlite");
        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Bring the coursehub schema up to the latest version.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if a migration statement fails.
    pub async fn migrate(&self) -> Result<(), SqliteInitError> {
        migrate::run_migrations(&self.pool).await
    }
}

impl Storage {
    /// Connect, migrate, and share one pool across all repositories.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` from [`SqliteRepository::connect`] or
    /// [`SqliteRepository::migrate`].
    pub async fn sqlite(database_url: &str) -> Result<Self, SqliteInitError> {
        let repo = SqliteRepository::connect(database_url).await?;
        repo.migrate().await?;
        Ok(Self {
            courses: Arc::new(repo.clone()),
            users: Arc::new(repo.clone()),
            progress: Arc::new(repo.clone()),
            promo_codes: Arc::new(repo.clone()),
            notifications: Arc::new(repo),
        })
    }
}
