//! Database lifecycle and schema migrations.

use crate::error::DatabaseError;
use crate::{Error, Result};
use sqlx::SqliteConnection;
use sqlx::sqlite::SqlitePool;
use std::path::Path;

use super::Database;

impl Database {
    /// Create a new database connection
    ///
    /// Creates the database file if it doesn't exist and runs migrations.
    pub async fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "Failed to create database directory: {}",
                    e
                )))
            })?;
        }

        use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
        use std::str::FromStr;

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "Failed to parse database path: {}",
                    e
                )))
            })?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePool::connect_with(options).await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to connect to database: {}",
                e
            )))
        })?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to acquire connection: {}",
                e
            )))
        })?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::MigrationFailed(format!(
                "Failed to create schema_version table: {}",
                e
            )))
        })?;

        let current_version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
                .fetch_optional(&mut *conn)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to query schema version: {}",
                        e
                    )))
                })?
                .flatten();

        if current_version.unwrap_or(0) < 1 {
            Self::migrate_v1(&mut conn).await?;
        }

        Ok(())
    }

    /// Migration v1: Create initial schema
    async fn migrate_v1(conn: &mut SqliteConnection) -> Result<()> {
        tracing::info!("Applying database migration v1");

        // Partial failures must not leave a half-created schema behind
        sqlx::query("BEGIN")
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::MigrationFailed(format!(
                    "Failed to begin transaction: {}",
                    e
                )))
            })?;

        let result = async {
            Self::create_queue_schema(conn).await?;
            Self::create_snapshots_table(conn).await?;
            Self::create_index_schema(conn).await?;
            Self::create_runtime_state_tables(conn).await?;
            Self::record_migration(conn, 1).await?;
            Ok::<(), Error>(())
        }
        .await;

        match result {
            Ok(()) => {
                sqlx::query("COMMIT")
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| {
                        Error::Database(DatabaseError::MigrationFailed(format!(
                            "Failed to commit migration v1: {}",
                            e
                        )))
                    })?;
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                return Err(e);
            }
        }

        tracing::info!("Database migration v1 complete");
        Ok(())
    }

    async fn exec_ddl(conn: &mut SqliteConnection, sql: &str, what: &str) -> Result<()> {
        sqlx::query(sql).execute(&mut *conn).await.map_err(|e| {
            Error::Database(DatabaseError::MigrationFailed(format!(
                "Failed to create {}: {}",
                what, e
            )))
        })?;
        Ok(())
    }

    /// Create queue table and its indexes
    async fn create_queue_schema(conn: &mut SqliteConnection) -> Result<()> {
        Self::exec_ddl(
            conn,
            r#"
            CREATE TABLE queue (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                parent_id TEXT NOT NULL,
                parent_title TEXT NOT NULL,
                parent_image TEXT NOT NULL,
                label TEXT NOT NULL,
                page_addresses TEXT NOT NULL DEFAULT '[]',
                pages_completed INTEGER NOT NULL DEFAULT 0,
                status INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                last_error TEXT
            )
            "#,
            "queue table",
        )
        .await?;

        Self::exec_ddl(
            conn,
            "CREATE INDEX idx_queue_status ON queue(status, seq)",
            "queue status index",
        )
        .await
    }

    /// Create resume_snapshots table
    async fn create_snapshots_table(conn: &mut SqliteConnection) -> Result<()> {
        Self::exec_ddl(
            conn,
            r#"
            CREATE TABLE resume_snapshots (
                local_path TEXT PRIMARY KEY,
                snapshot TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
            "resume_snapshots table",
        )
        .await
    }

    /// Create download_index table and its indexes
    async fn create_index_schema(conn: &mut SqliteConnection) -> Result<()> {
        Self::exec_ddl(
            conn,
            r#"
            CREATE TABLE download_index (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                parent_id TEXT NOT NULL,
                parent_title TEXT NOT NULL,
                parent_image TEXT NOT NULL,
                label TEXT NOT NULL,
                local_artifacts TEXT NOT NULL,
                page_count INTEGER NOT NULL,
                completed_at INTEGER NOT NULL
            )
            "#,
            "download_index table",
        )
        .await?;

        Self::exec_ddl(
            conn,
            "CREATE INDEX idx_download_index_parent ON download_index(parent_id)",
            "download_index parent index",
        )
        .await
    }

    /// Create runtime_state and drain_lease tables
    async fn create_runtime_state_tables(conn: &mut SqliteConnection) -> Result<()> {
        Self::exec_ddl(
            conn,
            r#"
            CREATE TABLE runtime_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
            "runtime_state table",
        )
        .await?;

        Self::exec_ddl(
            conn,
            r#"
            CREATE TABLE drain_lease (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                owner TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            )
            "#,
            "drain_lease table",
        )
        .await
    }

    /// Record a migration version
    async fn record_migration(conn: &mut SqliteConnection, version: i64) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES (?, ?)")
            .bind(version)
            .bind(now)
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::MigrationFailed(format!(
                    "Failed to record migration v{}: {}",
                    version, e
                )))
            })?;
        Ok(())
    }

    /// Close the database connection
    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Get the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
