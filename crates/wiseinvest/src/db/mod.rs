//! Database module for conversation persistence.
//!
//! A single SQLite database holds users, conversations and their messages.
//! The schema is applied idempotently on every open, and the demo user that
//! the mobile client expects (id 1) is seeded when missing.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Upper bound on pooled connections, whatever the configuration asks for.
pub const MAX_POOL_CONNECTIONS: u32 = 100;

/// Schema for the conversation database.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT UNIQUE NOT NULL,
    display_name TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS conversations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id),
    agent_type TEXT NOT NULL,
    title TEXT NOT NULL DEFAULT '',
    metadata TEXT NOT NULL DEFAULT '{}',
    status TEXT NOT NULL DEFAULT 'active' CHECK(status IN ('active', 'archived', 'deleted')),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_conversations_user ON conversations(user_id, status, updated_at);

CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    conversation_id INTEGER NOT NULL REFERENCES conversations(id),
    role TEXT NOT NULL CHECK(role IN ('user', 'assistant', 'system')),
    content TEXT NOT NULL,
    metadata TEXT,
    prompt_tokens INTEGER,
    completion_tokens INTEGER,
    total_tokens INTEGER,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, created_at);
"#;

/// Id of the seeded demo user.
pub const DEMO_USER_ID: i64 = 1;

/// Database connection pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the database at `path`.
    ///
    /// `max_connections` is clamped to [`MAX_POOL_CONNECTIONS`].
    pub async fn new(path: &Path, max_connections: u32) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating database directory: {}", parent.display()))?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .context("parsing database URL")?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.clamp(1, MAX_POOL_CONNECTIONS))
            .connect_with(options)
            .await
            .with_context(|| format!("connecting to database: {}", path.display()))?;

        let db = Self { pool };
        db.initialize_schema().await?;
        db.seed_default_data().await?;

        Ok(db)
    }

    /// Create an in-memory database (for testing).
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .context("parsing in-memory database URL")?
            .foreign_keys(true);

        // A single connection keeps every query on the same in-memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("connecting to in-memory database")?;

        let db = Self { pool };
        db.initialize_schema().await?;
        db.seed_default_data().await?;

        Ok(db)
    }

    async fn initialize_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .context("initializing database schema")?;
        Ok(())
    }

    /// Insert the demo user if it does not exist yet.
    async fn seed_default_data(&self) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO users (id, username, display_name, created_at)
            VALUES (?, 'demo_user', 'Demo User', ?)
            "#,
        )
        .bind(DEMO_USER_ID)
        .bind(crate::timestamp())
        .execute(&self.pool)
        .await
        .context("seeding default user")?;
        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Check if the database is healthy.
    pub async fn is_healthy(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_create_and_open() {
        let temp = TempDir::new().unwrap();
        let db_path = temp.path().join("nested").join("wiseinvest.db");

        let db = Database::new(&db_path, 4).await.unwrap();
        assert!(db.is_healthy().await);
        assert!(db_path.exists());

        db.close().await;
    }

    #[tokio::test]
    async fn test_reopen_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let db_path = temp.path().join("wiseinvest.db");

        Database::new(&db_path, 2).await.unwrap().close().await;
        let db = Database::new(&db_path, 2).await.unwrap();

        let users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(users, 1);
    }

    #[tokio::test]
    async fn test_demo_user_seeded() {
        let db = Database::in_memory().await.unwrap();
        let username: String = sqlx::query_scalar("SELECT username FROM users WHERE id = ?")
            .bind(DEMO_USER_ID)
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(username, "demo_user");
    }

    #[tokio::test]
    async fn test_messages_require_conversation() {
        let db = Database::in_memory().await.unwrap();
        let result = sqlx::query(
            "INSERT INTO messages (conversation_id, role, content, created_at) VALUES (42, 'user', 'hi', 'now')",
        )
        .execute(db.pool())
        .await;
        assert!(result.is_err());
    }
}
