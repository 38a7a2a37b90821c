//! Conversation database repository.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use sqlx::SqlitePool;

use super::ConversationStore;
use super::models::{Conversation, ConversationRow, ConversationStatus};

const CONVERSATION_COLUMNS: &str =
    "id, user_id, title, agent_type, metadata, status, created_at, updated_at";

/// Repository for conversation persistence.
#[derive(Debug, Clone)]
pub struct ConversationRepository {
    pool: SqlitePool,
}

impl ConversationRepository {
    /// Create a new repository.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationStore for ConversationRepository {
    async fn create(&self, user_id: i64, agent_type: &str, title: &str) -> Result<Conversation> {
        let now = crate::timestamp();
        let inserted = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO conversations (user_id, agent_type, title, metadata, status, created_at, updated_at)
            VALUES (?, ?, ?, '{}', ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(agent_type)
        .bind(title)
        .bind(ConversationStatus::Active.as_str())
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await;

        let id = match inserted {
            Err(sqlx::Error::Database(e)) if e.is_foreign_key_violation() => {
                bail!("user {} not found", user_id)
            }
            other => other.context("creating conversation")?,
        };

        self.get(id)
            .await?
            .with_context(|| format!("conversation {} vanished after insert", id))
    }

    async fn get(&self, id: i64) -> Result<Option<Conversation>> {
        let row = sqlx::query_as::<_, ConversationRow>(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("fetching conversation")?;

        row.map(Conversation::try_from).transpose()
    }

    async fn list_by_user(&self, user_id: i64) -> Result<Vec<Conversation>> {
        let rows = sqlx::query_as::<_, ConversationRow>(&format!(
            r#"
            SELECT {CONVERSATION_COLUMNS}
            FROM conversations
            WHERE user_id = ? AND status != ?
            ORDER BY updated_at DESC, id DESC
            "#
        ))
        .bind(user_id)
        .bind(ConversationStatus::Deleted.as_str())
        .fetch_all(&self.pool)
        .await
        .context("listing conversations")?;

        rows.into_iter().map(Conversation::try_from).collect()
    }

    async fn update_title(&self, id: i64, title: &str) -> Result<()> {
        sqlx::query("UPDATE conversations SET title = ?, updated_at = ? WHERE id = ?")
            .bind(title)
            .bind(crate::timestamp())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("updating conversation")?;

        Ok(())
    }

    async fn soft_delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE conversations SET status = ?, updated_at = ? WHERE id = ?")
            .bind(ConversationStatus::Deleted.as_str())
            .bind(crate::timestamp())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("deleting conversation")?;

        Ok(result.rows_affected() > 0)
    }
}
