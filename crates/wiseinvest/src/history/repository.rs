//! SQLite-backed message log.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::SqlitePool;

use super::HistoryStore;
use super::models::{Message, MessageRow, NewMessage};

const MESSAGE_COLUMNS: &str = "id, conversation_id, role, content, metadata, prompt_tokens, completion_tokens, total_tokens, created_at";

/// Repository for message persistence.
#[derive(Debug, Clone)]
pub struct MessageRepository {
    pool: SqlitePool,
}

impl MessageRepository {
    /// Create a new repository.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Count messages in a conversation.
    pub async fn count(&self, conversation_id: i64) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM messages WHERE conversation_id = ?")
            .bind(conversation_id)
            .fetch_one(&self.pool)
            .await
            .context("counting messages")
    }

    fn into_messages(rows: Vec<MessageRow>) -> Result<Vec<Message>> {
        rows.into_iter().map(Message::try_from).collect()
    }
}

#[async_trait]
impl HistoryStore for MessageRepository {
    async fn append(&self, message: NewMessage) -> Result<Message> {
        let metadata = message
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("serializing message metadata")?;
        let usage = message.usage;

        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO messages (
                conversation_id, role, content, metadata,
                prompt_tokens, completion_tokens, total_tokens, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(message.conversation_id)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(&metadata)
        .bind(usage.map(|u| u.prompt_tokens))
        .bind(usage.map(|u| u.completion_tokens))
        .bind(usage.map(|u| u.total_tokens))
        .bind(crate::timestamp())
        .fetch_one(&self.pool)
        .await
        .context("inserting message")?;

        self.get(id)
            .await?
            .with_context(|| format!("message {} vanished after insert", id))
    }

    async fn recent_chronological(&self, conversation_id: i64, limit: usize) -> Result<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM messages
            WHERE conversation_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#
        ))
        .bind(conversation_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("fetching recent messages")?;

        let mut messages = Self::into_messages(rows)?;
        messages.reverse();
        Ok(messages)
    }

    async fn list(&self, conversation_id: i64, limit: usize) -> Result<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM messages
            WHERE conversation_id = ?
            ORDER BY created_at ASC, id ASC
            LIMIT ?
            "#
        ))
        .bind(conversation_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("listing messages")?;

        Self::into_messages(rows)
    }

    async fn get(&self, id: i64) -> Result<Option<Message>> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("fetching message")?;

        row.map(Message::try_from).transpose()
    }
}
