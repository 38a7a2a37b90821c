//! Per-conversation message log.
//!
//! Messages are append-only. The store hands out bounded windows of recent
//! history, always oldest-first, for prompt assembly.

mod models;
mod repository;

use anyhow::Result;
use async_trait::async_trait;

pub use models::{Message, MessageRole, NewMessage, TokenUsage};
pub use repository::MessageRepository;

/// Append-only message storage.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Persist a message and return the stored record.
    async fn append(&self, message: NewMessage) -> Result<Message>;

    /// The `limit` most recent messages of a conversation, oldest first.
    async fn recent_chronological(&self, conversation_id: i64, limit: usize) -> Result<Vec<Message>>;

    /// The first `limit` messages of a conversation, oldest first.
    async fn list(&self, conversation_id: i64, limit: usize) -> Result<Vec<Message>>;

    /// Look up a single message by id.
    async fn get(&self, id: i64) -> Result<Option<Message>>;
}
