//! Conversation sessions.
//!
//! A conversation binds one user to one agent type. Conversations are never
//! removed: deleting flips their status to `deleted`, which hides them from
//! listings and turns while keeping their messages addressable.

mod models;
mod repository;
mod service;

use anyhow::Result;
use async_trait::async_trait;

pub use models::{
    Conversation, ConversationStatus, ConversationWithMessages, CreateConversation,
    PLACEHOLDER_TITLE, derive_title,
};
pub use repository::ConversationRepository;
pub use service::{CONVERSATION_MESSAGE_LIMIT, ConversationService};

/// Conversation storage.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create(&self, user_id: i64, agent_type: &str, title: &str) -> Result<Conversation>;

    async fn get(&self, id: i64) -> Result<Option<Conversation>>;

    /// Conversations of a user that are not deleted, most recently updated first.
    async fn list_by_user(&self, user_id: i64) -> Result<Vec<Conversation>>;

    /// Set the title and refresh `updated_at`.
    async fn update_title(&self, id: i64, title: &str) -> Result<()>;

    /// Mark a conversation deleted. Returns `false` if it does not exist.
    async fn soft_delete(&self, id: i64) -> Result<bool>;
}
