//! Conversation session manager.

use std::sync::Arc;

use anyhow::{Result, bail};
use log::{debug, info};

use crate::agent::{AgentDescriptor, AgentRegistry};
use crate::db::Database;
use crate::history::{HistoryStore, Message, MessageRepository};

use super::ConversationStore;
use super::models::{
    Conversation, ConversationWithMessages, CreateConversation, PLACEHOLDER_TITLE, derive_title,
};
use super::repository::ConversationRepository;

/// Messages returned alongside a single conversation.
pub const CONVERSATION_MESSAGE_LIMIT: usize = 100;

/// Conversation lifecycle operations.
#[derive(Clone)]
pub struct ConversationService {
    conversations: Arc<dyn ConversationStore>,
    messages: Arc<dyn HistoryStore>,
    registry: Arc<AgentRegistry>,
}

impl ConversationService {
    pub fn new(
        conversations: Arc<dyn ConversationStore>,
        messages: Arc<dyn HistoryStore>,
        registry: Arc<AgentRegistry>,
    ) -> Self {
        Self {
            conversations,
            messages,
            registry,
        }
    }

    /// Service backed by the SQLite repositories of `db`.
    pub fn from_database(db: &Database, registry: Arc<AgentRegistry>) -> Self {
        Self::new(
            Arc::new(ConversationRepository::new(db.pool().clone())),
            Arc::new(MessageRepository::new(db.pool().clone())),
            registry,
        )
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn history(&self) -> &Arc<dyn HistoryStore> {
        &self.messages
    }

    /// Create a conversation after validating its agent type.
    pub async fn create(&self, request: CreateConversation) -> Result<Conversation> {
        self.registry.lookup(&request.agent_type)?;

        let title = match request.title.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => t,
            _ => PLACEHOLDER_TITLE,
        };

        let conversation = self
            .conversations
            .create(request.user_id, &request.agent_type, title)
            .await?;

        info!(
            "Created conversation {} for user {} (agent {})",
            conversation.id, conversation.user_id, conversation.agent_type
        );
        Ok(conversation)
    }

    /// Get a conversation by id, whatever its status.
    pub async fn get(&self, id: i64) -> Result<Option<Conversation>> {
        self.conversations.get(id).await
    }

    /// Get a conversation with its first messages, oldest first.
    pub async fn get_with_messages(&self, id: i64) -> Result<Option<ConversationWithMessages>> {
        let Some(conversation) = self.conversations.get(id).await? else {
            return Ok(None);
        };
        let messages = self.messages.list(id, CONVERSATION_MESSAGE_LIMIT).await?;

        Ok(Some(ConversationWithMessages {
            conversation,
            messages,
        }))
    }

    /// A user's conversations that are not deleted, most recently updated first.
    pub async fn list(&self, user_id: i64) -> Result<Vec<Conversation>> {
        self.conversations.list_by_user(user_id).await
    }

    /// Soft-delete a conversation. Its messages are kept.
    pub async fn delete(&self, id: i64) -> Result<()> {
        if !self.conversations.soft_delete(id).await? {
            bail!("conversation {} not found", id);
        }
        info!("Deleted conversation {}", id);
        Ok(())
    }

    /// Refresh a conversation after a turn.
    ///
    /// The title is derived from `user_text` only while it is still the
    /// placeholder; `updated_at` always moves forward.
    pub async fn record_turn(&self, conversation: &Conversation, user_text: &str) -> Result<()> {
        let title = if conversation.has_placeholder_title() {
            derive_title(user_text)
        } else {
            conversation.title.clone()
        };

        debug!("Recording turn on conversation {}", conversation.id);
        self.conversations.update_title(conversation.id, &title).await
    }

    /// Look up a message directly by id.
    pub async fn get_message(&self, id: i64) -> Result<Option<Message>> {
        self.messages.get(id).await
    }

    pub fn available_agents(&self) -> Vec<AgentDescriptor> {
        self.registry.available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::UnknownAgent;
    use crate::db::DEMO_USER_ID;
    use crate::history::NewMessage;

    async fn service() -> ConversationService {
        let db = Database::in_memory().await.unwrap();
        ConversationService::from_database(&db, Arc::new(AgentRegistry::new()))
    }

    fn request(agent_type: &str, title: Option<&str>) -> CreateConversation {
        CreateConversation {
            user_id: DEMO_USER_ID,
            agent_type: agent_type.to_string(),
            title: title.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_create_defaults_title() {
        let service = service().await;

        let untitled = service
            .create(request("investment_advisor", None))
            .await
            .unwrap();
        assert_eq!(untitled.title, PLACEHOLDER_TITLE);

        let blank = service
            .create(request("trading_agent", Some("   ")))
            .await
            .unwrap();
        assert_eq!(blank.title, PLACEHOLDER_TITLE);

        let titled = service
            .create(request("trading_agent", Some("ETH swing")))
            .await
            .unwrap();
        assert_eq!(titled.title, "ETH swing");
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_agent() {
        let service = service().await;
        let err = service.create(request("oracle", None)).await.unwrap_err();
        assert!(err.downcast_ref::<UnknownAgent>().is_some());
        assert!(service.list(DEMO_USER_ID).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_record_turn_sets_title_once() {
        let service = service().await;
        let conversation = service
            .create(request("investment_advisor", None))
            .await
            .unwrap();

        service
            .record_turn(&conversation, "Should I rebalance?")
            .await
            .unwrap();
        let renamed = service.get(conversation.id).await.unwrap().unwrap();
        assert_eq!(renamed.title, "Should I rebalance?");
        assert!(renamed.updated_at >= conversation.updated_at);

        service
            .record_turn(&renamed, "Something else entirely")
            .await
            .unwrap();
        let unchanged = service.get(conversation.id).await.unwrap().unwrap();
        assert_eq!(unchanged.title, "Should I rebalance?");
    }

    #[tokio::test]
    async fn test_delete_hides_from_list_but_keeps_messages() {
        let service = service().await;
        let conversation = service
            .create(request("investment_advisor", None))
            .await
            .unwrap();
        let message = service
            .history()
            .append(NewMessage::user(conversation.id, "hello"))
            .await
            .unwrap();

        service.delete(conversation.id).await.unwrap();

        assert!(service.list(DEMO_USER_ID).await.unwrap().is_empty());
        let fetched = service.get_message(message.id).await.unwrap().unwrap();
        assert_eq!(fetched.content, "hello");

        let with_messages = service
            .get_with_messages(conversation.id)
            .await
            .unwrap()
            .unwrap();
        assert!(with_messages.conversation.is_deleted());
        assert_eq!(with_messages.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_unknown_is_not_found() {
        let service = service().await;
        let err = service.delete(404).await.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
