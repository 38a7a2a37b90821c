//! Conversation data models.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

use crate::history::Message;

/// Title given to conversations created without one.
pub const PLACEHOLDER_TITLE: &str = "New Conversation";

/// Longest title kept verbatim when derived from a message.
const TITLE_MAX_CHARS: usize = 50;

/// Conversation lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Active,
    Archived,
    Deleted,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStatus::Active => "active",
            ConversationStatus::Archived => "archived",
            ConversationStatus::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ConversationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(ConversationStatus::Active),
            "archived" => Ok(ConversationStatus::Archived),
            "deleted" => Ok(ConversationStatus::Deleted),
            _ => Err(format!("unknown conversation status: {}", s)),
        }
    }
}

impl TryFrom<String> for ConversationStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A chat session between one user and one agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conversation {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub agent_type: String,
    pub metadata: Value,
    pub status: ConversationStatus,
    pub created_at: String,
    pub updated_at: String,
}

impl Conversation {
    /// Whether the title may still be replaced by one derived from a message.
    pub fn has_placeholder_title(&self) -> bool {
        let title = self.title.trim();
        title.is_empty() || title == PLACEHOLDER_TITLE
    }

    pub fn is_deleted(&self) -> bool {
        self.status == ConversationStatus::Deleted
    }
}

/// Derive a display title from the first user message.
///
/// Up to 50 characters are kept verbatim; longer text is cut to its first 50
/// characters followed by `...`.
pub fn derive_title(text: &str) -> String {
    let mut chars = text.char_indices();
    match chars.nth(TITLE_MAX_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Raw `conversations` row.
#[derive(Debug, FromRow)]
pub(crate) struct ConversationRow {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub agent_type: String,
    pub metadata: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<ConversationRow> for Conversation {
    type Error = anyhow::Error;

    fn try_from(row: ConversationRow) -> Result<Self, Self::Error> {
        let status = ConversationStatus::try_from(row.status).map_err(anyhow::Error::msg)?;
        let metadata = if row.metadata.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(&row.metadata)?
        };

        Ok(Conversation {
            id: row.id,
            user_id: row.user_id,
            title: row.title,
            agent_type: row.agent_type,
            metadata,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Request body for creating a conversation.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateConversation {
    pub user_id: i64,
    pub agent_type: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// A conversation together with its messages, oldest first.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationWithMessages {
    #[serde(flatten)]
    pub conversation: Conversation,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<Message>,
}
