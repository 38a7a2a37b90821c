//! Completion request and response types.

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::history::{MessageRole, TokenUsage};

use super::error::{LlmError, LlmResult};

/// One prompt message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }
}

/// A provider-agnostic completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Result of a whole-response completion.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResponse {
    pub content: String,
    pub finish_reason: Option<String>,
    pub usage: TokenUsage,
}

/// Lazy, finite sequence of text fragments.
///
/// `None` means the provider signalled a clean end; an `Err` item is terminal.
pub type FragmentStream = BoxStream<'static, LlmResult<String>>;

// Wire format of OpenAI-compatible chat completions.

#[derive(Debug, Serialize)]
pub(crate) struct ChatCompletionBody<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    pub temperature: f32,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatCompletion {
    #[serde(default)]
    pub choices: Vec<CompletionChoice>,
    #[serde(default)]
    pub usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CompletionChoice {
    pub message: WireMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct WireUsage {
    #[serde(default)]
    pub prompt_tokens: i64,
    #[serde(default)]
    pub completion_tokens: i64,
    #[serde(default)]
    pub total_tokens: i64,
}

impl From<WireUsage> for TokenUsage {
    fn from(usage: WireUsage) -> Self {
        TokenUsage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// What one stream chunk contributed.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct StreamDelta {
    pub content: Option<String>,
    pub finish_reason: Option<String>,
}

/// Marker the provider sends after the last chunk.
pub(crate) const DONE_MARKER: &str = "[DONE]";

/// Parse the `data:` payload of one stream event.
pub(crate) fn parse_stream_chunk(data: &str) -> LlmResult<StreamDelta> {
    let chunk: ChatCompletionChunk =
        serde_json::from_str(data).map_err(|e| LlmError::ParseError(e.to_string()))?;

    let Some(choice) = chunk.choices.into_iter().next() else {
        return Ok(StreamDelta::default());
    };

    Ok(StreamDelta {
        content: choice.delta.content.filter(|c| !c.is_empty()),
        finish_reason: choice.finish_reason,
    })
}

impl ChatCompletion {
    pub(crate) fn into_response(self) -> LlmResult<CompletionResponse> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or(LlmError::EmptyChoices)?;

        Ok(CompletionResponse {
            content: choice.message.content.unwrap_or_default(),
            finish_reason: choice.finish_reason,
            usage: self.usage.unwrap_or_default().into(),
        })
    }
}
