//! Upstream model access.
//!
//! [`CompletionClient`] is the seam the turn orchestrator talks to;
//! [`OpenAiClient`] implements it for OpenAI-compatible providers.

mod client;
mod error;
mod types;

pub use client::{CompletionClient, OpenAiClient};
pub use error::{LlmError, LlmResult};
pub use types::{ChatMessage, CompletionRequest, CompletionResponse, FragmentStream};
