//! Drives one user turn from prompt assembly to persisted reply.

use std::sync::Arc;

use dashmap::DashSet;
use futures::StreamExt;
use serde::Serialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::agent::AgentDescriptor;
use crate::conversation::{Conversation, ConversationService};
use crate::history::{Message, NewMessage};
use crate::llm::{ChatMessage, CompletionClient, CompletionRequest};

use super::error::TurnError;
use super::sink::{ChunkSink, StreamAccumulator};

/// Prior messages fed to the model when not configured.
pub const DEFAULT_HISTORY_WINDOW: usize = 20;

/// The two messages a completed turn leaves behind.
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub user_message: Message,
    pub assistant_message: Message,
}

/// Runs turns against the configured completion client.
#[derive(Clone)]
pub struct TurnOrchestrator {
    sessions: ConversationService,
    client: Arc<dyn CompletionClient>,
    history_window: usize,
    in_flight: Arc<DashSet<i64>>,
}

/// Marks a conversation busy until dropped.
struct InFlightGuard {
    set: Arc<DashSet<i64>>,
    conversation_id: i64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.remove(&self.conversation_id);
    }
}

/// Everything resolved before the model is called.
struct PreparedTurn {
    _guard: InFlightGuard,
    turn_id: Uuid,
    conversation: Conversation,
    agent: AgentDescriptor,
    user_message: Message,
    request: CompletionRequest,
}

impl TurnOrchestrator {
    pub fn new(
        sessions: ConversationService,
        client: Arc<dyn CompletionClient>,
        history_window: usize,
    ) -> Self {
        Self {
            sessions,
            client,
            history_window,
            in_flight: Arc::new(DashSet::new()),
        }
    }

    pub fn sessions(&self) -> &ConversationService {
        &self.sessions
    }

    /// Run a streamed turn, handing each fragment to `sink` as it arrives.
    ///
    /// Returns once the assistant message is persisted. On any error no
    /// assistant message exists, though the user message may.
    pub async fn run_streamed_turn<S>(
        &self,
        conversation_id: i64,
        user_text: &str,
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, TurnError>
    where
        S: ChunkSink + ?Sized,
    {
        let turn = self.prepare(conversation_id, user_text, cancel).await?;
        info!(
            conversation_id,
            turn_id = %turn.turn_id,
            agent_type = %turn.agent.agent_type,
            "Streamed turn started"
        );

        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(canceled()),
            opened = self.client.stream(&turn.request) => opened?,
        };

        let mut accumulator = StreamAccumulator::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(canceled()),
                next = stream.next() => next,
            };

            let fragment = match next {
                Some(Ok(fragment)) => fragment,
                Some(Err(e)) => {
                    warn!(
                        conversation_id,
                        turn_id = %turn.turn_id,
                        fragments = accumulator.fragments(),
                        "Upstream stream failed: {}", e
                    );
                    return Err(TurnError::Upstream(e));
                }
                None => break,
            };

            accumulator.push(&fragment);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(canceled()),
                emitted = sink.emit(&fragment) => {
                    emitted.map_err(|e| TurnError::Canceled(e.to_string()))?
                }
            }
        }
        drop(stream);

        let fragments = accumulator.fragments();
        let bytes = accumulator.len();
        let metadata = json!({
            "agent_type": turn.agent.agent_type,
            "streamed": true,
        });
        let assistant = NewMessage::assistant(conversation_id, accumulator.into_content())
            .with_metadata(metadata);

        let outcome = self.finish(&turn, assistant, user_text).await?;
        info!(
            conversation_id,
            turn_id = %turn.turn_id,
            fragments,
            bytes,
            "Streamed turn completed"
        );
        Ok(outcome)
    }

    /// Run a turn with a single whole-response completion call.
    pub async fn run_turn(
        &self,
        conversation_id: i64,
        user_text: &str,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, TurnError> {
        let turn = self.prepare(conversation_id, user_text, cancel).await?;
        info!(conversation_id, turn_id = %turn.turn_id, "Turn started");

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(canceled()),
            response = self.client.complete(&turn.request) => response?,
        };

        let metadata = json!({
            "agent_type": turn.agent.agent_type,
            "finish_reason": response.finish_reason,
        });
        let usage = response.usage;
        let assistant = NewMessage::assistant(conversation_id, response.content)
            .with_metadata(metadata)
            .with_usage(usage);

        let outcome = self.finish(&turn, assistant, user_text).await?;
        info!(
            conversation_id,
            turn_id = %turn.turn_id,
            total_tokens = usage.total_tokens,
            "Turn completed"
        );
        Ok(outcome)
    }

    async fn prepare(
        &self,
        conversation_id: i64,
        user_text: &str,
        cancel: &CancellationToken,
    ) -> Result<PreparedTurn, TurnError> {
        let guard = self.acquire(conversation_id)?;
        let turn_id = Uuid::new_v4();

        let conversation = self
            .sessions
            .get(conversation_id)
            .await
            .map_err(TurnError::persistence)?
            .filter(|c| !c.is_deleted())
            .ok_or(TurnError::NotFound(conversation_id))?;

        let history = self.sessions.history();
        let user_message = history
            .append(NewMessage::user(conversation_id, user_text))
            .await
            .map_err(TurnError::persistence)?;

        // One extra row so the window stays full once the new turn is dropped.
        let recent = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(canceled()),
            recent = history.recent_chronological(conversation_id, self.history_window + 1) => {
                recent.map_err(TurnError::persistence)?
            }
        };
        let prior: Vec<Message> = recent
            .into_iter()
            .filter(|m| m.id != user_message.id)
            .collect();
        let skip = prior.len().saturating_sub(self.history_window);

        let agent = self.sessions.registry().lookup(&conversation.agent_type)?;

        let mut messages = Vec::with_capacity(prior.len() - skip + 2);
        messages.push(ChatMessage::system(agent.system_prompt));
        messages.extend(
            prior
                .into_iter()
                .skip(skip)
                .map(|m| ChatMessage::new(m.role, m.content)),
        );
        messages.push(ChatMessage::user(user_text));

        debug!(
            conversation_id,
            turn_id = %turn_id,
            prompt_messages = messages.len(),
            "Prompt assembled"
        );

        Ok(PreparedTurn {
            _guard: guard,
            turn_id,
            request: CompletionRequest {
                messages,
                temperature: agent.sampling.temperature,
                max_tokens: agent.sampling.max_tokens,
            },
            conversation,
            agent,
            user_message,
        })
    }

    async fn finish(
        &self,
        turn: &PreparedTurn,
        assistant: NewMessage,
        user_text: &str,
    ) -> Result<TurnOutcome, TurnError> {
        let assistant_message = self
            .sessions
            .history()
            .append(assistant)
            .await
            .map_err(TurnError::persistence)?;

        if let Err(e) = self.sessions.record_turn(&turn.conversation, user_text).await {
            warn!(
                conversation_id = turn.conversation.id,
                turn_id = %turn.turn_id,
                "Failed to update conversation: {:#}", e
            );
        }

        Ok(TurnOutcome {
            user_message: turn.user_message.clone(),
            assistant_message,
        })
    }

    fn acquire(&self, conversation_id: i64) -> Result<InFlightGuard, TurnError> {
        if !self.in_flight.insert(conversation_id) {
            return Err(TurnError::Busy(conversation_id));
        }
        Ok(InFlightGuard {
            set: self.in_flight.clone(),
            conversation_id,
        })
    }
}

fn canceled() -> TurnError {
    TurnError::Canceled("request canceled".to_string())
}
