//! HTTP request handlers.

use std::convert::Infallible;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::agent::AgentDescriptor;
use crate::conversation::{Conversation, ConversationWithMessages, CreateConversation};
use crate::history::Message;
use crate::turn::{ChunkSink, SinkError, TurnOutcome};

use super::error::{ApiError, ApiResult};
use super::state::AppState;

/// Terminal event of a successful stream.
pub const DONE_EVENT: &str = "[DONE]";

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "wiseinvest-api",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// List the available agents.
pub async fn list_agents(State(state): State<AppState>) -> Json<Vec<AgentDescriptor>> {
    Json(state.sessions.available_agents())
}

/// Create a conversation.
#[instrument(skip(state, request), fields(user_id = request.user_id, agent_type = %request.agent_type))]
pub async fn create_conversation(
    State(state): State<AppState>,
    Json(request): Json<CreateConversation>,
) -> ApiResult<(StatusCode, Json<Conversation>)> {
    let conversation = state.sessions.create(request).await?;
    Ok((StatusCode::CREATED, Json(conversation)))
}

/// Get a conversation with its messages.
#[instrument(skip(state))]
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ConversationWithMessages>> {
    state
        .sessions
        .get_with_messages(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Conversation {} not found", id)))
}

/// List a user's conversations.
#[instrument(skip(state))]
pub async fn list_user_conversations(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> ApiResult<Json<Vec<Conversation>>> {
    Ok(Json(state.sessions.list(user_id).await?))
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// Soft-delete a conversation.
#[instrument(skip(state))]
pub async fn delete_conversation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<MessageResponse>> {
    state.sessions.delete(id).await?;
    Ok(Json(MessageResponse {
        message: "Conversation deleted",
    }))
}

/// Look up a message by id.
#[instrument(skip(state))]
pub async fn get_message(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Message>> {
    state
        .sessions
        .get_message(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Message {} not found", id)))
}

/// Request body for sending a message.
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub conversation_id: i64,
    pub content: String,
}

impl SendMessageRequest {
    fn validate(&self) -> ApiResult<()> {
        if self.content.trim().is_empty() {
            return Err(ApiError::bad_request("content must not be empty"));
        }
        Ok(())
    }
}

/// Send a message and wait for the whole reply.
#[instrument(skip(state, request), fields(conversation_id = request.conversation_id))]
pub async fn send_message(
    State(state): State<AppState>,
    Json(request): Json<SendMessageRequest>,
) -> ApiResult<Json<TurnOutcome>> {
    request.validate()?;

    let cancel = CancellationToken::new();
    // Dropping the handler (client gone) cancels the turn too.
    let _guard = cancel.clone().drop_guard();
    cancel_after(&cancel, state.turn_timeout);

    let outcome = state
        .turns
        .run_turn(request.conversation_id, &request.content, &cancel)
        .await?;
    Ok(Json(outcome))
}

/// Send a message and stream the reply as server-sent events.
///
/// Each fragment is sent as `{"content": ...}`, followed by `[DONE]`. A
/// failure once streaming has begun ends the stream with `{"error", "code"}`.
#[instrument(skip(state, request), fields(conversation_id = request.conversation_id))]
pub async fn stream_message(
    State(state): State<AppState>,
    Json(request): Json<SendMessageRequest>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    request.validate()?;

    // Resolve before the first byte so an unknown id is a plain 404.
    let conversation_id = request.conversation_id;
    state
        .sessions
        .get(conversation_id)
        .await?
        .filter(|c| !c.is_deleted())
        .ok_or_else(|| ApiError::not_found(format!("Conversation {} not found", conversation_id)))?;

    // Capacity 1 paces the upstream read to the client.
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(1);
    let cancel = CancellationToken::new();
    cancel_after(&cancel, state.turn_timeout);
    cancel_on_disconnect(&cancel, tx.clone());

    let turns = state.turns.clone();
    tokio::spawn(async move {
        let mut sink = SseSink { tx: tx.clone() };
        let result = turns
            .run_streamed_turn(conversation_id, &request.content, &mut sink, &cancel)
            .await;

        let last = match result {
            Ok(_) => Event::default().data(DONE_EVENT),
            Err(e) => {
                let err = ApiError::from(e);
                err.log();
                Event::default().data(serde_json::to_string(&err.body()).unwrap_or_default())
            }
        };
        let _ = tx.send(Ok(last)).await;
        // Releases the timer and disconnect watcher.
        cancel.cancel();
    });

    Ok(Sse::new(ReceiverStream::new(rx)).keep_alive(KeepAlive::default()))
}

/// Forwards fragments to the SSE response channel.
struct SseSink {
    tx: mpsc::Sender<Result<Event, Infallible>>,
}

#[async_trait]
impl ChunkSink for SseSink {
    async fn emit(&mut self, fragment: &str) -> Result<(), SinkError> {
        let data = json!({ "content": fragment }).to_string();
        self.tx
            .send(Ok(Event::default().data(data)))
            .await
            .map_err(|_| SinkError("client disconnected".to_string()))
    }
}

fn cancel_after(cancel: &CancellationToken, timeout: Duration) {
    let cancel = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(timeout) => {
                debug!("Turn timed out after {:?}", timeout);
                cancel.cancel();
            }
            _ = cancel.cancelled() => {}
        }
    });
}

fn cancel_on_disconnect(cancel: &CancellationToken, tx: mpsc::Sender<Result<Event, Infallible>>) {
    let cancel = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tx.closed() => cancel.cancel(),
            _ = cancel.cancelled() => {}
        }
    });
}
