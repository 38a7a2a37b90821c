//! Test utilities and common setup.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use futures::StreamExt;
use serde_json::Value;
use tower::ServiceExt;

use wiseinvest::agent::AgentRegistry;
use wiseinvest::api;
use wiseinvest::db::Database;
use wiseinvest::history::TokenUsage;
use wiseinvest::llm::{
    CompletionClient, CompletionRequest, CompletionResponse, FragmentStream, LlmError, LlmResult,
};

/// Completion client that replays fixed fragments.
pub struct ScriptedClient {
    fragments: Vec<String>,
    fail_at_end: bool,
}

impl ScriptedClient {
    pub fn new(fragments: &[&str]) -> Self {
        Self {
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            fail_at_end: false,
        }
    }

    /// Streams the fragments, then ends without a completion marker.
    pub fn truncated(fragments: &[&str]) -> Self {
        Self {
            fail_at_end: true,
            ..Self::new(fragments)
        }
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, _request: &CompletionRequest) -> LlmResult<CompletionResponse> {
        if self.fail_at_end {
            return Err(LlmError::EmptyChoices);
        }
        Ok(CompletionResponse {
            content: self.fragments.concat(),
            finish_reason: Some("stop".to_string()),
            usage: TokenUsage {
                prompt_tokens: 30,
                completion_tokens: 10,
                total_tokens: 40,
            },
        })
    }

    async fn stream(&self, _request: &CompletionRequest) -> LlmResult<FragmentStream> {
        let mut items: Vec<LlmResult<String>> =
            self.fragments.iter().cloned().map(Ok).collect();
        if self.fail_at_end {
            items.push(Err(LlmError::StreamEndedEarly));
        }
        Ok(futures::stream::iter(items).boxed())
    }
}

/// Create a test application and hand back its in-memory database.
pub async fn test_app_with_db(client: ScriptedClient) -> (Router, Database) {
    let db = Database::in_memory().await.unwrap();
    let state = api::AppState::new(
        db.clone(),
        Arc::new(client),
        AgentRegistry::new(),
        20,
        Duration::from_secs(30),
    );
    (api::create_router(state), db)
}

/// Create a test application backed by an in-memory database.
pub async fn test_app_with(client: ScriptedClient) -> Router {
    test_app_with_db(client).await.0
}

/// Create a test application whose model answers "Hello, investor!".
pub async fn test_app() -> Router {
    test_app_with(ScriptedClient::new(&["Hello", ", ", "investor!"])).await
}

/// Send a request and decode the JSON response body.
pub async fn request_json(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let (status, bytes) = request_raw(app, method, uri, body).await;
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

/// Send a request and return the raw response body.
pub async fn request_raw(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Vec<u8>) {
    let builder = Request::builder().uri(uri).method(method);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

/// `data:` payloads of a server-sent-events body, in order.
pub fn sse_data(body: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(body)
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.trim_start().to_string())
        .collect()
}
