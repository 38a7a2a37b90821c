//! OpenAI-compatible client tests against a local server.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    Json, Router,
    http::{HeaderMap, StatusCode, header},
    response::{
        IntoResponse, Response,
        sse::{Event, Sse},
    },
    routing::post,
};
use futures::StreamExt;
use serde_json::{Value, json};
use tokio::net::TcpListener;

use wiseinvest::llm::{
    ChatMessage, CompletionClient, CompletionRequest, LlmError, OpenAiClient,
};

const API_KEY: &str = "sk-test";

fn chunk(content: Option<&str>, finish_reason: Option<&str>) -> String {
    let delta = match content {
        Some(text) => json!({ "content": text }),
        None => json!({}),
    };
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion.chunk",
        "choices": [{ "index": 0, "delta": delta, "finish_reason": finish_reason }]
    })
    .to_string()
}

fn sse(events: Vec<String>) -> Response {
    let stream = futures::stream::iter(
        events
            .into_iter()
            .map(|data| Ok::<_, Infallible>(Event::default().data(data))),
    );
    Sse::new(stream).into_response()
}

fn authorized(headers: &HeaderMap) -> bool {
    let expected = format!("Bearer {API_KEY}");
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        == Some(expected.as_str())
}

/// Serves a scripted chat-completions endpoint and returns its base URL.
async fn spawn_provider(events: Vec<String>) -> String {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(move |headers: HeaderMap, Json(body): Json<Value>| {
            let events = events.clone();
            async move {
                if !authorized(&headers) {
                    return (StatusCode::UNAUTHORIZED, "missing key").into_response();
                }
                if body["stream"] == true {
                    return sse(events);
                }
                if body["messages"][0]["content"] == "empty" {
                    return Json(json!({ "choices": [] })).into_response();
                }
                Json(json!({
                    "choices": [{
                        "index": 0,
                        "message": { "role": "assistant", "content": "Stay diversified." },
                        "finish_reason": "stop"
                    }],
                    "usage": { "prompt_tokens": 9, "completion_tokens": 3, "total_tokens": 12 }
                }))
                .into_response()
            }
        }),
    );

    serve(app).await
}

async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/v1")
}

fn client(base_url: &str) -> OpenAiClient {
    OpenAiClient::new(
        base_url,
        "gpt-test",
        Some(API_KEY.to_string()),
        Duration::from_secs(5),
    )
    .unwrap()
}

fn request(text: &str) -> CompletionRequest {
    CompletionRequest {
        messages: vec![ChatMessage::user(text)],
        temperature: 0.7,
        max_tokens: 100,
    }
}

async fn collect(client: &OpenAiClient) -> (Vec<String>, Option<LlmError>) {
    let mut stream = client.stream(&request("hi")).await.unwrap();
    let mut fragments = Vec::new();
    while let Some(item) = stream.next().await {
        match item {
            Ok(fragment) => fragments.push(fragment),
            Err(e) => return (fragments, Some(e)),
        }
    }
    (fragments, None)
}

#[tokio::test]
async fn test_stream_ends_on_done_marker() {
    let base_url = spawn_provider(vec![
        chunk(Some(""), None),
        chunk(Some("Hel"), None),
        chunk(Some("lo"), None),
        chunk(None, Some("stop")),
        "[DONE]".to_string(),
    ])
    .await;

    let (fragments, error) = collect(&client(&base_url)).await;

    assert_eq!(fragments, vec!["Hel", "lo"]);
    assert!(error.is_none());
}

#[tokio::test]
async fn test_stream_close_after_finish_reason_is_clean() {
    let base_url = spawn_provider(vec![chunk(Some("Done."), Some("stop"))]).await;

    let (fragments, error) = collect(&client(&base_url)).await;

    assert_eq!(fragments, vec!["Done."]);
    assert!(error.is_none());
}

#[tokio::test]
async fn test_stream_premature_end_is_error() {
    let base_url = spawn_provider(vec![chunk(Some("Half"), None)]).await;

    let (fragments, error) = collect(&client(&base_url)).await;

    assert_eq!(fragments, vec!["Half"]);
    assert!(matches!(error, Some(LlmError::StreamEndedEarly)));
}

#[tokio::test]
async fn test_stream_garbage_chunk_is_error() {
    let base_url = spawn_provider(vec!["{not json".to_string()]).await;

    let (fragments, error) = collect(&client(&base_url)).await;

    assert!(fragments.is_empty());
    assert!(matches!(error, Some(LlmError::ParseError(_))));
}

#[tokio::test]
async fn test_stream_bad_status_fails_open() {
    let base_url = spawn_provider(vec![]).await;
    let unauthorized = OpenAiClient::new(&base_url, "gpt-test", None, Duration::from_secs(5)).unwrap();

    let err = match unauthorized.stream(&request("hi")).await {
        Ok(_) => panic!("stream should not open"),
        Err(e) => e,
    };

    match err {
        LlmError::Status { status, body } => {
            assert_eq!(status, 401);
            assert_eq!(body, "missing key");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_complete_returns_content_and_usage() {
    let base_url = spawn_provider(vec![]).await;

    let response = client(&base_url).complete(&request("hi")).await.unwrap();

    assert_eq!(response.content, "Stay diversified.");
    assert_eq!(response.finish_reason.as_deref(), Some("stop"));
    assert_eq!(response.usage.prompt_tokens, 9);
    assert_eq!(response.usage.total_tokens, 12);
}

#[tokio::test]
async fn test_complete_empty_choices() {
    let base_url = spawn_provider(vec![]).await;

    let err = client(&base_url)
        .complete(&request("empty"))
        .await
        .unwrap_err();

    assert!(matches!(err, LlmError::EmptyChoices));
}
