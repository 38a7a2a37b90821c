//! OpenAI-compatible chat completion client.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder};
use reqwest_eventsource::{Event, EventSource, retry::Never};

use super::error::{LlmError, LlmResult};
use super::types::*;

/// Seam between the turn orchestrator and a model provider.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Run a completion and return the whole response.
    async fn complete(&self, request: &CompletionRequest) -> LlmResult<CompletionResponse>;

    /// Open a streamed completion.
    ///
    /// Errors returned here mean the stream never opened (transport failure or
    /// a non-success status). Errors after that arrive as stream items.
    async fn stream(&self, request: &CompletionRequest) -> LlmResult<FragmentStream>;
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client,
    /// Base URL including the version prefix (e.g. "https://api.openai.com/v1").
    base_url: String,
    model: String,
    api_key: Option<String>,
    /// Upper bound for whole-response calls. Streams are bounded by the turn timeout.
    request_timeout: Duration,
}

impl OpenAiClient {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        request_timeout: Duration,
    ) -> LlmResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
            request_timeout,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request(&self, request: &CompletionRequest, stream: bool) -> RequestBuilder {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatCompletionBody {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream,
        };

        let builder = self.client.post(&url).json(&body);
        match &self.api_key {
            Some(key) => builder.header("Authorization", format!("Bearer {}", key)),
            None => builder,
        }
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> LlmResult<CompletionResponse> {
        let response = self
            .request(request, false)
            .timeout(self.request_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(e.to_string()))?;
        completion.into_response()
    }

    async fn stream(&self, request: &CompletionRequest) -> LlmResult<FragmentStream> {
        let mut es = EventSource::new(self.request(request, true))
            .map_err(|e| LlmError::Stream(e.to_string()))?;
        es.set_retry_policy(Box::new(Never));

        // Wait for the connection so open failures surface to the caller.
        match es.next().await {
            Some(Ok(Event::Open)) => {}
            Some(Ok(Event::Message(_))) => {
                es.close();
                return Err(LlmError::Stream("message before stream open".to_string()));
            }
            Some(Err(e)) => {
                es.close();
                return Err(map_stream_error(e).await);
            }
            None => return Err(LlmError::StreamEndedEarly),
        }

        let state = StreamState {
            es,
            finish_seen: false,
            done: false,
        };

        Ok(futures::stream::unfold(state, next_fragment).boxed())
    }
}

struct StreamState {
    es: EventSource,
    /// A chunk carried a finish_reason, so a bare close counts as a clean end.
    finish_seen: bool,
    done: bool,
}

async fn next_fragment(mut st: StreamState) -> Option<(LlmResult<String>, StreamState)> {
    if st.done {
        return None;
    }

    loop {
        match st.es.next().await {
            Some(Ok(Event::Open)) => continue,
            Some(Ok(Event::Message(msg))) => {
                if msg.data.trim() == DONE_MARKER {
                    st.es.close();
                    return None;
                }
                match parse_stream_chunk(&msg.data) {
                    Ok(delta) => {
                        if delta.finish_reason.is_some() {
                            st.finish_seen = true;
                        }
                        if let Some(text) = delta.content {
                            return Some((Ok(text), st));
                        }
                    }
                    Err(e) => {
                        st.es.close();
                        st.done = true;
                        return Some((Err(e), st));
                    }
                }
            }
            Some(Err(reqwest_eventsource::Error::StreamEnded)) | None => {
                st.es.close();
                if st.finish_seen {
                    return None;
                }
                st.done = true;
                return Some((Err(LlmError::StreamEndedEarly), st));
            }
            Some(Err(e)) => {
                st.es.close();
                st.done = true;
                return Some((Err(map_stream_error(e).await), st));
            }
        }
    }
}

async fn map_stream_error(err: reqwest_eventsource::Error) -> LlmError {
    use reqwest_eventsource::Error;

    match err {
        Error::InvalidStatusCode(status, response) => LlmError::Status {
            status: status.as_u16(),
            body: response.text().await.unwrap_or_default(),
        },
        Error::Transport(e) => LlmError::RequestFailed(e),
        Error::InvalidContentType(content_type, _) => LlmError::Stream(format!(
            "unexpected content type: {}",
            content_type.to_str().unwrap_or("<binary>")
        )),
        Error::StreamEnded => LlmError::StreamEndedEarly,
        other => LlmError::Stream(other.to_string()),
    }
}
