use async_trait::async_trait;
use thiserror::Error;

/// The consumer rejected a fragment, usually because the client went away.
#[derive(Debug, Clone, Error)]
#[error("sink rejected fragment: {0}")]
pub struct SinkError(pub String);

/// Receives the fragments of a streamed turn, one at a time and in order.
///
/// `emit` may block to apply backpressure to the upstream stream.
#[async_trait]
pub trait ChunkSink: Send {
    async fn emit(&mut self, fragment: &str) -> Result<(), SinkError>;
}

/// Concatenates fragments into the final assistant reply.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    content: String,
    fragments: usize,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: &str) {
        self.content.push_str(fragment);
        self.fragments += 1;
    }

    pub fn fragments(&self) -> usize {
        self.fragments
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn into_content(self) -> String {
        self.content
    }
}
