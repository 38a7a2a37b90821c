//! Turn pipeline.
//!
//! A turn persists the user message, assembles the prompt from the agent's
//! system prompt and a bounded window of history, calls the model, and then
//! persists the assembled reply. In streamed mode every fragment is handed
//! to a [`ChunkSink`] before the next one is read.

mod error;
mod orchestrator;
mod sink;

pub use error::TurnError;
pub use orchestrator::{DEFAULT_HISTORY_WINDOW, TurnOrchestrator, TurnOutcome};
pub use sink::{ChunkSink, SinkError, StreamAccumulator};
