//! Agent registry.
//!
//! Agents differ only by system prompt and sampling parameters, so they are
//! plain data keyed by a closed [`AgentType`] enum.

mod prompts;
mod registry;

pub use prompts::system_prompt;
pub use registry::{
    AgentDescriptor, AgentOverride, AgentRegistry, AgentType, SamplingParams, UnknownAgent,
};
