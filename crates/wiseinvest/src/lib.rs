//! WiseInvest Backend Library
//!
//! Conversation persistence, agent dispatch and the streaming turn pipeline
//! behind the WiseInvest chat API.

pub mod agent;
pub mod api;
pub mod conversation;
pub mod db;
pub mod history;
pub mod llm;
pub mod settings;
pub mod turn;

use chrono::{SecondsFormat, Utc};

/// Current time as a fixed-width RFC 3339 string.
///
/// Fixed width keeps lexicographic order equal to chronological order, which
/// the `ORDER BY created_at` / `updated_at` queries rely on.
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
