use thiserror::Error;

use crate::agent::UnknownAgent;
use crate::llm::LlmError;

/// Why a turn did not complete.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("conversation {0} not found")]
    NotFound(i64),

    #[error(transparent)]
    InvalidAgent(#[from] UnknownAgent),

    #[error("upstream model error: {0}")]
    Upstream(#[from] LlmError),

    #[error("turn canceled: {0}")]
    Canceled(String),

    #[error("persistence failed: {0}")]
    Persistence(String),

    #[error("conversation {0} already has a turn in progress")]
    Busy(i64),
}

impl TurnError {
    pub(crate) fn persistence(err: anyhow::Error) -> Self {
        Self::Persistence(format!("{:#}", err))
    }

    /// Stable category string for clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidAgent(_) => "INVALID_AGENT",
            Self::Upstream(_) => "UPSTREAM_ERROR",
            Self::Canceled(_) => "CANCELED",
            Self::Persistence(_) => "PERSISTENCE_ERROR",
            Self::Busy(_) => "BUSY",
        }
    }
}
