//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use crate::agent::AgentRegistry;
use crate::conversation::ConversationService;
use crate::db::Database;
use crate::llm::CompletionClient;
use crate::turn::TurnOrchestrator;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub sessions: ConversationService,
    pub turns: TurnOrchestrator,
    /// Upper bound on one turn before it is canceled.
    pub turn_timeout: Duration,
    /// CORS origins; empty or `*` allows any.
    pub allowed_origins: Vec<String>,
}

impl AppState {
    pub fn new(
        db: Database,
        client: Arc<dyn CompletionClient>,
        registry: AgentRegistry,
        history_window: usize,
        turn_timeout: Duration,
    ) -> Self {
        let sessions = ConversationService::from_database(&db, Arc::new(registry));
        let turns = TurnOrchestrator::new(sessions.clone(), client, history_window);

        Self {
            db,
            sessions,
            turns,
            turn_timeout,
            allowed_origins: Vec::new(),
        }
    }

    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = origins;
        self
    }
}
