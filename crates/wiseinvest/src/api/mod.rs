//! HTTP API: REST endpoints plus a server-sent-events stream for replies.

mod error;
mod handlers;
mod routes;
mod state;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use handlers::{DONE_EVENT, SendMessageRequest};
pub use routes::create_router;
pub use state::AppState;
