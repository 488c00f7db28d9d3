//! Visioneer API crate - axum HTTP and WebSocket surface over the agent.
//!
//! Exposes chat, voice, conversation history and intent inspection
//! endpoints, protected by a bearer token and a per-minute rate limit.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod rate_limit;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
