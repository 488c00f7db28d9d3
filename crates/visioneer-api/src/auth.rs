//! Bearer-token authentication and actor resolution.
//!
//! Provides token generation, persistence, the middleware guarding every
//! `/agent/*` route, and the lookup that turns a request's `actor_id` into
//! an `Actor` the agent can authorize against.

use std::path::Path;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rand::Rng;

use visioneer_agent::Actor;

use crate::error::ApiError;
use crate::state::AppState;

/// Generate a random 32-character hex token.
pub fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 16] = rng.random();
    hex::encode(bytes)
}

/// Load the token from `token_path`, or generate and save a new one.
pub fn load_or_generate_token(token_path: &Path) -> String {
    if let Ok(contents) = std::fs::read_to_string(token_path) {
        let token = contents.trim().to_string();
        if !token.is_empty() {
            tracing::info!(path = %token_path.display(), "API token loaded");
            return token;
        }
    }

    let token = generate_token();

    if let Some(parent) = token_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Err(e) = std::fs::write(token_path, &token) {
        tracing::warn!(error = %e, path = %token_path.display(), "Failed to save API token");
    } else {
        // Owner-only access.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(token_path, std::fs::Permissions::from_mode(0o600));
        }
        tracing::info!(path = %token_path.display(), "API token saved");
    }

    token
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": "unauthorized",
            "message": message
        })),
    )
        .into_response()
}

/// Middleware that validates `Authorization: Bearer <token>` against
/// `AppState.api_token`. Returns 401 if missing or invalid.
pub async fn require_auth(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(value) = req.headers().get("authorization") else {
        return unauthorized("Missing Authorization header");
    };
    let Ok(value) = value.to_str() else {
        return unauthorized("Invalid Authorization header encoding");
    };

    match value.strip_prefix("Bearer ") {
        Some(token) if token == state.api_token => next.run(req).await,
        _ => unauthorized("Invalid bearer token"),
    }
}

/// Resolve `actor_id` to an `Actor`.
///
/// Unknown and deactivated accounts resolve to `None`, so the turn runs
/// anonymously and any mutation it attempts is refused by the agent.
pub async fn resolve_actor(
    state: &AppState,
    actor_id: Option<i64>,
) -> Result<Option<Actor>, ApiError> {
    let Some(id) = actor_id else {
        return Ok(None);
    };

    let users = std::sync::Arc::clone(&state.users);
    let user = tokio::task::spawn_blocking(move || users.find_by_id(id))
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "Actor lookup task failed");
            ApiError::Internal("Failed to look up the acting user".to_string())
        })??;

    match user {
        Some(user) if user.is_active => Ok(Some(Actor {
            user_id: user.id,
            role: user.role,
        })),
        Some(_) => {
            tracing::debug!(actor_id = id, "Inactive actor; continuing anonymously");
            Ok(None)
        }
        None => {
            tracing::debug!(actor_id = id, "Unknown actor; continuing anonymously");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_token_shape() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_token_is_persisted_and_reloaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("api_token");

        let first = load_or_generate_token(&path);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), first);
        let second = load_or_generate_token(&path);
        assert_eq!(first, second);
    }

    #[test]
    fn test_blank_token_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api_token");
        std::fs::write(&path, "  \n").unwrap();

        let token = load_or_generate_token(&path);
        assert_eq!(token.len(), 32);
    }
}
