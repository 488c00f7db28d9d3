//! Router setup with all API routes and middleware.
//!
//! Configures the axum Router with CORS, tracing, compression, the
//! per-minute rate limit and bearer auth on every `/agent/*` route.

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use visioneer_core::error::VisioneerError;

use crate::handlers;
use crate::rate_limit::RateLimiter;
use crate::state::AppState;

fn cors_layer(state: &AppState) -> CorsLayer {
    let port = state.config.general.port;
    let mut origins: Vec<HeaderValue> = state
        .config
        .api
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    if origins.is_empty() {
        origins = [
            format!("http://127.0.0.1:{}", port),
            format!("http://localhost:{}", port),
        ]
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
}

/// Create the axum Router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state);

    let public_routes = Router::new().route("/health", get(handlers::health));

    let limiter = RateLimiter::per_minute(state.config.api.rate_limit_per_minute);

    let rate_limited_routes = Router::new()
        .route("/agent/chat", post(handlers::chat))
        .route("/agent/voice-message", post(handlers::voice_message))
        .route("/agent/conversation/{session_id}", get(handlers::conversation))
        .route(
            "/agent/conversation/{session_id}/clear",
            post(handlers::clear_conversation),
        )
        .route("/agent/intent", get(handlers::intent))
        .route("/agent/suggestions", get(handlers::suggestions))
        .layer(axum::middleware::from_fn(
            crate::rate_limit::rate_limit_middleware,
        ))
        .layer(axum::Extension(limiter));

    // Long-lived sockets are exempt from the request rate limit.
    let socket_routes = Router::new().route("/agent/ws/{session_id}", get(handlers::ws));

    let protected_routes =
        rate_limited_routes
            .merge(socket_routes)
            .route_layer(axum::middleware::from_fn_with_state(
                state.clone(),
                crate::auth::require_auth,
            ));

    public_routes
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(state.config.api.max_body_bytes))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind to `general.host:general.port` and serve until the process exits.
pub async fn start_server(state: AppState) -> Result<(), VisioneerError> {
    let addr = format!("{}:{}", state.config.general.host, state.config.general.port);
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| VisioneerError::Api(format!("Failed to bind {}: {}", addr, e)))?;

    tracing::info!(addr = %addr, "API server listening");

    axum::serve(listener, router)
        .await
        .map_err(|e| VisioneerError::Api(format!("Server error: {}", e)))?;

    Ok(())
}
