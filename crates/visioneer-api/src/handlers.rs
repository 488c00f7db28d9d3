//! Route handler functions for all API endpoints.
//!
//! Each handler extracts parameters from the request, calls into the agent
//! and returns a JSON response. Turn endpoints always answer 200 with a
//! `success` flag; only malformed requests produce an error status.

use std::time::Instant;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use visioneer_agent::{Intent, TurnOutcome, Utterance};
use visioneer_core::types::{ProductSummary, Turn};

use crate::auth::resolve_actor;
use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Request and response types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub actor_id: Option<i64>,
    /// Explicit intent that bypasses classification.
    #[serde(default)]
    pub intent: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub success: bool,
    pub session_id: String,
    pub message: String,
    pub metadata: serde_json::Value,
    pub intent: Intent,
    pub response_time_ms: u64,
}

impl ChatResponse {
    fn from_outcome(outcome: TurnOutcome, started: Instant) -> Self {
        Self {
            success: outcome.success,
            session_id: outcome.session_id,
            message: outcome.message,
            metadata: outcome.metadata,
            intent: outcome.intent,
            response_time_ms: started.elapsed().as_millis() as u64,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct VoiceRequest {
    /// Base64-encoded audio.
    pub audio_data: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub actor_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VoiceResponse {
    #[serde(flatten)]
    pub turn: ChatResponse,
    pub original_text: Option<String>,
    /// Base64-encoded synthesized reply, absent when synthesis failed.
    pub audio_response: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WsIncoming {
    pub message: String,
    #[serde(default)]
    pub actor_id: Option<i64>,
    #[serde(default)]
    pub intent: Option<String>,
}

/// Frames sent to WebSocket clients.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsFrame {
    AgentResponse(TurnOutcome),
    Error { message: String },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationResponse {
    pub session_id: String,
    pub messages: Vec<Turn>,
    pub total: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClearResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct IntentParams {
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IntentResponse {
    pub message: String,
    pub intent: Intent,
    pub confidence: f32,
}

#[derive(Debug, Deserialize)]
pub struct SuggestionsParams {
    pub query: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuggestionsResponse {
    pub query: String,
    pub suggestions: Vec<ProductSummary>,
    pub total_found: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub llm_enabled: bool,
    pub voice_enabled: bool,
}

// =============================================================================
// Helpers
// =============================================================================

/// Use the caller's session id, or mint one when it is absent or blank.
fn session_or_new(session_id: Option<String>) -> String {
    session_id
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn required_param(value: Option<String>, name: &str) -> Result<String, ApiError> {
    let value = value.ok_or_else(|| {
        ApiError::BadRequest(format!("Parameter '{}' is required", name))
    })?;
    if value.trim().is_empty() {
        return Err(ApiError::BadRequest(format!(
            "Parameter '{}' must not be empty",
            name
        )));
    }
    Ok(value)
}

// =============================================================================
// Handler functions
// =============================================================================

/// GET /health - liveness plus which optional collaborators are active.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        llm_enabled: state.llm_enabled,
        voice_enabled: state.agent.voice_enabled(),
    })
}

/// POST /agent/chat - run one text turn.
pub async fn chat(
    State(state): State<AppState>,
    Json(body): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    if body.message.trim().is_empty() {
        return Err(ApiError::BadRequest("'message' must not be empty".to_string()));
    }

    let started = Instant::now();
    let session_id = session_or_new(body.session_id);
    let actor = resolve_actor(&state, body.actor_id).await?;
    let utterance = Utterance {
        actor,
        ..Utterance::new(body.message)
    };

    let outcome = state
        .agent
        .handle_turn(&session_id, utterance, body.intent.as_deref())
        .await;
    Ok(Json(ChatResponse::from_outcome(outcome, started)))
}

/// POST /agent/voice-message - transcribe, run the turn, synthesize the reply.
pub async fn voice_message(
    State(state): State<AppState>,
    Json(body): Json<VoiceRequest>,
) -> Result<Json<VoiceResponse>, ApiError> {
    if !state.agent.voice_enabled() {
        return Err(ApiError::ServiceUnavailable(
            "Voice input is disabled on this server".to_string(),
        ));
    }

    let audio = BASE64
        .decode(body.audio_data.trim())
        .map_err(|_| ApiError::BadRequest("'audio_data' must be valid base64".to_string()))?;
    let limit = state.config.voice.max_audio_bytes;
    if audio.len() > limit {
        return Err(ApiError::PayloadTooLarge(format!(
            "Audio exceeds the {} byte limit",
            limit
        )));
    }

    let started = Instant::now();
    let session_id = session_or_new(body.session_id);
    let actor = resolve_actor(&state, body.actor_id).await?;
    debug!(session_id = %session_id, bytes = audio.len(), "Voice message received");

    let outcome = state.agent.handle_voice_turn(&audio, &session_id, actor).await;
    Ok(Json(VoiceResponse {
        turn: ChatResponse::from_outcome(outcome.turn, started),
        original_text: outcome.original_text,
        audio_response: outcome.audio_response.map(|bytes| BASE64.encode(bytes)),
    }))
}

/// GET /agent/ws/{session_id} - one turn per text frame.
pub async fn ws(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
    upgrade: WebSocketUpgrade,
) -> Response {
    upgrade.on_upgrade(move |socket| handle_socket(socket, state, session_id))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, session_id: String) {
    info!(session_id = %session_id, "WebSocket connected");

    while let Some(msg) = socket.recv().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(Message::Binary(_)) => {
                let frame = WsFrame::Error {
                    message: "Only text frames are supported".to_string(),
                };
                if !send_frame(&mut socket, &frame).await {
                    break;
                }
                continue;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "WebSocket receive failed");
                break;
            }
        };

        let frame = match serde_json::from_str::<WsIncoming>(text.as_str()) {
            Ok(incoming) if !incoming.message.trim().is_empty() => {
                match resolve_actor(&state, incoming.actor_id).await {
                    Ok(actor) => {
                        let utterance = Utterance {
                            actor,
                            ..Utterance::new(incoming.message)
                        };
                        let outcome = state
                            .agent
                            .handle_turn(&session_id, utterance, incoming.intent.as_deref())
                            .await;
                        WsFrame::AgentResponse(outcome)
                    }
                    Err(_) => WsFrame::Error {
                        message: "Could not verify the acting user".to_string(),
                    },
                }
            }
            Ok(_) => WsFrame::Error {
                message: "'message' must not be empty".to_string(),
            },
            Err(_) => WsFrame::Error {
                message: "Invalid message format".to_string(),
            },
        };

        if !send_frame(&mut socket, &frame).await {
            break;
        }
    }

    info!(session_id = %session_id, "WebSocket disconnected");
}

async fn send_frame(socket: &mut WebSocket, frame: &WsFrame) -> bool {
    let text = match serde_json::to_string(frame) {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "Failed to encode WebSocket frame");
            return false;
        }
    };
    socket.send(Message::Text(text.into())).await.is_ok()
}

/// GET /agent/conversation/{session_id} - ordered turns of a session.
pub async fn conversation(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ConversationResponse>, ApiError> {
    let messages = state
        .agent
        .history(&session_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Conversation {} not found", session_id)))?;

    Ok(Json(ConversationResponse {
        total: messages.len(),
        session_id,
        messages,
    }))
}

/// POST /agent/conversation/{session_id}/clear - reset a session. Idempotent.
pub async fn clear_conversation(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ClearResponse>, ApiError> {
    state.agent.clear(&session_id).await?;
    Ok(Json(ClearResponse {
        success: true,
        message: "Conversation cleared".to_string(),
    }))
}

/// GET /agent/intent?message= - classify without running a turn.
pub async fn intent(
    State(state): State<AppState>,
    Query(params): Query<IntentParams>,
) -> Result<Json<IntentResponse>, ApiError> {
    let message = required_param(params.message, "message")?;
    let classification = state.agent.classify_message(&message);
    Ok(Json(IntentResponse {
        message,
        intent: classification.intent,
        confidence: classification.confidence,
    }))
}

/// GET /agent/suggestions?query= - product summaries for a free-text query.
pub async fn suggestions(
    State(state): State<AppState>,
    Query(params): Query<SuggestionsParams>,
) -> Result<Json<SuggestionsResponse>, ApiError> {
    let query = required_param(params.query, "query")?;
    let suggestions = state.agent.suggestions(&query).await?;
    Ok(Json(SuggestionsResponse {
        total_found: suggestions.len(),
        query,
        suggestions,
    }))
}
