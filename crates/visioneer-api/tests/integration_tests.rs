//! Integration tests for the Visioneer API.
//!
//! Drives the router with `oneshot` against a seeded in-memory database.
//! The WebSocket test binds a real listener on an ephemeral port.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Value};
use tower::ServiceExt;

use visioneer_api::handlers::{
    ChatResponse, ConversationResponse, HealthResponse, IntentResponse, SuggestionsResponse,
    VoiceResponse,
};
use visioneer_agent::{MockVoiceProvider, VoiceProvider};
use visioneer_api::{create_router, AppState};
use visioneer_core::config::VisioneerConfig;
use visioneer_core::types::{NewUser, UserRole};
use visioneer_storage::{seed_demo_catalog, Database, ProductRepository, UserRepository};

// =============================================================================
// Helpers
// =============================================================================

const TEST_TOKEN: &str = "test-token-12345";

struct Harness {
    state: AppState,
    db: Arc<Database>,
    seller_id: i64,
    buyer_id: i64,
}

fn make_harness_with(configure: impl FnOnce(&mut VisioneerConfig)) -> Harness {
    let mut config = VisioneerConfig::default();
    configure(&mut config);

    let db = Arc::new(Database::in_memory().unwrap());
    let seller_id = seed_demo_catalog(&db).unwrap().seller_id;
    let buyer_id = UserRepository::new(Arc::clone(&db))
        .create(&NewUser {
            email: "buyer@example.com".to_string(),
            username: "buyer".to_string(),
            full_name: None,
            role: UserRole::Buyer,
        })
        .unwrap()
        .id;

    let voice = config
        .voice
        .enabled
        .then(|| Arc::new(MockVoiceProvider::new()) as Arc<dyn VoiceProvider>);
    let mut state = AppState::assemble(config, Arc::clone(&db), None, voice);
    state.api_token = TEST_TOKEN.to_string();
    Harness {
        state,
        db,
        seller_id,
        buyer_id,
    }
}

fn make_harness() -> Harness {
    make_harness_with(|_| {})
}

fn make_app() -> axum::Router {
    create_router(make_harness().state)
}

fn authed_get(uri: &str) -> Request<Body> {
    Request::get(uri)
        .header("authorization", format!("Bearer {}", TEST_TOKEN))
        .body(Body::empty())
        .unwrap()
}

fn authed_post_empty(uri: &str) -> Request<Body> {
    Request::post(uri)
        .header("authorization", format!("Bearer {}", TEST_TOKEN))
        .body(Body::empty())
        .unwrap()
}

fn authed_post_json(uri: &str, json: &Value) -> Request<Body> {
    Request::post(uri)
        .header("authorization", format!("Bearer {}", TEST_TOKEN))
        .header("content-type", "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

/// Read full response body bytes.
async fn body_bytes(resp: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .unwrap()
        .to_vec()
}

async fn chat(app: &axum::Router, body: Value) -> ChatResponse {
    let resp = app
        .clone()
        .oneshot(authed_post_json("/agent/chat", &body))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    serde_json::from_slice(&body_bytes(resp).await).unwrap()
}

fn price_of(db: &Arc<Database>, id: i64) -> f64 {
    ProductRepository::new(Arc::clone(db))
        .find_by_id(id)
        .unwrap()
        .unwrap()
        .price
}

// =============================================================================
// Public endpoints
// =============================================================================

#[tokio::test]
async fn test_health_no_auth_required() {
    let app = make_app();
    let resp = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let health: HealthResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(health.status, "healthy");
    assert!(!health.llm_enabled);
    assert!(!health.voice_enabled);
}

// =============================================================================
// Auth
// =============================================================================

#[tokio::test]
async fn test_missing_token_returns_401() {
    let app = make_app();
    let resp = app
        .oneshot(
            Request::get("/agent/intent?message=hello")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let json: Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(json["error"], "unauthorized");
    assert!(json["message"].as_str().unwrap().contains("Missing"));
}

#[tokio::test]
async fn test_wrong_token_returns_401() {
    let app = make_app();
    let resp = app
        .oneshot(
            Request::post("/agent/chat")
                .header("authorization", "Bearer wrong-token-value")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"message":"hi"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Chat
// =============================================================================

#[tokio::test]
async fn test_chat_generates_session_id() {
    let app = make_app();
    let reply = chat(&app, json!({"message": "hello there"})).await;

    assert!(reply.success);
    assert_eq!(reply.metadata["intent"], "general");
    assert!(uuid::Uuid::parse_str(&reply.session_id).is_ok());
}

#[tokio::test]
async fn test_chat_seller_updates_own_price() {
    let h = make_harness();
    let db = Arc::clone(&h.db);
    let app = create_router(h.state);

    let search = chat(
        &app,
        json!({"message": "show me asus laptops", "session_id": "s-1", "actor_id": h.seller_id}),
    )
    .await;
    assert_eq!(search.session_id, "s-1");
    assert!(search.message.contains("ASUS"));

    let update = chat(
        &app,
        json!({"message": "Change the price to $1,199", "session_id": "s-1", "actor_id": h.seller_id}),
    )
    .await;
    assert!(update.success, "{}", update.message);
    assert_eq!(update.metadata["action"]["new_price"], 1199.0);
    assert_eq!(price_of(&db, 4), 1199.0);
}

#[tokio::test]
async fn test_chat_buyer_cannot_update_price() {
    let h = make_harness();
    let db = Arc::clone(&h.db);
    let app = create_router(h.state);

    let reply = chat(
        &app,
        json!({"message": "set product 1 price to $5", "actor_id": h.buyer_id}),
    )
    .await;
    assert!(!reply.success);
    assert_eq!(reply.metadata["failure_reason"], "not_authorized");
    assert_eq!(price_of(&db, 1), 85.0);
}

#[tokio::test]
async fn test_chat_unknown_actor_is_anonymous() {
    let h = make_harness();
    let db = Arc::clone(&h.db);
    let app = create_router(h.state);

    let reply = chat(
        &app,
        json!({"message": "set product 1 price to $5", "actor_id": 9999}),
    )
    .await;
    assert!(!reply.success);
    assert_eq!(reply.metadata["failure_reason"], "not_authorized");
    assert_eq!(price_of(&db, 1), 85.0);
}

#[tokio::test]
async fn test_chat_inactive_seller_cannot_update() {
    let h = make_harness();
    let db = Arc::clone(&h.db);
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE users SET is_active = 0 WHERE id = ?1",
            rusqlite::params![h.seller_id],
        )
        .map_err(|e| visioneer_core::error::VisioneerError::Storage(e.to_string()))?;
        Ok(())
    })
    .unwrap();
    let app = create_router(h.state);

    let reply = chat(
        &app,
        json!({"message": "set product 1 price to $5", "actor_id": h.seller_id}),
    )
    .await;
    assert!(!reply.success);
    assert_eq!(price_of(&db, 1), 85.0);
}

#[tokio::test]
async fn test_chat_intent_hint_overrides_classifier() {
    let app = make_app();
    let reply = chat(&app, json!({"message": "asus", "intent": "product_search"})).await;
    assert_eq!(reply.intent, visioneer_agent::Intent::ProductSearch);
}

#[tokio::test]
async fn test_chat_empty_message_is_400() {
    let app = make_app();
    let resp = app
        .oneshot(authed_post_json("/agent/chat", &json!({"message": "   "})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let json: Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(json["error"], "bad_request");
}

#[tokio::test]
async fn test_chat_too_long_is_domain_failure() {
    let app = create_router(
        make_harness_with(|config| config.agent.max_message_length = 10).state,
    );
    let reply = chat(&app, json!({"message": "this message is far too long"})).await;
    assert!(!reply.success);
    assert_eq!(reply.metadata["failure_reason"], "message_too_long");
}

// =============================================================================
// Conversation history
// =============================================================================

#[tokio::test]
async fn test_conversation_history_and_clear() {
    let app = make_app();
    chat(&app, json!({"message": "hello", "session_id": "hist"})).await;

    let resp = app
        .clone()
        .oneshot(authed_get("/agent/conversation/hist"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let history: ConversationResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(history.total, 2);
    assert_eq!(history.messages[0].text, "hello");

    for _ in 0..2 {
        let resp = app
            .clone()
            .oneshot(authed_post_empty("/agent/conversation/hist/clear"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json: Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
        assert_eq!(json["success"], true);
    }

    let resp = app
        .oneshot(authed_get("/agent/conversation/hist"))
        .await
        .unwrap();
    let history: ConversationResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(history.total, 0);
}

#[tokio::test]
async fn test_unknown_conversation_is_404() {
    let app = make_app();
    let resp = app
        .oneshot(authed_get("/agent/conversation/never-seen"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let json: Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(json["error"], "not_found");
}

// =============================================================================
// Intent and suggestions
// =============================================================================

#[tokio::test]
async fn test_intent_endpoint() {
    let app = make_app();
    let resp = app
        .oneshot(authed_get("/agent/intent?message=show%20me%20asus%20laptops"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: IntentResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(body.message, "show me asus laptops");
    assert_eq!(body.intent, visioneer_agent::Intent::ProductSearch);
    assert!(body.confidence > 0.0 && body.confidence <= 1.0);
}

#[tokio::test]
async fn test_intent_requires_message() {
    let app = make_app();
    let resp = app.oneshot(authed_get("/agent/intent")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_suggestions_endpoint() {
    let app = make_app();
    let resp = app
        .oneshot(authed_get("/agent/suggestions?query=laptops"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: SuggestionsResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(body.total_found, body.suggestions.len());
    assert!(body.suggestions.iter().any(|p| p.name.contains("ASUS")));
    assert!(body.suggestions.len() <= 5);
}

// =============================================================================
// Voice
// =============================================================================

#[tokio::test]
async fn test_voice_disabled_is_503() {
    let app = make_app();
    let resp = app
        .oneshot(authed_post_json(
            "/agent/voice-message",
            &json!({"audio_data": BASE64.encode("hello"), "session_id": "v"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_voice_round_trip() {
    let app = create_router(make_harness_with(|config| config.voice.enabled = true).state);
    let resp = app
        .oneshot(authed_post_json(
            "/agent/voice-message",
            &json!({"audio_data": BASE64.encode("show me asus laptops"), "session_id": "v"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body: VoiceResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert!(body.turn.success);
    assert_eq!(body.turn.session_id, "v");
    assert_eq!(body.original_text.as_deref(), Some("show me asus laptops"));
    let audio = BASE64.decode(body.audio_response.unwrap()).unwrap();
    assert_eq!(String::from_utf8(audio).unwrap(), body.turn.message);
}

#[tokio::test]
async fn test_voice_invalid_base64_is_400() {
    let app = create_router(make_harness_with(|config| config.voice.enabled = true).state);
    let resp = app
        .oneshot(authed_post_json(
            "/agent/voice-message",
            &json!({"audio_data": "***not base64***"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_voice_oversized_audio_is_413() {
    let app = create_router(
        make_harness_with(|config| {
            config.voice.enabled = true;
            config.voice.max_audio_bytes = 4;
        })
        .state,
    );
    let resp = app
        .oneshot(authed_post_json(
            "/agent/voice-message",
            &json!({"audio_data": BASE64.encode("far more than four bytes")}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_voice_silence_is_transcription_failure() {
    let app = create_router(make_harness_with(|config| config.voice.enabled = true).state);
    let resp = app
        .oneshot(authed_post_json(
            "/agent/voice-message",
            &json!({"audio_data": BASE64.encode("   ")}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: VoiceResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert!(!body.turn.success);
    assert_eq!(body.turn.metadata["failure_reason"], "transcription_failed");
    assert!(body.original_text.is_none());
}

// =============================================================================
// Rate limiting
// =============================================================================

#[tokio::test]
async fn test_rate_limit_returns_429() {
    let app = create_router(make_harness_with(|config| config.api.rate_limit_per_minute = 2).state);

    let mut statuses = Vec::new();
    for _ in 0..3 {
        let resp = app
            .clone()
            .oneshot(authed_get("/agent/intent?message=hi"))
            .await
            .unwrap();
        statuses.push(resp.status());
    }
    assert_eq!(statuses.last(), Some(&StatusCode::TOO_MANY_REQUESTS));

    // Health stays reachable.
    let resp = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

// =============================================================================
// WebSocket
// =============================================================================

#[tokio::test]
async fn test_websocket_turns_and_errors() {
    use futures::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;
    use tokio_tungstenite::tungstenite::Message;

    let app = make_app();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let mut request = format!("ws://{}/agent/ws/ws-session", addr)
        .into_client_request()
        .unwrap();
    request.headers_mut().insert(
        "authorization",
        format!("Bearer {}", TEST_TOKEN).parse().unwrap(),
    );
    let (mut socket, _) = tokio_tungstenite::connect_async(request).await.unwrap();

    socket
        .send(Message::Text(
            json!({"message": "show me asus laptops"}).to_string().into(),
        ))
        .await
        .unwrap();
    let frame = socket.next().await.unwrap().unwrap();
    let reply: Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
    assert_eq!(reply["type"], "agent_response");
    assert_eq!(reply["session_id"], "ws-session");
    assert_eq!(reply["intent"], "product_search");

    socket
        .send(Message::Text("not json".to_string().into()))
        .await
        .unwrap();
    let frame = socket.next().await.unwrap().unwrap();
    let reply: Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
    assert_eq!(reply["type"], "error");

    socket.close(None).await.unwrap();
}

#[tokio::test]
async fn test_websocket_requires_auth() {
    let app = make_app();
    let resp = app
        .oneshot(
            Request::get("/agent/ws/ws-session")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}
