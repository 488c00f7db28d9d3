//! Runs one conversational turn end to end.
//!
//! classify -> dispatch -> compose, with the session locked for the whole
//! turn and both sides of the exchange recorded in the session store.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{debug, info, warn};

use visioneer_core::config::AgentConfig;
use visioneer_core::types::{Product, ProductSummary, Turn};

use crate::dispatcher::ActionDispatcher;
use crate::error::AgentError;
use crate::intent::{self, extract, Classification};
use crate::response::ResponseComposer;
use crate::session::SessionStore;
use crate::types::{ActionResult, Actor, Intent, Session, TurnOutcome, Utterance, VoiceOutcome};
use crate::voice::VoiceProvider;

pub struct AgentOrchestrator {
    store: Arc<SessionStore>,
    dispatcher: ActionDispatcher,
    composer: ResponseComposer,
    voice: Option<Arc<dyn VoiceProvider>>,
}

impl AgentOrchestrator {
    pub fn new(store: Arc<SessionStore>, dispatcher: ActionDispatcher) -> Self {
        Self {
            store,
            dispatcher,
            composer: ResponseComposer::new(),
            voice: None,
        }
    }

    /// Accept voice turns through `voice`.
    pub fn with_voice(mut self, voice: Arc<dyn VoiceProvider>) -> Self {
        self.voice = Some(voice);
        self
    }

    pub fn config(&self) -> &AgentConfig {
        self.dispatcher.config()
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn voice_enabled(&self) -> bool {
        self.voice.is_some()
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.config().collaborator_timeout_ms)
    }

    /// Handle one text turn. Always returns a well-formed outcome.
    pub async fn handle_turn(
        &self,
        session_id: &str,
        utterance: Utterance,
        intent_hint: Option<&str>,
    ) -> TurnOutcome {
        let text = utterance.text.trim();
        let limit = self.config().max_message_length;
        if text.chars().count() > limit {
            return self.failure_outcome(session_id, Intent::General, &AgentError::MessageTooLong(limit));
        }

        let handle = match self.store.get_or_create(session_id).await {
            Ok(handle) => handle,
            Err(err) => {
                warn!(session_id, error = %err, "Session unavailable");
                return self.failure_outcome(session_id, Intent::General, &err);
            }
        };
        let mut session = handle.lock().await;

        let intent = self.resolve_intent(&session, text, intent_hint);
        debug!(session_id, intent = %intent, "Turn classified");

        if let Some(actor) = &utterance.actor {
            if let Err(err) = self.store.attach_user(session_id, actor.user_id).await {
                warn!(session_id, error = %err, "Failed to attach user to session");
            }
        }
        self.record(&mut session, Turn::user(text), intent, json!({})).await;

        let result = self
            .dispatcher
            .dispatch(intent, text, &mut session, utterance.actor.as_ref())
            .await;
        let reply = self.composer.compose(&result);

        self.record(
            &mut session,
            Turn::assistant(reply.message.clone()),
            intent,
            reply.metadata.clone(),
        )
        .await;
        if let Err(err) = self.store.save_context(&session).await {
            warn!(session_id, error = %err, "Failed to persist session context");
        }
        drop(session);
        self.store.release(session_id, handle);

        info!(session_id, intent = %intent, success = result.success, "Turn handled");
        TurnOutcome {
            success: result.success,
            message: reply.message,
            metadata: reply.metadata,
            intent,
            session_id: session_id.to_string(),
        }
    }

    /// Transcribe `audio`, run the turn and synthesize the reply.
    pub async fn handle_voice_turn(
        &self,
        audio: &[u8],
        session_id: &str,
        actor: Option<Actor>,
    ) -> VoiceOutcome {
        let Some(voice) = &self.voice else {
            let err = AgentError::TranscriptionFailed("voice input is disabled".to_string());
            return VoiceOutcome {
                turn: self.failure_outcome(session_id, Intent::General, &err),
                original_text: None,
                audio_response: None,
            };
        };

        let transcript = match tokio::time::timeout(self.timeout(), voice.audio_to_text(audio)).await {
            Ok(Ok(text)) => text,
            Ok(Err(err)) => {
                warn!(session_id, error = %err, "Transcription failed");
                return self.transcription_failure(session_id, err);
            }
            Err(_) => {
                warn!(session_id, "Transcription timed out");
                return self.transcription_failure(
                    session_id,
                    AgentError::TranscriptionFailed("timed out".to_string()),
                );
            }
        };

        let utterance = Utterance {
            actor,
            ..Utterance::new(transcript.clone())
        };
        let turn = self.handle_turn(session_id, utterance, None).await;

        let audio_response =
            match tokio::time::timeout(self.timeout(), voice.text_to_audio(&turn.message)).await {
                Ok(Ok(bytes)) => Some(bytes),
                Ok(Err(err)) => {
                    warn!(session_id, error = %err, "Speech synthesis failed; returning text only");
                    None
                }
                Err(_) => {
                    warn!(session_id, "Speech synthesis timed out; returning text only");
                    None
                }
            };

        VoiceOutcome {
            turn,
            original_text: Some(transcript),
            audio_response,
        }
    }

    fn transcription_failure(&self, session_id: &str, err: AgentError) -> VoiceOutcome {
        let err = match err {
            AgentError::TranscriptionFailed(_) => err,
            other => AgentError::TranscriptionFailed(other.to_string()),
        };
        VoiceOutcome {
            turn: self.failure_outcome(session_id, Intent::General, &err),
            original_text: None,
            audio_response: None,
        }
    }

    /// Intent for this turn: a valid hint, a pending follow-up, or the
    /// classifier's answer.
    fn resolve_intent(&self, session: &Session, text: &str, hint: Option<&str>) -> Intent {
        if let Some(hint) = hint {
            return match hint.parse::<Intent>() {
                Ok(intent) => intent,
                Err(_) => {
                    let err = AgentError::ClassificationAmbiguous(hint.to_string());
                    warn!(session_id = %session.id, error = %err, "Falling back to general");
                    Intent::General
                }
            };
        }

        let classified = intent::classify(text);
        match session.context.pending_intent {
            Some(pending) if classified == Intent::General && !extract::numbers(text).is_empty() => {
                debug!(session_id = %session.id, intent = %pending, "Completing pending action");
                pending
            }
            _ => classified,
        }
    }

    async fn record(&self, session: &mut Session, turn: Turn, intent: Intent, metadata: serde_json::Value) {
        if let Err(err) = self
            .store
            .record_turn(session, turn, Some(intent), metadata)
            .await
        {
            warn!(session_id = %session.id, error = %err, "Failed to persist turn");
        }
    }

    fn failure_outcome(&self, session_id: &str, intent: Intent, err: &AgentError) -> TurnOutcome {
        let reply = self.composer.compose(&ActionResult::failure(intent, err));
        TurnOutcome {
            success: false,
            message: reply.message,
            metadata: reply.metadata,
            intent,
            session_id: session_id.to_string(),
        }
    }

    /// Ordered turns of a session, `None` if unknown.
    pub async fn history(&self, session_id: &str) -> Result<Option<Vec<Turn>>, AgentError> {
        self.store.history(session_id).await
    }

    /// Reset a session's turns and context. Idempotent.
    pub async fn clear(&self, session_id: &str) -> Result<bool, AgentError> {
        let existed = self.store.clear(session_id).await?;
        info!(session_id, existed, "Session cleared");
        Ok(existed)
    }

    /// Classify without dispatching.
    pub fn classify_message(&self, text: &str) -> Classification {
        intent::classify_detailed(text)
    }

    /// Product suggestions for a free-text query, bounded by the search limit.
    pub async fn suggestions(&self, query: &str) -> Result<Vec<ProductSummary>, AgentError> {
        let constraints = extract::extract_search_constraints(query, self.config());
        let products = tokio::time::timeout(
            self.timeout(),
            self.dispatcher.catalog().find_products(&constraints),
        )
        .await
        .map_err(|_| AgentError::CatalogUnavailable("suggestions timed out".to_string()))??;

        Ok(products
            .iter()
            .take(self.config().max_search_results)
            .map(Product::summary)
            .collect())
    }
}
