//! Application state shared across all route handlers.
//!
//! AppState holds the agent, the user directory used to resolve actors and
//! the bearer token. It is passed to handlers via axum's State extractor.

use std::sync::Arc;
use std::time::Instant;

use visioneer_agent::{
    ActionDispatcher, AgentOrchestrator, LanguageModel, OpenAiChatClient, OpenAiVoiceProvider,
    SessionStore, StoreCatalog, VoiceProvider,
};
use visioneer_core::config::VisioneerConfig;
use visioneer_core::error::VisioneerError;
use visioneer_storage::{ConversationRepository, Database, ProductRepository, UserRepository};

use crate::auth::generate_token;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<VisioneerConfig>,
    pub agent: Arc<AgentOrchestrator>,
    /// Directory used to turn an `actor_id` into an `Actor`.
    pub users: Arc<UserRepository>,
    /// Bearer token required on every `/agent/*` route.
    pub api_token: String,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
    pub llm_enabled: bool,
}

impl AppState {
    /// Create state around an already assembled orchestrator.
    ///
    /// A fresh random token is generated; callers that persist tokens
    /// replace `api_token` afterwards.
    pub fn new(config: VisioneerConfig, agent: AgentOrchestrator, users: UserRepository) -> Self {
        Self {
            config: Arc::new(config),
            agent: Arc::new(agent),
            users: Arc::new(users),
            api_token: generate_token(),
            start_time: Instant::now(),
            llm_enabled: false,
        }
    }

    /// Wire the agent and its collaborators on top of `database`.
    ///
    /// The language model is attached only when enabled and keyed. The
    /// voice path needs `voice.enabled` and the same key.
    pub fn from_database(
        config: VisioneerConfig,
        database: Arc<Database>,
    ) -> Result<Self, VisioneerError> {
        let llm = OpenAiChatClient::from_config(&config.llm)
            .map_err(|e| VisioneerError::Config(e.to_string()))?
            .map(|client| Arc::new(client) as Arc<dyn LanguageModel>);
        let voice = OpenAiVoiceProvider::from_config(&config.voice, &config.llm)
            .map_err(|e| VisioneerError::Config(e.to_string()))?
            .map(|provider| Arc::new(provider) as Arc<dyn VoiceProvider>);
        Ok(Self::assemble(config, database, llm, voice))
    }

    /// Like `from_database`, with explicit collaborators.
    pub fn assemble(
        config: VisioneerConfig,
        database: Arc<Database>,
        llm: Option<Arc<dyn LanguageModel>>,
        voice: Option<Arc<dyn VoiceProvider>>,
    ) -> Self {
        let catalog = StoreCatalog::new(Arc::new(ProductRepository::new(Arc::clone(&database))));
        let mut dispatcher = ActionDispatcher::new(Arc::new(catalog), config.agent.clone());
        let llm_enabled = llm.is_some();
        if let Some(llm) = llm {
            dispatcher = dispatcher.with_language_model(llm);
        }

        let sessions = SessionStore::with_persistence(Arc::new(ConversationRepository::new(
            Arc::clone(&database),
        )));
        let mut agent = AgentOrchestrator::new(Arc::new(sessions), dispatcher);
        let voice_enabled = voice.is_some();
        if let Some(voice) = voice {
            agent = agent.with_voice(voice);
        }

        tracing::info!(llm = llm_enabled, voice = voice_enabled, "Agent assembled");

        let mut state = Self::new(config, agent, UserRepository::new(database));
        state.llm_enabled = llm_enabled;
        state
    }
}
