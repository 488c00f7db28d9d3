use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, VisioneerError};

/// Top-level configuration for the Visioneer backend.
///
/// Loaded from `~/.visioneer/config.toml` by default. Every section falls back
/// to its defaults when omitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VisioneerConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub voice: VoiceConfig,
}

impl VisioneerConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: VisioneerConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject values the agent cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.agent.max_search_results == 0 {
            return Err(VisioneerError::Config(
                "agent.max_search_results must be at least 1".to_string(),
            ));
        }
        if self.agent.max_message_length == 0 {
            return Err(VisioneerError::Config(
                "agent.max_message_length must be at least 1".to_string(),
            ));
        }
        if self.agent.collaborator_timeout_ms == 0 {
            return Err(VisioneerError::Config(
                "agent.collaborator_timeout_ms must be positive".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(VisioneerError::Config(format!(
                "llm.temperature must be within 0.0..=2.0, got {}",
                self.llm.temperature
            )));
        }
        Ok(())
    }

    /// Data directory with a leading `~` expanded against `$HOME`.
    pub fn data_dir(&self) -> PathBuf {
        expand_home(&self.general.data_dir)
    }

    /// Path of the SQLite database inside the data directory.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir().join("visioneer.db")
    }

    /// Path of the API token file, relative paths resolved inside the data directory.
    pub fn token_path(&self) -> PathBuf {
        let raw = expand_home(&self.api.token_file);
        if raw.is_absolute() {
            raw
        } else {
            self.data_dir().join(raw)
        }
    }
}

fn expand_home(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(raw)
}

/// General process settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory holding the SQLite database and API token.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// Address the HTTP server binds to.
    pub host: String,
    /// Port the HTTP server listens on.
    pub port: u16,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.visioneer/data".to_string(),
            log_level: "info".to_string(),
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

/// HTTP surface configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Requests allowed per client per minute.
    pub rate_limit_per_minute: u32,
    /// Allowed CORS origins. Empty means localhost only.
    pub cors_origins: Vec<String>,
    /// Maximum accepted request body size in bytes.
    pub max_body_bytes: usize,
    /// Bearer token file name.
    pub token_file: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            rate_limit_per_minute: 60,
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:8080".to_string(),
            ],
            max_body_bytes: 10 * 1024 * 1024,
            token_file: "api_token".to_string(),
        }
    }
}

/// Conversational agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Longest accepted utterance, in characters.
    pub max_message_length: usize,
    /// Upper bound on products returned by a search turn.
    pub max_search_results: usize,
    /// Turns of history forwarded to the language model.
    pub max_conversation_history: usize,
    /// Deadline for any single catalog, model or voice call.
    pub collaborator_timeout_ms: u64,
    /// Category names recognised in search phrases.
    pub known_categories: Vec<String>,
    /// Brand names recognised in search phrases.
    pub known_brands: Vec<String>,
    /// Price cap applied to "cheap"/"under" searches without an amount.
    pub default_max_price: f64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_message_length: 2000,
            max_search_results: 5,
            max_conversation_history: 10,
            collaborator_timeout_ms: 5000,
            known_categories: [
                "electronics",
                "clothing",
                "books",
                "home",
                "sports",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            known_brands: [
                "apple", "samsung", "nike", "adidas", "sony", "vans", "converse", "asus",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            default_max_price: 100.0,
        }
    }
}

/// OpenAI-compatible language model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Route general chat through the model.
    pub enabled: bool,
    /// Base URL of the chat completions API.
    pub api_base: String,
    /// API key. Falls back to `OPENAI_API_KEY` when empty.
    pub api_key: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o".to_string(),
            temperature: 0.7,
            max_tokens: 500,
        }
    }
}

impl LlmConfig {
    /// Configured key, or the `OPENAI_API_KEY` environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        if !self.api_key.is_empty() {
            return Some(self.api_key.clone());
        }
        std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty())
    }
}

/// Voice entry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Accept voice turns.
    pub enabled: bool,
    /// Largest decoded audio payload accepted.
    pub max_audio_bytes: usize,
    /// Speech-to-text model. Endpoint and key are shared with `[llm]`.
    pub transcription_model: String,
    pub speech_model: String,
    pub speech_voice: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_audio_bytes: 10 * 1024 * 1024,
            transcription_model: "whisper-1".to_string(),
            speech_model: "tts-1".to_string(),
            speech_voice: "alloy".to_string(),
        }
    }
}
