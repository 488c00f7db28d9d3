//! Speech collaborator.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use visioneer_core::config::{LlmConfig, VoiceConfig};

use crate::error::AgentError;

/// Converts between audio and text.
#[async_trait]
pub trait VoiceProvider: Send + Sync {
    /// Transcribe raw audio into text.
    async fn audio_to_text(&self, audio: &[u8]) -> Result<String, AgentError>;

    /// Synthesize speech for `text`.
    async fn text_to_audio(&self, text: &str) -> Result<Vec<u8>, AgentError>;
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
}

/// Whisper transcription and TTS synthesis against an OpenAI-compatible API.
#[derive(Debug, Clone)]
pub struct OpenAiVoiceProvider {
    client: Client,
    api_base: String,
    api_key: String,
    transcription_model: String,
    speech_model: String,
    speech_voice: String,
}

impl OpenAiVoiceProvider {
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        voice: &VoiceConfig,
    ) -> Result<Self, AgentError> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(AgentError::TranscriptionFailed(
                "API key must not be empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| {
                AgentError::TranscriptionFailed(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            api_base: api_base.into(),
            api_key,
            transcription_model: voice.transcription_model.clone(),
            speech_model: voice.speech_model.clone(),
            speech_voice: voice.speech_voice.clone(),
        })
    }

    /// Build a provider when voice is enabled and the `[llm]` endpoint has a key.
    pub fn from_config(voice: &VoiceConfig, llm: &LlmConfig) -> Result<Option<Self>, AgentError> {
        if !voice.enabled {
            return Ok(None);
        }
        let Some(api_key) = llm.resolve_api_key() else {
            tracing::warn!("Voice enabled but no API key configured; voice turns are disabled");
            return Ok(None);
        };
        Ok(Some(Self::new(&llm.api_base, api_key, voice)?))
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/audio/{}", self.api_base.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl VoiceProvider for OpenAiVoiceProvider {
    async fn audio_to_text(&self, audio: &[u8]) -> Result<String, AgentError> {
        let file = Part::bytes(audio.to_vec())
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| AgentError::TranscriptionFailed(e.to_string()))?;
        let form = Form::new()
            .text("model", self.transcription_model.clone())
            .text("response_format", "text")
            .part("file", file);

        let response = self
            .client
            .post(self.endpoint("transcriptions"))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AgentError::TranscriptionFailed(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::TranscriptionFailed(format!(
                "status {}: {}",
                status, body
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| AgentError::TranscriptionFailed(format!("invalid response: {}", e)))?;
        let text = text.trim();
        if text.is_empty() {
            return Err(AgentError::TranscriptionFailed("no speech detected".to_string()));
        }

        debug!(model = %self.transcription_model, chars = text.len(), "Transcription received");
        Ok(text.to_string())
    }

    async fn text_to_audio(&self, text: &str) -> Result<Vec<u8>, AgentError> {
        let request = SpeechRequest {
            model: &self.speech_model,
            voice: &self.speech_voice,
            input: text,
        };

        let response = self
            .client
            .post(self.endpoint("speech"))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AgentError::SynthesisFailed(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::SynthesisFailed(format!("status {}: {}", status, body)));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| AgentError::SynthesisFailed(format!("invalid response: {}", e)))?;
        if audio.is_empty() {
            return Err(AgentError::SynthesisFailed("empty audio".to_string()));
        }
        Ok(audio.to_vec())
    }
}

/// Provider that treats audio bytes as UTF-8 text.
///
/// Lets the voice path be exercised end to end without a speech engine.
/// Used by tests; production wires `OpenAiVoiceProvider`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockVoiceProvider;

impl MockVoiceProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl VoiceProvider for MockVoiceProvider {
    async fn audio_to_text(&self, audio: &[u8]) -> Result<String, AgentError> {
        let text = std::str::from_utf8(audio)
            .map_err(|e| AgentError::TranscriptionFailed(format!("not UTF-8: {}", e)))?
            .trim();
        if text.is_empty() {
            return Err(AgentError::TranscriptionFailed("no speech detected".to_string()));
        }
        Ok(text.to_string())
    }

    async fn text_to_audio(&self, text: &str) -> Result<Vec<u8>, AgentError> {
        Ok(text.as_bytes().to_vec())
    }
}
