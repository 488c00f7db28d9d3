//! Error types for the conversational agent.
//!
//! Every `AgentError` is recovered into a failed turn before it reaches a
//! caller. `FailureKind` is the stable, serializable label that travels in
//! turn metadata, and `user_message` is the only text a user ever sees.

use serde::{Deserialize, Serialize};

use visioneer_core::error::VisioneerError;

/// Errors raised while handling a conversational turn.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("unrecognised intent hint: {0}")]
    ClassificationAmbiguous(String),
    #[error("no target product could be resolved")]
    NoTargetProduct,
    #[error("actor may not modify the requested product")]
    NotAuthorized,
    #[error("no {0} value found in message")]
    UnparsableValue(&'static str),
    #[error("transcription failed: {0}")]
    TranscriptionFailed(String),
    #[error("catalog unavailable: {0}")]
    CatalogUnavailable(String),
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { available: i64, requested: i64 },
    /// Carries a user-facing explanation produced by the agent itself.
    #[error("invalid value: {0}")]
    InvalidValue(String),
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("language model error: {0}")]
    LanguageModel(String),
    #[error("speech synthesis failed: {0}")]
    SynthesisFailed(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<VisioneerError> for AgentError {
    fn from(err: VisioneerError) -> Self {
        AgentError::Storage(err.to_string())
    }
}

impl AgentError {
    /// Stable failure label for this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            AgentError::ClassificationAmbiguous(_) => FailureKind::ClassificationAmbiguous,
            AgentError::NoTargetProduct => FailureKind::NoTargetProduct,
            AgentError::NotAuthorized => FailureKind::NotAuthorized,
            AgentError::UnparsableValue(_) => FailureKind::UnparsableValue,
            AgentError::TranscriptionFailed(_) => FailureKind::TranscriptionFailed,
            AgentError::CatalogUnavailable(_) => FailureKind::CatalogUnavailable,
            AgentError::InsufficientStock { .. } => FailureKind::InsufficientStock,
            AgentError::InvalidValue(_) => FailureKind::InvalidValue,
            AgentError::MessageTooLong(_) => FailureKind::MessageTooLong,
            AgentError::LanguageModel(_)
            | AgentError::SynthesisFailed(_)
            | AgentError::Storage(_) => FailureKind::ServiceUnavailable,
        }
    }

    /// Conversational, non-technical text describing this failure.
    pub fn user_message(&self) -> String {
        match self {
            AgentError::InsufficientStock { available, .. } if *available <= 0 => {
                "Sorry, that product is out of stock right now.".to_string()
            }
            AgentError::InsufficientStock { available, .. } => format!(
                "Sorry, only {} {} available. Would you like that many instead?",
                available,
                if *available == 1 { "unit is" } else { "units are" }
            ),
            AgentError::InvalidValue(explanation) => explanation.clone(),
            AgentError::MessageTooLong(limit) => format!(
                "That message is a bit long for me. Could you keep it under {} characters?",
                limit
            ),
            other => other.kind().user_message().to_string(),
        }
    }
}

/// Closed set of failure labels surfaced in turn metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ClassificationAmbiguous,
    NoTargetProduct,
    NotAuthorized,
    UnparsableValue,
    TranscriptionFailed,
    CatalogUnavailable,
    InsufficientStock,
    InvalidValue,
    MessageTooLong,
    ServiceUnavailable,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::ClassificationAmbiguous => "classification_ambiguous",
            FailureKind::NoTargetProduct => "no_target_product",
            FailureKind::NotAuthorized => "not_authorized",
            FailureKind::UnparsableValue => "unparsable_value",
            FailureKind::TranscriptionFailed => "transcription_failed",
            FailureKind::CatalogUnavailable => "catalog_unavailable",
            FailureKind::InsufficientStock => "insufficient_stock",
            FailureKind::InvalidValue => "invalid_value",
            FailureKind::MessageTooLong => "message_too_long",
            FailureKind::ServiceUnavailable => "service_unavailable",
        }
    }

    /// Default reply for this failure.
    pub fn user_message(&self) -> &'static str {
        match self {
            FailureKind::ClassificationAmbiguous => {
                "I wasn't sure what you meant, so I'll treat that as a general question."
            }
            FailureKind::NoTargetProduct => {
                "I couldn't tell which product you mean. Mention it by number, for example \"product 12\", or look it up first."
            }
            FailureKind::NotAuthorized => {
                "Sorry, I can't make that change. You can only update products you sell."
            }
            FailureKind::UnparsableValue => {
                "I couldn't find a number in that. Could you say the new value again, for example \"$45\" or \"add 5 units\"?"
            }
            FailureKind::TranscriptionFailed => {
                "Sorry, I couldn't make out that audio. Could you try again or type your message?"
            }
            FailureKind::CatalogUnavailable => {
                "The product catalog isn't responding right now. Please try again in a moment."
            }
            FailureKind::InsufficientStock => "Sorry, there isn't enough stock for that.",
            FailureKind::InvalidValue => "That value doesn't work here. Could you try a different one?",
            FailureKind::MessageTooLong => "That message is a bit long for me. Could you shorten it?",
            FailureKind::ServiceUnavailable => {
                "Something went wrong on my side. Please try again in a moment."
            }
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
