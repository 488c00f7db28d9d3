//! Conversational agent for Visioneer.
//!
//! Classifies each utterance into one intent, dispatches it against the
//! product catalog on behalf of the acting user, and composes a reply.
//! Sessions carry the turn history and the small context that lets a
//! follow-up such as "$45" complete an earlier "change the price".

pub mod catalog;
pub mod dispatcher;
pub mod error;
pub mod intent;
pub mod llm;
pub mod orchestrator;
pub mod response;
pub mod session;
pub mod types;
pub mod voice;

pub use catalog::{Catalog, StoreCatalog};
pub use dispatcher::ActionDispatcher;
pub use error::{AgentError, FailureKind};
pub use intent::{classify, classify_detailed, Classification};
pub use llm::{ChatMessage, LanguageModel, OpenAiChatClient};
pub use orchestrator::AgentOrchestrator;
pub use response::{ComposedReply, ResponseComposer};
pub use session::{SessionHandle, SessionStore};
pub use types::{
    ActionPayload, ActionResult, Actor, Intent, Session, SessionContext, TurnOutcome, Utterance,
    VoiceOutcome,
};
pub use voice::{MockVoiceProvider, OpenAiVoiceProvider, VoiceProvider};
