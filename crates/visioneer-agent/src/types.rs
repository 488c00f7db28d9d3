//! Types for the conversational agent.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use visioneer_core::types::{Product, ProductQuery, ProductSummary, Timestamp, Turn, UserRole};

use crate::error::{AgentError, FailureKind};

// =============================================================================
// Intent
// =============================================================================

/// Closed set of purposes a single utterance can have.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    ProductSearch,
    ProductDetail,
    PriceUpdate,
    InventoryUpdate,
    PricingAdvice,
    Analytics,
    Purchase,
    General,
}

impl Intent {
    pub const ALL: [Intent; 8] = [
        Intent::ProductSearch,
        Intent::ProductDetail,
        Intent::PriceUpdate,
        Intent::InventoryUpdate,
        Intent::PricingAdvice,
        Intent::Analytics,
        Intent::Purchase,
        Intent::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::ProductSearch => "product_search",
            Intent::ProductDetail => "product_detail",
            Intent::PriceUpdate => "price_update",
            Intent::InventoryUpdate => "inventory_update",
            Intent::PricingAdvice => "pricing_advice",
            Intent::Analytics => "analytics",
            Intent::Purchase => "purchase",
            Intent::General => "general",
        }
    }

    /// Whether handling this intent writes to the catalog.
    pub fn is_mutating(&self) -> bool {
        matches!(self, Intent::PriceUpdate | Intent::InventoryUpdate)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Intent {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Intent::ALL
            .iter()
            .copied()
            .find(|intent| intent.as_str() == normalized)
            .ok_or_else(|| format!("Unknown intent: {}", s))
    }
}

// =============================================================================
// Session
// =============================================================================

/// Cross-turn memory carried by a session.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionContext {
    /// Product most recently shown, updated or bought.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_product_id: Option<i64>,
    /// Mutating intent that stalled for lack of a target or value; a bare
    /// follow-up such as "$45" completes it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_intent: Option<Intent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_intent: Option<Intent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_stock: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_search: Option<ProductQuery>,
}

/// A conversation keyed by an opaque, caller-supplied identifier.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub turns: Vec<Turn>,
    pub context: SessionContext,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            turns: Vec::new(),
            context: SessionContext::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// The last `n` turns, oldest first.
    pub fn recent_turns(&self, n: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    /// Drop all turns and context, keeping the identifier.
    pub fn reset(&mut self) {
        self.turns.clear();
        self.context = SessionContext::default();
        self.updated_at = Utc::now();
    }
}

// =============================================================================
// Inputs
// =============================================================================

/// The authenticated party attempting an action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: i64,
    pub role: UserRole,
}

impl Actor {
    pub fn seller(user_id: i64) -> Self {
        Self {
            user_id,
            role: UserRole::Seller,
        }
    }

    pub fn can_manage_listings(&self) -> bool {
        self.role == UserRole::Seller
    }
}

/// One unit of user input, already transcribed if it started as audio.
#[derive(Clone, Debug, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub actor: Option<Actor>,
    pub received_at: Timestamp,
}

impl Utterance {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            actor: None,
            received_at: Utc::now(),
        }
    }

    pub fn from_actor(text: impl Into<String>, actor: Actor) -> Self {
        Self {
            actor: Some(actor),
            ..Self::new(text)
        }
    }
}

// =============================================================================
// Results
// =============================================================================

/// Intent-specific payload of an action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionPayload {
    Search {
        products: Vec<ProductSummary>,
        total_found: usize,
        constraints: ProductQuery,
    },
    Detail {
        product: Product,
    },
    PriceUpdate {
        product_id: i64,
        product_name: String,
        old_price: f64,
        new_price: f64,
    },
    InventoryUpdate {
        product_id: i64,
        product_name: String,
        old_stock: i64,
        new_stock: i64,
        delta: i64,
    },
    Purchase {
        product_id: i64,
        product_name: String,
        quantity: i64,
        unit_price: f64,
        total: f64,
    },
    Advice {
        topic: String,
        features: Vec<String>,
    },
    Chat {
        model_generated: bool,
        suggestions: Vec<String>,
    },
    Failure {
        reason: FailureKind,
    },
}

/// Outcome of dispatching one intent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub intent: Intent,
    pub success: bool,
    /// Short human-readable headline.
    pub message: String,
    pub payload: ActionPayload,
}

impl ActionResult {
    pub fn ok(intent: Intent, message: impl Into<String>, payload: ActionPayload) -> Self {
        Self {
            intent,
            success: true,
            message: message.into(),
            payload,
        }
    }

    pub fn failure(intent: Intent, err: &AgentError) -> Self {
        Self {
            intent,
            success: false,
            message: err.user_message(),
            payload: ActionPayload::Failure { reason: err.kind() },
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match &self.payload {
            ActionPayload::Failure { reason } => Some(*reason),
            _ => None,
        }
    }
}

/// Boundary shape returned for every turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub success: bool,
    pub message: String,
    pub metadata: serde_json::Value,
    pub intent: Intent,
    pub session_id: String,
}

/// A voice turn: the text outcome plus transcript and synthesized reply.
#[derive(Clone, Debug, PartialEq)]
pub struct VoiceOutcome {
    pub turn: TurnOutcome,
    pub original_text: Option<String>,
    pub audio_response: Option<Vec<u8>>,
}
