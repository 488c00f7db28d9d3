//! Ordered lexical rules mapping an utterance to an intent.
//!
//! Rules are evaluated top to bottom and the first match wins, so the table
//! order is part of the contract. A rule may carry an `unless` pattern that
//! vetoes it, which stands in for the lookarounds the regex crate lacks.

use std::sync::OnceLock;

use regex::Regex;

use crate::types::Intent;

/// A single compiled rule.
pub struct IntentRule {
    pub name: &'static str,
    pub intent: Intent,
    pub pattern: Regex,
    pub unless: Option<Regex>,
    pub confidence: f32,
}

impl IntentRule {
    pub fn matches(&self, text: &str) -> bool {
        self.pattern.is_match(text) && !self.unless.as_ref().is_some_and(|u| u.is_match(text))
    }
}

type RuleSpec = (&'static str, Intent, &'static str, Option<&'static str>, f32);

const RULE_TABLE: &[RuleSpec] = &[
    // =========================================================================
    // Price changes
    // =========================================================================
    (
        "price_change_verb",
        Intent::PriceUpdate,
        r"(?i)\b(?:change|set|update|adjust|raise|increase|reduce|cut|edit|modify)\s+(?:\S+\s+){0,4}?price\b",
        None,
        0.95,
    ),
    (
        "price_lower_verb",
        Intent::PriceUpdate,
        r"(?i)\b(?:lower|drop|bump)\s+(?:the|its|my|this|that)\s+(?:\S+\s+){0,3}?price\b",
        None,
        0.9,
    ),
    (
        "price_to_amount",
        Intent::PriceUpdate,
        r"(?i)\bprice\b.{0,40}?\bto\s+\$?\s*\d",
        Some(r"(?i)\b(?:range|between|under|below|budget)\b"),
        0.9,
    ),
    (
        "price_with_currency",
        Intent::PriceUpdate,
        r"(?i)\bprice\b.*\$\s*\d",
        Some(
            r"(?i)\b(?:under|below|less\s+than|cheaper|over|above|more\s+than|between|range|budget|what|how\s+much)\b",
        ),
        0.85,
    ),
    (
        "new_price",
        Intent::PriceUpdate,
        r"(?i)\b(?:new\s+price|reprice|re-price)\b",
        None,
        0.85,
    ),
    // =========================================================================
    // Stock changes
    // =========================================================================
    (
        "stock_change_verb",
        Intent::InventoryUpdate,
        r"(?i)\b(?:add|added|remove|removed|subtract|deduct|restock|sold|set|update|change|adjust|increase|decrease|reduce)\b.{0,40}?\b(?:stock|units?|inventory|pieces|pcs|quantity)\b",
        None,
        0.95,
    ),
    (
        "stock_to_amount",
        Intent::InventoryUpdate,
        r"(?i)\b(?:stock|inventory|quantity)\b.{0,30}?\bto\s+\d",
        None,
        0.9,
    ),
    (
        "restock",
        Intent::InventoryUpdate,
        r"(?i)\brestock(?:ed)?\b",
        None,
        0.9,
    ),
    (
        "sold_count",
        Intent::InventoryUpdate,
        r"(?i)\bsold\s+\d+",
        None,
        0.85,
    ),
    (
        "bare_delta",
        Intent::InventoryUpdate,
        r"(?i)^\s*(?:add|remove|subtract|plus|minus)\s+\d+\b",
        Some(r"(?i)\bcart\b"),
        0.7,
    ),
    // =========================================================================
    // Search
    // =========================================================================
    (
        "price_ceiling",
        Intent::ProductSearch,
        r"(?i)\b(?:under|below|less\s+than|cheaper\s+than|at\s+most|up\s+to)\s+\$?\s*\d",
        None,
        0.9,
    ),
    (
        "search_phrase",
        Intent::ProductSearch,
        r"(?i)\b(?:looking\s+for|search(?:ing)?(?:\s+for)?|find|show\s+me|do\s+you\s+(?:have|sell|carry)|got\s+any|browse|i\s+(?:want|need)\s+(?:a|an|some)|what(?:'s|\s+is)\s+(?:in\s+stock|available)|any\s+\w+(?:\s+\w+)?\s+(?:available|in\s+stock))\b",
        Some(r"(?i)\b(?:product|item|listing)\s*#?\s*\d"),
        0.85,
    ),
    (
        "bargain_words",
        Intent::ProductSearch,
        r"(?i)\b(?:cheap(?:est)?|affordable|inexpensive|bargains?|deals?)\b",
        None,
        0.7,
    ),
    // =========================================================================
    // Product detail
    // =========================================================================
    (
        "tell_me_about",
        Intent::ProductDetail,
        r"(?i)\b(?:tell\s+me\s+(?:more\s+)?about|more\s+(?:info|information|details)|details?\s+(?:on|of|for|about)|describe|specs|specifications|what\s+condition|what(?:'s|\s+is)\s+the\s+price\s+of|how\s+much\s+(?:is|does|for))\b",
        None,
        0.85,
    ),
    (
        "availability_question",
        Intent::ProductDetail,
        r"(?i)\b(?:is|are|how\s+many)\b.{0,40}?\b(?:in\s+stock|left|available)\b",
        None,
        0.8,
    ),
    (
        "product_reference",
        Intent::ProductDetail,
        r"(?i)^\s*(?:show\s+me\s+|what\s+(?:is|about)\s+|how\s+about\s+)?(?:product|item|listing|#)\s*#?\s*\d+\b",
        None,
        0.8,
    ),
    // =========================================================================
    // Purchase
    // =========================================================================
    (
        "buy",
        Intent::Purchase,
        r"(?i)\b(?:buy|purchase|order|checkout|check\s+out|add\s+(?:it\s+|this\s+|that\s+)?to\s+(?:my\s+)?cart|i'?ll\s+take)\b",
        None,
        0.85,
    ),
    // =========================================================================
    // Seller help
    // =========================================================================
    (
        "pricing_advice",
        Intent::PricingAdvice,
        r"(?i)\b(?:pricing|how\s+(?:much\s+)?should\s+i\s+(?:price|charge|sell|ask)|what\s+should\s+i\s+(?:charge|price|ask)|competitive\s+price|price\s+(?:suggestions?|recommendations?|advice|strategy)|suggest\s+a\s+price|market\s+(?:price|value|rate))\b",
        None,
        0.85,
    ),
    (
        "analytics",
        Intent::Analytics,
        r"(?i)\b(?:analytics|sales\s+(?:report|data|numbers|performance|stats)|my\s+sales|revenue|performance|insights?|metrics|stats|statistics|conversion|best\s*sell(?:ing|ers?)|how\s+(?:are|is)\s+my\s+(?:store|shop|listings?|products?)\s+doing)\b",
        None,
        0.8,
    ),
    // =========================================================================
    // Fallbacks
    // =========================================================================
    (
        "bare_stock_word",
        Intent::InventoryUpdate,
        r"(?i)\b(?:stock|units|inventory)\b",
        None,
        0.5,
    ),
];

/// The compiled rule table, in evaluation order.
pub fn rules() -> &'static [IntentRule] {
    static RULES: OnceLock<Vec<IntentRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        RULE_TABLE
            .iter()
            .map(|&(name, intent, pattern, unless, confidence)| IntentRule {
                name,
                intent,
                pattern: Regex::new(pattern).expect("Invalid intent regex"),
                unless: unless.map(|u| Regex::new(u).expect("Invalid intent veto regex")),
                confidence,
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_rules_compile() {
        assert_eq!(rules().len(), RULE_TABLE.len());
    }

    #[test]
    fn test_rule_names_unique() {
        let mut names: Vec<&str> = rules().iter().map(|r| r.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), RULE_TABLE.len());
    }

    #[test]
    fn test_unless_vetoes_match() {
        let rule = rules()
            .iter()
            .find(|r| r.name == "price_with_currency")
            .unwrap();
        assert!(rule.matches("make the price $40"));
        assert!(!rule.matches("anything with a price under $40"));
    }

    #[test]
    fn test_every_intent_but_general_has_a_rule() {
        for intent in Intent::ALL {
            let covered = rules().iter().any(|r| r.intent == intent);
            assert_eq!(covered, intent != Intent::General, "{}", intent);
        }
    }
}
