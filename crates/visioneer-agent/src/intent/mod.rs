//! Intent classification and value extraction.
//!
//! `classify` is a pure, total function: every input maps to exactly one
//! intent, and anything no rule recognises falls back to `general`.

pub mod extract;
pub mod rules;

use serde::Serialize;

use crate::types::Intent;

/// Confidence reported when no rule matches.
const FALLBACK_CONFIDENCE: f32 = 0.3;

/// Classification with the rule that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Classification {
    pub intent: Intent,
    pub confidence: f32,
    /// Name of the matching rule, `None` for the general fallback.
    pub rule: Option<&'static str>,
}

/// Map one utterance to an intent.
pub fn classify(text: &str) -> Intent {
    classify_detailed(text).intent
}

/// Map one utterance to an intent, reporting the deciding rule.
pub fn classify_detailed(text: &str) -> Classification {
    if text.trim().is_empty() {
        return fallback();
    }

    rules::rules()
        .iter()
        .find(|rule| rule.matches(text))
        .map(|rule| Classification {
            intent: rule.intent,
            confidence: rule.confidence,
            rule: Some(rule.name),
        })
        .unwrap_or_else(fallback)
}

fn fallback() -> Classification {
    Classification {
        intent: Intent::General,
        confidence: FALLBACK_CONFIDENCE,
        rule: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_intent(text: &str, expected: Intent) {
        assert_eq!(classify(text), expected, "text: {:?}", text);
    }

    #[test]
    fn test_empty_and_whitespace_are_general() {
        assert_intent("", Intent::General);
        assert_intent("   \t\n", Intent::General);
        assert_eq!(classify_detailed("").rule, None);
    }

    #[test]
    fn test_unmatched_text_is_general() {
        assert_intent("hello there", Intent::General);
        assert_intent("what are your opening hours?", Intent::General);
        assert_intent("thanks!", Intent::General);
    }

    #[test]
    fn test_price_update_phrases() {
        assert_intent("Change the price to $1,199", Intent::PriceUpdate);
        assert_intent("set price to 45", Intent::PriceUpdate);
        assert_intent("update product 3 price to 40", Intent::PriceUpdate);
        assert_intent("lower the price to 60 dollars", Intent::PriceUpdate);
        assert_intent("make the price $40", Intent::PriceUpdate);
        assert_intent("new price $19.99", Intent::PriceUpdate);
        assert_intent("change the price", Intent::PriceUpdate);
    }

    #[test]
    fn test_inventory_update_phrases() {
        assert_intent("add 5 units", Intent::InventoryUpdate);
        assert_intent("set stock to 25", Intent::InventoryUpdate);
        assert_intent("update inventory to 25 units", Intent::InventoryUpdate);
        assert_intent("restock 3", Intent::InventoryUpdate);
        assert_intent("I sold 4 today", Intent::InventoryUpdate);
        assert_intent("add 3", Intent::InventoryUpdate);
        assert_intent("remove 2 units from product 5", Intent::InventoryUpdate);
    }

    #[test]
    fn test_product_search_phrases() {
        assert_intent("I'm looking for sneakers under $100", Intent::ProductSearch);
        assert_intent("anything under $50?", Intent::ProductSearch);
        assert_intent("show me nike shoes", Intent::ProductSearch);
        assert_intent("Do you have any laptops?", Intent::ProductSearch);
        assert_intent("cheap electronics", Intent::ProductSearch);
        assert_intent("what's in stock?", Intent::ProductSearch);
    }

    #[test]
    fn test_product_detail_phrases() {
        assert_intent("tell me more about product 3", Intent::ProductDetail);
        assert_intent("product 12", Intent::ProductDetail);
        assert_intent("#4", Intent::ProductDetail);
        assert_intent("show me product 3", Intent::ProductDetail);
        assert_intent("is it still available?", Intent::ProductDetail);
        assert_intent("how many are left?", Intent::ProductDetail);
        assert_intent("What's the price of product 2?", Intent::ProductDetail);
    }

    #[test]
    fn test_purchase_phrases() {
        assert_intent("I want to buy product 3", Intent::Purchase);
        assert_intent("I'll take 2", Intent::Purchase);
        assert_intent("add it to my cart", Intent::Purchase);
    }

    #[test]
    fn test_seller_help_phrases() {
        assert_intent("how should I price my jacket?", Intent::PricingAdvice);
        assert_intent("any pricing tips?", Intent::PricingAdvice);
        assert_intent("show my analytics", Intent::Analytics);
        assert_intent("how are my listings doing?", Intent::Analytics);
    }

    #[test]
    fn test_bare_stock_word_falls_to_inventory() {
        assert_intent("inventory", Intent::InventoryUpdate);
    }

    #[test]
    fn test_rule_order_price_before_search() {
        // Both a price change and a search trigger: the earlier rule wins.
        assert_intent("find product 3 and set the price to $20", Intent::PriceUpdate);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let text = "add 5 units";
        let first = classify_detailed(text);
        for _ in 0..10 {
            assert_eq!(classify_detailed(text), first);
        }
        assert_eq!(first.rule, Some("stock_change_verb"));
        assert!(first.confidence > FALLBACK_CONFIDENCE);
    }
}
