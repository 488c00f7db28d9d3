//! Response composer: renders an `ActionResult` as reply text plus metadata.

use serde::Serialize;
use serde_json::json;

use crate::types::{ActionPayload, ActionResult};

/// Reply text and the structured metadata returned alongside it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComposedReply {
    pub message: String,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseComposer;

impl ResponseComposer {
    pub fn new() -> Self {
        Self
    }

    /// Render `result`. Infallible: failures become apologetic text.
    pub fn compose(&self, result: &ActionResult) -> ComposedReply {
        let message = if result.success {
            render(result)
        } else {
            result.message.clone()
        };

        let mut metadata = json!({
            "intent": result.intent,
            "success": result.success,
            "action": result.payload,
        });
        if let Some(reason) = result.failure_kind() {
            metadata["failure_reason"] = json!(reason);
        }

        ComposedReply { message, metadata }
    }
}

fn render(result: &ActionResult) -> String {
    match &result.payload {
        ActionPayload::Search { products, .. } if products.is_empty() => {
            "I couldn't find any products matching that. Could you tell me a bit more about what you're looking for?"
                .to_string()
        }
        ActionPayload::Search { products, .. } => {
            let mut text = String::from("Here are some products that match your search:\n\n");
            for (i, product) in products.iter().enumerate() {
                text.push_str(&format!("{}. {} - {}", i + 1, product.name, format_price(product.price)));
                if let Some(brand) = &product.brand {
                    text.push_str(&format!(" ({})", brand));
                }
                text.push_str(&format!(", {} in stock\n", product.stock_quantity));
            }
            text.push_str("\nWould you like more details about any of these?");
            text
        }
        ActionPayload::Detail { product } => {
            let mut text = format!("{}\n\nPrice: {}\n", product.name, format_price(product.price));
            let optional = [
                ("Brand", &product.brand),
                ("Model", &product.model),
                ("Category", &product.category),
                ("Condition", &product.condition),
            ];
            for (label, value) in optional {
                if let Some(value) = value {
                    text.push_str(&format!("{}: {}\n", label, value));
                }
            }
            text.push_str(&format!("Stock: {} available\n", product.stock_quantity));
            if let Some(description) = &product.description {
                text.push_str(&format!("\n{}\n", description));
            }
            text.push_str("\nWould you like to buy it or see similar items?");
            text
        }
        ActionPayload::PriceUpdate {
            product_name,
            old_price,
            new_price,
            ..
        } => format!(
            "Done! The price of {} is now {} (was {}).",
            product_name,
            format_price(*new_price),
            format_price(*old_price)
        ),
        ActionPayload::InventoryUpdate {
            product_name,
            new_stock,
            delta: 0,
            ..
        } => format!(
            "{} already has {} {} in stock, so nothing changed.",
            product_name,
            new_stock,
            units(*new_stock)
        ),
        ActionPayload::InventoryUpdate {
            product_name,
            old_stock,
            new_stock,
            ..
        } => format!(
            "Done! {} now has {} {} in stock (was {}).",
            product_name,
            new_stock,
            units(*new_stock),
            old_stock
        ),
        ActionPayload::Purchase {
            product_name,
            quantity,
            unit_price,
            total,
            ..
        } => format!(
            "Great! Here's your order summary:\n\nProduct: {}\nQuantity: {}\nPrice per unit: {}\nTotal: {}\n\nWould you like to go ahead with the purchase?",
            product_name,
            quantity,
            format_price(*unit_price),
            format_price(*total)
        ),
        ActionPayload::Advice { topic, .. } if topic == "analytics" => [
            "Here's what I can show you about your store:",
            "",
            "- Sales performance: revenue and growth over time",
            "- Product performance: which listings sell best",
            "- Customer insights: how buyers find and choose you",
            "- Inventory analytics: stock levels and turnover",
            "",
            "Which report would you like?",
        ]
        .join("\n"),
        ActionPayload::Advice { .. } => [
            "I can help you with pricing!",
            "",
            "- Market research: compare with similar listings",
            "- Price optimization: suggest a competitive price",
            "- Dynamic pricing: adjust to demand",
            "- Price updates: just say \"set the price to $45\"",
            "",
            "What would you like help with?",
        ]
        .join("\n"),
        ActionPayload::Chat { .. } | ActionPayload::Failure { .. } => result.message.clone(),
    }
}

fn units(n: i64) -> &'static str {
    if n == 1 {
        "unit"
    } else {
        "units"
    }
}

/// `1199.5` becomes `$1,199.50`.
pub fn format_price(amount: f64) -> String {
    let cents = (amount * 100.0).round() as i64;
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.abs();
    let whole = (cents / 100).to_string();

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    format!("{}${}.{:02}", sign, grouped, cents % 100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AgentError, FailureKind};
    use crate::types::Intent;
    use visioneer_core::types::{ProductQuery, ProductSummary};

    fn compose(result: &ActionResult) -> ComposedReply {
        ResponseComposer::new().compose(result)
    }

    #[test]
    fn test_format_price() {
        assert_eq!(format_price(1199.0), "$1,199.00");
        assert_eq!(format_price(85.5), "$85.50");
        assert_eq!(format_price(1_234_567.891), "$1,234,567.89");
        assert_eq!(format_price(0.0), "$0.00");
    }

    #[test]
    fn test_inventory_message_mentions_new_stock() {
        let result = ActionResult::ok(
            Intent::InventoryUpdate,
            "Stock is now 15",
            ActionPayload::InventoryUpdate {
                product_id: 1,
                product_name: "Vans".to_string(),
                old_stock: 10,
                new_stock: 15,
                delta: 5,
            },
        );
        let reply = compose(&result);
        assert!(reply.message.contains("15"));
        assert_eq!(reply.metadata["intent"], "inventory_update");
        assert_eq!(reply.metadata["action"]["kind"], "inventory_update");
        assert_eq!(reply.metadata["action"]["new_stock"], 15);
        assert!(reply.metadata.get("failure_reason").is_none());
    }

    #[test]
    fn test_failure_is_rendered_not_raised() {
        let result = ActionResult::failure(Intent::PriceUpdate, &AgentError::UnparsableValue("price"));
        let reply = compose(&result);
        assert_eq!(reply.message, FailureKind::UnparsableValue.user_message());
        assert_eq!(reply.metadata["success"], false);
        assert_eq!(reply.metadata["failure_reason"], "unparsable_value");
    }

    #[test]
    fn test_search_listing() {
        let result = ActionResult::ok(
            Intent::ProductSearch,
            "Found 1 product",
            ActionPayload::Search {
                products: vec![ProductSummary {
                    id: 1,
                    name: "Vintage Adidas Gazelle - Blue".to_string(),
                    price: 85.0,
                    brand: Some("Adidas".to_string()),
                    category: Some("Clothing".to_string()),
                    stock_quantity: 3,
                }],
                total_found: 1,
                constraints: ProductQuery::default(),
            },
        );
        let reply = compose(&result);
        assert!(reply.message.contains("1. Vintage Adidas Gazelle - Blue - $85.00 (Adidas), 3 in stock"));
    }

    #[test]
    fn test_empty_search_asks_for_more() {
        let result = ActionResult::ok(
            Intent::ProductSearch,
            "No matching products",
            ActionPayload::Search {
                products: Vec::new(),
                total_found: 0,
                constraints: ProductQuery::default(),
            },
        );
        assert!(compose(&result).message.contains("couldn't find"));
    }

    #[test]
    fn test_unchanged_stock_message() {
        let result = ActionResult::ok(
            Intent::InventoryUpdate,
            "Stock is now 1",
            ActionPayload::InventoryUpdate {
                product_id: 1,
                product_name: "Chuck 70".to_string(),
                old_stock: 1,
                new_stock: 1,
                delta: 0,
            },
        );
        assert!(compose(&result).message.contains("already has 1 unit "));
    }
}
