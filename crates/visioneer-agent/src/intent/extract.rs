//! Best-effort extraction of values from free text.
//!
//! Numbers are digits with optional `,` thousands groups and an optional
//! `.` fraction, optionally prefixed with `$`. Number words ("fifty") are
//! not recognised. Digits glued to letters ("128GB", "G15") are not numbers.

use std::sync::OnceLock;

use regex::Regex;

use visioneer_core::config::AgentConfig;
use visioneer_core::types::ProductQuery;

const AMOUNT: &str = r"\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:\.\d+)?";

fn number_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\$\s*)?\b(\d{1,3}(?:,\d{3})+|\d+)(\.\d+)?\b").expect("Invalid number regex")
    })
}

fn product_ref_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:product|item|listing|id)\s*(?:#|no\.?|number)?\s*(\d+)\b|#\s*(\d+)\b")
            .expect("Invalid product reference regex")
    })
}

fn decrease_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:remove|removed|subtract|deduct|sold|sell|minus|decrease|reduce|lower|lost|damaged|take\s+(?:away|off))\b",
        )
        .expect("Invalid decrease regex")
    })
}

fn absolute_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:set|make\s+it|now\s+have|only\s+have|there\s+are)\b")
            .expect("Invalid absolute regex")
    })
}

/// A numeric token located in text.
#[derive(Debug, Clone, PartialEq)]
pub struct NumberToken {
    pub value: f64,
    pub is_integer: bool,
    /// Byte offset of the first digit.
    pub start: usize,
    pub currency: bool,
    /// Directly preceded by the word "to".
    pub after_to: bool,
    /// Part of a product reference such as "product 12" or "#12".
    pub product_ref: bool,
}

/// Every number in `text`, in order of appearance.
pub fn numbers(text: &str) -> Vec<NumberToken> {
    let ref_starts: Vec<usize> = product_ref_regex()
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.start())
        .collect();

    number_regex()
        .captures_iter(text)
        .filter_map(|caps| {
            let digits = caps.get(2)?;
            let fraction = caps.get(3).map(|m| m.as_str()).unwrap_or("");
            let raw = format!("{}{}", digits.as_str().replace(',', ""), fraction);
            let value: f64 = raw.parse().ok()?;
            Some(NumberToken {
                value,
                is_integer: fraction.is_empty(),
                start: digits.start(),
                currency: caps.get(1).is_some(),
                after_to: preceded_by_word(text, caps.get(0).map_or(digits.start(), |m| m.start()), "to"),
                product_ref: ref_starts.contains(&digits.start()),
            })
        })
        .collect()
}

fn preceded_by_word(text: &str, pos: usize, word: &str) -> bool {
    let before = text[..pos].trim_end();
    let lower = before.to_ascii_lowercase();
    if !lower.ends_with(word) {
        return false;
    }
    let boundary = lower.len() - word.len();
    lower[..boundary]
        .chars()
        .next_back()
        .map_or(true, |c| !c.is_alphanumeric())
}

/// Explicit product identifier, e.g. "product 12", "item #12", "id 12", "#12".
pub fn extract_product_id(text: &str) -> Option<i64> {
    product_ref_regex()
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .find_map(|m| m.as_str().parse().ok())
}

/// Price mentioned in `text`.
///
/// Prefers a `$` amount, then a number after "to", then the first number
/// that is not part of a product reference.
pub fn extract_price(text: &str) -> Option<f64> {
    let tokens: Vec<NumberToken> = numbers(text).into_iter().filter(|t| !t.product_ref).collect();
    tokens
        .iter()
        .find(|t| t.currency)
        .or_else(|| tokens.iter().find(|t| t.after_to))
        .or_else(|| tokens.first())
        .map(|t| t.value)
}

/// Largest stock level the agent will record.
pub const MAX_STOCK_QUANTITY: i64 = 1_000_000;

/// A stock instruction parsed from text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockInstruction {
    /// Relative change; negative removes units.
    Delta(i64),
    /// Absolute target quantity.
    Set(i64),
}

/// Stock change in `text`: "add 5 units", "remove 2", "set stock to 25".
pub fn extract_stock_change(text: &str) -> Option<StockInstruction> {
    let tokens: Vec<NumberToken> = numbers(text)
        .into_iter()
        .filter(|t| !t.product_ref && !t.currency && t.is_integer)
        .collect();

    if let Some(target) = tokens.iter().find(|t| t.after_to) {
        return Some(StockInstruction::Set(target.value as i64));
    }

    let amount = tokens.first()?.value as i64;
    if decrease_regex().is_match(text) {
        Some(StockInstruction::Delta(-amount))
    } else if absolute_regex().is_match(text) {
        Some(StockInstruction::Set(amount))
    } else {
        Some(StockInstruction::Delta(amount))
    }
}

/// Quantity for a purchase: the first plain integer that is neither a
/// price nor a product reference.
pub fn extract_quantity(text: &str) -> Option<i64> {
    numbers(text)
        .into_iter()
        .find(|t| !t.product_ref && !t.currency && t.is_integer)
        .map(|t| t.value as i64)
}

// =============================================================================
// Search constraints
// =============================================================================

fn between_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"(?i)\bbetween\s+\$?\s*({a})\s+(?:and|to|-)\s+\$?\s*({a})",
            a = AMOUNT
        ))
        .expect("Invalid between regex")
    })
}

fn max_price_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"(?i)\b(?:under|below|less\s+than|cheaper\s+than|at\s+most|up\s+to|max(?:imum)?|no\s+more\s+than|within)\s+\$?\s*({})",
            AMOUNT
        ))
        .expect("Invalid max price regex")
    })
}

fn min_price_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"(?i)\b(?:over|above|more\s+than|at\s+least|min(?:imum)?|from|starting\s+at)\s+\$?\s*({})",
            AMOUNT
        ))
        .expect("Invalid min price regex")
    })
}

fn budget_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:cheap(?:est)?|affordable|inexpensive|budget|under|below|less\s+than)\b")
            .expect("Invalid budget regex")
    })
}

fn keyword_trigger_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:looking\s+for|search(?:ing)?\s+for|search|find(?:\s+me)?|show\s+me|do\s+you\s+(?:have|sell|carry)|got\s+any|i\s+(?:want|need))\s+(.+)",
        )
        .expect("Invalid keyword trigger regex")
    })
}

fn keyword_stop_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:under|below|less\s+than|cheaper\s+than|over|above|more\s+than|between|from|at\s+most|up\s+to|with|that|which|for|in|please|around|available)\b|[,.?!;$\d]",
        )
        .expect("Invalid keyword stop regex")
    })
}

const LEADING_FILLERS: &[&str] = &[
    "a", "an", "some", "any", "the", "me", "my", "good", "nice", "new", "cheap", "cheapest",
    "affordable", "anything", "something", "i'm", "im", "i", "want", "need", "show", "get",
    "what's", "whats", "what", "is", "are", "there",
];

const TRAILING_FILLERS: &[&str] = &[
    "please", "today", "now", "here", "products", "product", "items", "item", "stuff", "things",
    "anything",
];

fn parse_amount(raw: &str) -> Option<f64> {
    raw.replace(',', "").parse().ok()
}

fn words_of(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

fn mentions(words: &[String], term: &str) -> bool {
    let term = term.to_lowercase();
    words.iter().any(|w| {
        *w == term
            || w.strip_suffix('s') == Some(term.as_str())
            || term.strip_suffix('s') == Some(w.as_str())
    })
}

fn singular(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ies") {
        if stem.len() > 1 {
            return format!("{}y", stem);
        }
    }
    for suffix in ["sses", "ches", "shes", "xes"] {
        if word.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }
    if word.len() > 3 && word.ends_with('s') && !word.ends_with("ss") {
        return word[..word.len() - 1].to_string();
    }
    word.to_string()
}

fn extract_keyword(text: &str, exclude: &[&str]) -> Option<String> {
    let (segment, triggered) = match keyword_trigger_regex().captures(text) {
        Some(caps) => (caps.get(1).map_or("", |m| m.as_str()), true),
        None => (text, false),
    };
    let segment = match keyword_stop_regex().find(segment) {
        Some(stop) => &segment[..stop.start()],
        None => segment,
    };

    let mut words: Vec<String> = words_of(segment);
    while words
        .first()
        .is_some_and(|w| LEADING_FILLERS.contains(&w.as_str()))
    {
        words.remove(0);
    }
    words.retain(|w| !exclude.iter().any(|e| mentions(std::slice::from_ref(w), e)));
    while words
        .last()
        .is_some_and(|w| TRAILING_FILLERS.contains(&w.as_str()))
    {
        words.pop();
    }

    if words.is_empty() || (!triggered && words.len() > 3) {
        return None;
    }
    if let Some(last) = words.last_mut() {
        *last = singular(last);
    }
    Some(words.join(" "))
}

/// Search constraints expressed in `text`.
///
/// Category and brand are recognised only from the configured vocabularies.
/// A budget word with no amount caps the price at `default_max_price`.
pub fn extract_search_constraints(text: &str, config: &AgentConfig) -> ProductQuery {
    let mut query = ProductQuery {
        limit: config.max_search_results,
        ..ProductQuery::default()
    };

    if let Some(caps) = between_regex().captures(text) {
        let low = caps.get(1).and_then(|m| parse_amount(m.as_str()));
        let high = caps.get(2).and_then(|m| parse_amount(m.as_str()));
        if let (Some(low), Some(high)) = (low, high) {
            query.min_price = Some(low.min(high));
            query.max_price = Some(low.max(high));
        }
    }
    if query.max_price.is_none() {
        query.max_price = max_price_regex()
            .captures(text)
            .and_then(|caps| caps.get(1))
            .and_then(|m| parse_amount(m.as_str()));
    }
    if query.min_price.is_none() {
        query.min_price = min_price_regex()
            .captures(text)
            .and_then(|caps| caps.get(1))
            .and_then(|m| parse_amount(m.as_str()));
    }
    if query.max_price.is_none() && budget_regex().is_match(text) {
        query.max_price = Some(config.default_max_price);
    }

    let words = words_of(text);
    query.category = config
        .known_categories
        .iter()
        .find(|c| mentions(&words, c))
        .map(|c| c.to_lowercase());
    query.brand = config
        .known_brands
        .iter()
        .find(|b| mentions(&words, b))
        .map(|b| b.to_lowercase());

    let mut exclude: Vec<&str> = Vec::new();
    if let Some(category) = &query.category {
        exclude.push(category);
    }
    if let Some(brand) = &query.brand {
        exclude.push(brand);
    }
    query.keyword = extract_keyword(text, &exclude);
    query
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AgentConfig {
        AgentConfig::default()
    }

    // =========================================================================
    // Numbers
    // =========================================================================

    #[test]
    fn test_price_with_thousands_separator() {
        assert_eq!(extract_price("Change the price to $1,199"), Some(1199.0));
        assert_eq!(extract_price("price is now $1,199.50"), Some(1199.5));
    }

    #[test]
    fn test_price_preference_order() {
        // `$` wins over a bare number.
        assert_eq!(extract_price("set item 3 price from 40 to $45"), Some(45.0));
        // "to" wins over an earlier bare number.
        assert_eq!(extract_price("change price from 40 to 45"), Some(45.0));
        // Product references are never prices.
        assert_eq!(extract_price("set product 12 price 30"), Some(30.0));
        assert_eq!(extract_price("change the price of product 12"), None);
    }

    #[test]
    fn test_price_ignores_model_numbers() {
        assert_eq!(extract_price("change the price of the 128GB model"), None);
        assert_eq!(extract_price("iPhone 13 Pro price to 750"), Some(750.0));
    }

    #[test]
    fn test_number_words_are_not_parsed() {
        assert_eq!(extract_price("change the price to fifty"), None);
        assert_eq!(extract_stock_change("add five units"), None);
    }

    #[test]
    fn test_extract_product_id() {
        assert_eq!(extract_product_id("tell me about product 12"), Some(12));
        assert_eq!(extract_product_id("item #7 please"), Some(7));
        assert_eq!(extract_product_id("what about #3?"), Some(3));
        assert_eq!(extract_product_id("ID 42"), Some(42));
        assert_eq!(extract_product_id("add 5 units"), None);
    }

    #[test]
    fn test_stock_deltas() {
        assert_eq!(extract_stock_change("add 5 units"), Some(StockInstruction::Delta(5)));
        assert_eq!(extract_stock_change("restock 3"), Some(StockInstruction::Delta(3)));
        assert_eq!(extract_stock_change("remove 2"), Some(StockInstruction::Delta(-2)));
        assert_eq!(extract_stock_change("sold 4 today"), Some(StockInstruction::Delta(-4)));
        assert_eq!(
            extract_stock_change("add 10 units to product 3"),
            Some(StockInstruction::Delta(10))
        );
    }

    #[test]
    fn test_stock_absolute_sets() {
        assert_eq!(extract_stock_change("set stock to 25"), Some(StockInstruction::Set(25)));
        assert_eq!(
            extract_stock_change("update inventory to 25 units"),
            Some(StockInstruction::Set(25))
        );
        assert_eq!(extract_stock_change("set stock 8"), Some(StockInstruction::Set(8)));
        assert_eq!(extract_stock_change("stock to 0"), Some(StockInstruction::Set(0)));
    }

    #[test]
    fn test_stock_without_number() {
        assert_eq!(extract_stock_change("add some units"), None);
        assert_eq!(extract_stock_change("restock product 4"), None);
    }

    #[test]
    fn test_extract_quantity() {
        assert_eq!(extract_quantity("buy 2 of product 5"), Some(2));
        assert_eq!(extract_quantity("buy product 5"), None);
        assert_eq!(extract_quantity("I'll take the $85 pair"), None);
    }

    #[test]
    fn test_numbers_flags() {
        let tokens = numbers("move product 4 to $12.50");
        assert_eq!(tokens.len(), 2);
        assert!(tokens[0].product_ref);
        assert!(tokens[1].currency);
        assert!(tokens[1].after_to);
        assert!(!tokens[1].is_integer);
        assert_eq!(tokens[1].value, 12.5);
    }

    #[test]
    fn test_preceded_by_word_requires_boundary() {
        assert!(preceded_by_word("go to 5", 6, "to"));
        assert!(!preceded_by_word("pluto 5", 6, "to"));
    }

    // =========================================================================
    // Search constraints
    // =========================================================================

    #[test]
    fn test_search_constraints_with_ceiling() {
        let q = extract_search_constraints("I'm looking for sneakers under $100", &config());
        assert_eq!(q.max_price, Some(100.0));
        assert_eq!(q.keyword.as_deref(), Some("sneaker"));
        assert_eq!(q.limit, 5);
        assert!(q.in_stock_only);
    }

    #[test]
    fn test_search_constraints_brand_and_category() {
        let q = extract_search_constraints("show me nike shoes", &config());
        assert_eq!(q.brand.as_deref(), Some("nike"));
        assert_eq!(q.keyword.as_deref(), Some("shoe"));

        let q = extract_search_constraints("do you have any electronics from apple?", &config());
        assert_eq!(q.category.as_deref(), Some("electronics"));
        assert_eq!(q.brand.as_deref(), Some("apple"));
        assert_eq!(q.keyword, None);
    }

    #[test]
    fn test_search_constraints_budget_default() {
        let q = extract_search_constraints("cheap headphones", &config());
        assert_eq!(q.max_price, Some(100.0));
        assert_eq!(q.keyword.as_deref(), Some("headphone"));
    }

    #[test]
    fn test_search_constraints_between() {
        let q = extract_search_constraints("find laptops between $1,500 and $800", &config());
        assert_eq!(q.min_price, Some(800.0));
        assert_eq!(q.max_price, Some(1500.0));
        assert_eq!(q.keyword.as_deref(), Some("laptop"));
    }

    #[test]
    fn test_search_constraints_min_price() {
        let q = extract_search_constraints("show me watches over $200", &config());
        assert_eq!(q.min_price, Some(200.0));
        assert_eq!(q.max_price, None);
        assert_eq!(q.keyword.as_deref(), Some("watch"));
    }

    #[test]
    fn test_search_constraints_without_keyword() {
        let q = extract_search_constraints("anything under $50?", &config());
        assert_eq!(q.max_price, Some(50.0));
        assert_eq!(q.keyword, None);

        let q = extract_search_constraints("what's in stock?", &config());
        assert_eq!(q.keyword, None);
    }

    #[test]
    fn test_singular() {
        assert_eq!(singular("laptops"), "laptop");
        assert_eq!(singular("accessories"), "accessory");
        assert_eq!(singular("glass"), "glass");
        assert_eq!(singular("bus"), "bus");
        assert_eq!(singular("watches"), "watch");
        assert_eq!(singular("shoes"), "shoe");
    }
}
