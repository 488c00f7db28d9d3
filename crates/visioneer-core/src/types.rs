use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Seconds-precision UTC timestamp used across the backend.
pub type Timestamp = DateTime<Utc>;

// =============================================================================
// Enums
// =============================================================================

/// Marketplace account role.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    #[default]
    Buyer,
    Seller,
    Admin,
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Buyer => write!(f, "buyer"),
            UserRole::Seller => write!(f, "seller"),
            UserRole::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buyer" => Ok(UserRole::Buyer),
            "seller" => Ok(UserRole::Seller),
            "admin" => Ok(UserRole::Admin),
            _ => Err(format!("Unknown user role: {}", s)),
        }
    }
}

/// Author of a conversation turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

// =============================================================================
// Accounts
// =============================================================================

/// A marketplace account.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub full_name: Option<String>,
    pub role: UserRole,
    pub is_active: bool,
    pub created_at: Timestamp,
}

/// Fields required to register a new account.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub full_name: Option<String>,
    pub role: UserRole,
}

// =============================================================================
// Catalog
// =============================================================================

/// A product listing owned by a seller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub stock_quantity: i64,
    pub seller_id: i64,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub condition: Option<String>,
    pub is_active: bool,
    pub is_featured: bool,
    pub updated_at: Timestamp,
}

impl Product {
    /// Condensed view used in search listings.
    pub fn summary(&self) -> ProductSummary {
        ProductSummary {
            id: self.id,
            name: self.name.clone(),
            price: self.price,
            brand: self.brand.clone(),
            category: self.category.clone(),
            stock_quantity: self.stock_quantity,
        }
    }
}

/// Compact product listing for search results and suggestions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductSummary {
    pub id: i64,
    pub name: String,
    pub price: f64,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub stock_quantity: i64,
}

/// Fields required to list a new product.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub stock_quantity: i64,
    pub seller_id: i64,
    pub category: String,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub condition: Option<String>,
    pub is_featured: bool,
}

/// Catalog search constraints.
///
/// All filters are optional and combined with AND. String filters are
/// case-insensitive substring matches.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_price: Option<f64>,
    pub in_stock_only: bool,
    pub limit: usize,
}

impl Default for ProductQuery {
    fn default() -> Self {
        Self {
            keyword: None,
            category: None,
            brand: None,
            min_price: None,
            max_price: None,
            in_stock_only: true,
            limit: 20,
        }
    }
}

impl ProductQuery {
    /// True when no narrowing filter is set.
    pub fn is_unconstrained(&self) -> bool {
        self.keyword.is_none()
            && self.category.is_none()
            && self.brand.is_none()
            && self.min_price.is_none()
            && self.max_price.is_none()
    }
}

// =============================================================================
// Conversation
// =============================================================================

/// One entry in a session's ordered history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub timestamp: Timestamp,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_role_round_trips_through_str() {
        for role in [UserRole::Buyer, UserRole::Seller, UserRole::Admin] {
            let parsed: UserRole = role.to_string().parse().unwrap();
            assert_eq!(parsed, role);
        }
        assert!("owner".parse::<UserRole>().is_err());
    }

    #[test]
    fn test_role_serializes_snake_case() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
        assert_eq!("system".parse::<Role>().unwrap(), Role::System);
    }

    #[test]
    fn test_product_summary() {
        let product = Product {
            id: 3,
            name: "Retro Converse Chuck 70".to_string(),
            description: None,
            price: 78.0,
            stock_quantity: 2,
            seller_id: 1,
            category: Some("Clothing".to_string()),
            brand: Some("Converse".to_string()),
            model: None,
            condition: Some("Excellent".to_string()),
            is_active: true,
            is_featured: false,
            updated_at: Utc::now(),
        };
        let summary = product.summary();
        assert_eq!(summary.id, 3);
        assert_eq!(summary.brand.as_deref(), Some("Converse"));
        assert_eq!(summary.stock_quantity, 2);
    }

    #[test]
    fn test_product_query_defaults() {
        let query = ProductQuery::default();
        assert!(query.in_stock_only);
        assert_eq!(query.limit, 20);
        assert!(query.is_unconstrained());

        let narrowed = ProductQuery {
            max_price: Some(100.0),
            ..ProductQuery::default()
        };
        assert!(!narrowed.is_unconstrained());
    }

    #[test]
    fn test_turn_constructors() {
        assert_eq!(Turn::user("hi").role, Role::User);
        assert_eq!(Turn::assistant("hello").role, Role::Assistant);
    }
}
