//! Catalog collaborator.
//!
//! The agent never talks to storage directly. Every read and write goes
//! through `Catalog`, and every write is scoped to the acting seller.

use std::sync::Arc;

use async_trait::async_trait;

use visioneer_core::types::{Product, ProductQuery};
use visioneer_storage::{ProductRepository, StockChange};

use crate::error::AgentError;
use crate::types::Actor;

/// Product lookup and seller-scoped mutation.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Active products matching `query`, best match first.
    async fn find_products(&self, query: &ProductQuery) -> Result<Vec<Product>, AgentError>;

    /// A single product by id, `None` if unknown.
    async fn get_product(&self, id: i64) -> Result<Option<Product>, AgentError>;

    /// Set the price of a product owned by `actor`.
    async fn update_price(&self, id: i64, price: f64, actor: &Actor)
        -> Result<Product, AgentError>;

    /// Apply a relative stock change to a product owned by `actor`.
    ///
    /// Fails with `InvalidValue` if the result would be negative.
    async fn update_stock(&self, id: i64, delta: i64, actor: &Actor)
        -> Result<Product, AgentError>;
}

/// `Catalog` backed by the SQLite product repository.
///
/// Repository calls are synchronous, so each runs on the blocking pool.
#[derive(Clone)]
pub struct StoreCatalog {
    products: Arc<ProductRepository>,
}

impl StoreCatalog {
    pub fn new(products: Arc<ProductRepository>) -> Self {
        Self { products }
    }

    async fn run<T, F>(&self, op: F) -> Result<T, AgentError>
    where
        T: Send + 'static,
        F: FnOnce(&ProductRepository) -> Result<T, AgentError> + Send + 'static,
    {
        let products = Arc::clone(&self.products);
        tokio::task::spawn_blocking(move || op(&products))
            .await
            .map_err(|e| AgentError::CatalogUnavailable(format!("catalog task failed: {}", e)))?
    }
}

/// Error for a stock change that would leave fewer than zero units.
pub(crate) fn stock_below_zero(available: i64) -> AgentError {
    AgentError::InvalidValue(format!(
        "That would take stock below zero. There {} only {} in stock right now.",
        if available == 1 { "is" } else { "are" },
        available
    ))
}

fn require_seller(actor: &Actor) -> Result<(), AgentError> {
    if actor.can_manage_listings() {
        Ok(())
    } else {
        Err(AgentError::NotAuthorized)
    }
}

#[async_trait]
impl Catalog for StoreCatalog {
    async fn find_products(&self, query: &ProductQuery) -> Result<Vec<Product>, AgentError> {
        let query = query.clone();
        self.run(move |products| Ok(products.search(&query)?)).await
    }

    async fn get_product(&self, id: i64) -> Result<Option<Product>, AgentError> {
        self.run(move |products| Ok(products.find_by_id(id)?)).await
    }

    async fn update_price(
        &self,
        id: i64,
        price: f64,
        actor: &Actor,
    ) -> Result<Product, AgentError> {
        require_seller(actor)?;
        let seller_id = actor.user_id;
        self.run(move |products| {
            products
                .update_price(id, price, seller_id)?
                .ok_or(AgentError::NotAuthorized)
        })
        .await
    }

    async fn update_stock(
        &self,
        id: i64,
        delta: i64,
        actor: &Actor,
    ) -> Result<Product, AgentError> {
        require_seller(actor)?;
        let seller_id = actor.user_id;
        self.run(move |products| match products.adjust_stock(id, delta, seller_id)? {
            StockChange::Applied(product) => Ok(product),
            StockChange::NotOwned => Err(AgentError::NotAuthorized),
            StockChange::WouldGoNegative { available } => Err(stock_below_zero(available)),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use visioneer_core::types::UserRole;
    use visioneer_storage::{seed_demo_catalog, Database};

    async fn seeded() -> (StoreCatalog, i64) {
        let db = Arc::new(Database::in_memory().unwrap());
        let report = seed_demo_catalog(&db).unwrap();
        let catalog = StoreCatalog::new(Arc::new(ProductRepository::new(db)));
        (catalog, report.seller_id)
    }

    #[tokio::test]
    async fn test_find_products_by_category() {
        let (catalog, _) = seeded().await;
        let query = ProductQuery {
            category: Some("electronics".to_string()),
            ..ProductQuery::default()
        };
        let found = catalog.find_products(&query).await.unwrap();
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn test_update_price_by_owner() {
        let (catalog, seller_id) = seeded().await;
        let updated = catalog
            .update_price(1, 90.0, &Actor::seller(seller_id))
            .await
            .unwrap();
        assert_eq!(updated.price, 90.0);
    }

    #[tokio::test]
    async fn test_update_price_by_stranger_is_rejected() {
        let (catalog, seller_id) = seeded().await;
        let err = catalog
            .update_price(1, 1.0, &Actor::seller(seller_id + 100))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::NotAuthorized));
        assert_eq!(catalog.get_product(1).await.unwrap().unwrap().price, 85.0);
    }

    #[tokio::test]
    async fn test_buyer_cannot_update() {
        let (catalog, seller_id) = seeded().await;
        let buyer = Actor {
            user_id: seller_id,
            role: UserRole::Buyer,
        };
        let err = catalog.update_stock(1, 5, &buyer).await.unwrap_err();
        assert!(matches!(err, AgentError::NotAuthorized));
    }

    #[tokio::test]
    async fn test_update_stock_cannot_go_negative() {
        let (catalog, seller_id) = seeded().await;
        let err = catalog
            .update_stock(1, -10, &Actor::seller(seller_id))
            .await
            .unwrap_err();
        match err {
            AgentError::InvalidValue(text) => assert!(text.contains("only 3")),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(
            catalog.get_product(1).await.unwrap().unwrap().stock_quantity,
            3
        );
    }

    #[tokio::test]
    async fn test_get_unknown_product() {
        let (catalog, _) = seeded().await;
        assert!(catalog.get_product(999).await.unwrap().is_none());
    }
}
