//! Demo catalog seeding.
//!
//! Inserts the default categories, a sample seller and a handful of listings
//! so a fresh install has something to talk about.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use visioneer_core::error::VisioneerError;
use visioneer_core::types::{NewProduct, NewUser, UserRole};

use crate::db::Database;
use crate::repository::{ensure_category, ProductRepository, UserRepository};

const DEFAULT_CATEGORIES: &[(&str, &str)] = &[
    ("Electronics", "Electronic devices and gadgets"),
    ("Clothing", "Apparel and fashion items"),
    ("Home & Garden", "Home improvement and garden supplies"),
    ("Sports & Outdoors", "Sports equipment and outdoor gear"),
    ("Books & Media", "Books, movies, and digital media"),
    ("Automotive", "Car parts and accessories"),
    ("Health & Beauty", "Health products and beauty supplies"),
    ("Toys & Games", "Toys, games, and entertainment"),
    ("Jewelry & Watches", "Jewelry and timepieces"),
    ("Collectibles", "Collectible items and memorabilia"),
];

pub const DEMO_SELLER_EMAIL: &str = "seller@example.com";

/// What a seeding run inserted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SeedReport {
    pub categories: usize,
    pub seller_id: i64,
    pub products: usize,
}

/// Seed categories, the demo seller and sample products.
///
/// Categories and the demo seller are inserted if missing. Products are
/// only created when the catalog is empty, so repeated runs are harmless.
pub fn seed_demo_catalog(db: &Arc<Database>) -> Result<SeedReport, VisioneerError> {
    let mut report = SeedReport::default();

    db.with_conn(|conn| {
        for (name, description) in DEFAULT_CATEGORIES {
            ensure_category(conn, name, Some(*description))?;
        }
        Ok(())
    })?;
    report.categories = DEFAULT_CATEGORIES.len();

    let users = UserRepository::new(db.clone());
    let seller = match users.find_by_email(DEMO_SELLER_EMAIL)? {
        Some(existing) => existing,
        None => users.create(&NewUser {
            email: DEMO_SELLER_EMAIL.to_string(),
            username: "sample_seller".to_string(),
            full_name: Some("Sample Seller".to_string()),
            role: UserRole::Seller,
        })?,
    };
    report.seller_id = seller.id;

    let products = ProductRepository::new(db.clone());
    if products.count()? > 0 {
        info!("Catalog already populated, skipping demo products");
        return Ok(report);
    }

    for product in demo_products(seller.id) {
        products.create(&product)?;
        report.products += 1;
    }

    info!(
        seller_id = seller.id,
        products = report.products,
        "Demo catalog seeded"
    );
    Ok(report)
}

fn demo_products(seller_id: i64) -> Vec<NewProduct> {
    let listing = |name: &str,
                   description: &str,
                   price: f64,
                   stock: i64,
                   category: &str,
                   brand: &str,
                   model: &str,
                   condition: &str,
                   featured: bool| NewProduct {
        name: name.to_string(),
        description: Some(description.to_string()),
        price,
        stock_quantity: stock,
        seller_id,
        category: category.to_string(),
        brand: Some(brand.to_string()),
        model: Some(model.to_string()),
        condition: Some(condition.to_string()),
        is_featured: featured,
    };

    vec![
        listing(
            "Vintage Adidas Gazelle - Blue",
            "Authentic vintage Adidas Gazelle sneakers in classic blue colorway. Minimal wear.",
            85.0,
            3,
            "Clothing",
            "Adidas",
            "Gazelle",
            "Very Good",
            true,
        ),
        listing(
            "Classic Vans Old Skool - Black",
            "Timeless Vans Old Skool sneakers in black with original box.",
            65.0,
            5,
            "Clothing",
            "Vans",
            "Old Skool",
            "Good",
            false,
        ),
        listing(
            "Retro Converse Chuck 70",
            "Vintage Converse Chuck Taylor 70s high-top sneakers in a rare colorway.",
            78.0,
            2,
            "Clothing",
            "Converse",
            "Chuck 70",
            "Excellent",
            true,
        ),
        listing(
            "ASUS ROG Strix Gaming Laptop",
            "High-performance gaming laptop with RTX 3060 graphics.",
            1299.99,
            4,
            "Electronics",
            "ASUS",
            "ROG Strix G15",
            "New",
            true,
        ),
        listing(
            "iPhone 13 Pro - 128GB",
            "iPhone 13 Pro with 128GB storage, original box and accessories.",
            799.99,
            2,
            "Electronics",
            "Apple",
            "iPhone 13 Pro",
            "Excellent",
            false,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use visioneer_core::types::ProductQuery;

    #[test]
    fn test_seed_populates_empty_catalog() {
        let db = Arc::new(Database::in_memory().unwrap());
        let report = seed_demo_catalog(&db).unwrap();
        assert_eq!(report.categories, 10);
        assert_eq!(report.products, 5);

        let seller = UserRepository::new(db.clone())
            .find_by_email(DEMO_SELLER_EMAIL)
            .unwrap()
            .unwrap();
        assert_eq!(seller.role, UserRole::Seller);
        assert_eq!(report.seller_id, seller.id);

        let clothing = ProductRepository::new(db)
            .search(&ProductQuery {
                category: Some("clothing".to_string()),
                ..ProductQuery::default()
            })
            .unwrap();
        assert_eq!(clothing.len(), 3);
    }

    #[test]
    fn test_seed_is_idempotent() {
        let db = Arc::new(Database::in_memory().unwrap());
        let first = seed_demo_catalog(&db).unwrap();
        let second = seed_demo_catalog(&db).unwrap();
        assert_eq!(second.products, 0);
        assert_eq!(second.seller_id, first.seller_id);
        assert_eq!(ProductRepository::new(db).count().unwrap(), 5);
    }
}
