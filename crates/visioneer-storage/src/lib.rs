//! Visioneer Storage crate - SQLite persistence for the marketplace agent.
//!
//! Provides a WAL-mode SQLite database with migrations, repositories for
//! users, products and conversations, and demo catalog seeding.

pub mod db;
pub mod migrations;
pub mod repository;
pub mod seed;

pub use db::Database;
pub use repository::{
    ConversationRecord, ConversationRepository, ProductRepository, StockChange, UserRepository,
};
pub use seed::{seed_demo_catalog, SeedReport};
