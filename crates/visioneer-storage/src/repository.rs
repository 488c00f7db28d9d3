//! Repository implementations for SQLite-backed persistence.
//!
//! Provides UserRepository, ProductRepository and ConversationRepository
//! that operate on the Database struct using raw SQL.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use visioneer_core::error::VisioneerError;
use visioneer_core::types::{
    NewProduct, NewUser, Product, ProductQuery, Role, Timestamp, Turn, User, UserRole,
};

use crate::db::Database;

fn storage_err(e: rusqlite::Error) -> VisioneerError {
    VisioneerError::Storage(e.to_string())
}

fn from_unix(secs: i64) -> Timestamp {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

fn from_unix_millis(ms: i64) -> Timestamp {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn parse_column<T>(idx: usize, raw: String) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

// =============================================================================
// Users
// =============================================================================

/// Repository for marketplace accounts.
pub struct UserRepository {
    db: Arc<Database>,
}

impl UserRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Register a new account.
    pub fn create(&self, user: &NewUser) -> Result<User, VisioneerError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (email, username, full_name, role) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    user.email,
                    user.username,
                    user.full_name,
                    user.role.to_string()
                ],
            )
            .map_err(|e| VisioneerError::Storage(format!("Failed to create user: {}", e)))?;

            let id = conn.last_insert_rowid();
            load_user(conn, "id = ?1", rusqlite::params![id])?
                .ok_or_else(|| VisioneerError::Storage(format!("User {} vanished after insert", id)))
        })
    }

    /// Find an account by ID.
    pub fn find_by_id(&self, id: i64) -> Result<Option<User>, VisioneerError> {
        self.db
            .with_conn(|conn| load_user(conn, "id = ?1", rusqlite::params![id]))
    }

    /// Find an account by email address.
    pub fn find_by_email(&self, email: &str) -> Result<Option<User>, VisioneerError> {
        self.db
            .with_conn(|conn| load_user(conn, "email = ?1", rusqlite::params![email]))
    }
}

fn load_user(
    conn: &Connection,
    predicate: &str,
    params: &[&dyn rusqlite::ToSql],
) -> Result<Option<User>, VisioneerError> {
    let sql = format!(
        "SELECT id, email, username, full_name, role, is_active, created_at
         FROM users WHERE {}",
        predicate
    );
    conn.query_row(&sql, params, row_to_user)
        .optional()
        .map_err(storage_err)
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    let role: UserRole = parse_column(4, row.get(4)?)?;
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        username: row.get(2)?,
        full_name: row.get(3)?,
        role,
        is_active: row.get(5)?,
        created_at: from_unix(row.get(6)?),
    })
}

// =============================================================================
// Products
// =============================================================================

const PRODUCT_SELECT: &str = "SELECT p.id, p.name, p.description, p.price, p.stock_quantity,
        p.seller_id, c.name, p.brand, p.model, p.condition, p.is_active, p.is_featured,
        p.updated_at
    FROM products p
    LEFT JOIN categories c ON c.id = p.category_id";

/// Outcome of a guarded stock adjustment.
#[derive(Debug, Clone, PartialEq)]
pub enum StockChange {
    /// The adjustment was committed; carries the updated product.
    Applied(Product),
    /// The product does not exist, is inactive, or belongs to another seller.
    NotOwned,
    /// The adjustment would drive stock below zero.
    WouldGoNegative { available: i64 },
}

/// Repository for product listings.
pub struct ProductRepository {
    db: Arc<Database>,
}

impl ProductRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// List a new product, creating its category if needed.
    pub fn create(&self, product: &NewProduct) -> Result<Product, VisioneerError> {
        self.db.with_conn(|conn| {
            let category_id = ensure_category(conn, &product.category, None)?;
            conn.execute(
                "INSERT INTO products (name, description, price, stock_quantity, category_id,
                                       seller_id, brand, model, condition, is_featured)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                rusqlite::params![
                    product.name,
                    product.description,
                    product.price,
                    product.stock_quantity,
                    category_id,
                    product.seller_id,
                    product.brand,
                    product.model,
                    product.condition,
                    product.is_featured,
                ],
            )
            .map_err(|e| VisioneerError::Storage(format!("Failed to create product: {}", e)))?;

            let id = conn.last_insert_rowid();
            load_product(conn, id)?.ok_or_else(|| {
                VisioneerError::Storage(format!("Product {} vanished after insert", id))
            })
        })
    }

    /// Find a product by ID, active or not.
    pub fn find_by_id(&self, id: i64) -> Result<Option<Product>, VisioneerError> {
        self.db.with_conn(|conn| load_product(conn, id))
    }

    /// Search active products.
    ///
    /// String filters are case-insensitive substring matches. Results are
    /// ordered featured-first, then by ascending price.
    pub fn search(&self, query: &ProductQuery) -> Result<Vec<Product>, VisioneerError> {
        let mut sql = format!("{} WHERE p.is_active = 1", PRODUCT_SELECT);
        let mut values: Vec<Value> = Vec::new();

        if query.in_stock_only {
            sql.push_str(" AND p.stock_quantity > 0");
        }
        if let Some(keyword) = &query.keyword {
            values.push(Value::Text(like_pattern(keyword)));
            let n = values.len();
            sql.push_str(&format!(
                " AND (LOWER(p.name) LIKE ?{n} ESCAPE '\\'
                    OR LOWER(COALESCE(p.description, '')) LIKE ?{n} ESCAPE '\\'
                    OR LOWER(COALESCE(p.brand, '')) LIKE ?{n} ESCAPE '\\')"
            ));
        }
        if let Some(category) = &query.category {
            values.push(Value::Text(like_pattern(category)));
            sql.push_str(&format!(
                " AND LOWER(COALESCE(c.name, '')) LIKE ?{} ESCAPE '\\'",
                values.len()
            ));
        }
        if let Some(brand) = &query.brand {
            values.push(Value::Text(like_pattern(brand)));
            sql.push_str(&format!(
                " AND LOWER(COALESCE(p.brand, '')) LIKE ?{} ESCAPE '\\'",
                values.len()
            ));
        }
        if let Some(min) = query.min_price {
            values.push(Value::Real(min));
            sql.push_str(&format!(" AND p.price >= ?{}", values.len()));
        }
        if let Some(max) = query.max_price {
            values.push(Value::Real(max));
            sql.push_str(&format!(" AND p.price <= ?{}", values.len()));
        }
        values.push(Value::Integer(query.limit as i64));
        sql.push_str(&format!(
            " ORDER BY p.is_featured DESC, p.price ASC, p.id ASC LIMIT ?{}",
            values.len()
        ));

        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql).map_err(storage_err)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(values.iter()), row_to_product)
                .map_err(storage_err)?;

            let mut products = Vec::new();
            for row in rows {
                products.push(row.map_err(storage_err)?);
            }
            Ok(products)
        })
    }

    /// Set a product's price, only if `seller_id` owns it.
    ///
    /// Returns `None` when the product is missing, inactive or owned by
    /// someone else; the caller cannot tell these apart.
    pub fn update_price(
        &self,
        id: i64,
        price: f64,
        seller_id: i64,
    ) -> Result<Option<Product>, VisioneerError> {
        self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE products
                     SET price = ?2, updated_at = strftime('%s', 'now')
                     WHERE id = ?1 AND seller_id = ?3 AND is_active = 1",
                    rusqlite::params![id, price, seller_id],
                )
                .map_err(|e| VisioneerError::Storage(format!("Failed to update price: {}", e)))?;

            if changed == 0 {
                return Ok(None);
            }
            load_product(conn, id)
        })
    }

    /// Apply a relative stock change, only if `seller_id` owns the product
    /// and the result stays non-negative.
    pub fn adjust_stock(
        &self,
        id: i64,
        delta: i64,
        seller_id: i64,
    ) -> Result<StockChange, VisioneerError> {
        self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE products
                     SET stock_quantity = stock_quantity + ?2, updated_at = strftime('%s', 'now')
                     WHERE id = ?1 AND seller_id = ?3 AND is_active = 1
                       AND stock_quantity + ?2 >= 0",
                    rusqlite::params![id, delta, seller_id],
                )
                .map_err(|e| VisioneerError::Storage(format!("Failed to adjust stock: {}", e)))?;

            if changed > 0 {
                return match load_product(conn, id)? {
                    Some(product) => Ok(StockChange::Applied(product)),
                    None => Ok(StockChange::NotOwned),
                };
            }

            let current: Option<(i64, i64)> = conn
                .query_row(
                    "SELECT seller_id, stock_quantity FROM products WHERE id = ?1 AND is_active = 1",
                    rusqlite::params![id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
                .map_err(storage_err)?;

            Ok(match current {
                Some((owner, available)) if owner == seller_id => {
                    StockChange::WouldGoNegative { available }
                }
                _ => StockChange::NotOwned,
            })
        })
    }

    /// Count active products.
    pub fn count(&self) -> Result<u64, VisioneerError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM products WHERE is_active = 1",
                    [],
                    |row| row.get(0),
                )
                .map_err(storage_err)?;
            Ok(count as u64)
        })
    }
}

/// Insert a category if absent and return its ID.
pub(crate) fn ensure_category(
    conn: &Connection,
    name: &str,
    description: Option<&str>,
) -> Result<i64, VisioneerError> {
    conn.execute(
        "INSERT OR IGNORE INTO categories (name, description) VALUES (?1, ?2)",
        rusqlite::params![name, description],
    )
    .map_err(|e| VisioneerError::Storage(format!("Failed to create category: {}", e)))?;

    conn.query_row(
        "SELECT id FROM categories WHERE name = ?1",
        rusqlite::params![name],
        |row| row.get(0),
    )
    .map_err(storage_err)
}

fn load_product(conn: &Connection, id: i64) -> Result<Option<Product>, VisioneerError> {
    conn.query_row(
        &format!("{} WHERE p.id = ?1", PRODUCT_SELECT),
        rusqlite::params![id],
        row_to_product,
    )
    .optional()
    .map_err(storage_err)
}

fn row_to_product(row: &Row<'_>) -> rusqlite::Result<Product> {
    Ok(Product {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        price: row.get(3)?,
        stock_quantity: row.get(4)?,
        seller_id: row.get(5)?,
        category: row.get(6)?,
        brand: row.get(7)?,
        model: row.get(8)?,
        condition: row.get(9)?,
        is_active: row.get(10)?,
        is_featured: row.get(11)?,
        updated_at: from_unix(row.get(12)?),
    })
}

/// Lowercased `%term%` pattern with LIKE wildcards escaped.
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for ch in term.trim().to_lowercase().chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

// =============================================================================
// Conversations
// =============================================================================

/// Persisted conversation header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: i64,
    pub session_id: String,
    pub user_id: Option<i64>,
    pub context: serde_json::Value,
    pub intent: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Repository for conversation sessions and their messages.
pub struct ConversationRepository {
    db: Arc<Database>,
}

impl ConversationRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Fetch the conversation for `session_id`, creating an empty one if absent.
    pub fn get_or_create(&self, session_id: &str) -> Result<ConversationRecord, VisioneerError> {
        self.db.with_conn(|conn| {
            ensure_conversation(conn, session_id)?;
            load_conversation(conn, session_id)?.ok_or_else(|| {
                VisioneerError::Storage(format!("Conversation {} vanished", session_id))
            })
        })
    }

    /// Fetch the conversation for `session_id` without creating it.
    pub fn find(&self, session_id: &str) -> Result<Option<ConversationRecord>, VisioneerError> {
        self.db
            .with_conn(|conn| load_conversation(conn, session_id))
    }

    /// All messages of a session in insertion order.
    pub fn load_messages(&self, session_id: &str) -> Result<Vec<Turn>, VisioneerError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT m.role, m.content, m.created_at_ms
                     FROM messages m
                     JOIN conversations c ON c.id = m.conversation_id
                     WHERE c.session_id = ?1
                     ORDER BY m.id ASC",
                )
                .map_err(storage_err)?;

            let rows = stmt
                .query_map(rusqlite::params![session_id], |row| {
                    let role: Role = parse_column(0, row.get(0)?)?;
                    Ok(Turn {
                        role,
                        text: row.get(1)?,
                        timestamp: from_unix_millis(row.get(2)?),
                    })
                })
                .map_err(storage_err)?;

            let mut turns = Vec::new();
            for row in rows {
                turns.push(row.map_err(storage_err)?);
            }
            Ok(turns)
        })
    }

    /// Append one message, creating the conversation if needed.
    ///
    /// When `intent` is given it also becomes the conversation's latest intent.
    pub fn append_message(
        &self,
        session_id: &str,
        turn: &Turn,
        intent: Option<&str>,
        metadata: &serde_json::Value,
    ) -> Result<(), VisioneerError> {
        let metadata = serde_json::to_string(metadata)?;
        self.db.with_conn(|conn| {
            let conversation_id = ensure_conversation(conn, session_id)?;
            conn.execute(
                "INSERT INTO messages (conversation_id, role, content, intent, metadata, created_at_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    conversation_id,
                    turn.role.to_string(),
                    turn.text,
                    intent,
                    metadata,
                    turn.timestamp.timestamp_millis(),
                ],
            )
            .map_err(|e| VisioneerError::Storage(format!("Failed to append message: {}", e)))?;

            conn.execute(
                "UPDATE conversations
                 SET intent = COALESCE(?2, intent), updated_at = strftime('%s', 'now')
                 WHERE id = ?1",
                rusqlite::params![conversation_id, intent],
            )
            .map_err(storage_err)?;
            Ok(())
        })
    }

    /// Replace the structured context of a session.
    pub fn save_context(
        &self,
        session_id: &str,
        context: &serde_json::Value,
    ) -> Result<(), VisioneerError> {
        let context = serde_json::to_string(context)?;
        self.db.with_conn(|conn| {
            ensure_conversation(conn, session_id)?;
            conn.execute(
                "UPDATE conversations SET context = ?2, updated_at = strftime('%s', 'now')
                 WHERE session_id = ?1",
                rusqlite::params![session_id, context],
            )
            .map_err(|e| VisioneerError::Storage(format!("Failed to save context: {}", e)))?;
            Ok(())
        })
    }

    /// Record which account is talking in this session.
    pub fn attach_user(&self, session_id: &str, user_id: i64) -> Result<(), VisioneerError> {
        self.db.with_conn(|conn| {
            ensure_conversation(conn, session_id)?;
            conn.execute(
                "UPDATE conversations SET user_id = ?2 WHERE session_id = ?1",
                rusqlite::params![session_id, user_id],
            )
            .map_err(storage_err)?;
            Ok(())
        })
    }

    /// Delete all messages and reset the context, keeping the session row.
    ///
    /// Returns whether the session existed. Clearing twice is a no-op.
    pub fn clear(&self, session_id: &str) -> Result<bool, VisioneerError> {
        self.db.with_conn(|conn| {
            let id: Option<i64> = conn
                .query_row(
                    "SELECT id FROM conversations WHERE session_id = ?1",
                    rusqlite::params![session_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(storage_err)?;

            let Some(id) = id else {
                return Ok(false);
            };

            conn.execute(
                "DELETE FROM messages WHERE conversation_id = ?1",
                rusqlite::params![id],
            )
            .map_err(|e| VisioneerError::Storage(format!("Failed to clear messages: {}", e)))?;
            conn.execute(
                "UPDATE conversations
                 SET context = '{}', intent = NULL, updated_at = strftime('%s', 'now')
                 WHERE id = ?1",
                rusqlite::params![id],
            )
            .map_err(storage_err)?;
            Ok(true)
        })
    }

    /// Number of messages stored for a session.
    pub fn count_messages(&self, session_id: &str) -> Result<u64, VisioneerError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM messages m
                     JOIN conversations c ON c.id = m.conversation_id
                     WHERE c.session_id = ?1",
                    rusqlite::params![session_id],
                    |row| row.get(0),
                )
                .map_err(storage_err)?;
            Ok(count as u64)
        })
    }
}

fn ensure_conversation(conn: &Connection, session_id: &str) -> Result<i64, VisioneerError> {
    conn.execute(
        "INSERT OR IGNORE INTO conversations (session_id) VALUES (?1)",
        rusqlite::params![session_id],
    )
    .map_err(|e| VisioneerError::Storage(format!("Failed to create conversation: {}", e)))?;

    conn.query_row(
        "SELECT id FROM conversations WHERE session_id = ?1",
        rusqlite::params![session_id],
        |row| row.get(0),
    )
    .map_err(storage_err)
}

fn load_conversation(
    conn: &Connection,
    session_id: &str,
) -> Result<Option<ConversationRecord>, VisioneerError> {
    let row = conn
        .query_row(
            "SELECT id, session_id, user_id, context, intent, created_at, updated_at
             FROM conversations WHERE session_id = ?1",
            rusqlite::params![session_id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<i64>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, i64>(6)?,
                ))
            },
        )
        .optional()
        .map_err(storage_err)?;

    match row {
        Some((id, session_id, user_id, context, intent, created_at, updated_at)) => {
            Ok(Some(ConversationRecord {
                id,
                session_id,
                user_id,
                context: serde_json::from_str(&context)?,
                intent,
                created_at: from_unix(created_at),
                updated_at: from_unix(updated_at),
            }))
        }
        None => Ok(None),
    }
}
