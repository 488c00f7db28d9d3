//! Database schema migrations.
//!
//! Applies the initial marketplace schema: users, categories, products,
//! conversations, messages and the schema_migrations ledger.

use rusqlite::Connection;
use tracing::info;

use visioneer_core::error::VisioneerError;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), VisioneerError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| VisioneerError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| {
            VisioneerError::Storage(format!("Failed to query migration version: {}", e))
        })?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: marketplace_schema");
    }

    Ok(())
}

/// Version 1: marketplace schema.
fn apply_v1(conn: &Connection) -> Result<(), VisioneerError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            email       TEXT NOT NULL UNIQUE,
            username    TEXT NOT NULL UNIQUE,
            full_name   TEXT,
            role        TEXT NOT NULL DEFAULT 'buyer'
                        CHECK (role IN ('buyer', 'seller', 'admin')),
            is_active   INTEGER NOT NULL DEFAULT 1,
            created_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        CREATE TABLE IF NOT EXISTS categories (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT NOT NULL UNIQUE,
            description TEXT
        );

        CREATE TABLE IF NOT EXISTS products (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            name            TEXT NOT NULL,
            description     TEXT,
            price           REAL NOT NULL CHECK (price >= 0),
            stock_quantity  INTEGER NOT NULL DEFAULT 0 CHECK (stock_quantity >= 0),
            category_id     INTEGER REFERENCES categories(id) ON DELETE SET NULL,
            seller_id       INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            brand           TEXT,
            model           TEXT,
            condition       TEXT,
            is_active       INTEGER NOT NULL DEFAULT 1,
            is_featured     INTEGER NOT NULL DEFAULT 0,
            created_at      INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
            updated_at      INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_products_seller
            ON products (seller_id);

        CREATE INDEX IF NOT EXISTS idx_products_category
            ON products (category_id, price ASC);

        CREATE TABLE IF NOT EXISTS conversations (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id  TEXT NOT NULL UNIQUE,
            user_id     INTEGER REFERENCES users(id) ON DELETE SET NULL,
            context     TEXT NOT NULL DEFAULT '{}',
            intent      TEXT,
            created_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
            updated_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        CREATE TABLE IF NOT EXISTS messages (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            conversation_id INTEGER NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
            role            TEXT NOT NULL CHECK (role IN ('user', 'assistant', 'system')),
            content         TEXT NOT NULL,
            intent          TEXT,
            metadata        TEXT NOT NULL DEFAULT '{}',
            created_at_ms   INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages (conversation_id, id ASC);

        INSERT INTO schema_migrations (version, name) VALUES (1, 'marketplace_schema');
        ",
    )
    .map_err(|e| VisioneerError::Storage(format!("Migration v1 failed: {}", e)))?;

    Ok(())
}
