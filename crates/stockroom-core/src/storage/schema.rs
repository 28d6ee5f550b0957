//! SQLite schema for the read-side projection
//!
//! The database is disposable: it is rebuilt from the Automerge document
//! whenever the document changes, so a version bump simply drops and
//! recreates the tables.

use rusqlite::{Connection, Result};

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// Create (or recreate) all tables
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_info (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        DROP TABLE IF EXISTS products;
        DROP TABLE IF EXISTS sales;
        DROP TABLE IF EXISTS purchases;

        CREATE TABLE products (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            category TEXT NOT NULL,
            sku TEXT NOT NULL DEFAULT '',
            price REAL NOT NULL,
            cost REAL NOT NULL,
            stock_quantity INTEGER NOT NULL,
            reorder_point INTEGER NOT NULL,
            image_url TEXT NOT NULL DEFAULT '',
            image_hint TEXT NOT NULL DEFAULT '',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        -- No foreign keys: sales and purchases may outlive their product
        CREATE TABLE sales (
            id TEXT PRIMARY KEY,
            product_id TEXT NOT NULL,
            product_name TEXT NOT NULL,
            quantity INTEGER NOT NULL,
            total REAL NOT NULL,
            sale_date INTEGER NOT NULL
        );

        CREATE TABLE purchases (
            id TEXT PRIMARY KEY,
            product_id TEXT NOT NULL,
            product_name TEXT NOT NULL,
            quantity INTEGER NOT NULL,
            cost REAL NOT NULL,
            total_cost REAL NOT NULL,
            purchase_date INTEGER NOT NULL
        );

        CREATE INDEX idx_products_name ON products(name);
        CREATE INDEX idx_sales_date ON sales(sale_date);
        CREATE INDEX idx_sales_product ON sales(product_id);
        CREATE INDEX idx_purchases_date ON purchases(purchase_date);
        CREATE INDEX idx_purchases_product ON purchases(product_id);
        "#,
    )?;

    conn.execute(
        "INSERT OR REPLACE INTO schema_info (key, value) VALUES ('version', ?)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

/// Get the schema version recorded in the database
pub fn get_schema_version(conn: &Connection) -> Result<Option<i32>> {
    let mut stmt = conn.prepare("SELECT value FROM schema_info WHERE key = 'version'")?;
    let result: Result<String> = stmt.query_row([], |row| row.get(0));

    match result {
        Ok(version_str) => Ok(version_str.parse().ok()),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Check whether the schema is missing or older than this build
pub fn needs_init(conn: &Connection) -> bool {
    let table_exists: bool = conn
        .prepare("SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_info'")
        .and_then(|mut stmt| stmt.exists([]))
        .unwrap_or(false);

    if !table_exists {
        return true;
    }

    !matches!(get_schema_version(conn), Ok(Some(v)) if v == SCHEMA_VERSION)
}
