//! SQLite projection layer
//!
//! Mirrors the namespace document into SQLite so that list views can be
//! sorted and limited without walking the whole Automerge tree. The
//! document stays the source of truth; after every change the projection
//! is cleared and rebuilt inside one SQLite transaction.
//!
//! ## Tables
//!
//! - `products` - catalog with current stock
//! - `sales` - sale records, denormalized product name
//! - `purchases` - purchase records, denormalized product name

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::config::Config;
use crate::document::InventoryDocument;
use crate::live::{CollectionQuery, SortDirection};
use crate::models::{Collection, Product, Purchase, Sale};
use crate::storage::schema::{init_schema, needs_init};
use crate::user_id::UserId;

const PRODUCT_COLUMNS: &str = "id, name, category, sku, price, cost, stock_quantity, \
     reorder_point, image_url, image_hint, created_at, updated_at";
const SALE_COLUMNS: &str = "id, product_id, product_name, quantity, total, sale_date";
const PURCHASE_COLUMNS: &str =
    "id, product_id, product_name, quantity, cost, total_cost, purchase_date";

/// Map a camelCase record field to its sortable column
///
/// Returns `None` for fields that do not exist on the collection.
pub fn sort_column(collection: Collection, field: &str) -> Option<&'static str> {
    let column = match (collection, field) {
        (_, "id") => "id",
        (Collection::Products, "name") => "name",
        (Collection::Products, "category") => "category",
        (Collection::Products, "sku") => "sku",
        (Collection::Products, "price") => "price",
        (Collection::Products, "cost") => "cost",
        (Collection::Products, "stockQuantity") => "stock_quantity",
        (Collection::Products, "reorderPoint") => "reorder_point",
        (Collection::Products, "createdAt") => "created_at",
        (Collection::Products, "updatedAt") => "updated_at",
        (Collection::Sales, "productName") | (Collection::Purchases, "productName") => {
            "product_name"
        }
        (Collection::Sales, "quantity") | (Collection::Purchases, "quantity") => "quantity",
        (Collection::Sales, "total") => "total",
        (Collection::Sales, "saleDate") => "sale_date",
        (Collection::Purchases, "cost") => "cost",
        (Collection::Purchases, "totalCost") => "total_cost",
        (Collection::Purchases, "purchaseDate") => "purchase_date",
        _ => return None,
    };
    Some(column)
}

/// SQLite projection for one namespace
pub struct SqliteProjection {
    conn: Connection,
}

impl SqliteProjection {
    /// Open or create the namespace's database
    pub fn open(config: &Config, user_id: &UserId) -> Result<Self> {
        let path = config.sqlite_path(user_id);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open SQLite database at {:?}", path))?;

        if needs_init(&conn) {
            init_schema(&conn).context("Failed to initialize SQLite schema")?;
        }

        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Rebuild every table from the document
    pub fn project_full(&mut self, doc: &InventoryDocument) -> Result<()> {
        let products = doc
            .all_products()
            .context("Failed to read products from document")?;
        let sales = doc.all_sales().context("Failed to read sales from document")?;
        let purchases = doc
            .all_purchases()
            .context("Failed to read purchases from document")?;

        let tx = self.conn.transaction()?;
        clear_all_data(&tx)?;
        for product in &products {
            insert_product(&tx, product)?;
        }
        for sale in &sales {
            insert_sale(&tx, sale)?;
        }
        for purchase in &purchases {
            insert_purchase(&tx, purchase)?;
        }
        tx.commit()?;

        debug!(
            products = products.len(),
            sales = sales.len(),
            purchases = purchases.len(),
            "Projection rebuilt"
        );
        Ok(())
    }

    // ==================== Query Methods ====================

    pub fn query_products(&self, query: &CollectionQuery) -> Result<Vec<Product>> {
        let sql = select_sql(PRODUCT_COLUMNS, query)?;
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], product_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn query_sales(&self, query: &CollectionQuery) -> Result<Vec<Sale>> {
        let sql = select_sql(SALE_COLUMNS, query)?;
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], sale_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn query_purchases(&self, query: &CollectionQuery) -> Result<Vec<Purchase>> {
        let sql = select_sql(PURCHASE_COLUMNS, query)?;
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], purchase_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn get_product(&self, id: &Uuid) -> Result<Option<Product>> {
        self.get_one(Collection::Products, PRODUCT_COLUMNS, id, product_from_row)
    }

    pub fn get_sale(&self, id: &Uuid) -> Result<Option<Sale>> {
        self.get_one(Collection::Sales, SALE_COLUMNS, id, sale_from_row)
    }

    pub fn get_purchase(&self, id: &Uuid) -> Result<Option<Purchase>> {
        self.get_one(Collection::Purchases, PURCHASE_COLUMNS, id, purchase_from_row)
    }

    /// Ids in a collection starting with `prefix`, in id order
    ///
    /// The prefix is compared literally; `_` and `%` are not wildcards.
    pub fn ids_with_prefix(&self, collection: Collection, prefix: &str) -> Result<Vec<Uuid>> {
        let sql = format!(
            "SELECT id FROM {} WHERE substr(id, 1, length(?1)) = ?1 ORDER BY id",
            collection.name()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let ids = stmt
            .query_map(params![prefix.to_lowercase()], |row| uuid_at(row, 0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    pub fn count(&self, collection: Collection) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", collection.name());
        self.conn
            .query_row(&sql, [], |row| row.get(0))
            .map_err(Into::into)
    }

    // ==================== Private helpers ====================

    fn get_one<T>(
        &self,
        collection: Collection,
        columns: &str,
        id: &Uuid,
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Option<T>> {
        let sql = format!("SELECT {} FROM {} WHERE id = ?", columns, collection.name());
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![id.to_string()])?;

        match rows.next()? {
            Some(row) => Ok(Some(map(row)?)),
            None => Ok(None),
        }
    }
}

/// Build the SELECT for a collection query
///
/// Column names come from [`sort_column`], never from user text.
fn select_sql(columns: &str, query: &CollectionQuery) -> Result<String> {
    let table = query.collection.name();
    let mut sql = format!("SELECT {} FROM {}", columns, table);

    match &query.sort {
        Some((field, direction)) => {
            let column = sort_column(query.collection, field).ok_or_else(|| {
                anyhow::anyhow!("cannot sort {} by unknown field '{}'", table, field)
            })?;
            let dir = match direction {
                SortDirection::Asc => "ASC",
                SortDirection::Desc => "DESC",
            };
            sql.push_str(&format!(" ORDER BY {} {}, id ASC", column, dir));
        }
        None => sql.push_str(" ORDER BY id ASC"),
    }

    if let Some(limit) = query.limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }
    Ok(sql)
}

// ==================== Row mapping ====================

fn uuid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let s: String = row.get(idx)?;
    Uuid::parse_str(&s)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn time_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let millis: i64 = row.get(idx)?;
    DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Integer,
            format!("timestamp out of range: {}", millis).into(),
        )
    })
}

fn product_from_row(row: &Row<'_>) -> rusqlite::Result<Product> {
    Ok(Product {
        id: uuid_at(row, 0)?,
        name: row.get(1)?,
        category: row.get(2)?,
        sku: row.get(3)?,
        price: row.get(4)?,
        cost: row.get(5)?,
        stock_quantity: row.get(6)?,
        reorder_point: row.get(7)?,
        image_url: row.get(8)?,
        image_hint: row.get(9)?,
        created_at: time_at(row, 10)?,
        updated_at: time_at(row, 11)?,
    })
}

fn sale_from_row(row: &Row<'_>) -> rusqlite::Result<Sale> {
    Ok(Sale {
        id: uuid_at(row, 0)?,
        product_id: uuid_at(row, 1)?,
        product_name: row.get(2)?,
        quantity: row.get(3)?,
        total: row.get(4)?,
        sale_date: time_at(row, 5)?,
    })
}

fn purchase_from_row(row: &Row<'_>) -> rusqlite::Result<Purchase> {
    Ok(Purchase {
        id: uuid_at(row, 0)?,
        product_id: uuid_at(row, 1)?,
        product_name: row.get(2)?,
        quantity: row.get(3)?,
        cost: row.get(4)?,
        total_cost: row.get(5)?,
        purchase_date: time_at(row, 6)?,
    })
}

// ==================== Transaction helpers ====================

fn clear_all_data(tx: &Transaction) -> Result<()> {
    tx.execute("DELETE FROM products", [])?;
    tx.execute("DELETE FROM sales", [])?;
    tx.execute("DELETE FROM purchases", [])?;
    Ok(())
}

fn insert_product(tx: &Transaction, p: &Product) -> Result<()> {
    tx.execute(
        &format!(
            "INSERT INTO products ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            PRODUCT_COLUMNS
        ),
        params![
            p.id.to_string(),
            p.name,
            p.category,
            p.sku,
            p.price,
            p.cost,
            p.stock_quantity,
            p.reorder_point,
            p.image_url,
            p.image_hint,
            p.created_at.timestamp_millis(),
            p.updated_at.timestamp_millis(),
        ],
    )?;
    Ok(())
}

fn insert_sale(tx: &Transaction, s: &Sale) -> Result<()> {
    tx.execute(
        &format!("INSERT INTO sales ({}) VALUES (?, ?, ?, ?, ?, ?)", SALE_COLUMNS),
        params![
            s.id.to_string(),
            s.product_id.to_string(),
            s.product_name,
            s.quantity,
            s.total,
            s.sale_date.timestamp_millis(),
        ],
    )?;
    Ok(())
}

fn insert_purchase(tx: &Transaction, p: &Purchase) -> Result<()> {
    tx.execute(
        &format!(
            "INSERT INTO purchases ({}) VALUES (?, ?, ?, ?, ?, ?, ?)",
            PURCHASE_COLUMNS
        ),
        params![
            p.id.to_string(),
            p.product_id.to_string(),
            p.product_name,
            p.quantity,
            p.cost,
            p.total_cost,
            p.purchase_date.timestamp_millis(),
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProductInput;
    use chrono::Duration;

    fn product(name: &str, price: f64, stock: i64) -> Product {
        let input = ProductInput {
            price,
            stock_quantity: stock,
            ..ProductInput::new(name, "General")
        };
        Product::from_input(input, Utc::now())
    }

    fn sale(product: &Product, quantity: i64, days_ago: i64) -> Sale {
        Sale {
            id: Uuid::new_v4(),
            product_id: product.id,
            product_name: product.name.clone(),
            quantity,
            total: product.price * quantity as f64,
            sale_date: Utc::now() - Duration::days(days_ago),
        }
    }

    fn seeded() -> (InventoryDocument, SqliteProjection, Vec<Product>) {
        let mut doc = InventoryDocument::new(UserId::new());
        let products = vec![
            product("Candle", 12.0, 3),
            product("Apron", 25.0, 10),
            product("Bowl", 8.5, 0),
        ];
        for p in &products {
            doc.insert_product(p).unwrap();
        }
        let mut projection = SqliteProjection::open_in_memory().unwrap();
        projection.project_full(&doc).unwrap();
        (doc, projection, products)
    }

    fn names(products: &[Product]) -> Vec<&str> {
        products.iter().map(|p| p.name.as_str()).collect()
    }

    #[test]
    fn test_project_full_and_get() {
        let (_, projection, products) = seeded();

        assert_eq!(projection.count(Collection::Products).unwrap(), 3);
        let loaded = projection.get_product(&products[0].id).unwrap().unwrap();
        assert_eq!(loaded.name, "Candle");
        assert_eq!(loaded.stock_quantity, 3);
        assert!(projection.get_product(&Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_sorted_queries() {
        let (_, projection, _) = seeded();

        let query = CollectionQuery::new(Collection::Products).order_by("name", SortDirection::Asc);
        assert_eq!(
            names(&projection.query_products(&query).unwrap()),
            vec!["Apron", "Bowl", "Candle"]
        );

        let query = CollectionQuery::new(Collection::Products)
            .order_by("price", SortDirection::Desc)
            .limit(2);
        assert_eq!(
            names(&projection.query_products(&query).unwrap()),
            vec!["Apron", "Candle"]
        );
    }

    #[test]
    fn test_sales_by_date_desc() {
        let (mut doc, mut projection, products) = seeded();
        let old = sale(&products[0], 1, 5);
        let new = sale(&products[1], 2, 0);
        doc.insert_sale(&old).unwrap();
        doc.insert_sale(&new).unwrap();
        projection.project_full(&doc).unwrap();

        let query =
            CollectionQuery::new(Collection::Sales).order_by("saleDate", SortDirection::Desc);
        let sales = projection.query_sales(&query).unwrap();
        assert_eq!(sales.len(), 2);
        assert_eq!(sales[0].id, new.id);
        assert_eq!(sales[1].id, old.id);
    }

    #[test]
    fn test_unknown_sort_field_is_rejected() {
        let (_, projection, _) = seeded();
        let query = CollectionQuery::new(Collection::Products)
            .order_by("name; DROP TABLE products", SortDirection::Asc);
        assert!(projection.query_products(&query).is_err());
        assert_eq!(projection.count(Collection::Products).unwrap(), 3);
    }

    #[test]
    fn test_reprojection_reflects_deletes() {
        let (mut doc, mut projection, products) = seeded();
        doc.delete_product(products[1].id).unwrap();
        projection.project_full(&doc).unwrap();

        assert_eq!(projection.count(Collection::Products).unwrap(), 2);
        assert!(projection.get_product(&products[1].id).unwrap().is_none());
    }

    #[test]
    fn test_ids_with_prefix() {
        let (_, projection, products) = seeded();
        let id = products[2].id;
        let prefix = &id.to_string()[..8];

        let found = projection
            .ids_with_prefix(Collection::Products, prefix)
            .unwrap();
        assert!(found.contains(&id));
        assert!(projection
            .ids_with_prefix(Collection::Sales, prefix)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_prefix_is_not_a_pattern() {
        let (_, projection, _) = seeded();

        for prefix in ["________", "%", "_"] {
            assert!(projection
                .ids_with_prefix(Collection::Products, prefix)
                .unwrap()
                .is_empty());
        }
    }

    #[test]
    fn test_out_of_range_timestamp_is_an_error() {
        let (_, projection, products) = seeded();
        let id = Uuid::new_v4();
        projection
            .connection()
            .execute(
                "INSERT INTO sales (id, product_id, product_name, quantity, total, sale_date) \
                 VALUES (?1, ?2, 'Candle', 1, 12.0, ?3)",
                params![id.to_string(), products[0].id.to_string(), i64::MAX],
            )
            .unwrap();

        assert!(projection.get_sale(&id).is_err());
    }

    #[test]
    fn test_purchases_roundtrip() {
        let (mut doc, mut projection, products) = seeded();
        let purchase = Purchase {
            id: Uuid::new_v4(),
            product_id: products[0].id,
            product_name: products[0].name.clone(),
            quantity: 4,
            cost: 5.0,
            total_cost: 20.0,
            purchase_date: Utc::now(),
        };
        doc.insert_purchase(&purchase).unwrap();
        projection.project_full(&doc).unwrap();

        let loaded = projection.get_purchase(&purchase.id).unwrap().unwrap();
        assert_eq!(loaded.total_cost, 20.0);
        assert_eq!(
            loaded.purchase_date.timestamp_millis(),
            purchase.purchase_date.timestamp_millis()
        );
    }
}
