//! Unified storage interface
//!
//! The `Store` owns one namespace and coordinates:
//! - Automerge (source of truth)
//! - SQLite (read-optimized queries)
//! - live query subscribers
//!
//! Every mutation runs as a single document transaction. Once it commits,
//! the document is saved, the projection rebuilt, and every live query
//! receives its fresh result.
//!
//! ## Usage
//!
//! ```ignore
//! let mut store = Store::open_with_config(Config::load()?, user_id)?;
//!
//! let product = store.add_product(ProductInput::new("Mug", "Kitchen"))?;
//! store.record_purchase(PurchaseInput::new(product.id, 10, 3.5))?;
//! store.record_sale(SaleInput::new(product.id, 2))?;
//!
//! let recent = store.watch_collection::<Sale>(
//!     CollectionQuery::new(Collection::Sales).order_by("saleDate", SortDirection::Desc).limit(10),
//! )?;
//! ```

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::Config;
use crate::document::InventoryDocument;
use crate::error::{InventoryError, InventoryResult};
use crate::live::{
    subscribe_collection, subscribe_document, CollectionQuery, LiveDocument, LiveQuery, Record,
    Subscriber,
};
use crate::models::{
    Collection, Product, ProductInput, Purchase, PurchaseInput, Sale, SaleInput,
};
use crate::storage::{AutomergePersistence, SqliteProjection};
use crate::sync::{SyncClient, SyncState};
use crate::user_id::UserId;

/// Storage for one namespace
pub struct Store {
    doc: InventoryDocument,
    persistence: AutomergePersistence,
    projection: SqliteProjection,
    config: Config,
    subscribers: Vec<Box<dyn Subscriber>>,
}

impl Store {
    /// Open a namespace with a specific configuration
    ///
    /// Loads the document (or creates it) and rebuilds the projection so
    /// SQLite always starts consistent with Automerge.
    pub fn open_with_config(config: Config, user_id: UserId) -> Result<Self> {
        let persistence = AutomergePersistence::new(config.clone(), user_id);
        let mut projection = SqliteProjection::open(&config, &user_id)
            .context("Failed to open SQLite database")?;

        let doc = persistence
            .load_or_create()
            .context("Failed to load or create inventory document")?;

        projection
            .project_full(&doc)
            .context("Failed to project document to SQLite")?;

        debug!("Opened store for {}", user_id.namespace());
        Ok(Self {
            doc,
            persistence,
            projection,
            config,
            subscribers: Vec::new(),
        })
    }

    pub fn user_id(&self) -> &UserId {
        self.doc.user_id()
    }

    /// Automerge URL of the namespace document
    pub fn url(&self) -> String {
        self.doc.url()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // ==================== Product Operations ====================

    pub fn add_product(&mut self, input: ProductInput) -> InventoryResult<Product> {
        input.validate()?;
        let product = Product::from_input(input, Utc::now());

        self.doc
            .transact("Add product", |doc| doc.insert_product(&product))?;
        info!("Added product {} ({})", product.name, product.id);

        self.after_commit()?;
        Ok(product)
    }

    /// Overwrite a product's fields, stock included
    pub fn update_product(&mut self, id: Uuid, input: ProductInput) -> InventoryResult<Product> {
        input.validate()?;
        let now = Utc::now();

        let product = self.doc.transact("Update product", |doc| -> InventoryResult<Product> {
            let mut product = doc
                .get_product(id)?
                .ok_or(InventoryError::ProductNotFound(id))?;
            product.apply_input(input, now);
            doc.update_product(&product)?;
            Ok(product)
        })?;
        info!("Updated product {} ({})", product.name, product.id);

        self.after_commit()?;
        Ok(product)
    }

    /// Remove a product
    ///
    /// Its sales and purchases are kept. Deleting a missing id does nothing.
    pub fn delete_product(&mut self, id: Uuid) -> InventoryResult<()> {
        let existed = self
            .doc
            .transact("Delete product", |doc| doc.delete_product(id))?;

        if existed {
            info!("Deleted product {}", id);
            self.after_commit()?;
        } else {
            debug!("Delete of missing product {} ignored", id);
        }
        Ok(())
    }

    // ==================== Stock Transactions ====================

    /// Sell from stock
    ///
    /// Fails without writing anything if the product is missing or has
    /// fewer units than requested.
    pub fn record_sale(&mut self, input: SaleInput) -> InventoryResult<Sale> {
        input.validate()?;
        let now = Utc::now();

        let sale = self.doc.transact("Record sale", |doc| -> InventoryResult<Sale> {
            let product = doc
                .get_product(input.product_id)?
                .ok_or(InventoryError::ProductNotFound(input.product_id))?;

            if input.quantity > product.stock_quantity {
                return Err(InventoryError::InsufficientStock {
                    available: product.stock_quantity,
                    requested: input.quantity,
                });
            }

            doc.adjust_stock(product.id, -input.quantity, now)?;
            let sale = Sale {
                id: Uuid::new_v4(),
                product_id: product.id,
                product_name: product.name.clone(),
                quantity: input.quantity,
                total: product.price * input.quantity as f64,
                sale_date: now,
            };
            doc.insert_sale(&sale)?;
            Ok(sale)
        })?;
        info!(
            "Recorded sale of {} x {} for {:.2}",
            sale.quantity, sale.product_name, sale.total
        );

        self.after_commit()?;
        Ok(sale)
    }

    /// Receive stock
    pub fn record_purchase(&mut self, input: PurchaseInput) -> InventoryResult<Purchase> {
        input.validate()?;
        let now = Utc::now();

        let purchase = self.doc.transact("Record purchase", |doc| -> InventoryResult<Purchase> {
            let product = doc
                .get_product(input.product_id)?
                .ok_or(InventoryError::ProductNotFound(input.product_id))?;

            doc.adjust_stock(product.id, input.quantity, now)?;
            let purchase = Purchase {
                id: Uuid::new_v4(),
                product_id: product.id,
                product_name: product.name.clone(),
                quantity: input.quantity,
                cost: input.cost,
                total_cost: input.cost * input.quantity as f64,
                purchase_date: now,
            };
            doc.insert_purchase(&purchase)?;
            Ok(purchase)
        })?;
        info!(
            "Recorded purchase of {} x {} for {:.2}",
            purchase.quantity, purchase.product_name, purchase.total_cost
        );

        self.after_commit()?;
        Ok(purchase)
    }

    /// Delete a sale and put its units back in stock
    ///
    /// Stock is only restored if the product still exists. Returns the
    /// deleted sale, or `None` if there was no such sale.
    pub fn delete_sale(&mut self, id: Uuid) -> InventoryResult<Option<Sale>> {
        let now = Utc::now();

        let deleted = self.doc.transact("Delete sale", |doc| -> InventoryResult<Option<Sale>> {
            let Some(sale) = doc.get_sale(id)? else {
                return Ok(None);
            };
            if doc.adjust_stock(sale.product_id, sale.quantity, now)?.is_none() {
                debug!(
                    "Product {} of sale {} is gone, stock not restored",
                    sale.product_id, sale.id
                );
            }
            doc.delete_sale(sale.id)?;
            Ok(Some(sale))
        })?;

        if let Some(sale) = &deleted {
            info!("Deleted sale {}", sale.id);
            self.after_commit()?;
        }
        Ok(deleted)
    }

    /// Delete a purchase and take its units back out of stock
    ///
    /// There is no floor: stock can go negative if the units were already
    /// sold.
    pub fn delete_purchase(&mut self, id: Uuid) -> InventoryResult<Option<Purchase>> {
        let now = Utc::now();

        let deleted = self.doc.transact("Delete purchase", |doc| -> InventoryResult<Option<Purchase>> {
            let Some(purchase) = doc.get_purchase(id)? else {
                return Ok(None);
            };
            if doc
                .adjust_stock(purchase.product_id, purchase.quantity.saturating_neg(), now)?
                .is_none()
            {
                debug!(
                    "Product {} of purchase {} is gone, stock not adjusted",
                    purchase.product_id, purchase.id
                );
            }
            doc.delete_purchase(purchase.id)?;
            Ok(Some(purchase))
        })?;

        if let Some(purchase) = &deleted {
            info!("Deleted purchase {}", purchase.id);
            self.after_commit()?;
        }
        Ok(deleted)
    }

    // ==================== Queries ====================

    pub fn get_product(&self, id: Uuid) -> InventoryResult<Option<Product>> {
        Ok(self
            .projection
            .get_product(&id)
            .context("Failed to get product")?)
    }

    pub fn get_sale(&self, id: Uuid) -> InventoryResult<Option<Sale>> {
        Ok(self.projection.get_sale(&id).context("Failed to get sale")?)
    }

    pub fn get_purchase(&self, id: Uuid) -> InventoryResult<Option<Purchase>> {
        Ok(self
            .projection
            .get_purchase(&id)
            .context("Failed to get purchase")?)
    }

    pub fn products(&self, query: &CollectionQuery) -> InventoryResult<Vec<Product>> {
        self.query::<Product>(query)
    }

    pub fn sales(&self, query: &CollectionQuery) -> InventoryResult<Vec<Sale>> {
        self.query::<Sale>(query)
    }

    pub fn purchases(&self, query: &CollectionQuery) -> InventoryResult<Vec<Purchase>> {
        self.query::<Purchase>(query)
    }

    /// Ids in a collection that start with `prefix`
    pub fn ids_with_prefix(&self, collection: Collection, prefix: &str) -> Result<Vec<Uuid>> {
        self.projection
            .ids_with_prefix(collection, prefix)
            .with_context(|| format!("Failed to look up {} ids", collection))
    }

    pub fn count(&self, collection: Collection) -> Result<i64> {
        self.projection
            .count(collection)
            .with_context(|| format!("Failed to count {}", collection))
    }

    fn query<T: Record>(&self, query: &CollectionQuery) -> InventoryResult<Vec<T>> {
        check_collection::<T>(query)?;
        query.validate()?;
        Ok(T::query(&self.projection, query)
            .with_context(|| format!("Failed to query {}", query.collection))?)
    }

    // ==================== Live Queries ====================

    /// Subscribe to a collection
    ///
    /// The handle starts from cached data (or empty and loading) and has
    /// a fresh result waiting; every later commit pushes again.
    pub fn watch_collection<T: Record>(
        &mut self,
        query: CollectionQuery,
    ) -> InventoryResult<LiveQuery<T>> {
        check_collection::<T>(&query)?;
        query.validate()?;

        let path = self.user_id().collection_path(T::COLLECTION);
        let (subscriber, live) = subscribe_collection::<T>(path, query);
        subscriber.refresh(&self.projection);
        self.subscribers.push(subscriber);
        Ok(live)
    }

    /// Subscribe to one record
    pub fn watch_document<T: Record>(&mut self, id: Uuid) -> LiveDocument<T> {
        let path = self.user_id().document_path(T::COLLECTION, &id);
        let (subscriber, live) = subscribe_document::<T>(path, id);
        subscriber.refresh(&self.projection);
        self.subscribers.push(subscriber);
        live
    }

    /// Number of live queries still attached
    pub fn subscriber_count(&mut self) -> usize {
        self.subscribers.retain(|s| !s.is_closed());
        self.subscribers.len()
    }

    // ==================== Sync ====================

    /// Build a sync client from configuration, if sync is enabled
    pub fn sync_client(&self) -> Result<Option<SyncClient>> {
        let url = match (&self.config.sync_url, self.config.sync_enabled) {
            (Some(url), true) => url,
            _ => return Ok(None),
        };
        let state = SyncState::with_path(self.config.sync_state_path(self.user_id()))
            .context("Failed to load sync state")?;
        Ok(Some(SyncClient::new(url, *self.user_id()).with_sync_state(state)))
    }

    /// Sync once; on incoming changes save, re-project and notify
    pub async fn sync_with(&mut self, client: &SyncClient) -> Result<bool> {
        let updated = client.sync_once(&mut self.doc).await?;
        if updated {
            self.after_commit()?;
        }
        Ok(updated)
    }

    // ==================== Advanced ====================

    /// The underlying document (for sync)
    pub fn document(&self) -> &InventoryDocument {
        &self.doc
    }

    /// Merge another replica of this namespace and notify subscribers
    pub fn merge(&mut self, other: &mut InventoryDocument) -> Result<()> {
        self.doc
            .merge(other)
            .context("Failed to merge document")?;
        self.after_commit()
    }

    /// Merge whatever another process saved for this namespace
    ///
    /// Returns whether it brought anything new; subscribers are only
    /// notified in that case.
    pub fn reload(&mut self) -> Result<bool> {
        let Some(mut saved) = self.persistence.load()? else {
            return Ok(false);
        };
        let before = self.doc.inner_mut().get_heads();
        self.doc
            .merge(&mut saved)
            .context("Failed to merge saved document")?;
        if self.doc.inner_mut().get_heads() == before {
            return Ok(false);
        }
        debug!("Reloaded changes for {}", self.user_id().namespace());
        self.after_commit()?;
        Ok(true)
    }

    fn after_commit(&mut self) -> Result<()> {
        self.persistence
            .save(&mut self.doc)
            .context("Failed to save document")?;
        self.projection
            .project_full(&self.doc)
            .context("Failed to project to SQLite")?;
        self.publish();
        Ok(())
    }

    fn publish(&mut self) {
        self.subscribers.retain(|s| !s.is_closed());
        for subscriber in &self.subscribers {
            subscriber.refresh(&self.projection);
        }
    }
}

fn check_collection<T: Record>(query: &CollectionQuery) -> InventoryResult<()> {
    if query.collection != T::COLLECTION {
        return Err(InventoryError::InvalidQuery(format!(
            "query on {} cannot return {}",
            query.collection,
            T::COLLECTION
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentError;
    use crate::live::SortDirection;
    use tempfile::TempDir;

    fn test_config(temp_dir: &TempDir) -> Config {
        Config {
            data_dir: temp_dir.path().to_path_buf(),
            ..Config::default()
        }
    }

    fn open(temp_dir: &TempDir) -> Store {
        Store::open_with_config(test_config(temp_dir), UserId::new()).unwrap()
    }

    fn stocked(store: &mut Store, name: &str, stock: i64, reorder_point: i64) -> Product {
        let input = ProductInput {
            price: 10.0,
            cost: 4.0,
            stock_quantity: stock,
            reorder_point,
            ..ProductInput::new(name, "General")
        };
        store.add_product(input).unwrap()
    }

    fn stock_of(store: &Store, id: Uuid) -> i64 {
        store.get_product(id).unwrap().unwrap().stock_quantity
    }

    #[test]
    fn test_open_creates_namespace_files() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir);
        let user = UserId::new();

        let store = Store::open_with_config(config.clone(), user).unwrap();
        assert!(store.url().starts_with("automerge:"));
        assert!(config.document_path(&user).exists());
        assert!(config.sqlite_path(&user).exists());
    }

    #[test]
    fn test_data_persists_across_reopens() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir);
        let user = UserId::new();

        let product_id = {
            let mut store = Store::open_with_config(config.clone(), user).unwrap();
            let p = stocked(&mut store, "Mug", 5, 1);
            store.record_sale(SaleInput::new(p.id, 2)).unwrap();
            p.id
        };

        let store = Store::open_with_config(config, user).unwrap();
        assert_eq!(stock_of(&store, product_id), 3);
        assert_eq!(store.count(Collection::Sales).unwrap(), 1);
    }

    #[test]
    fn test_add_product_validates() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir);

        let err = store.add_product(ProductInput::new("", "General")).unwrap_err();
        match err {
            InventoryError::Validation(errors) => assert!(errors.has("name")),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(store.count(Collection::Products).unwrap(), 0);
    }

    #[test]
    fn test_update_product() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir);
        let p = stocked(&mut store, "Mug", 5, 1);

        let mut input = p.to_input();
        input.name = "Big Mug".to_string();
        input.stock_quantity = 12;
        let updated = store.update_product(p.id, input).unwrap();

        assert_eq!(
            updated.created_at.timestamp_millis(),
            p.created_at.timestamp_millis()
        );
        assert!(updated.updated_at >= p.updated_at);
        let loaded = store.get_product(p.id).unwrap().unwrap();
        assert_eq!(loaded.name, "Big Mug");
        assert_eq!(loaded.stock_quantity, 12);

        assert!(matches!(
            store.update_product(Uuid::new_v4(), p.to_input()),
            Err(InventoryError::ProductNotFound(_))
        ));
    }

    #[test]
    fn test_delete_product_keeps_history() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir);
        let p = stocked(&mut store, "Mug", 5, 1);
        store.record_sale(SaleInput::new(p.id, 1)).unwrap();

        store.delete_product(p.id).unwrap();
        store.delete_product(p.id).unwrap();

        assert!(store.get_product(p.id).unwrap().is_none());
        assert_eq!(store.count(Collection::Sales).unwrap(), 1);
    }

    #[test]
    fn test_sale_then_purchase_scenario() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir);
        let p = stocked(&mut store, "Lantern", 10, 5);

        let sale = store.record_sale(SaleInput::new(p.id, 6)).unwrap();
        assert_eq!(sale.total, 60.0);
        assert_eq!(sale.product_name, "Lantern");
        let product = store.get_product(p.id).unwrap().unwrap();
        assert_eq!(product.stock_quantity, 4);
        assert!(product.is_low_stock());

        let purchase = store
            .record_purchase(PurchaseInput::new(p.id, 3, 4.5))
            .unwrap();
        assert_eq!(purchase.total_cost, 13.5);
        let product = store.get_product(p.id).unwrap().unwrap();
        assert_eq!(product.stock_quantity, 7);
        assert!(!product.is_low_stock());
    }

    #[test]
    fn test_oversell_is_rejected_without_writes() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir);
        let p = stocked(&mut store, "Lantern", 10, 5);

        let err = store.record_sale(SaleInput::new(p.id, 11)).unwrap_err();
        assert!(err.to_string().contains("insufficient stock"));
        assert!(matches!(
            err,
            InventoryError::InsufficientStock {
                available: 10,
                requested: 11
            }
        ));

        assert_eq!(stock_of(&store, p.id), 10);
        assert_eq!(store.count(Collection::Sales).unwrap(), 0);
        assert!(store.document().all_sales().unwrap().is_empty());
    }

    #[test]
    fn test_selling_exact_stock_is_allowed() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir);
        let p = stocked(&mut store, "Lantern", 3, 0);

        store.record_sale(SaleInput::new(p.id, 3)).unwrap();
        assert_eq!(stock_of(&store, p.id), 0);
    }

    #[test]
    fn test_unknown_product() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir);
        let missing = Uuid::new_v4();

        let err = store.record_sale(SaleInput::new(missing, 1)).unwrap_err();
        assert!(err.to_string().contains("product not found"));
        assert!(matches!(
            store.record_purchase(PurchaseInput::new(missing, 1, 1.0)),
            Err(InventoryError::ProductNotFound(id)) if id == missing
        ));
    }

    #[test]
    fn test_invalid_quantities() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir);
        let p = stocked(&mut store, "Lantern", 3, 0);

        assert!(matches!(
            store.record_sale(SaleInput::new(p.id, 0)),
            Err(InventoryError::Validation(_))
        ));
        assert!(matches!(
            store.record_purchase(PurchaseInput::new(p.id, 2, -1.0)),
            Err(InventoryError::Validation(_))
        ));
        assert_eq!(stock_of(&store, p.id), 3);
    }

    #[test]
    fn test_delete_sale_restores_stock() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir);
        let p = stocked(&mut store, "Lantern", 10, 0);
        let sale = store.record_sale(SaleInput::new(p.id, 4)).unwrap();

        let deleted = store.delete_sale(sale.id).unwrap().unwrap();
        assert_eq!(deleted.id, sale.id);
        assert_eq!(stock_of(&store, p.id), 10);
        assert!(store.get_sale(sale.id).unwrap().is_none());

        assert!(store.delete_sale(sale.id).unwrap().is_none());
        assert_eq!(stock_of(&store, p.id), 10);
    }

    #[test]
    fn test_delete_sale_of_deleted_product() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir);
        let p = stocked(&mut store, "Lantern", 10, 0);
        let sale = store.record_sale(SaleInput::new(p.id, 4)).unwrap();
        store.delete_product(p.id).unwrap();

        assert!(store.delete_sale(sale.id).unwrap().is_some());
        assert!(store.get_product(p.id).unwrap().is_none());
        assert_eq!(store.count(Collection::Sales).unwrap(), 0);
    }

    #[test]
    fn test_delete_purchase_of_deleted_product() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir);
        let p = stocked(&mut store, "Lantern", 10, 0);
        let purchase = store
            .record_purchase(PurchaseInput::new(p.id, 3, 2.0))
            .unwrap();
        store.delete_product(p.id).unwrap();

        let deleted = store.delete_purchase(purchase.id).unwrap();
        assert_eq!(deleted.map(|d| d.id), Some(purchase.id));
        assert!(store.get_product(p.id).unwrap().is_none());
        assert_eq!(store.count(Collection::Products).unwrap(), 0);
        assert_eq!(store.count(Collection::Purchases).unwrap(), 0);
    }

    #[test]
    fn test_huge_sale_on_negative_stock_is_insufficient() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir);
        let p = stocked(&mut store, "Lantern", 0, 0);
        let purchase = store
            .record_purchase(PurchaseInput::new(p.id, 5, 2.0))
            .unwrap();
        store.record_sale(SaleInput::new(p.id, 4)).unwrap();
        store.delete_purchase(purchase.id).unwrap();
        assert_eq!(stock_of(&store, p.id), -4);

        let err = store
            .record_sale(SaleInput::new(p.id, i64::MAX))
            .unwrap_err();
        assert!(matches!(
            err,
            InventoryError::InsufficientStock {
                available: -4,
                requested: i64::MAX
            }
        ));
        assert_eq!(stock_of(&store, p.id), -4);
        assert_eq!(store.count(Collection::Sales).unwrap(), 1);
    }

    #[test]
    fn test_purchase_overflowing_stock_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir);
        let p = stocked(&mut store, "Lantern", 10, 0);

        let err = store
            .record_purchase(PurchaseInput::new(p.id, i64::MAX, 1.0))
            .unwrap_err();
        assert!(matches!(
            err,
            InventoryError::Document(DocumentError::StockOutOfRange { stock: 10, .. })
        ));
        assert!(err.is_user_error());
        assert_eq!(stock_of(&store, p.id), 10);
        assert_eq!(store.count(Collection::Purchases).unwrap(), 0);

        store.record_sale(SaleInput::new(p.id, 3)).unwrap();
        assert_eq!(stock_of(&store, p.id), 7);
    }

    #[test]
    fn test_delete_purchase_can_go_negative() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir);
        let p = stocked(&mut store, "Lantern", 0, 0);
        let purchase = store
            .record_purchase(PurchaseInput::new(p.id, 5, 2.0))
            .unwrap();
        store.record_sale(SaleInput::new(p.id, 4)).unwrap();

        store.delete_purchase(purchase.id).unwrap();
        assert_eq!(stock_of(&store, p.id), -4);
    }

    #[test]
    fn test_stock_matches_history() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir);
        let p = stocked(&mut store, "Lantern", 20, 0);

        let s1 = store.record_sale(SaleInput::new(p.id, 3)).unwrap();
        store.record_sale(SaleInput::new(p.id, 5)).unwrap();
        store.record_purchase(PurchaseInput::new(p.id, 7, 1.0)).unwrap();
        let p2 = store.record_purchase(PurchaseInput::new(p.id, 2, 1.0)).unwrap();
        store.delete_sale(s1.id).unwrap();
        store.delete_purchase(p2.id).unwrap();

        let all = CollectionQuery::new(Collection::Sales);
        let sold: i64 = store.sales(&all).unwrap().iter().map(|s| s.quantity).sum();
        let all = CollectionQuery::new(Collection::Purchases);
        let bought: i64 = store.purchases(&all).unwrap().iter().map(|p| p.quantity).sum();

        assert_eq!(stock_of(&store, p.id), 20 + bought - sold);
    }

    #[test]
    fn test_query_rejects_mismatched_collection() {
        let temp_dir = TempDir::new().unwrap();
        let store = open(&temp_dir);
        let query = CollectionQuery::new(Collection::Sales);
        assert!(matches!(
            store.products(&query),
            Err(InventoryError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_live_query_receives_commits() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir);
        let p = stocked(&mut store, "Lantern", 10, 0);

        let mut recent = store
            .watch_collection::<Sale>(
                CollectionQuery::new(Collection::Sales)
                    .order_by("saleDate", SortDirection::Desc)
                    .limit(10),
            )
            .unwrap();
        assert!(recent.try_update());
        assert!(recent.data().is_empty());
        assert!(!recent.is_loading());

        let sale = store.record_sale(SaleInput::new(p.id, 2)).unwrap();
        assert!(recent.try_update());
        assert_eq!(recent.data().len(), 1);
        assert_eq!(recent.data()[0].id, sale.id);
    }

    #[test]
    fn test_second_subscription_seeded_from_cache() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir);
        stocked(&mut store, "Lantern", 10, 0);

        let mut first = store
            .watch_collection::<Product>(CollectionQuery::new(Collection::Products))
            .unwrap();
        first.try_update();

        let second = store
            .watch_collection::<Product>(CollectionQuery::new(Collection::Products))
            .unwrap();
        assert!(!second.is_loading());
        assert_eq!(second.data().len(), 1);
    }

    #[test]
    fn test_watch_document_sees_stock_and_delete() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir);
        let p = stocked(&mut store, "Lantern", 10, 0);

        let mut live = store.watch_document::<Product>(p.id);
        live.try_update();
        assert_eq!(live.data().as_ref().unwrap().stock_quantity, 10);

        store.record_sale(SaleInput::new(p.id, 1)).unwrap();
        live.try_update();
        assert_eq!(live.data().as_ref().unwrap().stock_quantity, 9);

        store.delete_product(p.id).unwrap();
        live.try_update();
        assert!(live.data().is_none());
    }

    #[test]
    fn test_dropped_subscriptions_are_pruned() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir);

        let live = store
            .watch_collection::<Product>(CollectionQuery::new(Collection::Products))
            .unwrap();
        assert_eq!(store.subscriber_count(), 1);
        drop(live);
        assert_eq!(store.subscriber_count(), 0);
    }

    #[test]
    fn test_invalid_watch_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir);

        let result = store.watch_collection::<Sale>(
            CollectionQuery::new(Collection::Sales).order_by("stockQuantity", SortDirection::Asc),
        );
        assert!(matches!(result, Err(InventoryError::InvalidQuery(_))));
        assert_eq!(store.subscriber_count(), 0);
    }

    #[test]
    fn test_merge_from_other_device_notifies() {
        let temp_dir = TempDir::new().unwrap();
        let user = UserId::new();
        let config = test_config(&temp_dir);
        let mut store = Store::open_with_config(config.clone(), user).unwrap();
        let p = stocked(&mut store, "Lantern", 10, 0);

        let bytes = std::fs::read(config.document_path(&user)).unwrap();
        let mut other = InventoryDocument::load(&bytes).unwrap().fork();
        other.adjust_stock(p.id, -3, Utc::now()).unwrap();

        let mut live = store.watch_document::<Product>(p.id);
        live.try_update();
        store.record_sale(SaleInput::new(p.id, 2)).unwrap();
        store.merge(&mut other).unwrap();

        live.try_update();
        assert_eq!(live.data().as_ref().unwrap().stock_quantity, 5);
    }

    #[test]
    fn test_reload_picks_up_other_process() {
        let temp_dir = TempDir::new().unwrap();
        let user = UserId::new();
        let config = test_config(&temp_dir);
        let mut watcher = Store::open_with_config(config.clone(), user).unwrap();
        let p = stocked(&mut watcher, "Lantern", 10, 0);
        assert!(!watcher.reload().unwrap());

        let mut writer = Store::open_with_config(config, user).unwrap();
        writer.record_sale(SaleInput::new(p.id, 4)).unwrap();
        drop(writer);

        let mut live = watcher.watch_document::<Product>(p.id);
        live.try_update();
        assert!(watcher.reload().unwrap());
        live.try_update();
        assert_eq!(live.data().as_ref().unwrap().stock_quantity, 6);
        assert_eq!(watcher.count(Collection::Sales).unwrap(), 1);
    }

    #[test]
    fn test_sync_client_requires_config() {
        let temp_dir = TempDir::new().unwrap();
        let store = open(&temp_dir);
        assert!(store.sync_client().unwrap().is_none());

        let config = Config {
            sync_url: Some("ws://localhost:3030".to_string()),
            sync_enabled: true,
            ..test_config(&temp_dir)
        };
        let store = Store::open_with_config(config, UserId::new()).unwrap();
        let client = store.sync_client().unwrap().unwrap();
        assert_eq!(client.user_id(), store.user_id());
    }
}
