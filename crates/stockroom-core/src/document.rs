//! Automerge document handling
//!
//! One document holds a whole namespace: three maps (`products`, `sales`,
//! `purchases`) keyed by record id, each record a flat map of fields.
//! Field names match the camelCase names used everywhere else.
//!
//! `stockQuantity` is an Automerge counter so that stock adjustments made
//! on different replicas add up when merged.

use automerge::transaction::{CommitOptions, Transactable};
use automerge::{ActorId, AutoCommit, ObjId, ObjType, ReadDoc, ScalarValue, ROOT};
use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Collection, Product, Purchase, Sale};
use crate::user_id::UserId;

/// Errors that can occur during document operations
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Automerge error: {0}")]
    Automerge(#[from] automerge::AutomergeError),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid field type for {0}")]
    InvalidType(String),

    #[error("Invalid UUID: {0}")]
    InvalidUuid(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(i64),

    #[error("stock of product {id} out of range: {stock} + {delta}")]
    StockOutOfRange { id: Uuid, stock: i64, delta: i64 },

    #[error("Document belongs to {found}, expected {expected}")]
    WrongNamespace { expected: UserId, found: UserId },
}

/// Keys used in the Automerge document structure
mod keys {
    pub const SCHEMA_VERSION: &str = "schemaVersion";
    pub const USER_ID: &str = "userId";

    pub const ID: &str = "id";
    pub const NAME: &str = "name";
    pub const CATEGORY: &str = "category";
    pub const SKU: &str = "sku";
    pub const PRICE: &str = "price";
    pub const COST: &str = "cost";
    pub const STOCK_QUANTITY: &str = "stockQuantity";
    pub const REORDER_POINT: &str = "reorderPoint";
    pub const IMAGE_URL: &str = "imageUrl";
    pub const IMAGE_HINT: &str = "imageHint";
    pub const CREATED_AT: &str = "createdAt";
    pub const UPDATED_AT: &str = "updatedAt";

    pub const PRODUCT_ID: &str = "productId";
    pub const PRODUCT_NAME: &str = "productName";
    pub const QUANTITY: &str = "quantity";
    pub const TOTAL: &str = "total";
    pub const TOTAL_COST: &str = "totalCost";
    pub const SALE_DATE: &str = "saleDate";
    pub const PURCHASE_DATE: &str = "purchaseDate";
}

/// Current schema version
pub const CURRENT_SCHEMA_VERSION: u64 = 1;

/// A namespace document backed by Automerge
pub struct InventoryDocument {
    user_id: UserId,
    doc: AutoCommit,
}

impl InventoryDocument {
    /// Create the document for a namespace
    ///
    /// The initial structure is written by an actor derived from the user
    /// id with a fixed timestamp, so every replica that creates the same
    /// namespace produces a byte-identical first change. Merging two such
    /// replicas therefore shares one set of collection maps instead of
    /// producing conflicting ones.
    pub fn new(user_id: UserId) -> Self {
        let genesis_actor = ActorId::from(user_id.as_uuid().as_bytes().to_vec());
        let mut doc = AutoCommit::new().with_actor(genesis_actor);

        doc.put(ROOT, keys::SCHEMA_VERSION, CURRENT_SCHEMA_VERSION)
            .expect("Failed to set schema version");
        doc.put(ROOT, keys::USER_ID, user_id.to_string())
            .expect("Failed to set user id");
        for collection in Collection::ALL {
            doc.put_object(ROOT, collection.name(), ObjType::Map)
                .expect("Failed to create collection map");
        }
        doc.commit_with(CommitOptions::default().with_message("init").with_time(0));

        doc.set_actor(ActorId::random());
        Self { user_id, doc }
    }

    /// Load a document from Automerge bytes
    pub fn load(bytes: &[u8]) -> Result<Self, DocumentError> {
        let doc = AutoCommit::load(bytes)?;

        let id_str = match doc.get(ROOT, keys::USER_ID)? {
            Some((value, _)) => value
                .to_str()
                .map(|s| s.to_string())
                .ok_or_else(|| DocumentError::InvalidType(keys::USER_ID.to_string()))?,
            None => return Err(DocumentError::MissingField(keys::USER_ID.to_string())),
        };
        let user_id = id_str
            .parse()
            .map_err(|_| DocumentError::InvalidUuid(id_str.clone()))?;

        Ok(Self { user_id, doc })
    }

    /// Load a document and check that it belongs to the expected namespace
    pub fn load_for(user_id: UserId, bytes: &[u8]) -> Result<Self, DocumentError> {
        let doc = Self::load(bytes)?;
        if doc.user_id != user_id {
            return Err(DocumentError::WrongNamespace {
                expected: user_id,
                found: doc.user_id,
            });
        }
        Ok(doc)
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Get the Automerge URL for this document
    pub fn url(&self) -> String {
        self.user_id.to_url()
    }

    /// Save the document to bytes
    pub fn save(&mut self) -> Vec<u8> {
        self.doc.save()
    }

    /// Fork the document (a replica with its own actor)
    pub fn fork(&mut self) -> Self {
        Self {
            user_id: self.user_id,
            doc: self.doc.fork(),
        }
    }

    /// Merge another replica into this one
    pub fn merge(&mut self, other: &mut InventoryDocument) -> Result<(), DocumentError> {
        self.doc.merge(&mut other.doc)?;
        Ok(())
    }

    /// Get the underlying Automerge document (for sync operations)
    pub fn inner(&self) -> &AutoCommit {
        &self.doc
    }

    /// Get the underlying Automerge document mutably
    pub fn inner_mut(&mut self) -> &mut AutoCommit {
        &mut self.doc
    }

    // ==================== Transactions ====================

    /// Run `f` as one atomic change
    ///
    /// Writes made by `f` are committed together under `message` if it
    /// returns `Ok`, and rolled back if it returns `Err`. Changes pending
    /// before the call are committed first so a rollback only discards
    /// what `f` wrote.
    pub fn transact<T, E, F>(&mut self, message: &str, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
    {
        self.doc.commit();

        match f(self) {
            Ok(value) => {
                self.doc.commit_with(
                    CommitOptions::default()
                        .with_message(message)
                        .with_time(Utc::now().timestamp()),
                );
                Ok(value)
            }
            Err(e) => {
                self.doc.rollback();
                Err(e)
            }
        }
    }

    // ==================== Products ====================

    /// Insert a new product
    pub fn insert_product(&mut self, product: &Product) -> Result<(), DocumentError> {
        let products = self.collection(Collection::Products)?;
        let obj = self
            .doc
            .put_object(&products, product.id.to_string(), ObjType::Map)?;

        self.write_product_fields(&obj, product)?;
        self.doc.put(
            &obj,
            keys::STOCK_QUANTITY,
            ScalarValue::counter(product.stock_quantity),
        )?;
        Ok(())
    }

    /// Overwrite an existing product
    ///
    /// Stock is moved to the new value with a counter increment.
    pub fn update_product(&mut self, product: &Product) -> Result<(), DocumentError> {
        let obj = self
            .record(Collection::Products, product.id)?
            .ok_or_else(|| DocumentError::MissingField(format!("product {}", product.id)))?;

        self.write_product_fields(&obj, product)?;
        let current = self.get_i64(&obj, keys::STOCK_QUANTITY)?;
        let delta = product.stock_quantity.checked_sub(current).ok_or(
            DocumentError::StockOutOfRange {
                id: product.id,
                stock: current,
                delta: product.stock_quantity,
            },
        )?;
        if delta != 0 {
            self.doc.increment(&obj, keys::STOCK_QUANTITY, delta)?;
        }
        Ok(())
    }

    /// Add `delta` to a product's stock and touch `updatedAt`
    ///
    /// Returns the new stock, or `None` if the product does not exist. A
    /// result outside the `i64` range is rejected before anything is
    /// written.
    pub fn adjust_stock(
        &mut self,
        id: Uuid,
        delta: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<i64>, DocumentError> {
        let Some(obj) = self.record(Collection::Products, id)? else {
            return Ok(None);
        };

        let stock = self.get_i64(&obj, keys::STOCK_QUANTITY)?;
        let updated = stock
            .checked_add(delta)
            .ok_or(DocumentError::StockOutOfRange { id, stock, delta })?;

        self.doc.increment(&obj, keys::STOCK_QUANTITY, delta)?;
        self.doc
            .put(&obj, keys::UPDATED_AT, now.timestamp_millis())?;
        Ok(Some(updated))
    }

    /// Delete a product; returns whether it existed
    pub fn delete_product(&mut self, id: Uuid) -> Result<bool, DocumentError> {
        self.delete_record(Collection::Products, id)
    }

    /// Get a product by ID
    pub fn get_product(&self, id: Uuid) -> Result<Option<Product>, DocumentError> {
        match self.record(Collection::Products, id)? {
            Some(obj) => Ok(Some(self.read_product(&obj, id)?)),
            None => Ok(None),
        }
    }

    /// Get all products
    pub fn all_products(&self) -> Result<Vec<Product>, DocumentError> {
        self.read_all(Collection::Products, |doc, obj, id| doc.read_product(obj, id))
    }

    // ==================== Sales ====================

    pub fn insert_sale(&mut self, sale: &Sale) -> Result<(), DocumentError> {
        let sales = self.collection(Collection::Sales)?;
        let obj = self
            .doc
            .put_object(&sales, sale.id.to_string(), ObjType::Map)?;

        self.doc.put(&obj, keys::ID, sale.id.to_string())?;
        self.doc
            .put(&obj, keys::PRODUCT_ID, sale.product_id.to_string())?;
        self.doc
            .put(&obj, keys::PRODUCT_NAME, sale.product_name.clone())?;
        self.doc.put(&obj, keys::QUANTITY, sale.quantity)?;
        self.doc.put(&obj, keys::TOTAL, sale.total)?;
        self.doc
            .put(&obj, keys::SALE_DATE, sale.sale_date.timestamp_millis())?;
        Ok(())
    }

    pub fn delete_sale(&mut self, id: Uuid) -> Result<bool, DocumentError> {
        self.delete_record(Collection::Sales, id)
    }

    pub fn get_sale(&self, id: Uuid) -> Result<Option<Sale>, DocumentError> {
        match self.record(Collection::Sales, id)? {
            Some(obj) => Ok(Some(self.read_sale(&obj, id)?)),
            None => Ok(None),
        }
    }

    pub fn all_sales(&self) -> Result<Vec<Sale>, DocumentError> {
        self.read_all(Collection::Sales, |doc, obj, id| doc.read_sale(obj, id))
    }

    // ==================== Purchases ====================

    pub fn insert_purchase(&mut self, purchase: &Purchase) -> Result<(), DocumentError> {
        let purchases = self.collection(Collection::Purchases)?;
        let obj = self
            .doc
            .put_object(&purchases, purchase.id.to_string(), ObjType::Map)?;

        self.doc.put(&obj, keys::ID, purchase.id.to_string())?;
        self.doc
            .put(&obj, keys::PRODUCT_ID, purchase.product_id.to_string())?;
        self.doc
            .put(&obj, keys::PRODUCT_NAME, purchase.product_name.clone())?;
        self.doc.put(&obj, keys::QUANTITY, purchase.quantity)?;
        self.doc.put(&obj, keys::COST, purchase.cost)?;
        self.doc.put(&obj, keys::TOTAL_COST, purchase.total_cost)?;
        self.doc.put(
            &obj,
            keys::PURCHASE_DATE,
            purchase.purchase_date.timestamp_millis(),
        )?;
        Ok(())
    }

    pub fn delete_purchase(&mut self, id: Uuid) -> Result<bool, DocumentError> {
        self.delete_record(Collection::Purchases, id)
    }

    pub fn get_purchase(&self, id: Uuid) -> Result<Option<Purchase>, DocumentError> {
        match self.record(Collection::Purchases, id)? {
            Some(obj) => Ok(Some(self.read_purchase(&obj, id)?)),
            None => Ok(None),
        }
    }

    pub fn all_purchases(&self) -> Result<Vec<Purchase>, DocumentError> {
        self.read_all(Collection::Purchases, |doc, obj, id| {
            doc.read_purchase(obj, id)
        })
    }

    // ==================== Private helpers ====================

    fn collection(&self, collection: Collection) -> Result<ObjId, DocumentError> {
        Ok(self
            .doc
            .get(ROOT, collection.name())?
            .ok_or_else(|| DocumentError::MissingField(collection.name().to_string()))?
            .1)
    }

    fn record(&self, collection: Collection, id: Uuid) -> Result<Option<ObjId>, DocumentError> {
        let map = self.collection(collection)?;
        Ok(self.doc.get(&map, id.to_string())?.map(|(_, obj)| obj))
    }

    fn delete_record(&mut self, collection: Collection, id: Uuid) -> Result<bool, DocumentError> {
        let map = self.collection(collection)?;
        if self.doc.get(&map, id.to_string())?.is_none() {
            return Ok(false);
        }
        self.doc.delete(&map, id.to_string())?;
        Ok(true)
    }

    fn read_all<T, F>(&self, collection: Collection, read: F) -> Result<Vec<T>, DocumentError>
    where
        F: Fn(&Self, &ObjId, Uuid) -> Result<T, DocumentError>,
    {
        let map = self.collection(collection)?;
        let mut records = Vec::new();
        for key in self.doc.keys(&map) {
            let id = Uuid::parse_str(&key).map_err(|_| DocumentError::InvalidUuid(key.clone()))?;
            if let Some((_, obj)) = self.doc.get(&map, &key)? {
                records.push(read(self, &obj, id)?);
            }
        }
        Ok(records)
    }

    fn write_product_fields(&mut self, obj: &ObjId, product: &Product) -> Result<(), DocumentError> {
        self.doc.put(obj, keys::ID, product.id.to_string())?;
        self.doc.put(obj, keys::NAME, product.name.clone())?;
        self.doc.put(obj, keys::CATEGORY, product.category.clone())?;
        self.doc.put(obj, keys::SKU, product.sku.clone())?;
        self.doc.put(obj, keys::PRICE, product.price)?;
        self.doc.put(obj, keys::COST, product.cost)?;
        self.doc
            .put(obj, keys::REORDER_POINT, product.reorder_point)?;
        self.doc.put(obj, keys::IMAGE_URL, product.image_url.clone())?;
        self.doc
            .put(obj, keys::IMAGE_HINT, product.image_hint.clone())?;
        self.doc
            .put(obj, keys::CREATED_AT, product.created_at.timestamp_millis())?;
        self.doc
            .put(obj, keys::UPDATED_AT, product.updated_at.timestamp_millis())?;
        Ok(())
    }

    fn read_product(&self, obj: &ObjId, id: Uuid) -> Result<Product, DocumentError> {
        Ok(Product {
            id,
            name: self.get_string(obj, keys::NAME)?,
            category: self.get_string(obj, keys::CATEGORY)?,
            sku: self.get_optional_string(obj, keys::SKU)?.unwrap_or_default(),
            price: self.get_f64(obj, keys::PRICE)?,
            cost: self.get_f64(obj, keys::COST)?,
            stock_quantity: self.get_i64(obj, keys::STOCK_QUANTITY)?,
            reorder_point: self.get_i64(obj, keys::REORDER_POINT)?,
            image_url: self
                .get_optional_string(obj, keys::IMAGE_URL)?
                .unwrap_or_default(),
            image_hint: self
                .get_optional_string(obj, keys::IMAGE_HINT)?
                .unwrap_or_default(),
            created_at: self.get_timestamp(obj, keys::CREATED_AT)?,
            updated_at: self.get_timestamp(obj, keys::UPDATED_AT)?,
        })
    }

    fn read_sale(&self, obj: &ObjId, id: Uuid) -> Result<Sale, DocumentError> {
        Ok(Sale {
            id,
            product_id: self.get_uuid(obj, keys::PRODUCT_ID)?,
            product_name: self.get_string(obj, keys::PRODUCT_NAME)?,
            quantity: self.get_i64(obj, keys::QUANTITY)?,
            total: self.get_f64(obj, keys::TOTAL)?,
            sale_date: self.get_timestamp(obj, keys::SALE_DATE)?,
        })
    }

    fn read_purchase(&self, obj: &ObjId, id: Uuid) -> Result<Purchase, DocumentError> {
        Ok(Purchase {
            id,
            product_id: self.get_uuid(obj, keys::PRODUCT_ID)?,
            product_name: self.get_string(obj, keys::PRODUCT_NAME)?,
            quantity: self.get_i64(obj, keys::QUANTITY)?,
            cost: self.get_f64(obj, keys::COST)?,
            total_cost: self.get_f64(obj, keys::TOTAL_COST)?,
            purchase_date: self.get_timestamp(obj, keys::PURCHASE_DATE)?,
        })
    }

    fn get_scalar(&self, obj: &ObjId, key: &str) -> Result<ScalarValue, DocumentError> {
        match self.doc.get(obj, key)? {
            Some((automerge::Value::Scalar(value), _)) => Ok(value.into_owned()),
            Some(_) => Err(DocumentError::InvalidType(key.to_string())),
            None => Err(DocumentError::MissingField(key.to_string())),
        }
    }

    fn get_string(&self, obj: &ObjId, key: &str) -> Result<String, DocumentError> {
        match self.get_scalar(obj, key)? {
            ScalarValue::Str(s) => Ok(s.to_string()),
            _ => Err(DocumentError::InvalidType(key.to_string())),
        }
    }

    fn get_optional_string(&self, obj: &ObjId, key: &str) -> Result<Option<String>, DocumentError> {
        match self.doc.get(obj, key)? {
            Some((value, _)) => Ok(value.to_str().map(|s| s.to_string())),
            None => Ok(None),
        }
    }

    fn get_uuid(&self, obj: &ObjId, key: &str) -> Result<Uuid, DocumentError> {
        let s = self.get_string(obj, key)?;
        Uuid::parse_str(&s).map_err(|_| DocumentError::InvalidUuid(s))
    }

    fn get_i64(&self, obj: &ObjId, key: &str) -> Result<i64, DocumentError> {
        match self.get_scalar(obj, key)? {
            ScalarValue::Int(n) => Ok(n),
            ScalarValue::Uint(n) => Ok(n as i64),
            ScalarValue::Counter(c) => Ok(i64::from(&c)),
            _ => Err(DocumentError::InvalidType(key.to_string())),
        }
    }

    fn get_f64(&self, obj: &ObjId, key: &str) -> Result<f64, DocumentError> {
        match self.get_scalar(obj, key)? {
            ScalarValue::F64(n) => Ok(n),
            // Whole amounts written by other clients may arrive as integers
            ScalarValue::Int(n) => Ok(n as f64),
            ScalarValue::Uint(n) => Ok(n as f64),
            _ => Err(DocumentError::InvalidType(key.to_string())),
        }
    }

    fn get_timestamp(&self, obj: &ObjId, key: &str) -> Result<DateTime<Utc>, DocumentError> {
        let millis = match self.get_scalar(obj, key)? {
            ScalarValue::Int(n) | ScalarValue::Timestamp(n) => n,
            _ => return Err(DocumentError::InvalidType(key.to_string())),
        };
        Utc.timestamp_millis_opt(millis)
            .single()
            .ok_or(DocumentError::InvalidTimestamp(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProductInput;

    fn product(stock: i64) -> Product {
        let input = ProductInput {
            price: 4.5,
            cost: 2.25,
            stock_quantity: stock,
            reorder_point: 2,
            ..ProductInput::new("Notebook", "Stationery")
        };
        Product::from_input(input, Utc::now())
    }

    fn sale_of(product: &Product, quantity: i64) -> Sale {
        Sale {
            id: Uuid::new_v4(),
            product_id: product.id,
            product_name: product.name.clone(),
            quantity,
            total: product.price * quantity as f64,
            sale_date: Utc::now(),
        }
    }

    #[test]
    fn test_new_document_is_empty() {
        let user = UserId::new();
        let doc = InventoryDocument::new(user);
        assert_eq!(*doc.user_id(), user);
        assert!(doc.all_products().unwrap().is_empty());
        assert!(doc.all_sales().unwrap().is_empty());
        assert!(doc.all_purchases().unwrap().is_empty());
    }

    #[test]
    fn test_product_roundtrip() {
        let mut doc = InventoryDocument::new(UserId::new());
        let mut p = product(10);
        p.sku = "NB-01".to_string();
        doc.insert_product(&p).unwrap();

        let loaded = doc.get_product(p.id).unwrap().unwrap();
        assert_eq!(loaded.name, "Notebook");
        assert_eq!(loaded.sku, "NB-01");
        assert_eq!(loaded.price, 4.5);
        assert_eq!(loaded.stock_quantity, 10);
        assert_eq!(
            loaded.created_at.timestamp_millis(),
            p.created_at.timestamp_millis()
        );
    }

    #[test]
    fn test_update_product_moves_counter() {
        let mut doc = InventoryDocument::new(UserId::new());
        let mut p = product(10);
        doc.insert_product(&p).unwrap();

        p.name = "Notebook A5".to_string();
        p.stock_quantity = 3;
        doc.update_product(&p).unwrap();

        let loaded = doc.get_product(p.id).unwrap().unwrap();
        assert_eq!(loaded.name, "Notebook A5");
        assert_eq!(loaded.stock_quantity, 3);
    }

    #[test]
    fn test_update_missing_product_fails() {
        let mut doc = InventoryDocument::new(UserId::new());
        assert!(doc.update_product(&product(1)).is_err());
    }

    #[test]
    fn test_adjust_stock() {
        let mut doc = InventoryDocument::new(UserId::new());
        let p = product(10);
        doc.insert_product(&p).unwrap();

        assert_eq!(doc.adjust_stock(p.id, -4, Utc::now()).unwrap(), Some(6));
        assert_eq!(doc.adjust_stock(p.id, 7, Utc::now()).unwrap(), Some(13));
        assert_eq!(doc.adjust_stock(Uuid::new_v4(), 1, Utc::now()).unwrap(), None);
    }

    #[test]
    fn test_adjust_stock_out_of_range() {
        let mut doc = InventoryDocument::new(UserId::new());
        let p = product(10);
        doc.insert_product(&p).unwrap();

        let err = doc.adjust_stock(p.id, i64::MAX, Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            DocumentError::StockOutOfRange { stock: 10, delta: i64::MAX, .. }
        ));
        assert_eq!(doc.get_product(p.id).unwrap().unwrap().stock_quantity, 10);
    }

    #[test]
    fn test_delete_records() {
        let mut doc = InventoryDocument::new(UserId::new());
        let p = product(5);
        let s = sale_of(&p, 1);
        doc.insert_product(&p).unwrap();
        doc.insert_sale(&s).unwrap();

        assert!(doc.delete_sale(s.id).unwrap());
        assert!(!doc.delete_sale(s.id).unwrap());
        assert!(doc.delete_product(p.id).unwrap());
        assert!(doc.get_product(p.id).unwrap().is_none());
    }

    #[test]
    fn test_sale_and_purchase_roundtrip() {
        let mut doc = InventoryDocument::new(UserId::new());
        let p = product(5);
        let s = sale_of(&p, 2);
        let purchase = Purchase {
            id: Uuid::new_v4(),
            product_id: p.id,
            product_name: p.name.clone(),
            quantity: 4,
            cost: 2.0,
            total_cost: 8.0,
            purchase_date: Utc::now(),
        };
        doc.insert_sale(&s).unwrap();
        doc.insert_purchase(&purchase).unwrap();

        let loaded = doc.get_sale(s.id).unwrap().unwrap();
        assert_eq!(loaded.product_id, p.id);
        assert_eq!(loaded.total, 9.0);

        let loaded = doc.get_purchase(purchase.id).unwrap().unwrap();
        assert_eq!(loaded.total_cost, 8.0);
        assert_eq!(doc.all_purchases().unwrap().len(), 1);
    }

    #[test]
    fn test_transact_commits_on_ok() {
        let mut doc = InventoryDocument::new(UserId::new());
        let p = product(5);

        let result: Result<(), DocumentError> =
            doc.transact("add product", |tx| tx.insert_product(&p));
        result.unwrap();

        assert!(doc.get_product(p.id).unwrap().is_some());
    }

    #[test]
    fn test_transact_rolls_back_on_err() {
        let mut doc = InventoryDocument::new(UserId::new());
        let p = product(5);
        doc.insert_product(&p).unwrap();

        let result: Result<(), String> = doc.transact("failing", |tx| {
            tx.adjust_stock(p.id, -3, Utc::now())
                .map_err(|e| e.to_string())?;
            tx.insert_sale(&sale_of(&p, 3)).map_err(|e| e.to_string())?;
            Err("abort".to_string())
        });

        assert!(result.is_err());
        assert_eq!(doc.get_product(p.id).unwrap().unwrap().stock_quantity, 5);
        assert!(doc.all_sales().unwrap().is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let user = UserId::new();
        let mut doc = InventoryDocument::new(user);
        let p = product(8);
        doc.insert_product(&p).unwrap();

        let bytes = doc.save();
        let loaded = InventoryDocument::load_for(user, &bytes).unwrap();
        assert_eq!(*loaded.user_id(), user);
        assert_eq!(loaded.all_products().unwrap().len(), 1);

        assert!(matches!(
            InventoryDocument::load_for(UserId::new(), &bytes),
            Err(DocumentError::WrongNamespace { .. })
        ));
    }

    #[test]
    fn test_concurrent_stock_changes_merge_additively() {
        let mut doc1 = InventoryDocument::new(UserId::new());
        let p = product(10);
        doc1.insert_product(&p).unwrap();
        let mut doc2 = doc1.fork();

        doc1.adjust_stock(p.id, -2, Utc::now()).unwrap();
        doc2.adjust_stock(p.id, -3, Utc::now()).unwrap();
        doc2.adjust_stock(p.id, 4, Utc::now()).unwrap();

        doc1.merge(&mut doc2).unwrap();
        assert_eq!(doc1.get_product(p.id).unwrap().unwrap().stock_quantity, 9);
    }

    #[test]
    fn test_independent_replicas_share_collections() {
        let user = UserId::new();
        let mut device_a = InventoryDocument::new(user);
        let mut device_b = InventoryDocument::new(user);

        let pa = product(1);
        let pb = product(2);
        device_a.insert_product(&pa).unwrap();
        device_b.insert_product(&pb).unwrap();

        device_a.merge(&mut device_b).unwrap();
        let products = device_a.all_products().unwrap();
        assert_eq!(products.len(), 2);
    }
}
