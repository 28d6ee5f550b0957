//! Live queries
//!
//! A live query is a subscription to a collection (or to one record) that
//! receives the full current result every time the data changes. Pushes
//! travel over an unbounded channel, so a consumer on another task sees
//! them with [`Live::changed`] or polls with [`Live::try_update`].
//!
//! Results are also kept in a process-wide cache keyed by path
//! (`users/{id}/{collection}` or `users/{id}/{collection}/{docId}`). A new
//! subscription starts from whatever the cache holds for its path, marked
//! as not loading, and is replaced by fresh data as soon as the store
//! pushes. Without a cache entry it starts empty and loading. The cache
//! is never invalidated explicitly and does not distinguish sort order or
//! limit for the same path.

use std::any::Any;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex, OnceLock};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::warn;
use uuid::Uuid;

use crate::error::InventoryError;
use crate::models::{Collection, Product, Purchase, Sale};
use crate::storage::projection::{sort_column, SqliteProjection};

// ==================== Queries ====================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl FromStr for SortDirection {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            other => Err(InventoryError::InvalidQuery(format!(
                "unknown sort direction '{}'",
                other
            ))),
        }
    }
}

/// What to read from a collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionQuery {
    pub collection: Collection,
    /// camelCase field name and direction
    pub sort: Option<(String, SortDirection)>,
    pub limit: Option<usize>,
}

impl CollectionQuery {
    pub fn new(collection: Collection) -> Self {
        Self {
            collection,
            sort: None,
            limit: None,
        }
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort = Some((field.into(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Reject unknown sort fields and a zero limit
    pub fn validate(&self) -> Result<(), InventoryError> {
        if let Some((field, _)) = &self.sort {
            if sort_column(self.collection, field).is_none() {
                return Err(InventoryError::InvalidQuery(format!(
                    "cannot sort {} by '{}'",
                    self.collection, field
                )));
            }
        }
        if self.limit == Some(0) {
            return Err(InventoryError::InvalidQuery(
                "limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// A record type that can be watched
pub trait Record: Clone + Send + Sync + 'static {
    const COLLECTION: Collection;

    fn id(&self) -> Uuid;

    fn query(projection: &SqliteProjection, query: &CollectionQuery) -> anyhow::Result<Vec<Self>>;

    fn get(projection: &SqliteProjection, id: &Uuid) -> anyhow::Result<Option<Self>>;
}

impl Record for Product {
    const COLLECTION: Collection = Collection::Products;

    fn id(&self) -> Uuid {
        self.id
    }

    fn query(projection: &SqliteProjection, query: &CollectionQuery) -> anyhow::Result<Vec<Self>> {
        projection.query_products(query)
    }

    fn get(projection: &SqliteProjection, id: &Uuid) -> anyhow::Result<Option<Self>> {
        projection.get_product(id)
    }
}

impl Record for Sale {
    const COLLECTION: Collection = Collection::Sales;

    fn id(&self) -> Uuid {
        self.id
    }

    fn query(projection: &SqliteProjection, query: &CollectionQuery) -> anyhow::Result<Vec<Self>> {
        projection.query_sales(query)
    }

    fn get(projection: &SqliteProjection, id: &Uuid) -> anyhow::Result<Option<Self>> {
        projection.get_sale(id)
    }
}

impl Record for Purchase {
    const COLLECTION: Collection = Collection::Purchases;

    fn id(&self) -> Uuid {
        self.id
    }

    fn query(projection: &SqliteProjection, query: &CollectionQuery) -> anyhow::Result<Vec<Self>> {
        projection.query_purchases(query)
    }

    fn get(projection: &SqliteProjection, id: &Uuid) -> anyhow::Result<Option<Self>> {
        projection.get_purchase(id)
    }
}

// ==================== Cache ====================

type CacheMap = HashMap<String, Arc<dyn Any + Send + Sync>>;

fn cache() -> &'static Mutex<CacheMap> {
    static CACHE: OnceLock<Mutex<CacheMap>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

fn cache_get<D: Clone + 'static>(path: &str) -> Option<D> {
    let map = cache().lock().unwrap_or_else(|e| e.into_inner());
    map.get(path).and_then(|v| v.downcast_ref::<D>()).cloned()
}

fn cache_put<D: Send + Sync + 'static>(path: &str, data: D) {
    let mut map = cache().lock().unwrap_or_else(|e| e.into_inner());
    map.insert(path.to_string(), Arc::new(data));
}

fn cache_remove(path: &str) {
    let mut map = cache().lock().unwrap_or_else(|e| e.into_inner());
    map.remove(path);
}

// ==================== Subscriptions ====================

/// One push from the store
#[derive(Debug)]
enum Push<D> {
    Data(D),
    Error(String),
}

/// Snapshot of a live query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState<D> {
    pub data: D,
    pub loading: bool,
    pub error: Option<String>,
}

/// Handle to a live query
///
/// Dropping it ends the subscription.
pub struct Live<D> {
    path: String,
    state: QueryState<D>,
    rx: UnboundedReceiver<Push<D>>,
}

/// Live view of a sorted, limited collection
pub type LiveQuery<T> = Live<Vec<T>>;

/// Live view of one record; `None` while missing or after deletion
pub type LiveDocument<T> = Live<Option<T>>;

impl<D: Clone + Default + 'static> Live<D> {
    fn seeded(path: String) -> (Self, UnboundedSender<Push<D>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = match cache_get::<D>(&path) {
            Some(data) => QueryState {
                data,
                loading: false,
                error: None,
            },
            None => QueryState {
                data: D::default(),
                loading: true,
                error: None,
            },
        };
        (Self { path, state, rx }, tx)
    }
}

impl<D> Live<D> {
    /// Cache key of this query
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn state(&self) -> &QueryState<D> {
        &self.state
    }

    pub fn data(&self) -> &D {
        &self.state.data
    }

    pub fn is_loading(&self) -> bool {
        self.state.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.state.error.as_deref()
    }

    /// Apply every push received so far without waiting
    ///
    /// Returns whether the state changed.
    pub fn try_update(&mut self) -> bool {
        let mut updated = false;
        while let Ok(push) = self.rx.try_recv() {
            self.apply(push);
            updated = true;
        }
        updated
    }

    /// Wait for the next push and apply it
    ///
    /// Returns `false` once the store has gone away.
    pub async fn changed(&mut self) -> bool {
        match self.rx.recv().await {
            Some(push) => {
                self.apply(push);
                true
            }
            None => false,
        }
    }

    fn apply(&mut self, push: Push<D>) {
        match push {
            Push::Data(data) => {
                self.state.data = data;
                self.state.error = None;
            }
            Push::Error(message) => self.state.error = Some(message),
        }
        self.state.loading = false;
    }
}

/// Store-side end of a live query
pub(crate) trait Subscriber: Send {
    /// The handle was dropped
    fn is_closed(&self) -> bool;

    /// Evaluate against the projection and push the result
    fn refresh(&self, projection: &SqliteProjection);
}

struct CollectionSubscriber<T> {
    path: String,
    query: CollectionQuery,
    tx: UnboundedSender<Push<Vec<T>>>,
}

impl<T: Record> Subscriber for CollectionSubscriber<T> {
    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn refresh(&self, projection: &SqliteProjection) {
        let push = match T::query(projection, &self.query) {
            Ok(data) => {
                cache_put(&self.path, data.clone());
                Push::Data(data)
            }
            Err(e) => {
                warn!("Live query on {} failed: {:#}", self.path, e);
                Push::Error(e.to_string())
            }
        };
        let _ = self.tx.send(push);
    }
}

struct DocumentSubscriber<T> {
    path: String,
    id: Uuid,
    tx: UnboundedSender<Push<Option<T>>>,
}

impl<T: Record> Subscriber for DocumentSubscriber<T> {
    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn refresh(&self, projection: &SqliteProjection) {
        let push = match T::get(projection, &self.id) {
            Ok(Some(record)) => {
                cache_put(&self.path, Some(record.clone()));
                Push::Data(Some(record))
            }
            Ok(None) => {
                cache_remove(&self.path);
                Push::Data(None)
            }
            Err(e) => {
                warn!("Live document {} failed: {:#}", self.path, e);
                Push::Error(e.to_string())
            }
        };
        let _ = self.tx.send(push);
    }
}

pub(crate) fn subscribe_collection<T: Record>(
    path: String,
    query: CollectionQuery,
) -> (Box<dyn Subscriber>, LiveQuery<T>) {
    let (live, tx) = LiveQuery::<T>::seeded(path.clone());
    (Box::new(CollectionSubscriber { path, query, tx }), live)
}

pub(crate) fn subscribe_document<T: Record>(
    path: String,
    id: Uuid,
) -> (Box<dyn Subscriber>, LiveDocument<T>) {
    let (live, tx) = LiveDocument::<T>::seeded(path.clone());
    (Box::new(DocumentSubscriber { path, id, tx }), live)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::InventoryDocument;
    use crate::models::ProductInput;
    use crate::user_id::UserId;
    use chrono::Utc;

    fn projection_with(names: &[&str]) -> (SqliteProjection, Vec<Product>) {
        let mut doc = InventoryDocument::new(UserId::new());
        let products: Vec<Product> = names
            .iter()
            .map(|n| Product::from_input(ProductInput::new(*n, "General"), Utc::now()))
            .collect();
        for p in &products {
            doc.insert_product(p).unwrap();
        }
        let mut projection = SqliteProjection::open_in_memory().unwrap();
        projection.project_full(&doc).unwrap();
        (projection, products)
    }

    fn unique_path() -> String {
        UserId::new().collection_path(Collection::Products)
    }

    #[test]
    fn test_query_validation() {
        assert!(CollectionQuery::new(Collection::Sales)
            .order_by("saleDate", SortDirection::Desc)
            .limit(10)
            .validate()
            .is_ok());
        assert!(matches!(
            CollectionQuery::new(Collection::Sales)
                .order_by("price", SortDirection::Asc)
                .validate(),
            Err(InventoryError::InvalidQuery(_))
        ));
        assert!(CollectionQuery::new(Collection::Products)
            .limit(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_sort_direction_parse() {
        assert_eq!("ASC".parse::<SortDirection>().unwrap(), SortDirection::Asc);
        assert_eq!(SortDirection::default(), SortDirection::Desc);
        assert!("sideways".parse::<SortDirection>().is_err());
    }

    #[test]
    fn test_first_subscription_starts_loading() {
        let (projection, _) = projection_with(&["Mug", "Tray"]);
        let (subscriber, mut live) = subscribe_collection::<Product>(
            unique_path(),
            CollectionQuery::new(Collection::Products),
        );

        assert!(live.is_loading());
        assert!(live.data().is_empty());
        assert!(!live.try_update());

        subscriber.refresh(&projection);
        assert!(live.try_update());
        assert!(!live.is_loading());
        assert_eq!(live.data().len(), 2);
    }

    #[test]
    fn test_second_subscription_is_seeded_from_cache() {
        let (projection, _) = projection_with(&["Mug"]);
        let path = unique_path();

        let (first, mut live1) =
            subscribe_collection::<Product>(path.clone(), CollectionQuery::new(Collection::Products));
        first.refresh(&projection);
        live1.try_update();

        let (_second, live2) =
            subscribe_collection::<Product>(path, CollectionQuery::new(Collection::Products));
        assert!(!live2.is_loading());
        assert_eq!(live2.data().len(), 1);
        assert_eq!(live2.data()[0].name, "Mug");
    }

    #[test]
    fn test_dropped_handle_closes_subscriber() {
        let (subscriber, live) = subscribe_collection::<Sale>(
            UserId::new().collection_path(Collection::Sales),
            CollectionQuery::new(Collection::Sales),
        );
        assert!(!subscriber.is_closed());
        drop(live);
        assert!(subscriber.is_closed());
    }

    #[test]
    fn test_document_subscription_and_missing_record() {
        let (projection, products) = projection_with(&["Mug"]);
        let user = UserId::new();
        let id = products[0].id;

        let (subscriber, mut live) = subscribe_document::<Product>(
            user.document_path(Collection::Products, &id),
            id,
        );
        subscriber.refresh(&projection);
        live.try_update();
        assert_eq!(live.data().as_ref().map(|p| p.name.as_str()), Some("Mug"));

        let missing = Uuid::new_v4();
        let (subscriber, mut live) = subscribe_document::<Product>(
            user.document_path(Collection::Products, &missing),
            missing,
        );
        subscriber.refresh(&projection);
        live.try_update();
        assert!(live.data().is_none());
        assert!(!live.is_loading());
    }

    #[test]
    fn test_failed_refresh_sets_error() {
        let (projection, _) = projection_with(&["Mug"]);
        let query = CollectionQuery::new(Collection::Products).order_by("bogus", SortDirection::Asc);
        let (subscriber, mut live) = subscribe_collection::<Product>(unique_path(), query);

        subscriber.refresh(&projection);
        live.try_update();
        assert!(live.error().is_some());
        assert!(!live.is_loading());
    }

    #[tokio::test]
    async fn test_changed_waits_for_push() {
        let (projection, _) = projection_with(&["Mug", "Tray", "Lamp"]);
        let (subscriber, mut live) = subscribe_collection::<Product>(
            unique_path(),
            CollectionQuery::new(Collection::Products)
                .order_by("name", SortDirection::Asc)
                .limit(2),
        );

        let handle = tokio::spawn(async move {
            assert!(live.changed().await);
            live
        });
        subscriber.refresh(&projection);

        let live = handle.await.unwrap();
        let names: Vec<&str> = live.data().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Lamp", "Mug"]);
    }

    #[tokio::test]
    async fn test_changed_returns_false_when_store_gone() {
        let (subscriber, mut live) = subscribe_collection::<Purchase>(
            UserId::new().collection_path(Collection::Purchases),
            CollectionQuery::new(Collection::Purchases),
        );
        drop(subscriber);
        assert!(!live.changed().await);
    }
}
