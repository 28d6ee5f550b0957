//! Stockroom Core Library
//!
//! Inventory, sales and purchases for a small shop, stored per anonymous
//! user id in a local-first Automerge document that can sync between
//! devices.
//!
//! # Architecture
//!
//! - **Automerge**: source of truth; one document per `users/{id}` namespace
//! - **SQLite**: rebuilt projection for sorted and limited list queries
//! - **Live queries**: subscriptions that receive the full result after
//!   every commit or sync
//!
//! Stock only changes through transactions that write the stock counter
//! and the sale or purchase record together.
//!
//! # Quick Start
//!
//! ```text
//! let user_id = Identity::new()?.load_or_create()?;
//! let mut store = Store::open_with_config(Config::load()?, user_id)?;
//!
//! let product = store.add_product(ProductInput {
//!     stock_quantity: 10,
//!     reorder_point: 5,
//!     ..ProductInput::new("Lantern", "Outdoor")
//! })?;
//! store.record_sale(SaleInput::new(product.id, 6))?;
//!
//! let products = store.products(&CollectionQuery::new(Collection::Products))?;
//! let alerts = reports::low_stock(&products);
//! ```
//!
//! # Modules
//!
//! - `store`: unified storage interface (main entry point)
//! - `models`: products, sales, purchases and their input validation
//! - `document`: Automerge document handling and transactions
//! - `live`: live queries and their cache
//! - `reports`: report and dashboard aggregation
//! - `storage`: Automerge persistence and SQLite projection
//! - `sync`: automerge-repo sync client
//! - `identity`, `user_id`: the anonymous user id
//! - `config`: application configuration

pub mod config;
pub mod document;
pub mod error;
pub mod identity;
pub mod live;
pub mod models;
pub mod reports;
pub mod storage;
pub mod store;
pub mod sync;
pub mod user_id;

pub use config::Config;
pub use document::{DocumentError, InventoryDocument};
pub use error::{InventoryError, InventoryResult};
pub use identity::{Identity, InitResult};
pub use live::{CollectionQuery, LiveDocument, LiveQuery, QueryState, Record, SortDirection};
pub use models::{
    Collection, FieldError, Product, ProductInput, Purchase, PurchaseInput, Sale, SaleInput,
    ValidationErrors,
};
pub use reports::{DateRange, Report, ReportKind};
pub use storage::{AutomergePersistence, StorageError};
pub use store::Store;
pub use user_id::{UserId, UserIdError};
