//! Data models for Stockroom
//!
//! Defines the records kept in each namespace (Product, Sale, Purchase)
//! and the validated inputs that create or change them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// The collections of a namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Products,
    Sales,
    Purchases,
}

impl Collection {
    pub const ALL: [Collection; 3] = [Collection::Products, Collection::Sales, Collection::Purchases];

    /// Name used in paths and in the document root
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Products => "products",
            Collection::Sales => "sales",
            Collection::Purchases => "purchases",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A catalog item with its current stock
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    /// Empty when not set
    pub sku: String,
    /// Unit selling price
    pub price: f64,
    /// Unit cost in the catalog
    pub cost: f64,
    pub stock_quantity: i64,
    /// Stock at or below this level needs replenishment
    pub reorder_point: i64,
    pub image_url: String,
    pub image_hint: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Build a new product from validated input
    pub fn from_input(input: ProductInput, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: input.name,
            category: input.category,
            sku: input.sku.unwrap_or_default(),
            price: input.price,
            cost: input.cost,
            stock_quantity: input.stock_quantity,
            reorder_point: input.reorder_point,
            image_url: input.image_url.unwrap_or_default(),
            image_hint: input.image_hint.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrite every editable field, keeping id and creation time
    pub fn apply_input(&mut self, input: ProductInput, now: DateTime<Utc>) {
        self.name = input.name;
        self.category = input.category;
        self.sku = input.sku.unwrap_or_default();
        self.price = input.price;
        self.cost = input.cost;
        self.stock_quantity = input.stock_quantity;
        self.reorder_point = input.reorder_point;
        self.image_url = input.image_url.unwrap_or_default();
        self.image_hint = input.image_hint.unwrap_or_default();
        self.updated_at = now;
    }

    pub fn is_low_stock(&self) -> bool {
        self.stock_quantity <= self.reorder_point
    }

    /// Current values as an input, for editing
    pub fn to_input(&self) -> ProductInput {
        fn non_empty(s: &str) -> Option<String> {
            (!s.is_empty()).then(|| s.to_string())
        }

        ProductInput {
            name: self.name.clone(),
            category: self.category.clone(),
            sku: non_empty(&self.sku),
            price: self.price,
            cost: self.cost,
            stock_quantity: self.stock_quantity,
            reorder_point: self.reorder_point,
            image_url: non_empty(&self.image_url),
            image_hint: non_empty(&self.image_hint),
        }
    }
}

/// A recorded sale of one product
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Sale {
    pub id: Uuid,
    pub product_id: Uuid,
    /// Product name at the time of sale
    pub product_name: String,
    pub quantity: i64,
    /// `price * quantity` at the time of sale
    pub total: f64,
    pub sale_date: DateTime<Utc>,
}

/// A recorded purchase (restock) of one product
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Purchase {
    pub id: Uuid,
    pub product_id: Uuid,
    /// Product name at the time of purchase
    pub product_name: String,
    pub quantity: i64,
    /// Unit cost paid, which may differ from the catalog cost
    pub cost: f64,
    /// `cost * quantity`
    pub total_cost: f64,
    pub purchase_date: DateTime<Utc>,
}

/// One failed field check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// All field checks that failed for one input
#[derive(Error, Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[error("{}", join_fields(.0))]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.push(FieldError {
            field,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    /// Whether the given field failed
    pub fn has(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field == field)
    }

    fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

fn join_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

fn check_money(errors: &mut ValidationErrors, field: &'static str, value: f64) {
    if !value.is_finite() || value < 0.0 {
        errors.push(field, "must be a non-negative number");
    }
}

/// Fields submitted to create or update a product
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProductInput {
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub sku: Option<String>,
    pub price: f64,
    pub cost: f64,
    pub stock_quantity: i64,
    pub reorder_point: i64,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub image_hint: Option<String>,
}

impl ProductInput {
    /// Minimal input with the required fields, the rest zero or unset
    pub fn new(name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            sku: None,
            price: 0.0,
            cost: 0.0,
            stock_quantity: 0,
            reorder_point: 0,
            image_url: None,
            image_hint: None,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();

        if self.name.trim().is_empty() {
            errors.push("name", "is required");
        }
        if self.category.trim().is_empty() {
            errors.push("category", "is required");
        }
        check_money(&mut errors, "price", self.price);
        check_money(&mut errors, "cost", self.cost);
        if self.stock_quantity < 0 {
            errors.push("stockQuantity", "cannot be negative");
        }
        if self.reorder_point < 0 {
            errors.push("reorderPoint", "cannot be negative");
        }
        if let Some(url) = self.image_url.as_deref().filter(|u| !u.is_empty()) {
            if url::Url::parse(url).is_err() {
                errors.push("imageUrl", "is not a valid URL");
            }
        }

        errors.into_result()
    }
}

/// Fields submitted to record a sale
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SaleInput {
    pub product_id: Uuid,
    pub quantity: i64,
}

impl SaleInput {
    pub fn new(product_id: Uuid, quantity: i64) -> Self {
        Self {
            product_id,
            quantity,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        if self.product_id.is_nil() {
            errors.push("productId", "a product must be selected");
        }
        if self.quantity < 1 {
            errors.push("quantity", "must be at least 1");
        }
        errors.into_result()
    }
}

/// Fields submitted to record a purchase
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseInput {
    pub product_id: Uuid,
    pub quantity: i64,
    /// Unit cost paid
    pub cost: f64,
}

impl PurchaseInput {
    pub fn new(product_id: Uuid, quantity: i64, cost: f64) -> Self {
        Self {
            product_id,
            quantity,
            cost,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        if self.product_id.is_nil() {
            errors.push("productId", "a product must be selected");
        }
        if self.quantity < 1 {
            errors.push("quantity", "must be at least 1");
        }
        check_money(&mut errors, "cost", self.cost);
        errors.into_result()
    }
}
