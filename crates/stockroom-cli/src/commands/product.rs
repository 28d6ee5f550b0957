//! Product command handlers

use anyhow::{Context, Result};
use clap::Args;

use stockroom_core::{Collection, CollectionQuery, ProductInput, SortDirection, Store};

use super::{confirm, resolve_id};
use crate::output::Output;

/// Product fields; on edit, omitted flags keep their current value
#[derive(Args, Debug, Default, Clone)]
pub struct ProductFields {
    /// Product name
    #[arg(short, long)]
    pub name: Option<String>,
    /// Category
    #[arg(short, long)]
    pub category: Option<String>,
    /// Stock keeping unit
    #[arg(long)]
    pub sku: Option<String>,
    /// Selling price per unit
    #[arg(short, long)]
    pub price: Option<f64>,
    /// Catalog cost per unit
    #[arg(long)]
    pub cost: Option<f64>,
    /// Units in stock
    #[arg(short, long)]
    pub stock: Option<i64>,
    /// Stock level at or below which the product is flagged
    #[arg(short, long)]
    pub reorder_point: Option<i64>,
    /// Image URL
    #[arg(long)]
    pub image_url: Option<String>,
    /// Short description of the image
    #[arg(long)]
    pub image_hint: Option<String>,
}

impl ProductFields {
    /// Overlay the given flags on `base`
    fn apply(self, mut base: ProductInput) -> ProductInput {
        if let Some(name) = self.name {
            base.name = name;
        }
        if let Some(category) = self.category {
            base.category = category;
        }
        if let Some(sku) = self.sku {
            base.sku = Some(sku);
        }
        if let Some(price) = self.price {
            base.price = price;
        }
        if let Some(cost) = self.cost {
            base.cost = cost;
        }
        if let Some(stock) = self.stock {
            base.stock_quantity = stock;
        }
        if let Some(reorder_point) = self.reorder_point {
            base.reorder_point = reorder_point;
        }
        if let Some(image_url) = self.image_url {
            base.image_url = Some(image_url);
        }
        if let Some(image_hint) = self.image_hint {
            base.image_hint = Some(image_hint);
        }
        base
    }

    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.category.is_none()
            && self.sku.is_none()
            && self.price.is_none()
            && self.cost.is_none()
            && self.stock.is_none()
            && self.reorder_point.is_none()
            && self.image_url.is_none()
            && self.image_hint.is_none()
    }
}

/// Build a list query from `--sort`, `--asc` and `--limit`
pub fn list_query(
    collection: Collection,
    sort: Option<String>,
    asc: bool,
    limit: Option<usize>,
) -> CollectionQuery {
    let mut query = CollectionQuery::new(collection);
    if let Some(field) = sort {
        let direction = if asc {
            SortDirection::Asc
        } else {
            SortDirection::Desc
        };
        query = query.order_by(field, direction);
    }
    if let Some(limit) = limit {
        query = query.limit(limit);
    }
    query
}

/// Create a product
pub fn add(store: &mut Store, fields: ProductFields, output: &Output) -> Result<()> {
    let input = fields.apply(ProductInput::new("", ""));
    let product = store.add_product(input)?;

    output.success(&format!("Added product: {}", product.id));
    output.print_product(&product);
    Ok(())
}

pub fn list(
    store: &Store,
    sort: Option<String>,
    asc: bool,
    limit: Option<usize>,
    output: &Output,
) -> Result<()> {
    let query = list_query(Collection::Products, sort, asc, limit);
    let products = store.products(&query)?;
    output.print_products(&products);
    Ok(())
}

pub fn show(store: &Store, id: String, output: &Output) -> Result<()> {
    let uuid = resolve_id(store, Collection::Products, &id)?;
    let product = store
        .get_product(uuid)?
        .ok_or_else(|| anyhow::anyhow!("Product not found: {}", id))?;

    output.print_product(&product);
    Ok(())
}

/// Update a product; omitted fields keep their current values
pub fn edit(store: &mut Store, id: String, fields: ProductFields, output: &Output) -> Result<()> {
    if fields.is_empty() {
        anyhow::bail!("Nothing to change. Pass at least one field flag, e.g. --price 9.99");
    }

    let uuid = resolve_id(store, Collection::Products, &id)?;
    let current = store
        .get_product(uuid)?
        .ok_or_else(|| anyhow::anyhow!("Product not found: {}", id))?;

    let input = fields.apply(current.to_input());
    let product = store.update_product(uuid, input)?;

    output.success(&format!("Updated product: {}", product.id));
    output.print_product(&product);
    Ok(())
}

/// Delete a product; its sales and purchases are kept
pub fn delete(store: &mut Store, id: String, yes: bool, output: &Output) -> Result<()> {
    let uuid = resolve_id(store, Collection::Products, &id)?;
    let product = store
        .get_product(uuid)?
        .ok_or_else(|| anyhow::anyhow!("Product not found: {}", id))?;

    if output.should_prompt() && !yes {
        println!("Delete product: {} - {}", &product.id.to_string()[..8], product.name);
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    store
        .delete_product(uuid)
        .context("Failed to delete product")?;

    output.success(&format!("Deleted product: {}", uuid));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_overlays_only_given_fields() {
        let mut base = ProductInput::new("Lamp", "Home");
        base.price = 20.0;
        base.stock_quantity = 4;

        let fields = ProductFields {
            price: Some(25.0),
            sku: Some("LMP-1".to_string()),
            ..Default::default()
        };
        let input = fields.apply(base);

        assert_eq!(input.name, "Lamp");
        assert_eq!(input.price, 25.0);
        assert_eq!(input.stock_quantity, 4);
        assert_eq!(input.sku.as_deref(), Some("LMP-1"));
    }

    #[test]
    fn test_empty_fields() {
        assert!(ProductFields::default().is_empty());
        let fields = ProductFields {
            stock: Some(0),
            ..Default::default()
        };
        assert!(!fields.is_empty());
    }

    #[test]
    fn test_list_query_defaults_to_descending() {
        let query = list_query(Collection::Products, Some("price".to_string()), false, Some(5));
        assert_eq!(query.sort, Some(("price".to_string(), SortDirection::Desc)));
        assert_eq!(query.limit, Some(5));

        let query = list_query(Collection::Sales, None, true, None);
        assert!(query.sort.is_none());
        assert!(query.limit.is_none());
    }
}
