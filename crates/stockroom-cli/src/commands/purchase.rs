//! Purchase command handlers

use anyhow::Result;

use stockroom_core::{Collection, PurchaseInput, Store};

use super::product::list_query;
use super::{confirm, resolve_id};
use crate::output::Output;

/// Record a purchase and add its quantity to stock
pub fn record(
    store: &mut Store,
    product: String,
    quantity: i64,
    unit_cost: f64,
    output: &Output,
) -> Result<()> {
    let product_id = resolve_id(store, Collection::Products, &product)?;
    let purchase = store.record_purchase(PurchaseInput::new(product_id, quantity, unit_cost))?;

    output.success(&format!(
        "Purchased {} x {} for {}",
        purchase.quantity,
        purchase.product_name,
        output.money(purchase.total_cost)
    ));
    output.print_purchase(&purchase);
    Ok(())
}

pub fn list(
    store: &Store,
    sort: Option<String>,
    asc: bool,
    limit: Option<usize>,
    output: &Output,
) -> Result<()> {
    let query = list_query(Collection::Purchases, sort, asc, limit);
    let purchases = store.purchases(&query)?;
    output.print_purchases(&purchases);
    Ok(())
}

/// Delete a purchase and take its quantity back out of stock
pub fn delete(store: &mut Store, id: String, yes: bool, output: &Output) -> Result<()> {
    let uuid = resolve_id(store, Collection::Purchases, &id)?;

    if output.should_prompt() && !yes {
        if let Some(purchase) = store.get_purchase(uuid)? {
            println!(
                "Delete purchase: {} - {} x {}",
                &purchase.id.to_string()[..8],
                purchase.quantity,
                purchase.product_name
            );
        }
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    match store.delete_purchase(uuid)? {
        Some(purchase) => output.success(&format!(
            "Deleted purchase: {} ({} removed from stock)",
            purchase.id, purchase.quantity
        )),
        None => anyhow::bail!("Purchase not found: {}", id),
    }
    Ok(())
}
