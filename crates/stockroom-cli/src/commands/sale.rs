//! Sale command handlers

use anyhow::Result;

use stockroom_core::{Collection, SaleInput, Store};

use super::product::list_query;
use super::{confirm, resolve_id};
use crate::output::Output;

/// Record a sale; fails without touching stock if there is not enough
pub fn record(store: &mut Store, product: String, quantity: i64, output: &Output) -> Result<()> {
    let product_id = resolve_id(store, Collection::Products, &product)?;
    let sale = store.record_sale(SaleInput::new(product_id, quantity))?;

    output.success(&format!(
        "Sold {} x {} for {}",
        sale.quantity,
        sale.product_name,
        output.money(sale.total)
    ));
    output.print_sale(&sale);
    Ok(())
}

pub fn list(
    store: &Store,
    sort: Option<String>,
    asc: bool,
    limit: Option<usize>,
    output: &Output,
) -> Result<()> {
    let query = list_query(Collection::Sales, sort, asc, limit);
    let sales = store.sales(&query)?;
    output.print_sales(&sales);
    Ok(())
}

/// Delete a sale and return its quantity to stock
pub fn delete(store: &mut Store, id: String, yes: bool, output: &Output) -> Result<()> {
    let uuid = resolve_id(store, Collection::Sales, &id)?;

    if output.should_prompt() && !yes {
        if let Some(sale) = store.get_sale(uuid)? {
            println!(
                "Delete sale: {} - {} x {}",
                &sale.id.to_string()[..8],
                sale.quantity,
                sale.product_name
            );
        }
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    match store.delete_sale(uuid)? {
        Some(sale) => output.success(&format!(
            "Deleted sale: {} ({} returned to stock)",
            sale.id, sale.quantity
        )),
        None => anyhow::bail!("Sale not found: {}", id),
    }
    Ok(())
}
