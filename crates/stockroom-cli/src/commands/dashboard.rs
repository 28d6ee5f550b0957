//! Dashboard command handler

use anyhow::Result;
use chrono::Utc;

use stockroom_core::reports::{daily_sales, low_stock, DashboardStats};
use stockroom_core::{Collection, CollectionQuery, SortDirection, Store};

use crate::output::{Dashboard, Output};

/// Number of sales listed under "recent sales"
const RECENT_SALES: usize = 10;

pub fn build(store: &Store) -> Result<Dashboard> {
    let products = store.products(&CollectionQuery::new(Collection::Products))?;
    let sales = store.sales(&CollectionQuery::new(Collection::Sales))?;
    let purchases = store.purchases(&CollectionQuery::new(Collection::Purchases))?;
    let recent_sales = store.sales(
        &CollectionQuery::new(Collection::Sales)
            .order_by("saleDate", SortDirection::Desc)
            .limit(RECENT_SALES),
    )?;

    Ok(Dashboard {
        stats: DashboardStats::compute(&products, &sales, &purchases),
        low_stock: low_stock(&products),
        daily_sales: daily_sales(&sales, Utc::now().date_naive()),
        recent_sales,
    })
}

pub fn show(store: &Store, output: &Output) -> Result<()> {
    let dashboard = build(store)?;
    output.print_dashboard(&dashboard);
    Ok(())
}
