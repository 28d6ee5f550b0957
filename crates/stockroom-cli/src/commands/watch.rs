//! Watch command handler
//!
//! Keeps a live query open and reprints it on every push. Pushes come
//! from sync with the server when it is configured, and from other local
//! sessions saving the same namespace.

use std::time::Duration;

use anyhow::{bail, Result};
use tracing::{debug, warn};

use stockroom_core::live::LiveQuery;
use stockroom_core::sync::SyncClient;
use stockroom_core::{Collection, CollectionQuery, Product, Purchase, Record, Sale, Store};

use crate::output::Output;

/// How often to look for changes from disk and the sync server
const POLL_INTERVAL: Duration = Duration::from_secs(2);

pub async fn watch(store: &mut Store, query: CollectionQuery, output: &Output) -> Result<()> {
    match query.collection {
        Collection::Products => {
            watch_records::<Product>(store, query, output, |o, rows| o.print_products(rows)).await
        }
        Collection::Sales => {
            watch_records::<Sale>(store, query, output, |o, rows| o.print_sales(rows)).await
        }
        Collection::Purchases => {
            watch_records::<Purchase>(store, query, output, |o, rows| o.print_purchases(rows))
                .await
        }
    }
}

async fn watch_records<T>(
    store: &mut Store,
    query: CollectionQuery,
    output: &Output,
    print: impl Fn(&Output, &[T]),
) -> Result<()>
where
    T: Record + PartialEq,
{
    let collection = query.collection;
    let mut live: LiveQuery<T> = store.watch_collection(query)?;
    let client = store.sync_client()?;

    live.try_update();
    let mut shown = live.data().clone();
    render(output, collection, &live, &print);

    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                poll(store, client.as_ref()).await;
                if live.try_update() && *live.data() != shown {
                    shown = live.data().clone();
                    render(output, collection, &live, &print);
                }
            }
        }
    }

    debug!("Stopped watching {}", collection);
    Ok(())
}

/// Pull in changes from other sessions and from the server
async fn poll(store: &mut Store, client: Option<&SyncClient>) {
    if let Err(e) = store.reload() {
        warn!("Reload failed: {:#}", e);
    }
    if let Some(client) = client {
        if let Err(e) = store.sync_with(client).await {
            warn!("Sync failed: {:#}", e);
        }
    }
}

fn render<T>(
    output: &Output,
    collection: Collection,
    live: &LiveQuery<T>,
    print: &impl Fn(&Output, &[T]),
) {
    if let Some(error) = live.error() {
        eprintln!("Error: {}", error);
        return;
    }
    if !output.is_json() && !output.is_quiet() {
        println!(
            "── {} at {} ──",
            collection,
            chrono::Local::now().format("%H:%M:%S")
        );
    }
    print(output, live.data());
}

/// Parse the collection argument of `watch`
pub fn parse_collection(name: &str) -> Result<Collection> {
    match Collection::parse(name) {
        Some(collection) => Ok(collection),
        None => bail!(
            "Unknown collection '{}'. Expected one of: products, sales, purchases",
            name
        ),
    }
}
