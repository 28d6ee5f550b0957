//! Status command handler

use anyhow::Result;

use stockroom_core::{Collection, Store};

use crate::output::{Output, OutputFormat};

/// Show status information
pub fn show(store: &Store, output: &Output) -> Result<()> {
    let config = store.config();
    let user_id = store.user_id();
    let document_path = config.document_path(user_id);
    let document_size = std::fs::metadata(&document_path)
        .map(|m| m.len())
        .unwrap_or(0);

    let products = store.count(Collection::Products)?;
    let sales = store.count(Collection::Sales)?;
    let purchases = store.count(Collection::Purchases)?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "user_id": user_id.to_string(),
                    "namespace": user_id.namespace(),
                    "document_url": store.url(),
                    "sync_enabled": config.sync_enabled,
                    "sync_url": config.sync_url,
                    "storage": {
                        "document": document_path,
                        "document_size": document_size,
                        "database": config.sqlite_path(user_id)
                    },
                    "counts": {
                        "products": products,
                        "sales": sales,
                        "purchases": purchases
                    }
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", user_id);
        }
        OutputFormat::Human => {
            println!("Stockroom Status");
            println!("================");
            println!();
            println!("Namespace:");
            println!("  Path: {}", user_id.namespace());
            println!("  URL:  {}", store.url());
            println!();
            println!("Sync:");
            println!(
                "  Status: {}",
                if config.sync_enabled {
                    "enabled"
                } else {
                    "disabled"
                }
            );
            if let Some(ref url) = config.sync_url {
                println!("  Server: {}", url);
            }
            println!();
            println!("Storage:");
            println!("  Location: {}", config.namespace_dir(user_id).display());
            println!("  Document: {}", human_size(document_size));
            println!();
            println!("Contents:");
            println!("  Products:  {}", products);
            println!("  Sales:     {}", sales);
            println!("  Purchases: {}", purchases);
        }
    }

    Ok(())
}

fn human_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
