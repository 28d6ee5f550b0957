//! Sync command handler

use anyhow::{bail, Result};

use stockroom_core::{Collection, Store};

use crate::output::Output;

/// Sync with the remote server
pub async fn sync(store: &mut Store, output: &Output) -> Result<()> {
    let config = store.config();

    if !config.sync_enabled {
        bail!(
            "Sync is not enabled. Enable it with:\n  \
             stockroom config set sync_enabled true\n  \
             stockroom config set sync_url ws://your-server:3030"
        );
    }
    if config.sync_url.is_none() {
        bail!(
            "Sync URL not configured. Set it with:\n  \
             stockroom config set sync_url ws://your-server:3030"
        );
    }

    let Some(client) = store.sync_client()? else {
        bail!("Sync is not configured");
    };

    output.message(&format!("Syncing {} with {}...", store.user_id(), client.url()));

    match store.sync_with(&client).await {
        Ok(true) => {
            output.success("Sync complete - document updated");
            output.message(&format!(
                "  Products: {}, Sales: {}, Purchases: {}",
                store.count(Collection::Products)?,
                store.count(Collection::Sales)?,
                store.count(Collection::Purchases)?
            ));
        }
        Ok(false) => output.success("Sync complete - already up to date"),
        Err(e) => {
            output.message(&format!("Sync failed: {}", e));
            return Err(e);
        }
    }

    Ok(())
}

/// Sync quietly (for auto-sync) - no output on success
pub async fn sync_quiet(store: &mut Store) -> Result<()> {
    if let Some(client) = store.sync_client()? {
        store.sync_with(&client).await?;
    }
    Ok(())
}
