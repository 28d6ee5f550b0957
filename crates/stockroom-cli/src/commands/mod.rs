//! Command handlers

pub mod config;
pub mod dashboard;
pub mod identity;
pub mod product;
pub mod purchase;
pub mod report;
pub mod sale;
pub mod status;
pub mod sync;
pub mod watch;

use std::io::{self, IsTerminal, Write};

use anyhow::{bail, Result};
use uuid::Uuid;

use stockroom_core::{Collection, Store};

/// Resolve a full UUID or an unambiguous id prefix within `collection`
pub fn resolve_id(store: &Store, collection: Collection, id: &str) -> Result<Uuid> {
    if let Ok(uuid) = Uuid::parse_str(id) {
        return Ok(uuid);
    }

    let matches = store.ids_with_prefix(collection, &id.to_ascii_lowercase())?;
    match matches.as_slice() {
        [] => bail!("No {} found matching: {}", singular(collection), id),
        [only] => Ok(*only),
        many => {
            eprintln!("Multiple {} match '{}':", collection, id);
            for uuid in many {
                eprintln!("  {}", uuid);
            }
            bail!("Ambiguous ID. Please provide more characters.");
        }
    }
}

fn singular(collection: Collection) -> &'static str {
    match collection {
        Collection::Products => "product",
        Collection::Sales => "sale",
        Collection::Purchases => "purchase",
    }
}

/// Ask a yes/no question; anything but "y" is a no, as is a non-interactive stdin
pub fn confirm(prompt: &str) -> Result<bool> {
    if !io::stdin().is_terminal() {
        return Ok(false);
    }

    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    let input = input.trim().to_lowercase();
    Ok(input == "y" || input == "yes")
}
