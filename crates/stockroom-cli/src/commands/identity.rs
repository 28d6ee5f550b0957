//! Init and device command handlers

use std::io::{self, Write};

use anyhow::{bail, Result};

use stockroom_core::{Config, Identity, InitResult, UserId};

use crate::output::Output;

/// Set up the user id for this device
pub fn init(config: Config, new: bool, join: Option<String>, output: &Output) -> Result<()> {
    let identity = Identity::with_config(config.clone());

    if let Some(user_id) = identity.current()? {
        if output.is_json() {
            println!(
                "{}",
                serde_json::json!({"user_id": user_id.to_string(), "already_initialized": true})
            );
        } else if output.is_quiet() {
            println!("{}", user_id);
        } else {
            println!();
            println!("Already initialized.");
            println!("User ID: {}", user_id);
            println!();
            println!("To start fresh, remove:");
            println!("  {}", config.user_id_path().display());
        }
        return Ok(());
    }

    let result = if let Some(id_str) = join {
        identity.initialize_join(UserId::parse(&id_str)?)?
    } else if new {
        identity.initialize_new()?
    } else {
        prompt_setup(&identity)?
    };

    report_init(&config, &result, output);
    Ok(())
}

fn report_init(config: &Config, result: &InitResult, output: &Output) {
    if output.is_json() {
        println!(
            "{}",
            serde_json::json!({
                "user_id": result.user_id.to_string(),
                "document_id": result.user_id.to_bs58check(),
                "is_new": result.is_new
            })
        );
        return;
    }
    if output.is_quiet() {
        println!("{}", result.user_id);
        return;
    }

    println!();
    if result.is_new {
        println!("Created new user ID.");
    } else {
        println!("User ID configured.");
    }
    println!();
    println!("Your user ID: {}", result.user_id);
    println!("Stored in:    {}", config.user_id_path().display());
    println!("View it anytime with: stockroom device show");
    if !result.is_new && config.sync_url.is_none() {
        println!();
        println!("Sync server not configured. Your data will sync once you set one:");
        println!("  stockroom config set sync_url ws://your-server:3030");
        println!("  stockroom config set sync_enabled true");
    }
    println!();
}

/// Ask whether to create a new id or join an existing one
fn prompt_setup(identity: &Identity) -> Result<InitResult> {
    println!();
    println!("Welcome to Stockroom!");
    println!();
    println!("Is this your first device?");
    println!();
    println!("  [1] Yes, create a new user ID");
    println!("  [2] No, I have an existing user ID");
    println!();
    print!("> ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    match input.trim() {
        "1" => identity.initialize_new(),
        "2" => {
            print!("Enter your user ID: ");
            io::stdout().flush()?;

            let mut id_input = String::new();
            io::stdin().read_line(&mut id_input)?;
            identity.initialize_join(UserId::parse(id_input.trim())?)
        }
        _ => bail!("Invalid choice. Please run the command again and enter 1 or 2."),
    }
}

/// Show the user id and how to use it on another device
pub fn show_device(config: Config, output: &Output) -> Result<()> {
    let identity = Identity::with_config(config);
    let Some(user_id) = identity.current()? else {
        bail!("Not initialized. Run `stockroom init` first.");
    };

    if output.is_json() {
        println!(
            "{}",
            serde_json::json!({
                "user_id": user_id.to_string(),
                "document_id": user_id.to_bs58check(),
                "document_url": user_id.to_url(),
                "namespace": user_id.namespace()
            })
        );
    } else if output.is_quiet() {
        println!("{}", user_id);
    } else {
        println!();
        println!("User ID:       {}", user_id);
        println!("Namespace:     {}", user_id.namespace());
        println!("Automerge URL: {}", user_id.to_url());
        println!();
        println!("Use this ID to set up Stockroom on another device:");
        println!("  stockroom init --join {}", user_id);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputFormat;
    use tempfile::TempDir;

    fn config(temp_dir: &TempDir) -> Config {
        Config {
            data_dir: temp_dir.path().to_path_buf(),
            ..Default::default()
        }
    }

    #[test]
    fn test_init_join_then_show() {
        let temp_dir = TempDir::new().unwrap();
        let output = Output::new(OutputFormat::Quiet);
        let user_id = UserId::new();

        init(config(&temp_dir), false, Some(user_id.to_string()), &output).unwrap();

        let current = Identity::with_config(config(&temp_dir)).current().unwrap();
        assert_eq!(current, Some(user_id));
        show_device(config(&temp_dir), &output).unwrap();
    }

    #[test]
    fn test_init_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let output = Output::new(OutputFormat::Quiet);

        init(config(&temp_dir), true, None, &output).unwrap();
        let first = Identity::with_config(config(&temp_dir)).current().unwrap();
        init(config(&temp_dir), true, None, &output).unwrap();
        let second = Identity::with_config(config(&temp_dir)).current().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_join_rejects_garbage() {
        let temp_dir = TempDir::new().unwrap();
        let output = Output::new(OutputFormat::Quiet);
        assert!(init(config(&temp_dir), false, Some("not-an-id".to_string()), &output).is_err());
    }

    #[test]
    fn test_show_requires_init() {
        let temp_dir = TempDir::new().unwrap();
        let output = Output::new(OutputFormat::Quiet);
        assert!(show_device(config(&temp_dir), &output).is_err());
    }
}
