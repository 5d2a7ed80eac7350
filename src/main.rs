//! keepbox - command line access to a store directory
//!
//! Puts, reads and deletes items, runs expiry sweeps, and can keep a store
//! open with its background reaper until interrupted.

use anyhow::Context;
use chrono::Duration as ChronoDuration;
use clap::{Parser, Subcommand};
use keepbox::{Item, Store, StoreConfig};
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Command line arguments
#[derive(Debug, Parser)]
#[command(name = "keepbox", version, about = "A small local content store with expiry")]
struct Cli {
    /// Base directory of the store
    #[arg(short, long, default_value = "store", env = "KEEPBOX_DIR")]
    dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Store a file and print its ID
    Put {
        /// File to store
        file: PathBuf,

        /// Seconds until the item expires
        #[arg(long, default_value_t = 86_400)]
        ttl: i64,

        /// MIME type recorded with the item
        #[arg(long)]
        content_type: Option<String>,
    },

    /// Print an item's record as JSON
    Get { id: String },

    /// Write an item's payload to stdout
    Cat { id: String },

    /// Delete an item
    Rm { id: String },

    /// Delete all expired items once
    Sweep,

    /// Keep the store open with the expiry reaper running until Ctrl+C
    Serve {
        /// Seconds between two sweeps
        #[arg(long, default_value_t = 60)]
        interval: u64,
    },
}

impl Cli {
    /// Store configuration for this invocation
    fn store_config(&self) -> StoreConfig {
        let config = StoreConfig::new(&self.dir);
        match self.command {
            Command::Serve { interval } => {
                config.with_sweep_interval(Duration::from_secs(interval.max(1)))
            }
            _ => config,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up logging; stdout is reserved for command output
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let store = Store::open_with_config(cli.store_config())
        .with_context(|| format!("failed to open store in {}", cli.dir.display()))?;

    let result = run(&store, cli.command).await;
    store.close().await.context("failed to close store")?;
    result
}

async fn run(store: &Store, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Put {
            file,
            ttl,
            content_type,
        } => {
            let payload = File::open(&file)
                .with_context(|| format!("cannot read {}", file.display()))?;

            let mut item = ChronoDuration::try_seconds(ttl)
                .and_then(Item::try_expiring_in)
                .context("ttl out of range")?;
            if let Some(name) = file.file_name().and_then(|n| n.to_str()) {
                item = item.with_filename(name);
            }
            if let Some(content_type) = content_type {
                item = item.with_content_type(content_type);
            }

            let id = store.put(item, payload)?;
            println!("{}", id);
        }

        Command::Get { id } => {
            let item = store.get(&id)?;
            println!("{}", serde_json::to_string_pretty(&item)?);
        }

        Command::Cat { id } => {
            // Expiry is checked by get, not by get_file
            store.get(&id)?;
            let mut file = store.get_file(&id)?;
            let mut stdout = io::stdout().lock();
            io::copy(&mut file, &mut stdout)?;
            stdout.flush()?;
        }

        Command::Rm { id } => {
            store.delete(&id)?;
            info!(id = %id, "Item deleted");
        }

        Command::Sweep => {
            let removed = store.sweep()?;
            println!("{}", removed);
        }

        Command::Serve { .. } => {
            info!("Store open, press Ctrl+C to stop");
            signal::ctrl_c()
                .await
                .context("failed to install Ctrl+C handler")?;
            info!("Shutdown signal received, stopping...");
        }
    }

    Ok(())
}
