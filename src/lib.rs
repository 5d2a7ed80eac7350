//! # keepbox - A Small Local Content Store with Expiry
//!
//! keepbox stores uploads as a pair: a metadata record in an embedded index
//! and a blob file holding the payload. Every item carries an expiry time and
//! disappears after it, either when somebody reads it or when the background
//! reaper gets to it. It is the persistence layer behind a file sharing
//! service, and nothing more: single process, single directory.
//!
//! ## Features
//!
//! - **Short IDs**: 32 random bits rendered as base58, collision-checked
//! - **Paired Storage**: a record in redb plus one file per item on disk
//! - **TTL Support**: items expire at an absolute timestamp
//! - **Crash Tolerant**: failed writes roll back; orphans are reconciled on open
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              keepbox                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────────────────────────────────────┐     │
//! │  │     ID      │───>│                   Store                     │     │
//! │  │  Allocator  │    │                                             │     │
//! │  └─────────────┘    │  ┌───────────────────┐  ┌────────────────┐  │     │
//! │                     │  │   RecordIndex     │  │   BlobStore    │  │     │
//! │                     │  │ (redb / memory)   │  │  (one file per │  │     │
//! │                     │  │                   │  │      item)     │  │     │
//! │                     │  └───────────────────┘  └────────────────┘  │     │
//! │                     └─────────────────────────────────────────────┘     │
//! │                                               ▲                         │
//! │                                               │                         │
//! │                     ┌─────────────────────────┴───────────────────────┐ │
//! │                     │                Reaper                           │ │
//! │                     │      (Background Tokio Task)                    │ │
//! │                     └─────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use keepbox::{Item, Store};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Open the store with lazy and background expiry
//!     let store = Store::open("./store", true)?;
//!
//!     // Keep an upload for one day
//!     let item = Item::expiring_in(chrono::Duration::days(1)).with_filename("report.pdf");
//!     let id = store.put(item, std::fs::File::open("report.pdf")?)?;
//!     println!("stored as {}", id);
//!
//!     // Read it back
//!     let item = store.get(&id)?;
//!     let mut file = store.get_file(&item.id)?;
//!     std::io::copy(&mut file, &mut std::io::stdout())?;
//!
//!     store.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`storage`]: the `Store`, the blob directory and the expiry reaper
//! - [`index`]: the record index trait and its redb and in-memory backends
//! - [`id`]: short ID encoding and collision-checked allocation
//! - [`item`]: the stored metadata record
//! - [`config`]: store configuration and directory layout
//!
//! ## Design Highlights
//!
//! ### Record First, Blob Second
//!
//! The record is the existence marker. `put` inserts it before writing the
//! blob and removes it again if the write fails; `delete` removes it before
//! the blob. An interrupted delete can leave an orphan file, never a record
//! without data, and orphans are removed the next time the store opens.
//!
//! ### Lazy + Active Expiry
//!
//! Items expire in two ways:
//! 1. **Lazy**: `get` deletes an expired item and reports it as not found
//! 2. **Active**: a background task periodically deletes expired items
//!
//! This keeps disk usage bounded even for uploads nobody fetches again.

pub mod config;
pub mod error;
pub mod id;
pub mod index;
pub mod item;
pub mod storage;

// Re-export commonly used types for convenience
pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use index::{IndexError, MemoryIndex, RecordIndex, RedbIndex};
pub use item::Item;
pub use storage::{Reaper, ReaperConfig, Store};

/// Version of keepbox
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
