//! Storage Module
//!
//! This module provides the store itself: the blob directory, the `Store`
//! façade tying it to the record index, and the background expiry reaper.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Store                              │
//! │   put / get / get_file / delete / sweep / close             │
//! │                                                             │
//! │   ┌──────────────────┐            ┌──────────────────┐      │
//! │   │   RecordIndex    │            │    BlobStore     │      │
//! │   │  (db/index.redb) │            │   (data/<id>)    │      │
//! │   └──────────────────┘            └──────────────────┘      │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!                            │ unified delete path
//!              ┌─────────────┴─────────────┐
//!              │          Reaper           │
//!              │  (Background Tokio Task)  │
//!              └───────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Paired Writes**: every record has exactly one blob file
//! - **Rollback**: a failed payload write removes the record again
//! - **Lazy Expiry**: expired items are deleted when read
//! - **Active Expiry**: the reaper removes expired items nobody reads
//! - **Reconciliation**: orphans left by a crash are removed on open

pub mod blob;
pub mod expiry;
pub mod store;

// Re-export commonly used types
pub use blob::BlobStore;
pub use expiry::{ExpirySweep, Reaper, ReaperConfig};
pub use store::Store;
