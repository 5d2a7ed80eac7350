//! Record Index
//!
//! The record index holds the metadata of every stored [`Item`], keyed by ID.
//! The store only needs a handful of capabilities from it, captured by the
//! [`RecordIndex`] trait, so any indexed key-value backend can sit underneath.
//!
//! Two backends ship with the crate:
//!
//! - [`RedbIndex`]: persistent, backed by an embedded `redb` database with a
//!   secondary expiry index for the reaper's range query.
//! - [`MemoryIndex`]: a `RwLock<HashMap>` for tests and embedding.
//!
//! ## Contract
//!
//! - Each call is atomic per key.
//! - `insert` never overwrites: an existing key yields [`IndexError::KeyExists`].
//! - `delete` of an absent key is not an error; it reports `false`.
//! - After `close`, every call fails with [`IndexError::Closed`].

pub mod embedded;
pub mod memory;

pub use self::embedded::RedbIndex;
pub use self::memory::MemoryIndex;

use crate::item::Item;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors reported by a record index backend.
#[derive(Debug, Error)]
pub enum IndexError {
    /// A record with this ID is already stored
    #[error("record already exists: {0}")]
    KeyExists(String),

    /// The index was closed
    #[error("record index is closed")]
    Closed,

    /// The embedded redb engine failed
    #[error("storage engine error: {0}")]
    Engine(#[from] redb::Error),

    /// A record could not be encoded or decoded
    #[error("record serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failure reported by some other backend
    #[error("backend error: {0}")]
    Backend(String),
}

/// The capabilities the store needs from its metadata backend.
pub trait RecordIndex: Send + Sync {
    /// Looks up a record by ID. `Ok(None)` means no such record.
    fn get(&self, id: &str) -> Result<Option<Item>, IndexError>;

    /// Stores a new record under `item.id`.
    fn insert(&self, item: &Item) -> Result<(), IndexError>;

    /// Removes a record. Returns `false` if it was already absent.
    fn delete(&self, id: &str) -> Result<bool, IndexError>;

    /// Returns every record whose expiry is strictly earlier than `cutoff`.
    fn find_expired_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Item>, IndexError>;

    /// Returns the IDs of all stored records.
    fn ids(&self) -> Result<Vec<String>, IndexError>;

    /// Releases the backend's resources.
    fn close(&self) -> Result<(), IndexError>;
}
