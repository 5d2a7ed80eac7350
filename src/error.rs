//! Error types for the store.
//!
//! `NotFound` is the only error callers should treat as routine. Everything
//! else indicates a degraded store and should be logged or alerted on.

use crate::index::IndexError;
use thiserror::Error;

/// Errors returned by [`Store`](crate::Store) operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No live record exists for this ID (absent, or expired during the call)
    #[error("no item found for id {0:?}")]
    NotFound(String),

    /// The ID allocator drew only IDs that are already taken
    #[error("failed to allocate an id after {attempts} attempts")]
    AllocationExhausted { attempts: usize },

    /// The record index failed
    #[error("record index error: {0}")]
    Index(#[from] IndexError),

    /// Filesystem failure on a blob file or a store directory
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The string cannot be an ID issued by this store
    #[error("invalid item id {0:?}")]
    InvalidId(String),

    /// The OS random source failed
    #[error("entropy source failed: {0}")]
    Entropy(#[from] rand::Error),

    /// Background cleanup was requested outside of a Tokio runtime
    #[error("no tokio runtime available for the expiry reaper: {0}")]
    Runtime(#[from] tokio::runtime::TryCurrentError),

    /// The store has already been closed
    #[error("store is closed")]
    Closed,
}

impl StoreError {
    /// Returns `true` for the routine "no such item" case.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_not_found() {
        assert!(StoreError::NotFound("abc".into()).is_not_found());
        assert!(!StoreError::Closed.is_not_found());
        assert!(!StoreError::AllocationExhausted { attempts: 32 }.is_not_found());
    }

    #[test]
    fn test_index_error_converts() {
        let err: StoreError = IndexError::Closed.into();
        assert!(matches!(err, StoreError::Index(IndexError::Closed)));
        assert_eq!(err.to_string(), "record index error: record index is closed");
    }
}
