//! In-memory record index.

use super::{IndexError, RecordIndex};
use crate::item::Item;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// HashMap-based record index.
///
/// Nothing survives a restart. Intended for tests and for embedding the store
/// where persistence of metadata is handled elsewhere.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    records: RwLock<HashMap<String, Item>>,
    closed: AtomicBool,
}

impl MemoryIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns true if no records are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Item>> {
        self.records.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Item>> {
        self.records.write().unwrap_or_else(|e| e.into_inner())
    }

    fn ensure_open(&self) -> Result<(), IndexError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(IndexError::Closed);
        }
        Ok(())
    }
}

impl RecordIndex for MemoryIndex {
    fn get(&self, id: &str) -> Result<Option<Item>, IndexError> {
        self.ensure_open()?;
        Ok(self.read().get(id).cloned())
    }

    fn insert(&self, item: &Item) -> Result<(), IndexError> {
        self.ensure_open()?;
        let mut records = self.write();
        if records.contains_key(&item.id) {
            return Err(IndexError::KeyExists(item.id.clone()));
        }
        records.insert(item.id.clone(), item.clone());
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<bool, IndexError> {
        self.ensure_open()?;
        Ok(self.write().remove(id).is_some())
    }

    fn find_expired_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Item>, IndexError> {
        self.ensure_open()?;
        let mut expired: Vec<Item> = self
            .read()
            .values()
            .filter(|item| item.expires < cutoff)
            .cloned()
            .collect();
        expired.sort_by(|a, b| a.expires.cmp(&b.expires));
        Ok(expired)
    }

    fn ids(&self) -> Result<Vec<String>, IndexError> {
        self.ensure_open()?;
        Ok(self.read().keys().cloned().collect())
    }

    fn close(&self) -> Result<(), IndexError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn item(id: &str, expires_in: Duration) -> Item {
        let mut item = Item::expiring_in(expires_in);
        item.id = id.to_string();
        item
    }

    #[test]
    fn test_insert_get_delete() {
        let index = MemoryIndex::new();
        let stored = item("abc", Duration::hours(1));

        index.insert(&stored).unwrap();
        assert_eq!(index.get("abc").unwrap(), Some(stored));
        assert_eq!(index.len(), 1);

        assert!(index.delete("abc").unwrap());
        assert!(!index.delete("abc").unwrap()); // Already deleted
        assert!(index.get("abc").unwrap().is_none());
    }

    #[test]
    fn test_insert_refuses_existing_key() {
        let index = MemoryIndex::new();
        index.insert(&item("abc", Duration::hours(1))).unwrap();

        let err = index.insert(&item("abc", Duration::hours(2))).unwrap_err();
        assert!(matches!(err, IndexError::KeyExists(id) if id == "abc"));
    }

    #[test]
    fn test_find_expired_before() {
        let index = MemoryIndex::new();
        index.insert(&item("old", Duration::hours(-2))).unwrap();
        index.insert(&item("stale", Duration::minutes(-1))).unwrap();
        index.insert(&item("fresh", Duration::hours(1))).unwrap();

        let expired = index.find_expired_before(Utc::now()).unwrap();
        let ids: Vec<&str> = expired.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["old", "stale"]);
    }

    #[test]
    fn test_closed_index_refuses_calls() {
        let index = MemoryIndex::new();
        index.close().unwrap();

        assert!(matches!(index.get("abc"), Err(IndexError::Closed)));
        assert!(matches!(index.ids(), Err(IndexError::Closed)));
    }
}
