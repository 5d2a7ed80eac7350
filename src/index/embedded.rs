//! Persistent record index backed by an embedded redb database.
//!
//! Two tables are kept in lockstep inside every write transaction:
//!
//! ```text
//! items            : id                 -> JSON-encoded Item
//! items_by_expiry  : (expires_us, id)   -> ()
//! ```
//!
//! The second table is ordered by expiry, so "everything that expired before
//! t" is a single range scan instead of a full table walk.

use super::{IndexError, RecordIndex};
use crate::item::Item;
use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, info};

const ITEMS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("items");
const EXPIRY_TABLE: TableDefinition<(i64, &str), ()> = TableDefinition::new("items_by_expiry");

fn engine<E: Into<redb::Error>>(err: E) -> IndexError {
    IndexError::Engine(err.into())
}

#[inline]
fn expiry_key(expires: &DateTime<Utc>) -> i64 {
    expires.timestamp_micros()
}

/// Record index stored in a single redb file.
pub struct RedbIndex {
    /// `None` once the index has been closed
    db: RwLock<Option<Database>>,
    path: PathBuf,
}

impl std::fmt::Debug for RedbIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbIndex").field("path", &self.path).finish()
    }
}

impl RedbIndex {
    /// Opens the database file at `path`, creating it and its tables if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IndexError> {
        let path = path.as_ref().to_path_buf();
        let db = Database::create(&path).map_err(engine)?;

        let txn = db.begin_write().map_err(engine)?;
        {
            txn.open_table(ITEMS_TABLE).map_err(engine)?;
            txn.open_table(EXPIRY_TABLE).map_err(engine)?;
        }
        txn.commit().map_err(engine)?;

        info!(path = %path.display(), "Record index opened");

        Ok(Self {
            db: RwLock::new(Some(db)),
            path,
        })
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_db<T>(
        &self,
        f: impl FnOnce(&Database) -> Result<T, IndexError>,
    ) -> Result<T, IndexError> {
        let guard = self.db.read().unwrap_or_else(|e| e.into_inner());
        let db = guard.as_ref().ok_or(IndexError::Closed)?;
        f(db)
    }
}

impl RecordIndex for RedbIndex {
    fn get(&self, id: &str) -> Result<Option<Item>, IndexError> {
        self.with_db(|db| {
            let txn = db.begin_read().map_err(engine)?;
            let items = txn.open_table(ITEMS_TABLE).map_err(engine)?;

            let found = items.get(id).map_err(engine)?;
            let item = match found {
                Some(bytes) => Some(serde_json::from_slice(bytes.value())?),
                None => None,
            };
            Ok(item)
        })
    }

    fn insert(&self, item: &Item) -> Result<(), IndexError> {
        let bytes = serde_json::to_vec(item)?;

        self.with_db(|db| {
            let txn = db.begin_write().map_err(engine)?;
            {
                let mut items = txn.open_table(ITEMS_TABLE).map_err(engine)?;
                // Dropping the uncommitted transaction aborts it
                if items.get(item.id.as_str()).map_err(engine)?.is_some() {
                    return Err(IndexError::KeyExists(item.id.clone()));
                }
                items
                    .insert(item.id.as_str(), bytes.as_slice())
                    .map_err(engine)?;

                let mut by_expiry = txn.open_table(EXPIRY_TABLE).map_err(engine)?;
                by_expiry
                    .insert((expiry_key(&item.expires), item.id.as_str()), ())
                    .map_err(engine)?;
            }
            txn.commit().map_err(engine)?;
            Ok(())
        })
    }

    fn delete(&self, id: &str) -> Result<bool, IndexError> {
        self.with_db(|db| {
            let txn = db.begin_write().map_err(engine)?;
            let removed = {
                let mut items = txn.open_table(ITEMS_TABLE).map_err(engine)?;
                let removed: Option<Item> = match items.remove(id).map_err(engine)? {
                    Some(bytes) => Some(serde_json::from_slice(bytes.value())?),
                    None => None,
                };

                if let Some(item) = &removed {
                    let mut by_expiry = txn.open_table(EXPIRY_TABLE).map_err(engine)?;
                    by_expiry
                        .remove((expiry_key(&item.expires), id))
                        .map_err(engine)?;
                }
                removed.is_some()
            };
            txn.commit().map_err(engine)?;

            if !removed {
                debug!(id = %id, "Record already absent from index");
            }
            Ok(removed)
        })
    }

    fn find_expired_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Item>, IndexError> {
        self.with_db(|db| {
            let txn = db.begin_read().map_err(engine)?;
            let by_expiry = txn.open_table(EXPIRY_TABLE).map_err(engine)?;
            let items = txn.open_table(ITEMS_TABLE).map_err(engine)?;

            let upper: (i64, &str) = (expiry_key(&cutoff), "");
            let mut expired = Vec::new();
            for entry in by_expiry.range(..upper).map_err(engine)? {
                let (key, _) = entry.map_err(engine)?;
                let (_, id) = key.value();
                if let Some(bytes) = items.get(id).map_err(engine)? {
                    expired.push(serde_json::from_slice(bytes.value())?);
                }
            }
            Ok(expired)
        })
    }

    fn ids(&self) -> Result<Vec<String>, IndexError> {
        self.with_db(|db| {
            let txn = db.begin_read().map_err(engine)?;
            let items = txn.open_table(ITEMS_TABLE).map_err(engine)?;

            let mut ids = Vec::new();
            for entry in items.iter().map_err(engine)? {
                let (key, _) = entry.map_err(engine)?;
                ids.push(key.value().to_string());
            }
            Ok(ids)
        })
    }

    fn close(&self) -> Result<(), IndexError> {
        let mut guard = self.db.write().unwrap_or_else(|e| e.into_inner());
        if guard.take().is_some() {
            info!(path = %self.path.display(), "Record index closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn item(id: &str, expires_in: Duration) -> Item {
        let mut item = Item::expiring_in(expires_in).with_filename(format!("{}.txt", id));
        item.id = id.to_string();
        item
    }

    fn open_temp() -> (TempDir, RedbIndex) {
        let dir = TempDir::new().unwrap();
        let index = RedbIndex::open(dir.path().join("index.redb")).unwrap();
        (dir, index)
    }

    #[test]
    fn test_insert_and_get() {
        let (_dir, index) = open_temp();
        let stored = item("2Ab3", Duration::hours(1));

        index.insert(&stored).unwrap();
        assert_eq!(index.get("2Ab3").unwrap(), Some(stored));
        assert!(index.get("nope").unwrap().is_none());
    }

    #[test]
    fn test_insert_refuses_existing_key() {
        let (_dir, index) = open_temp();
        let first = item("2Ab3", Duration::hours(1));
        index.insert(&first).unwrap();

        let err = index.insert(&item("2Ab3", Duration::hours(5))).unwrap_err();
        assert!(matches!(err, IndexError::KeyExists(_)));

        // The aborted insert left the original untouched
        assert_eq!(index.get("2Ab3").unwrap(), Some(first));
        assert_eq!(index.ids().unwrap().len(), 1);
    }

    #[test]
    fn test_delete() {
        let (_dir, index) = open_temp();
        index.insert(&item("2Ab3", Duration::hours(-1))).unwrap();

        assert!(index.delete("2Ab3").unwrap());
        assert!(!index.delete("2Ab3").unwrap()); // Already deleted
        assert!(index.get("2Ab3").unwrap().is_none());

        // The expiry entry went with it
        assert!(index.find_expired_before(Utc::now()).unwrap().is_empty());
    }

    #[test]
    fn test_find_expired_before_uses_cutoff() {
        let (_dir, index) = open_temp();
        index.insert(&item("old", Duration::hours(-3))).unwrap();
        index.insert(&item("stale", Duration::seconds(-5))).unwrap();
        index.insert(&item("fresh", Duration::hours(1))).unwrap();

        let expired = index.find_expired_before(Utc::now()).unwrap();
        let ids: Vec<&str> = expired.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["old", "stale"]);

        let all = index
            .find_expired_before(Utc::now() + Duration::days(1))
            .unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.redb");
        let stored = item("2Ab3", Duration::hours(1));

        {
            let index = RedbIndex::open(&path).unwrap();
            index.insert(&stored).unwrap();
            index.close().unwrap();
        }

        let index = RedbIndex::open(&path).unwrap();
        assert_eq!(index.get("2Ab3").unwrap(), Some(stored));
        assert_eq!(index.ids().unwrap(), vec!["2Ab3".to_string()]);
    }

    #[test]
    fn test_closed_index_refuses_calls() {
        let (_dir, index) = open_temp();
        index.close().unwrap();

        assert!(matches!(index.get("2Ab3"), Err(IndexError::Closed)));
        assert!(matches!(index.delete("2Ab3"), Err(IndexError::Closed)));
        assert!(matches!(
            index.insert(&item("2Ab3", Duration::hours(1))),
            Err(IndexError::Closed)
        ));
    }
}
