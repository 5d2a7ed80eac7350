//! The Store façade.
//!
//! A store pairs every record in the [`RecordIndex`] with one blob file in
//! the [`BlobStore`]. Neither side alone is authoritative for the payload,
//! but the record is the existence marker: an ID is live exactly while its
//! record is in the index.
//!
//! ## Write and delete ordering
//!
//! ```text
//! put:     allocate id ──> insert record ──> write blob
//!                                 ▲               │ fails
//!                                 └── rollback ◄──┘
//!
//! delete:  remove record ──> remove blob
//! ```
//!
//! A crash between the two delete steps leaves an orphan blob, never a record
//! pointing at nothing. Orphans and dangling records are both cleaned up by
//! the reconciliation pass that runs while the store is opened.
//!
//! ## Expiry
//!
//! With `auto_cleanup` on, [`Store::get`] deletes a stale item before
//! reporting [`StoreError::NotFound`], and a background [`Reaper`] sweeps the
//! index for expired records once per interval. Both go through the same
//! delete path, so either may find that the other got there first; that
//! case is not an error.

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::id::{allocate_id, is_valid_id};
use crate::index::{RecordIndex, RedbIndex};
use crate::item::Item;
use crate::storage::blob::BlobStore;
use crate::storage::expiry::{ExpirySweep, Reaper, ReaperConfig};
use chrono::Utc;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

/// What the reconciliation pass removed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ReconcileReport {
    /// Blob files without a record
    pub orphan_blobs: usize,
    /// Records without a blob file
    pub dangling_records: usize,
}

/// State shared between the foreground API and the reaper task.
pub(crate) struct StoreInner {
    index: Arc<dyn RecordIndex>,
    blobs: BlobStore,
    cleanup: bool,
    closed: AtomicBool,
}

impl StoreInner {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    /// The unified delete path: record first, then blob.
    ///
    /// Whatever is already gone counts as deleted.
    fn delete(&self, id: &str) -> Result<()> {
        debug!(id = %id, "Requested deletion of item");

        if !is_valid_id(id) {
            return Err(StoreError::InvalidId(id.to_string()));
        }

        let had_record = self.index.delete(id).map_err(|e| {
            error!(id = %id, error = %e, "Failed to delete item from index");
            StoreError::from(e)
        })?;

        let had_blob = self.blobs.remove(id).map_err(|e| {
            error!(id = %id, error = %e, "Failed to delete item's blob file");
            e
        })?;

        match (had_record, had_blob) {
            (true, false) => warn!(id = %id, "Deleted item had no blob file"),
            (false, _) => debug!(id = %id, had_blob, "Item was already deleted"),
            (true, true) => {}
        }

        Ok(())
    }

    /// Deletes every record whose expiry lies in the past. The first failing
    /// deletion aborts the pass.
    fn delete_expired(&self) -> Result<usize> {
        let expired = self.index.find_expired_before(Utc::now())?;

        for item in &expired {
            debug!(id = %item.id, expires = %item.expires, "Delete expired item");
            self.delete(&item.id)?;
        }

        Ok(expired.len())
    }

    /// Restores the record/blob pairing after an unclean shutdown.
    ///
    /// Must not run while a `put` is in flight: a record whose blob is still
    /// being written would count as dangling.
    fn reconcile(&self) -> Result<ReconcileReport> {
        let records: HashSet<String> = self.index.ids()?.into_iter().collect();
        let blobs: HashSet<String> = self.blobs.ids()?.into_iter().collect();
        let mut report = ReconcileReport::default();

        for id in blobs.difference(&records) {
            warn!(id = %id, "Removing orphan blob file");
            self.blobs.remove(id)?;
            report.orphan_blobs += 1;
        }

        for id in records.difference(&blobs) {
            warn!(id = %id, "Removing record without blob file");
            self.index.delete(id)?;
            report.dangling_records += 1;
        }

        Ok(report)
    }
}

impl ExpirySweep for StoreInner {
    fn sweep_expired(&self) -> Result<usize> {
        self.delete_expired()
    }
}

/// Metadata records plus their blob files, with TTL expiry.
///
/// `Store` is `Send + Sync`; share it behind an `Arc`. All operations except
/// [`Store::close`] are synchronous and block on storage I/O.
///
/// # Example
///
/// ```no_run
/// use keepbox::{Item, Store};
///
/// # async fn demo() -> keepbox::Result<()> {
/// let store = Store::open("/var/lib/keepbox", true)?;
///
/// let item = Item::expiring_in(chrono::Duration::hours(24)).with_filename("notes.txt");
/// let id = store.put(item, &b"hello"[..])?;
///
/// let item = store.get(&id)?;
/// assert_eq!(item.filename.as_deref(), Some("notes.txt"));
///
/// store.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct Store {
    inner: Arc<StoreInner>,

    /// Present while the background reaper runs
    reaper: Mutex<Option<Reaper>>,

    /// Set by the first call to `close`
    closing: AtomicBool,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("blob_dir", &self.inner.blobs.dir())
            .field("cleanup", &self.inner.cleanup)
            .field("closed", &self.inner.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl Store {
    /// Opens or initializes a store in `base_dir`.
    ///
    /// # Arguments
    ///
    /// * `base_dir` - Directory holding `db/` and `data/`; created if missing
    /// * `auto_cleanup` - Delete expired items on [`Store::get`] and run the
    ///   background reaper. Must then be called from within a Tokio runtime.
    ///
    /// # Returns
    ///
    /// The open store, or an error if the directories, the record index or
    /// the runtime handle are not available.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use keepbox::Store;
    ///
    /// // No reaper, so no runtime needed
    /// let store = Store::open("/tmp/keepbox", false)?;
    /// # Ok::<(), keepbox::StoreError>(())
    /// ```
    pub fn open(base_dir: impl AsRef<Path>, auto_cleanup: bool) -> Result<Self> {
        let config = StoreConfig::new(base_dir.as_ref()).with_auto_cleanup(auto_cleanup);
        Self::open_with_config(config)
    }

    /// Opens a store backed by the redb record index under `config.base_dir`.
    pub fn open_with_config(config: StoreConfig) -> Result<Self> {
        info!(directory = %config.base_dir.display(), "Opening store");

        create_dirs(&config)?;
        let index = RedbIndex::open(config.index_path())?;

        Self::open_with_index(config, Arc::new(index))
    }

    /// Opens a store on top of an existing record index.
    ///
    /// Only the blob directory is taken from `config`; the index is used as
    /// given.
    pub fn open_with_index(config: StoreConfig, index: Arc<dyn RecordIndex>) -> Result<Self> {
        let handle = if config.auto_cleanup {
            Some(Handle::try_current()?)
        } else {
            None
        };

        create_dirs(&config)?;

        let inner = Arc::new(StoreInner {
            index,
            blobs: BlobStore::new(config.storage_dir()),
            cleanup: config.auto_cleanup,
            closed: AtomicBool::new(false),
        });

        if config.reconcile_on_open {
            let report = inner.reconcile()?;
            if report != ReconcileReport::default() {
                info!(
                    orphan_blobs = report.orphan_blobs,
                    dangling_records = report.dangling_records,
                    "Store reconciled"
                );
            }
        }

        let reaper = handle.map(|handle| {
            let target: Arc<dyn ExpirySweep> = inner.clone();
            let config = ReaperConfig {
                interval: config.sweep_interval,
            };
            Reaper::start(&handle, Arc::downgrade(&target), config)
        });

        Ok(Self {
            inner,
            reaper: Mutex::new(reaper),
            closing: AtomicBool::new(false),
        })
    }

    /// Stores a new item and its payload. Returns the assigned ID.
    ///
    /// Any `id` already set on `item` is replaced. `payload` is consumed and
    /// dropped (closed) whether or not the call succeeds. If the payload
    /// cannot be written, the record is rolled back and the I/O error
    /// returned.
    ///
    /// An item that is already expired when it is put can be removed by the
    /// reaper between the record insert and the blob write. `put` still
    /// returns its ID, and the blob stays behind as an orphan until the next
    /// reconciliation on open.
    pub fn put<R: Read>(&self, mut item: Item, mut payload: R) -> Result<String> {
        self.inner.ensure_open()?;
        debug!("Requested insertion of item");

        let id = allocate_id(self.inner.index.as_ref()).map_err(|e| {
            error!(error = %e, "Failed to create an id for a new item");
            e
        })?;

        item.id = id.clone();
        debug!(id = %id, "Insert item with assigned id");

        if let Err(e) = self.inner.index.insert(&item) {
            error!(id = %id, error = %e, "Failed to insert item into index");
            return Err(e.into());
        }

        if let Err(e) = self.inner.blobs.write(&id, &mut payload) {
            error!(id = %id, error = %e, "Failed to write blob file, rolling back");
            self.rollback_put(&id);
            return Err(e);
        }

        Ok(id)
    }

    fn rollback_put(&self, id: &str) {
        if let Err(e) = self.inner.index.delete(id) {
            error!(id = %id, error = %e, "Rollback failed to remove record");
        }
        if let Err(e) = self.inner.blobs.remove(id) {
            error!(id = %id, error = %e, "Rollback failed to remove partial blob");
        }
    }

    /// Gets an item's record by ID. The payload is read with
    /// [`Store::get_file`].
    ///
    /// With cleanup enabled, an item whose expiry is at or before now is
    /// deleted and reported as [`StoreError::NotFound`].
    pub fn get(&self, id: &str) -> Result<Item> {
        self.inner.ensure_open()?;
        debug!(id = %id, "Requested item from store");

        if !is_valid_id(id) {
            return Err(StoreError::NotFound(id.to_string()));
        }

        let item = match self.inner.index.get(id) {
            Ok(Some(item)) => item,
            Ok(None) => {
                debug!(id = %id, "Requested item was not found");
                return Err(StoreError::NotFound(id.to_string()));
            }
            Err(e) => {
                error!(id = %id, error = %e, "Requesting item failed");
                return Err(e.into());
            }
        };

        if self.inner.cleanup && item.is_expired() {
            info!(id = %id, expires = %item.expires, "Requested item is expired, will be deleted");

            if let Err(e) = self.inner.delete(id) {
                error!(id = %id, error = %e, "Failed to delete expired item");
                return Err(e);
            }
            return Err(StoreError::NotFound(id.to_string()));
        }

        Ok(item)
    }

    /// Opens an item's blob file for reading.
    ///
    /// No expiry check happens here; call [`Store::get`] first for that.
    pub fn get_file(&self, id: &str) -> Result<File> {
        self.inner.ensure_open()?;
        self.inner.blobs.open(id)
    }

    /// Deletes an item: its record, then its blob file.
    ///
    /// Deleting an ID that is already gone succeeds.
    pub fn delete(&self, id: &str) -> Result<()> {
        self.inner.ensure_open()?;
        self.inner.delete(id)
    }

    /// Runs one expiry sweep right now. Returns how many items were removed.
    pub fn sweep(&self) -> Result<usize> {
        self.inner.ensure_open()?;
        self.inner.delete_expired()
    }

    /// Returns true while the background reaper is running.
    pub fn has_reaper(&self) -> bool {
        self.reaper
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Stops the reaper, waits for it to exit, then closes the record index.
    ///
    /// A second call returns [`StoreError::Closed`], as does every other
    /// operation once this one has finished.
    pub async fn close(&self) -> Result<()> {
        if self.closing.swap(true, Ordering::AcqRel) {
            return Err(StoreError::Closed);
        }
        info!("Closing store");

        let reaper = self.reaper.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(reaper) = reaper {
            reaper.stop().await;
        }

        self.inner.closed.store(true, Ordering::Release);
        self.inner.index.close()?;
        Ok(())
    }
}

impl Drop for Store {
    /// Without a prior `close`, signals the reaper and closes the record index
    /// so the store directory can be opened again right away.
    fn drop(&mut self) {
        if self.closing.swap(true, Ordering::AcqRel) {
            return;
        }

        // Dropping the handle sends the stop signal
        drop(self.reaper.get_mut().unwrap_or_else(|e| e.into_inner()).take());

        self.inner.closed.store(true, Ordering::Release);
        if let Err(e) = self.inner.index.close() {
            warn!(error = %e, "Failed to close record index on drop");
        }
    }
}

/// Creates the base, index and blob directories if they are missing.
fn create_dirs(config: &StoreConfig) -> Result<()> {
    for dir in [
        config.base_dir.clone(),
        config.database_dir(),
        config.storage_dir(),
    ] {
        if let Err(e) = create_private_dir(&dir) {
            error!(directory = %dir.display(), error = %e, "Cannot create directory");
            return Err(e.into());
        }
    }
    Ok(())
}

fn create_private_dir(dir: &Path) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(dir)
}
