//! Store configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Subdirectory of the base directory holding the record index.
pub const DIR_DATABASE: &str = "db";

/// Subdirectory of the base directory holding the blob files.
pub const DIR_STORAGE: &str = "data";

/// File name of the redb database inside [`DIR_DATABASE`].
pub const INDEX_FILE: &str = "index.redb";

/// Default interval between two expiry sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Shortest interval the reaper accepts; anything below is raised to this.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Configuration for opening a [`Store`](crate::Store).
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Base directory; `db/` and `data/` are created below it
    pub base_dir: PathBuf,

    /// Delete expired items on read and run the background reaper
    pub auto_cleanup: bool,

    /// Interval between two reaper sweeps (default: 60s)
    pub sweep_interval: Duration,

    /// Remove orphan blobs and dangling records while opening (default: on)
    pub reconcile_on_open: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("store"),
            auto_cleanup: true,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            reconcile_on_open: true,
        }
    }
}

impl StoreConfig {
    /// Default configuration rooted at `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_auto_cleanup(mut self, auto_cleanup: bool) -> Self {
        self.auto_cleanup = auto_cleanup;
        self
    }

    /// Sets the reaper interval, raised to at least [`MIN_SWEEP_INTERVAL`].
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval.max(MIN_SWEEP_INTERVAL);
        self
    }

    pub fn with_reconcile_on_open(mut self, reconcile: bool) -> Self {
        self.reconcile_on_open = reconcile;
        self
    }

    /// The record index directory.
    pub fn database_dir(&self) -> PathBuf {
        self.base_dir.join(DIR_DATABASE)
    }

    /// The blob directory.
    pub fn storage_dir(&self) -> PathBuf {
        self.base_dir.join(DIR_STORAGE)
    }

    /// The redb database file.
    pub fn index_path(&self) -> PathBuf {
        self.database_dir().join(INDEX_FILE)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let config = StoreConfig::new("/srv/keepbox");

        assert_eq!(config.database_dir(), PathBuf::from("/srv/keepbox/db"));
        assert_eq!(config.storage_dir(), PathBuf::from("/srv/keepbox/data"));
        assert_eq!(
            config.index_path(),
            PathBuf::from("/srv/keepbox/db/index.redb")
        );
    }

    #[test]
    fn test_defaults_and_builders() {
        let config = StoreConfig::new("x");
        assert!(config.auto_cleanup);
        assert!(config.reconcile_on_open);
        assert_eq!(config.sweep_interval, Duration::from_secs(60));

        let config = config
            .with_auto_cleanup(false)
            .with_sweep_interval(Duration::from_millis(20))
            .with_reconcile_on_open(false);
        assert!(!config.auto_cleanup);
        assert!(!config.reconcile_on_open);
        assert_eq!(config.sweep_interval, Duration::from_millis(20));
    }

    #[test]
    fn test_zero_sweep_interval_is_raised() {
        let config = StoreConfig::new("x").with_sweep_interval(Duration::ZERO);
        assert_eq!(config.sweep_interval, MIN_SWEEP_INTERVAL);
    }
}
