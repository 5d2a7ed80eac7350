//! Filesystem blob store: one file per item, named by its ID.

use crate::error::{Result, StoreError};
use crate::id::is_valid_id;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directory of payload files.
#[derive(Debug, Clone)]
pub struct BlobStore {
    dir: PathBuf,
}

impl BlobStore {
    /// Uses `dir` as the blob directory. The directory must already exist.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The blob directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        if !is_valid_id(id) {
            return Err(StoreError::InvalidId(id.to_string()));
        }
        Ok(self.dir.join(id))
    }

    /// Creates (or truncates) the blob for `id` and copies all of `payload`
    /// into it. Returns the number of bytes written.
    ///
    /// The file is flushed and synced before returning. On failure a partial
    /// file may be left behind; see [`BlobStore::remove`].
    pub fn write<R: Read>(&self, id: &str, payload: &mut R) -> Result<u64> {
        let path = self.path_for(id)?;
        let file = File::create(&path)?;

        let mut writer = BufWriter::new(file);
        let written = io::copy(payload, &mut writer)?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;

        debug!(id = %id, bytes = written, "Blob written");
        Ok(written)
    }

    /// Opens the blob for `id` for reading.
    pub fn open(&self, id: &str) -> Result<File> {
        let path = self.path_for(id)?;
        Ok(File::open(path)?)
    }

    /// Checks whether a blob file exists for `id`.
    pub fn exists(&self, id: &str) -> bool {
        self.path_for(id).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Removes the blob for `id`.
    ///
    /// Returns `false` if there was no such file.
    pub fn remove(&self, id: &str) -> Result<bool> {
        let path = self.path_for(id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Lists the IDs of all blob files. Files whose names are not valid IDs
    /// are ignored.
    pub fn ids(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if is_valid_id(name) {
                    ids.push(name.to_string());
                }
            }
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::encode_id;
    use tempfile::TempDir;

    fn blob_store() -> (TempDir, BlobStore) {
        let dir = TempDir::new().unwrap();
        let blobs = BlobStore::new(dir.path());
        (dir, blobs)
    }

    #[test]
    fn test_write_open_remove() {
        let (_dir, blobs) = blob_store();
        let id = encode_id(&[9, 8, 7, 6]);

        let written = blobs.write(&id, &mut &b"hello"[..]).unwrap();
        assert_eq!(written, 5);
        assert!(blobs.exists(&id));

        let mut contents = String::new();
        blobs.open(&id).unwrap().read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "hello");

        assert!(blobs.remove(&id).unwrap());
        assert!(!blobs.remove(&id).unwrap()); // Already removed
        assert!(!blobs.exists(&id));
    }

    #[test]
    fn test_open_missing_is_io_error() {
        let (_dir, blobs) = blob_store();
        let err = blobs.open(&encode_id(&[1, 1, 1, 1])).unwrap_err();
        assert!(matches!(err, StoreError::Io(e) if e.kind() == io::ErrorKind::NotFound));
    }

    #[test]
    fn test_rejects_invalid_ids() {
        let (dir, blobs) = blob_store();
        fs::write(dir.path().join("keep.txt"), b"x").unwrap();

        assert!(matches!(
            blobs.write("../escape", &mut &b"x"[..]),
            Err(StoreError::InvalidId(_))
        ));
        assert!(matches!(blobs.remove("keep.txt"), Err(StoreError::InvalidId(_))));
        assert!(dir.path().join("keep.txt").exists());
    }

    #[test]
    fn test_ids_ignores_foreign_files() {
        let (dir, blobs) = blob_store();
        let id = encode_id(&[1, 2, 3, 4]);
        blobs.write(&id, &mut &b"data"[..]).unwrap();
        fs::write(dir.path().join("notes.md"), b"not a blob").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();

        assert_eq!(blobs.ids().unwrap(), vec![id]);
    }
}
