//! File storage for task attachments.
//!
//! `BlobStore` is the seam the engine talks to; `DiskStore` keeps blobs as
//! plain files under one upload directory. A location handed out by `put` is
//! the only thing callers keep, and is all `get` and `delete` accept.

use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BlobError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("invalid blob key: {0:?}")]
    InvalidKey(String),
}

pub trait BlobStore: Send + Sync {
    /// Store `data` under `name`, returning the location to keep. Overwrites.
    fn put(&self, name: &str, data: &[u8]) -> Result<String, BlobError>;

    /// Read a blob. `None` if nothing is stored at `location`.
    fn get(&self, location: &str) -> Result<Option<Vec<u8>>, BlobError>;

    /// Remove a blob. Missing blobs are reported as [`BlobError::NotFound`].
    fn delete(&self, location: &str) -> Result<(), BlobError>;
}

/// Blob store rooted at a local directory. Locations are file names relative
/// to the root; anything that would escape it is rejected.
pub struct DiskStore {
    base_dir: PathBuf,
}

impl DiskStore {
    /// Open a store at `base_dir`, creating the directory if needed.
    pub fn open(base_dir: impl AsRef<Path>) -> Result<Self, BlobError> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir).map_err(|e| BlobError::Io(e.to_string()))?;
        Ok(DiskStore { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, BlobError> {
        let rel = Path::new(key);
        let plain = !key.is_empty()
            && rel
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !plain {
            return Err(BlobError::InvalidKey(key.to_string()));
        }
        Ok(self.base_dir.join(rel))
    }
}

impl BlobStore for DiskStore {
    fn put(&self, name: &str, data: &[u8]) -> Result<String, BlobError> {
        let path = self.resolve(name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| BlobError::Io(e.to_string()))?;
        }
        fs::write(&path, data).map_err(|e| BlobError::Io(e.to_string()))?;
        Ok(name.to_string())
    }

    fn get(&self, location: &str) -> Result<Option<Vec<u8>>, BlobError> {
        let path = self.resolve(location)?;
        match fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BlobError::Io(e.to_string())),
        }
    }

    fn delete(&self, location: &str) -> Result<(), BlobError> {
        let path = self.resolve(location)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(BlobError::NotFound(location.to_string())),
            Err(e) => Err(BlobError::Io(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::open(dir.path().join("uploads")).unwrap();

        let loc = store.put("abc_report.pdf", b"%PDF-1.4").unwrap();
        assert_eq!(store.get(&loc).unwrap().as_deref(), Some(&b"%PDF-1.4"[..]));
        assert!(store.base_dir().join("abc_report.pdf").is_file());

        store.delete(&loc).unwrap();
        assert_eq!(store.get(&loc).unwrap(), None);
    }

    #[test]
    fn deleting_missing_blob_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::open(dir.path()).unwrap();
        assert!(matches!(store.delete("nope.pdf"), Err(BlobError::NotFound(_))));
    }

    #[test]
    fn keys_cannot_escape_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::open(dir.path()).unwrap();
        for key in ["", "../secret", "/etc/passwd", "a/../../b"] {
            assert!(
                matches!(store.put(key, b"x"), Err(BlobError::InvalidKey(_))),
                "{key:?}"
            );
        }
    }
}
