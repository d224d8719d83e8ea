use std::fs;
use std::path::{Path, PathBuf};

use crate::error::BlobError;
use crate::traits::BlobStore;

/// FileStore is a BlobStore implementation backed by the local filesystem.
///
/// Keys are mapped to paths under `base_dir`:
///   key "listings/8f0c….jpg" → `{base_dir}/listings/8f0c….jpg`
///
/// Parent directories are created automatically on `put`. The binary
/// serves this same directory statically, so stored keys double as the
/// relative URL paths clients fetch.
pub struct FileStore {
    base_dir: PathBuf,
}

impl FileStore {
    /// Create a new FileStore rooted at `base_dir`.
    /// The directory is created if it doesn't exist.
    pub fn open(base_dir: &Path) -> Result<Self, BlobError> {
        fs::create_dir_all(base_dir).map_err(|e| BlobError::Io(e.to_string()))?;
        Ok(Self {
            base_dir: base_dir.to_path_buf(),
        })
    }

    /// Resolve a key to a filesystem path. Rejects keys that escape base_dir.
    fn resolve(&self, key: &str) -> Result<PathBuf, BlobError> {
        // Reject empty keys and absolute paths.
        if key.is_empty() || key.starts_with('/') || key.starts_with('\\') {
            return Err(BlobError::Io(format!("invalid blob key: {:?}", key)));
        }

        let path = self.base_dir.join(key);

        // Ensure the resolved path is still under base_dir (prevent traversal).
        let canonical_base = self
            .base_dir
            .canonicalize()
            .map_err(|e| BlobError::Io(e.to_string()))?;

        // For non-existent paths, check the parent.
        let check_path = if path.exists() {
            path.canonicalize()
                .map_err(|e| BlobError::Io(e.to_string()))?
        } else if let Some(parent) = path.parent() {
            if parent.exists() {
                let canonical_parent = parent
                    .canonicalize()
                    .map_err(|e| BlobError::Io(e.to_string()))?;
                canonical_parent.join(path.file_name().unwrap_or_default())
            } else {
                // Parent doesn't exist yet — will be created on put.
                // Do a basic component check instead.
                if key.contains("..") {
                    return Err(BlobError::Io(format!(
                        "path traversal detected in key: {:?}",
                        key
                    )));
                }
                return Ok(path);
            }
        } else {
            return Err(BlobError::Io(format!("invalid blob key: {:?}", key)));
        };

        if !check_path.starts_with(&canonical_base) {
            return Err(BlobError::Io(format!(
                "path traversal detected in key: {:?}",
                key
            )));
        }

        Ok(path)
    }
}

impl BlobStore for FileStore {
    fn put(&self, key: &str, data: &[u8]) -> Result<(), BlobError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| BlobError::Io(e.to_string()))?;
        }
        fs::write(&path, data).map_err(|e| BlobError::Io(e.to_string()))?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BlobError> {
        let path = self.resolve(key)?;
        if !path.is_file() {
            return Ok(None);
        }
        let data = fs::read(&path).map_err(|e| BlobError::Io(e.to_string()))?;
        Ok(Some(data))
    }

    fn delete(&self, key: &str) -> Result<(), BlobError> {
        let path = self.resolve(key)?;
        if path.is_file() {
            fs::remove_file(&path).map_err(|e| BlobError::Io(e.to_string()))?;
        }
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool, BlobError> {
        let path = self.resolve(key)?;
        Ok(path.is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, FileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn put_get_delete() {
        let (_dir, store) = store();
        store.put("listings/a.jpg", b"jpeg bytes").unwrap();
        assert!(store.exists("listings/a.jpg").unwrap());
        assert_eq!(store.get("listings/a.jpg").unwrap().unwrap(), b"jpeg bytes");

        store.delete("listings/a.jpg").unwrap();
        assert!(!store.exists("listings/a.jpg").unwrap());
        assert!(store.get("listings/a.jpg").unwrap().is_none());
    }

    #[test]
    fn delete_missing_is_noop() {
        let (_dir, store) = store();
        store.delete("listings/never-there.jpg").unwrap();
    }

    #[test]
    fn overwrite_on_put() {
        let (_dir, store) = store();
        store.put("equipment/x.png", b"v1").unwrap();
        store.put("equipment/x.png", b"v2").unwrap();
        assert_eq!(store.get("equipment/x.png").unwrap().unwrap(), b"v2");
    }

    #[test]
    fn rejects_traversal_keys() {
        let (_dir, store) = store();
        assert!(store.put("../escape.jpg", b"x").is_err());
        assert!(store.put("/absolute.jpg", b"x").is_err());
        assert!(store.put("", b"x").is_err());
        assert!(store.put("deep/../../escape.jpg", b"x").is_err());
    }
}
