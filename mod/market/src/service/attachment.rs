//! Attachment lifecycle — keeps an uploaded file consistent with the
//! record that owns it.
//!
//! A record mutation and its file side effect cannot share a
//! transaction, so the file step is a staged write with a compensating
//! delete: stage the blob, run the store mutation, and commit the stage
//! only on confirmed success. Dropping an uncommitted stage deletes the
//! blob again, so no handled failure path leaves an orphan. A crash
//! between a record delete and its file delete remains the one way to
//! leak a file.

use std::sync::Arc;

use agrimart_core::ServiceError;
use blob::BlobStore;

/// An uploaded file carried through a create/update request.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Client-supplied file name; only its extension is kept.
    pub file_name: String,
    pub data: Vec<u8>,
}

impl Upload {
    /// Blob key for this upload: `{prefix}/{id}` plus the original
    /// file extension, if there is one.
    pub(crate) fn key_for(&self, prefix: &str, id: &str) -> String {
        match self.file_name.rsplit_once('.') {
            Some((_, ext)) if !ext.is_empty() => format!("{}/{}.{}", prefix, id, ext),
            _ => format!("{}/{}", prefix, id),
        }
    }
}

/// A blob written to storage but not yet owned by a persisted record.
///
/// Call [`commit`](Self::commit) once the record mutation succeeded;
/// dropping the guard uncommitted runs the compensating delete.
pub(crate) struct StagedBlob {
    blob: Arc<dyn BlobStore>,
    key: String,
    committed: bool,
}

impl StagedBlob {
    pub fn stage(
        blob: &Arc<dyn BlobStore>,
        key: String,
        data: &[u8],
    ) -> Result<Self, ServiceError> {
        blob.put(&key, data)
            .map_err(|e| ServiceError::Storage(format!("failed to store upload: {}", e)))?;
        Ok(Self {
            blob: Arc::clone(blob),
            key,
            committed: false,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Keep the blob; returns its key.
    pub fn commit(mut self) -> String {
        self.committed = true;
        self.key.clone()
    }
}

impl Drop for StagedBlob {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = self.blob.delete(&self.key) {
                tracing::warn!(key = %self.key, error = %e, "failed to clean up staged upload");
            }
        }
    }
}

/// Best-effort delete of a no-longer-referenced attachment.
///
/// Cleanup failures do not affect the primary record operation and are
/// swallowed with a warning.
pub(crate) fn discard(blob: &Arc<dyn BlobStore>, key: &str) {
    if let Err(e) = blob.delete(key) {
        tracing::warn!(key = %key, error = %e, "failed to delete attachment");
    }
}
