use std::path::PathBuf;

use crate::Collection;

/// All errors that can be returned by a SnapshotStore implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Filesystem failure while reading, writing, or renaming a document.
    #[error("snapshot I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A stored document exists but cannot be decoded into the requested map.
    #[error("corrupt {collection} snapshot: {message}")]
    Corrupt {
        collection: Collection,
        message: String,
    },

    /// The map could not be encoded as a document.
    #[error("cannot serialize {collection} snapshot: {message}")]
    Serialize {
        collection: Collection,
        message: String,
    },

    /// A backend-specific failure (task join, injected fault, etc.).
    #[error("snapshot backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }
}
