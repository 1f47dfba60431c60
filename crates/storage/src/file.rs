//! JSON-file snapshot store.
//!
//! Each collection is one pretty-printed JSON object under a data directory.
//! Writes go to a temporary file in the same directory which is then renamed
//! over the target, so a concurrent loader sees either the old document or
//! the new one.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::record::EntityMap;
use crate::traits::{Collection, SnapshotStore};

/// Where each collection's document lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotLayout {
    pub data_dir: PathBuf,
    pub instances_file: String,
    pub bindings_file: String,
    pub credentials_file: String,
}

impl SnapshotLayout {
    /// Default file names under `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        SnapshotLayout {
            data_dir: data_dir.into(),
            instances_file: "service_instances.json".to_string(),
            bindings_file: "service_bindings.json".to_string(),
            credentials_file: "service_credentials.json".to_string(),
        }
    }

    pub fn path_for(&self, collection: Collection) -> PathBuf {
        let file = match collection {
            Collection::Instances => &self.instances_file,
            Collection::Bindings => &self.bindings_file,
            Collection::Credentials => &self.credentials_file,
        };
        self.data_dir.join(file)
    }
}

/// Snapshot store backed by one JSON file per collection.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    layout: SnapshotLayout,
}

impl FileSnapshotStore {
    pub fn new(layout: SnapshotLayout) -> Self {
        FileSnapshotStore { layout }
    }

    pub fn layout(&self) -> &SnapshotLayout {
        &self.layout
    }
}

/// Write `bytes` to `path` via a sibling temp file and an atomic rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(|e| StorageError::io(&dir, e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| StorageError::io(&dir, e))?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| StorageError::io(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| StorageError::io(path, e.error))?;
    Ok(())
}

/// Read `path`, mapping "not found" to `None`.
fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, StorageError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::io(path, e)),
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn save<T>(&self, collection: Collection, map: &EntityMap<T>) -> Result<(), StorageError>
    where
        T: Serialize + Sync,
    {
        let bytes = serde_json::to_vec_pretty(map).map_err(|e| StorageError::Serialize {
            collection,
            message: e.to_string(),
        })?;
        let path = self.layout.path_for(collection);

        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(|e| StorageError::Backend(format!("snapshot writer task failed: {}", e)))??;

        tracing::debug!(%collection, entries = map.len(), "snapshot saved");
        Ok(())
    }

    async fn load<T>(&self, collection: Collection) -> Result<EntityMap<T>, StorageError>
    where
        T: DeserializeOwned + Send,
    {
        let path = self.layout.path_for(collection);
        let read_path = path.clone();
        let bytes = tokio::task::spawn_blocking(move || read_optional(&read_path))
            .await
            .map_err(|e| StorageError::Backend(format!("snapshot reader task failed: {}", e)))??;

        let Some(bytes) = bytes else {
            tracing::warn!(
                %collection,
                path = %path.display(),
                "snapshot document does not exist, starting with an empty map"
            );
            return Ok(EntityMap::new());
        };

        serde_json::from_slice(&bytes).map_err(|e| StorageError::Corrupt {
            collection,
            message: format!("{}: {}", path.display(), e),
        })
    }
}
