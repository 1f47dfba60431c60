//! In-memory snapshot store.
//!
//! Keeps each collection as a serialized JSON document so that saves and
//! loads go through the same encoding as the file store.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StorageError;
use crate::record::EntityMap;
use crate::traits::{Collection, SnapshotStore};

#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    documents: Mutex<HashMap<Collection, Vec<u8>>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw stored document for `collection`, if one was saved.
    pub fn document(&self, collection: Collection) -> Option<serde_json::Value> {
        let documents = self.documents.lock().ok()?;
        documents
            .get(&collection)
            .and_then(|bytes| serde_json::from_slice(bytes).ok())
    }

    /// Whether anything has been saved for `collection`.
    pub fn has_document(&self, collection: Collection) -> bool {
        self.documents
            .lock()
            .map(|d| d.contains_key(&collection))
            .unwrap_or(false)
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn save<T>(&self, collection: Collection, map: &EntityMap<T>) -> Result<(), StorageError>
    where
        T: Serialize + Sync,
    {
        let bytes = serde_json::to_vec(map).map_err(|e| StorageError::Serialize {
            collection,
            message: e.to_string(),
        })?;
        let mut documents = self
            .documents
            .lock()
            .map_err(|_| StorageError::Backend("memory store lock poisoned".to_string()))?;
        documents.insert(collection, bytes);
        Ok(())
    }

    async fn load<T>(&self, collection: Collection) -> Result<EntityMap<T>, StorageError>
    where
        T: DeserializeOwned + Send,
    {
        let documents = self
            .documents
            .lock()
            .map_err(|_| StorageError::Backend("memory store lock poisoned".to_string()))?;
        match documents.get(&collection) {
            Some(bytes) => serde_json::from_slice(bytes).map_err(|e| StorageError::Corrupt {
                collection,
                message: e.to_string(),
            }),
            None => Ok(EntityMap::new()),
        }
    }
}
