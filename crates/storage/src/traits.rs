use std::fmt;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::record::EntityMap;

/// The three independently persisted entity maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Instances,
    Bindings,
    Credentials,
}

impl Collection {
    pub const ALL: [Collection; 3] = [
        Collection::Instances,
        Collection::Bindings,
        Collection::Credentials,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Instances => "instances",
            Collection::Bindings => "bindings",
            Collection::Credentials => "credentials",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whole-map persistence for the broker's entity maps.
///
/// ## Semantics
///
/// - `save` replaces the stored document for `collection` with the full
///   contents of `map`. Readers never observe a partially written document.
/// - `load` returns the last saved map. A collection that has never been
///   saved is an empty map, not an error: that is the normal first-boot state.
///
/// The store never keeps a reference to the map it is handed; ownership of
/// the live maps stays with the caller.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` so one store can be shared
/// by every request handler.
#[async_trait]
pub trait SnapshotStore: Send + Sync + 'static {
    /// Serialize and durably replace the document for `collection`.
    async fn save<T>(&self, collection: Collection, map: &EntityMap<T>) -> Result<(), StorageError>
    where
        T: Serialize + Sync;

    /// Restore the map for `collection`, or an empty map if none was saved.
    async fn load<T>(&self, collection: Collection) -> Result<EntityMap<T>, StorageError>
    where
        T: DeserializeOwned + Send;
}
