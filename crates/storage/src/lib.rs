//! broker-storage: entity records and whole-map snapshot persistence.
//!
//! The broker keeps three entity maps (instances, bindings, credentials).
//! This crate defines the records and the [`SnapshotStore`] capability that
//! writes and restores each map as one document.

pub mod conformance;
mod error;
mod file;
mod memory;
mod record;
mod traits;

pub use error::StorageError;
pub use file::{FileSnapshotStore, SnapshotLayout};
pub use memory::MemorySnapshotStore;
pub use record::{
    Credential, EntityMap, LastOperation, OperationState, ServiceBinding, ServiceInstance,
};
pub use traits::{Collection, SnapshotStore};
