//! Application state shared across request handlers.

use broker_core::{BrokerController, ProvisionerKind};
use broker_storage::FileSnapshotStore;

pub(crate) type Controller = BrokerController<FileSnapshotStore>;

pub(crate) struct AppState {
    pub(crate) controller: Controller,
    /// Backend kind the controller was built for; reported by /health.
    pub(crate) backend: ProvisionerKind,
}
