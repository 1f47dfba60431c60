//! broker-core: provider-side lifecycle for a service broker.
//!
//! Provisions backing resources on request, issues credentials for them,
//! tracks the platform-visible entities, and tears everything down again.
//!
//! # Public API
//!
//! - [`LifecycleController`] -- the six lifecycle operations over the
//!   instance, binding, and credential maps
//! - [`ResourceProvisioner`] / [`CredentialIssuer`] -- backend capabilities
//! - [`Backend`] -- the concrete provisioner/issuer pair for a [`ProvisionerKind`]
//! - [`Catalog`] -- the static offerings document
//! - [`BrokerError`] -- every failure an operation can return

pub mod backend;
pub mod catalog;
pub mod controller;
pub mod credentials;
pub mod error;
pub mod identifiers;
pub mod provisioner;
pub mod reconcile;

// ── Convenience re-exports ───────────────────────────────────────────

pub use backend::{Backend, Issuer, Provisioner, ProvisionerKind};
pub use catalog::Catalog;
pub use controller::{
    AuthPrincipal, ControllerSettings, CreateInstanceRequest, InstanceDescription,
    LifecycleController,
};
pub use credentials::{CredentialError, CredentialIssuer, ServerEndpoint};
pub use error::{BrokerError, ErrorKind};
pub use provisioner::{ProvisionError, RawState, ResourceProvisioner};
pub use reconcile::ReconcileReport;

/// The controller as the broker binary runs it.
pub type BrokerController<S> = LifecycleController<Provisioner, Issuer, S>;
