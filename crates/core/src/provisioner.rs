//! Resource provisioner capability.
//!
//! A provisioner creates, polls, and destroys one kind of backing resource.
//! Provisioning is modelled as pull-based: `create` returns immediately with
//! an internal id and the platform later polls [`ResourceProvisioner::get_state`]
//! until the resource reports running (or something else, which is failure).

use async_trait::async_trait;
use broker_storage::{LastOperation, OperationState, ServiceInstance};

use crate::identifiers::IdentifierError;

pub const DESCRIPTION_IN_PROGRESS: &str = "creating service instance...";
pub const DESCRIPTION_SUCCEEDED: &str = "successfully created service instance";
pub const DESCRIPTION_FAILED: &str = "failed to create service instance";

/// Raw resource state as reported by a provisioner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawState {
    Pending,
    Running,
    /// Anything else; the string is the provisioner's own word for it.
    Other(String),
}

impl From<&str> for RawState {
    fn from(s: &str) -> Self {
        match s {
            "pending" => RawState::Pending,
            "running" => RawState::Running,
            other => RawState::Other(other.to_string()),
        }
    }
}

impl RawState {
    /// Translate into the platform-visible progress marker.
    pub fn to_last_operation(&self, poll_interval_seconds: u64) -> LastOperation {
        let (state, description) = match self {
            RawState::Pending => (OperationState::InProgress, DESCRIPTION_IN_PROGRESS),
            RawState::Running => (OperationState::Succeeded, DESCRIPTION_SUCCEEDED),
            RawState::Other(_) => (OperationState::Failed, DESCRIPTION_FAILED),
        };
        LastOperation {
            state,
            description: description.to_string(),
            poll_interval_seconds,
        }
    }
}

/// The marker every new instance starts with.
pub fn initial_last_operation(poll_interval_seconds: u64) -> LastOperation {
    RawState::Pending.to_last_operation(poll_interval_seconds)
}

/// Errors a provisioner can report.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    /// The resource name is already taken on the backing server.
    #[error("backing resource '{name}' already exists")]
    AlreadyExists { name: String },

    /// A name failed the identifier allow-list.
    #[error(transparent)]
    InvalidName(#[from] IdentifierError),

    /// The backing server rejected or failed the request.
    #[error("backing store error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for ProvisionError {
    fn from(e: sqlx::Error) -> Self {
        ProvisionError::Backend(e.to_string())
    }
}

/// Creates, inspects, and destroys backing resources of one kind.
///
/// Implementations must be `Send + Sync + 'static`; one provisioner is shared
/// by every request handler.
#[async_trait]
pub trait ResourceProvisioner: Send + Sync + 'static {
    /// Allocate a new backing resource and return its internal id.
    async fn create(&self, parameters: &serde_json::Value) -> Result<String, ProvisionError>;

    /// Produce an access token for a resource. No provisioner issues
    /// per-binding tokens yet; implementations return a placeholder.
    async fn bind(
        &self,
        internal_id: &str,
        parameters: &serde_json::Value,
    ) -> Result<String, ProvisionError>;

    /// Report the resource's current raw state.
    async fn get_state(&self, internal_id: &str) -> Result<RawState, ProvisionError>;

    /// Destroy the resource backing `instance`. Destroying an already-absent
    /// resource is not an error.
    async fn delete(&self, instance: &ServiceInstance) -> Result<(), ProvisionError>;
}
