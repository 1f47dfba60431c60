use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// An entity map keyed by entity id. Ordered so persisted documents are stable.
pub type EntityMap<T> = BTreeMap<String, T>;

/// Platform-visible provisioning state of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    #[serde(alias = "in progress")]
    InProgress,
    Succeeded,
    Failed,
}

impl OperationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationState::InProgress => "in_progress",
            OperationState::Succeeded => "succeeded",
            OperationState::Failed => "failed",
        }
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provisioning progress marker embedded in a [`ServiceInstance`].
///
/// Created as `in_progress`; moves to `succeeded` or `failed` only when the
/// platform polls the instance state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastOperation {
    pub state: OperationState,
    pub description: String,
    #[serde(alias = "async_poll_interval_seconds")]
    pub poll_interval_seconds: u64,
}

/// One provisioned backing resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInstance {
    /// Platform-assigned id, the key of the instance map.
    pub id: String,
    /// Provisioner-assigned id. Set once at creation and never changed.
    pub internal_id: String,
    pub service_id: String,
    pub plan_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space_id: Option<String>,
    /// Free-form creation parameters, stored verbatim.
    #[serde(default)]
    pub parameters: serde_json::Value,
    #[serde(default)]
    pub dashboard_url: String,
    pub last_operation: LastOperation,
}

/// A grant connecting one consumer to an existing instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceBinding {
    pub id: String,
    pub service_id: String,
    #[serde(alias = "service_plan_id")]
    pub plan_id: String,
    #[serde(alias = "service_instance_id")]
    pub instance_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    /// Reserved for per-binding key material; always empty today.
    #[serde(default)]
    pub private_key: String,
}

/// Access credentials for one instance's backing resource.
///
/// Keyed 1:1 by instance id. Field aliases accept snapshots written with
/// capitalized names.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(alias = "Uri")]
    pub uri: String,
    #[serde(alias = "Username")]
    pub username: String,
    #[serde(alias = "Password")]
    pub password: String,
    #[serde(alias = "Host")]
    pub host: String,
    #[serde(alias = "Port")]
    pub port: u16,
    #[serde(alias = "Database")]
    pub database: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .finish()
    }
}
