//! Instance/binding lifecycle controller.
//!
//! Owns the three entity maps and drives every lifecycle operation:
//! it validates input, calls the provisioner and credential issuer, mutates
//! the maps, and persists each changed map before returning.
//!
//! ## Locking
//!
//! Each map sits behind its own `RwLock`. Operations that touch several maps
//! always acquire them in the order instances → credentials → bindings, and
//! a mutating operation keeps its write locks until its snapshots are saved,
//! so concurrent requests never interleave half-applied changes.
//!
//! ## Partial failure
//!
//! Nothing is rolled back. When a step fails after an earlier step already
//! changed external or in-memory state, the failure is logged with the step
//! name and every id needed to reconcile by hand, and surfaced to the caller
//! as [`BrokerError::Internal`].

use std::fmt;
use std::future::Future;
use std::time::Duration;

use broker_storage::{
    Collection, Credential, EntityMap, LastOperation, ServiceBinding, ServiceInstance,
    SnapshotStore, StorageError,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::catalog::Catalog;
use crate::credentials::CredentialIssuer;
use crate::error::BrokerError;
use crate::identifiers::{quote_literal, validate_identifier};
use crate::provisioner::{initial_last_operation, ResourceProvisioner};

/// Default `async_poll_interval_seconds` advertised to the platform.
pub const DEFAULT_POLL_INTERVAL_SECONDS: u64 = 10;

/// Default bound on every provisioner/issuer call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Instance dashboards live at `<dashboard_base_url>/<instance id>`.
    pub dashboard_base_url: String,
    pub poll_interval_seconds: u64,
    pub call_timeout: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            dashboard_base_url: "http://localhost:8080/dashboard".to_string(),
            poll_interval_seconds: DEFAULT_POLL_INTERVAL_SECONDS,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

/// The caller's basic-auth identity. Becomes the issued credential's principal.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthPrincipal {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for AuthPrincipal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthPrincipal")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// Body of a create-instance request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreateInstanceRequest {
    #[serde(default)]
    pub service_id: String,
    #[serde(default)]
    pub plan_id: String,
    #[serde(default)]
    pub organization_guid: Option<String>,
    #[serde(default)]
    pub space_guid: Option<String>,
    #[serde(default = "empty_object")]
    pub parameters: serde_json::Value,
}

impl Default for CreateInstanceRequest {
    fn default() -> Self {
        Self {
            service_id: String::new(),
            plan_id: String::new(),
            organization_guid: None,
            space_guid: None,
            parameters: empty_object(),
        }
    }
}

/// What the platform sees of an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceDescription {
    pub dashboard_url: String,
    pub last_operation: LastOperation,
}

impl From<&ServiceInstance> for InstanceDescription {
    fn from(instance: &ServiceInstance) -> Self {
        Self {
            dashboard_url: instance.dashboard_url.clone(),
            last_operation: instance.last_operation.clone(),
        }
    }
}

/// Why a bounded external call did not return a value.
enum CallError<E> {
    TimedOut(Duration),
    Failed(E),
}

impl<E: fmt::Display> fmt::Display for CallError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallError::TimedOut(d) => write!(f, "timed out after {:?}", d),
            CallError::Failed(e) => write!(f, "{}", e),
        }
    }
}

pub struct LifecycleController<P, C, S> {
    pub(crate) provisioner: P,
    pub(crate) issuer: C,
    pub(crate) store: S,
    pub(crate) catalog: Catalog,
    pub(crate) settings: ControllerSettings,
    pub(crate) instances: RwLock<EntityMap<ServiceInstance>>,
    pub(crate) credentials: RwLock<EntityMap<Credential>>,
    pub(crate) bindings: RwLock<EntityMap<ServiceBinding>>,
}

impl<P, C, S> LifecycleController<P, C, S>
where
    P: ResourceProvisioner,
    C: CredentialIssuer,
    S: SnapshotStore,
{
    /// Restore the three maps from `store` and build the controller.
    pub async fn open(
        provisioner: P,
        issuer: C,
        store: S,
        catalog: Catalog,
        settings: ControllerSettings,
    ) -> Result<Self, StorageError> {
        let instances: EntityMap<ServiceInstance> = store.load(Collection::Instances).await?;
        let bindings: EntityMap<ServiceBinding> = store.load(Collection::Bindings).await?;
        let credentials: EntityMap<Credential> = store.load(Collection::Credentials).await?;

        info!(
            instances = instances.len(),
            bindings = bindings.len(),
            credentials = credentials.len(),
            "broker state restored"
        );

        Ok(Self {
            provisioner,
            issuer,
            store,
            catalog,
            settings,
            instances: RwLock::new(instances),
            credentials: RwLock::new(credentials),
            bindings: RwLock::new(bindings),
        })
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn provisioner(&self) -> &P {
        &self.provisioner
    }

    pub fn issuer(&self) -> &C {
        &self.issuer
    }

    /// Run `fut` under the configured call timeout.
    async fn bounded<T, E, F>(&self, fut: F) -> Result<T, CallError<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        match tokio::time::timeout(self.settings.call_timeout, fut).await {
            Ok(result) => result.map_err(CallError::Failed),
            Err(_) => Err(CallError::TimedOut(self.settings.call_timeout)),
        }
    }

    async fn persist<T>(
        &self,
        step: &'static str,
        collection: Collection,
        map: &EntityMap<T>,
    ) -> Result<(), BrokerError>
    where
        T: Serialize + Sync,
    {
        self.store.save(collection, map).await.map_err(|e| {
            error!(step, %collection, error = %e, "snapshot write failed; memory is ahead of disk");
            BrokerError::internal(step, format!("could not persist {}", collection))
        })
    }

    // ── Operations ────────────────────────────────────────────────────────────

    /// The catalog document for the active backend kind.
    pub async fn list_catalog(&self) -> Result<serde_json::Value, BrokerError> {
        self.catalog.load().await
    }

    /// Provision a new instance and issue its credential.
    pub async fn create_instance(
        &self,
        id: &str,
        request: CreateInstanceRequest,
        auth: Option<&AuthPrincipal>,
    ) -> Result<InstanceDescription, BrokerError> {
        let auth = match auth {
            Some(a) if !a.username.is_empty() && !a.password.is_empty() => a,
            _ => {
                return Err(BrokerError::Unauthorized(
                    "basic auth credentials are required".to_string(),
                ))
            }
        };
        validate_identifier("user name", &auth.username)
            .map_err(|e| BrokerError::Unauthorized(e.to_string()))?;
        quote_literal("password", &auth.password)
            .map_err(|e| BrokerError::Unauthorized(e.to_string()))?;

        let mut instances = self.instances.write().await;
        if instances.contains_key(id) {
            return Err(BrokerError::Conflict(format!(
                "service instance '{}' already exists",
                id
            )));
        }
        let mut credentials = self.credentials.write().await;
        // A principal is shared across instances; its password is set once.
        if credentials
            .values()
            .any(|c| c.username == auth.username && c.password != auth.password)
        {
            warn!(instance_id = %id, user = %auth.username, "password differs from the principal's existing credentials");
            return Err(BrokerError::Unauthorized(format!(
                "user '{}' already holds credentials with a different password",
                auth.username
            )));
        }

        let internal_id = match self.bounded(self.provisioner.create(&request.parameters)).await {
            Ok(internal_id) => internal_id,
            Err(CallError::Failed(e)) => {
                warn!(instance_id = %id, step = "provision", error = %e, "provisioner rejected instance");
                return Err(BrokerError::Conflict(format!(
                    "backing resource for service instance '{}' could not be created",
                    id
                )));
            }
            Err(e @ CallError::TimedOut(_)) => {
                error!(instance_id = %id, step = "provision", error = %e, "provisioner call timed out; a backing resource may have been created");
                return Err(BrokerError::internal("provision", "provisioner timed out"));
            }
        };

        let instance = ServiceInstance {
            id: id.to_string(),
            internal_id: internal_id.clone(),
            service_id: request.service_id,
            plan_id: request.plan_id,
            organization_id: request.organization_guid,
            space_id: request.space_guid,
            parameters: request.parameters,
            dashboard_url: format!(
                "{}/{}",
                self.settings.dashboard_base_url.trim_end_matches('/'),
                id
            ),
            last_operation: initial_last_operation(self.settings.poll_interval_seconds),
        };
        let description = InstanceDescription::from(&instance);
        instances.insert(id.to_string(), instance);

        let issued = match self
            .issuer
            .endpoint()
            .credential(&auth.username, &auth.password, &internal_id)
        {
            Ok(credential) => self
                .bounded(
                    self.issuer
                        .issue(&auth.username, &auth.password, &internal_id),
                )
                .await
                .map(|()| credential)
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        let credential = match issued {
            Ok(credential) => credential,
            Err(e) => {
                error!(
                    instance_id = %id,
                    internal_id = %internal_id,
                    step = "issue_credential",
                    error = %e,
                    "credential issuance failed; backing resource left in place"
                );
                return Err(BrokerError::internal(
                    "issue_credential",
                    "credential could not be issued",
                ));
            }
        };
        credentials.insert(id.to_string(), credential);

        self.persist("persist_instances", Collection::Instances, &*instances)
            .await?;
        self.persist("persist_credentials", Collection::Credentials, &*credentials)
            .await?;

        info!(instance_id = %id, internal_id = %internal_id, user = %auth.username, "service instance created");
        Ok(description)
    }

    /// Poll the provisioner and update the instance's last operation.
    pub async fn get_instance_state(&self, id: &str) -> Result<InstanceDescription, BrokerError> {
        let internal_id = {
            let instances = self.instances.read().await;
            instances
                .get(id)
                .map(|i| i.internal_id.clone())
                .ok_or_else(|| BrokerError::NotFound {
                    instance_id: id.to_string(),
                })?
        };

        let raw = self
            .bounded(self.provisioner.get_state(&internal_id))
            .await
            .map_err(|e| {
                error!(instance_id = %id, internal_id = %internal_id, step = "poll_state", error = %e, "state poll failed");
                BrokerError::internal("poll_state", "instance state could not be read")
            })?;
        let last_operation = raw.to_last_operation(self.settings.poll_interval_seconds);

        let mut instances = self.instances.write().await;
        let instance = instances.get_mut(id).ok_or_else(|| BrokerError::NotFound {
            instance_id: id.to_string(),
        })?;
        if instance.internal_id != internal_id {
            // Deleted and re-created while the poll was in flight.
            debug!(instance_id = %id, polled = %internal_id, current = %instance.internal_id, "discarding state of a replaced instance");
            return Ok(InstanceDescription::from(&*instance));
        }
        let changed = instance.last_operation != last_operation;
        instance.last_operation = last_operation;
        let description = InstanceDescription::from(&*instance);

        if changed {
            debug!(instance_id = %id, state = %description.last_operation.state, "last operation changed");
            // The poll itself succeeded; a failed write only costs the
            // transition on restart, so it is logged rather than returned.
            if let Err(e) = self.store.save(Collection::Instances, &*instances).await {
                warn!(instance_id = %id, step = "persist_instances", error = %e, "state transition not persisted");
            }
        }
        Ok(description)
    }

    /// Tear down an instance, its credential, and every binding to it.
    pub async fn delete_instance(&self, id: &str) -> Result<(), BrokerError> {
        let mut instances = self.instances.write().await;
        let instance = instances.get(id).cloned().ok_or_else(|| BrokerError::Gone {
            instance_id: id.to_string(),
        })?;
        let mut credentials = self.credentials.write().await;

        match credentials.get(id).map(|c| c.database.clone()) {
            Some(resource) => {
                if let Err(e) = self.bounded(self.issuer.revoke(&resource)).await {
                    warn!(
                        instance_id = %id,
                        internal_id = %instance.internal_id,
                        step = "revoke_credential",
                        error = %e,
                        "credential revoke failed; continuing cleanup"
                    );
                }
            }
            None => debug!(instance_id = %id, "no credential recorded, skipping revoke"),
        }

        if let Err(e) = self.bounded(self.provisioner.delete(&instance)).await {
            warn!(
                instance_id = %id,
                internal_id = %instance.internal_id,
                step = "deprovision",
                error = %e,
                "provisioner delete failed; continuing cleanup"
            );
        }

        instances.remove(id);
        self.persist("persist_instances", Collection::Instances, &*instances)
            .await?;

        credentials.remove(id);
        self.persist("persist_credentials", Collection::Credentials, &*credentials)
            .await?;

        let mut bindings = self.bindings.write().await;
        let before = bindings.len();
        bindings.retain(|_, b| b.instance_id != id);
        let removed = before - bindings.len();
        self.persist("persist_bindings", Collection::Bindings, &*bindings)
            .await?;

        info!(instance_id = %id, internal_id = %instance.internal_id, bindings_removed = removed, "service instance deleted");
        Ok(())
    }

    /// Record a binding and hand back the instance's credential.
    ///
    /// Every binding to an instance shares the credential issued when the
    /// instance was created.
    pub async fn bind(
        &self,
        binding_id: &str,
        instance_id: &str,
        app_id: Option<String>,
    ) -> Result<Credential, BrokerError> {
        let instances = self.instances.read().await;
        let instance = instances
            .get(instance_id)
            .ok_or_else(|| BrokerError::NotFound {
                instance_id: instance_id.to_string(),
            })?;
        let credentials = self.credentials.read().await;
        let mut bindings = self.bindings.write().await;

        bindings.insert(
            binding_id.to_string(),
            ServiceBinding {
                id: binding_id.to_string(),
                service_id: instance.service_id.clone(),
                plan_id: instance.plan_id.clone(),
                instance_id: instance_id.to_string(),
                app_id,
                private_key: String::new(),
            },
        );
        self.persist("persist_bindings", Collection::Bindings, &*bindings)
            .await?;

        let credential = credentials.get(instance_id).cloned().ok_or_else(|| {
            error!(
                instance_id = %instance_id,
                binding_id = %binding_id,
                step = "lookup_credential",
                "no credential recorded for instance"
            );
            BrokerError::internal("lookup_credential", "no credential recorded for instance")
        })?;

        info!(instance_id = %instance_id, binding_id = %binding_id, "service binding created");
        Ok(credential)
    }

    /// Remove a binding. Unknown bindings are a no-op.
    pub async fn unbind(&self, binding_id: &str, instance_id: &str) -> Result<(), BrokerError> {
        let instances = self.instances.read().await;
        if !instances.contains_key(instance_id) {
            return Err(BrokerError::Gone {
                instance_id: instance_id.to_string(),
            });
        }
        let mut bindings = self.bindings.write().await;

        match bindings.get(binding_id) {
            Some(b) if b.instance_id == instance_id => {
                bindings.remove(binding_id);
            }
            Some(b) => {
                warn!(
                    binding_id = %binding_id,
                    instance_id = %instance_id,
                    bound_to = %b.instance_id,
                    "binding belongs to another instance, leaving it in place"
                );
            }
            None => debug!(binding_id = %binding_id, "binding already absent"),
        }
        self.persist("persist_bindings", Collection::Bindings, &*bindings)
            .await?;

        info!(instance_id = %instance_id, binding_id = %binding_id, "service binding removed");
        Ok(())
    }

    // ── Snapshot reads ────────────────────────────────────────────────────────

    pub async fn instance(&self, id: &str) -> Option<ServiceInstance> {
        self.instances.read().await.get(id).cloned()
    }

    pub async fn credential(&self, instance_id: &str) -> Option<Credential> {
        self.credentials.read().await.get(instance_id).cloned()
    }

    pub async fn binding(&self, id: &str) -> Option<ServiceBinding> {
        self.bindings.read().await.get(id).cloned()
    }

    /// Every binding that references `instance_id`.
    pub async fn bindings_for(&self, instance_id: &str) -> Vec<ServiceBinding> {
        self.bindings
            .read()
            .await
            .values()
            .filter(|b| b.instance_id == instance_id)
            .cloned()
            .collect()
    }

    pub async fn instance_ids(&self) -> Vec<String> {
        self.instances.read().await.keys().cloned().collect()
    }
}
