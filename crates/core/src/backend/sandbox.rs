//! In-process sandbox backend.
//!
//! Emulates a shared database server in memory so the broker can run without
//! an external store. New schemas stay `pending` for a configurable number of
//! state polls before they report `running`, which exercises the platform's
//! asynchronous polling path end to end.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use broker_storage::ServiceInstance;

use crate::credentials::{CredentialError, CredentialIssuer, ServerEndpoint};
use crate::identifiers::{generate_schema_name, quote_identifier, quote_literal, validate_identifier};
use crate::provisioner::{ProvisionError, RawState, ResourceProvisioner};

pub const SANDBOX_HOST: &str = "localhost";
pub const SANDBOX_PORT: u16 = 3306;

#[derive(Debug, Default)]
struct SandboxState {
    /// Schema name -> polls left before it reports running.
    schemas: HashMap<String, u32>,
    /// Schema name -> principals granted on it.
    grants: HashMap<String, BTreeSet<String>>,
}

/// Shared in-memory "server". Provisioner and issuer hold clones.
#[derive(Debug, Clone, Default)]
pub struct SandboxServer {
    state: Arc<Mutex<SandboxState>>,
}

impl SandboxServer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, SandboxState>, String> {
        self.state
            .lock()
            .map_err(|_| "sandbox state lock poisoned".to_string())
    }

    pub fn has_schema(&self, name: &str) -> bool {
        self.lock()
            .map(|s| s.schemas.contains_key(name))
            .unwrap_or(false)
    }

    /// Principals granted on `schema`, sorted.
    pub fn grants_for(&self, schema: &str) -> Vec<String> {
        self.lock()
            .ok()
            .and_then(|s| s.grants.get(schema).map(|g| g.iter().cloned().collect()))
            .unwrap_or_default()
    }

    fn drop_schema(&self, name: &str) -> Result<(), String> {
        let mut state = self.lock()?;
        state.schemas.remove(name);
        state.grants.remove(name);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SandboxProvisioner {
    server: SandboxServer,
    pending_polls: u32,
}

impl SandboxProvisioner {
    /// `pending_polls` is how many `get_state` calls report `pending` before
    /// a new schema reports `running`.
    pub fn new(server: SandboxServer, pending_polls: u32) -> Self {
        Self {
            server,
            pending_polls,
        }
    }
}

#[async_trait]
impl ResourceProvisioner for SandboxProvisioner {
    async fn create(&self, _parameters: &serde_json::Value) -> Result<String, ProvisionError> {
        let name = generate_schema_name();
        validate_identifier("schema name", &name)?;
        let mut state = self.server.lock().map_err(ProvisionError::Backend)?;
        if state.schemas.contains_key(&name) {
            return Err(ProvisionError::AlreadyExists { name });
        }
        state.schemas.insert(name.clone(), self.pending_polls);
        Ok(name)
    }

    async fn bind(
        &self,
        internal_id: &str,
        _parameters: &serde_json::Value,
    ) -> Result<String, ProvisionError> {
        validate_identifier("schema name", internal_id)?;
        if !self.server.has_schema(internal_id) {
            return Err(ProvisionError::Backend(format!(
                "unknown schema '{}'",
                internal_id
            )));
        }
        Ok(super::mysql::BIND_PLACEHOLDER_TOKEN.to_string())
    }

    async fn get_state(&self, internal_id: &str) -> Result<RawState, ProvisionError> {
        let mut state = self.server.lock().map_err(ProvisionError::Backend)?;
        Ok(match state.schemas.get_mut(internal_id) {
            None => RawState::Other("missing".to_string()),
            Some(0) => RawState::Running,
            Some(left) => {
                *left -= 1;
                RawState::Pending
            }
        })
    }

    async fn delete(&self, instance: &ServiceInstance) -> Result<(), ProvisionError> {
        validate_identifier("schema name", &instance.internal_id)?;
        self.server
            .drop_schema(&instance.internal_id)
            .map_err(ProvisionError::Backend)
    }
}

#[derive(Debug, Clone)]
pub struct SandboxIssuer {
    server: SandboxServer,
}

impl SandboxIssuer {
    pub fn new(server: SandboxServer) -> Self {
        Self { server }
    }
}

#[async_trait]
impl CredentialIssuer for SandboxIssuer {
    async fn issue(
        &self,
        username: &str,
        password: &str,
        resource: &str,
    ) -> Result<(), CredentialError> {
        // Same checks the MySQL issuer applies before building statements.
        quote_identifier("user name", username)?;
        quote_literal("password", password)?;
        quote_identifier("schema name", resource)?;

        let mut state = self.server.lock().map_err(CredentialError::Backend)?;
        if !state.schemas.contains_key(resource) {
            return Err(CredentialError::Backend(format!(
                "unknown database '{}'",
                resource
            )));
        }
        state
            .grants
            .entry(resource.to_string())
            .or_default()
            .insert(username.to_string());
        Ok(())
    }

    async fn revoke(&self, resource: &str) -> Result<(), CredentialError> {
        validate_identifier("schema name", resource)?;
        self.server
            .drop_schema(resource)
            .map_err(CredentialError::Backend)
    }

    fn endpoint(&self) -> ServerEndpoint {
        ServerEndpoint {
            scheme: "mysql",
            host: SANDBOX_HOST.to_string(),
            port: SANDBOX_PORT,
        }
    }
}
