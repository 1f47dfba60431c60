//! Concrete backing-resource kinds.
//!
//! The set of kinds is closed: [`ProvisionerKind`] is chosen once at startup
//! and [`Backend`] builds the matching provisioner/issuer pair. Adding a kind
//! means adding a variant here, not branching on strings elsewhere.

pub mod mysql;
pub mod sandbox;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use broker_storage::ServiceInstance;
use serde::{Deserialize, Serialize};

use self::mysql::{AdminConnection, AdminOptions, BackingStoreConfig, MySqlIssuer, MySqlProvisioner};
use self::sandbox::{SandboxIssuer, SandboxProvisioner, SandboxServer};
use crate::credentials::{CredentialError, CredentialIssuer, ServerEndpoint};
use crate::provisioner::{ProvisionError, RawState, ResourceProvisioner};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProvisionerKind {
    Mysql,
    Sandbox,
}

impl ProvisionerKind {
    /// File name of the catalog document offered by this kind.
    pub fn catalog_file(&self) -> &'static str {
        match self {
            ProvisionerKind::Mysql => "catalog.json",
            ProvisionerKind::Sandbox => "catalog.sandbox.json",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisionerKind::Mysql => "mysql",
            ProvisionerKind::Sandbox => "sandbox",
        }
    }
}

impl fmt::Display for ProvisionerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProvisionerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mysql" | "sql" => Ok(ProvisionerKind::Mysql),
            "sandbox" => Ok(ProvisionerKind::Sandbox),
            other => Err(format!(
                "unknown backend '{}' (expected 'mysql' or 'sandbox')",
                other
            )),
        }
    }
}

/// The active provisioner.
#[derive(Debug, Clone)]
pub enum Provisioner {
    Mysql(MySqlProvisioner),
    Sandbox(SandboxProvisioner),
}

#[async_trait]
impl ResourceProvisioner for Provisioner {
    async fn create(&self, parameters: &serde_json::Value) -> Result<String, ProvisionError> {
        match self {
            Provisioner::Mysql(p) => p.create(parameters).await,
            Provisioner::Sandbox(p) => p.create(parameters).await,
        }
    }

    async fn bind(
        &self,
        internal_id: &str,
        parameters: &serde_json::Value,
    ) -> Result<String, ProvisionError> {
        match self {
            Provisioner::Mysql(p) => p.bind(internal_id, parameters).await,
            Provisioner::Sandbox(p) => p.bind(internal_id, parameters).await,
        }
    }

    async fn get_state(&self, internal_id: &str) -> Result<RawState, ProvisionError> {
        match self {
            Provisioner::Mysql(p) => p.get_state(internal_id).await,
            Provisioner::Sandbox(p) => p.get_state(internal_id).await,
        }
    }

    async fn delete(&self, instance: &ServiceInstance) -> Result<(), ProvisionError> {
        match self {
            Provisioner::Mysql(p) => p.delete(instance).await,
            Provisioner::Sandbox(p) => p.delete(instance).await,
        }
    }
}

/// The active credential issuer.
#[derive(Debug, Clone)]
pub enum Issuer {
    Mysql(MySqlIssuer),
    Sandbox(SandboxIssuer),
}

#[async_trait]
impl CredentialIssuer for Issuer {
    async fn issue(
        &self,
        username: &str,
        password: &str,
        resource: &str,
    ) -> Result<(), CredentialError> {
        match self {
            Issuer::Mysql(i) => i.issue(username, password, resource).await,
            Issuer::Sandbox(i) => i.issue(username, password, resource).await,
        }
    }

    async fn revoke(&self, resource: &str) -> Result<(), CredentialError> {
        match self {
            Issuer::Mysql(i) => i.revoke(resource).await,
            Issuer::Sandbox(i) => i.revoke(resource).await,
        }
    }

    fn endpoint(&self) -> ServerEndpoint {
        match self {
            Issuer::Mysql(i) => i.endpoint(),
            Issuer::Sandbox(i) => i.endpoint(),
        }
    }
}

/// A provisioner/issuer pair for one kind, plus the resources they share.
#[derive(Debug)]
pub struct Backend {
    pub kind: ProvisionerKind,
    pub provisioner: Provisioner,
    pub issuer: Issuer,
    admin: Option<AdminConnection>,
}

impl Backend {
    /// Connect to the MySQL server described by `config`.
    pub async fn mysql(
        config: &BackingStoreConfig,
        options: &AdminOptions,
    ) -> Result<Self, sqlx::Error> {
        let admin = AdminConnection::connect(config, options).await?;
        Ok(Self {
            kind: ProvisionerKind::Mysql,
            provisioner: Provisioner::Mysql(MySqlProvisioner::new(admin.clone())),
            issuer: Issuer::Mysql(MySqlIssuer::new(admin.clone())),
            admin: Some(admin),
        })
    }

    /// A fresh in-process sandbox.
    pub fn sandbox(pending_polls: u32) -> Self {
        let server = SandboxServer::new();
        Self {
            kind: ProvisionerKind::Sandbox,
            provisioner: Provisioner::Sandbox(SandboxProvisioner::new(server.clone(), pending_polls)),
            issuer: Issuer::Sandbox(SandboxIssuer::new(server)),
            admin: None,
        }
    }

    /// Release the admin connection, if this kind holds one.
    pub async fn shutdown(&self) {
        if let Some(admin) = &self.admin {
            admin.close().await;
        }
    }
}
