//! Credential issuer capability.
//!
//! Issuing and revoking are privileged operations on the backing server and
//! always run under the broker's administrative identity, never the tenant's.

use std::net::Ipv6Addr;

use async_trait::async_trait;
use broker_storage::Credential;

use crate::identifiers::IdentifierError;

/// Where tenants connect to reach resources handed out by an issuer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEndpoint {
    pub scheme: &'static str,
    pub host: String,
    pub port: u16,
}

impl ServerEndpoint {
    /// Build the credential record for `username` on `database`.
    ///
    /// The URI is assembled with `url` so that reserved characters in the
    /// password are percent-encoded. IPv6 hosts are bracketed.
    pub fn credential(
        &self,
        username: &str,
        password: &str,
        database: &str,
    ) -> Result<Credential, CredentialError> {
        let host = match self.host.parse::<Ipv6Addr>() {
            Ok(addr) => format!("[{}]", addr),
            Err(_) => self.host.clone(),
        };
        let mut url = url::Url::parse(&format!(
            "{}://{}:{}/{}",
            self.scheme, host, self.port, database
        ))
        .map_err(|e| CredentialError::InvalidEndpoint(format!("{}: {}", host, e)))?;
        url.set_username(username)
            .and_then(|()| url.set_password(Some(password)))
            .map_err(|()| CredentialError::InvalidEndpoint(format!("{} cannot carry a user", host)))?;
        let uri = url.to_string();

        Ok(Credential {
            uri,
            username: username.to_string(),
            password: password.to_string(),
            host: self.host.clone(),
            port: self.port,
            database: database.to_string(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// A user name, password, or resource name failed validation.
    #[error(transparent)]
    InvalidName(#[from] IdentifierError),

    /// The endpoint does not form a usable connection URI.
    #[error("invalid server endpoint: {0}")]
    InvalidEndpoint(String),

    /// The backing server rejected or failed the request.
    #[error("backing store error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for CredentialError {
    fn from(e: sqlx::Error) -> Self {
        CredentialError::Backend(e.to_string())
    }
}

/// Grants and revokes tenant access to one backing resource.
#[async_trait]
pub trait CredentialIssuer: Send + Sync + 'static {
    /// Create principal `username` unless it exists, and grant it full
    /// rights over `resource`. An existing principal keeps its password.
    async fn issue(
        &self,
        username: &str,
        password: &str,
        resource: &str,
    ) -> Result<(), CredentialError>;

    /// Destroy `resource`, and with it every grant on it.
    async fn revoke(&self, resource: &str) -> Result<(), CredentialError>;

    /// The address tenants use to reach issued resources.
    fn endpoint(&self) -> ServerEndpoint;
}
