//! MySQL backend: one schema per instance on a shared server.
//!
//! All statements run over a single administrative pool owned by
//! [`AdminConnection`]. Schema and account names cannot be bound as
//! parameters in DDL, so they go through [`crate::identifiers`] first;
//! lookups that can be parameterized are.

use std::time::Duration;

use async_trait::async_trait;
use broker_storage::ServiceInstance;
use sqlx::mysql::{MySqlConnectOptions, MySqlDatabaseError, MySqlPoolOptions};
use sqlx::MySqlPool;
use tracing::{debug, info, warn};

use crate::credentials::{CredentialError, CredentialIssuer, ServerEndpoint};
use crate::identifiers::{generate_schema_name, quote_identifier, quote_literal};
use crate::provisioner::{ProvisionError, RawState, ResourceProvisioner};

/// MySQL error number for "database exists".
const ER_DB_CREATE_EXISTS: u16 = 1007;

/// Placeholder returned by [`ResourceProvisioner::bind`].
pub const BIND_PLACEHOLDER_TOKEN: &str = "unsupported";

pub const ENV_ADDR: &str = "MYSQL_ADDR";
pub const ENV_PORT: &str = "MYSQL_PORT";
pub const ENV_DATABASE: &str = "MYSQL_DATABASE";
pub const ENV_USER: &str = "MYSQL_USER";
pub const ENV_PASSWORD: &str = "MYSQL_ENV_MYSQL_ROOT_PASSWORD";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackingConfigError {
    #[error("missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("MYSQL_PORT is not a valid port: '{0}'")]
    InvalidPort(String),
}

/// Address and administrative identity of the backing MySQL server.
#[derive(Clone, PartialEq, Eq)]
pub struct BackingStoreConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for BackingStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackingStoreConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl BackingStoreConfig {
    /// Read every setting from the process environment.
    pub fn from_env() -> Result<Self, BackingConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`. Empty values count as missing, and
    /// every missing variable is reported at once.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, BackingConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut missing = Vec::new();
        let mut get = |key: &'static str| {
            let value = lookup(key).filter(|v| !v.is_empty());
            if value.is_none() {
                missing.push(key);
            }
            value.unwrap_or_default()
        };

        let host = get(ENV_ADDR);
        let port = get(ENV_PORT);
        let database = get(ENV_DATABASE);
        let username = get(ENV_USER);
        let password = get(ENV_PASSWORD);

        if !missing.is_empty() {
            return Err(BackingConfigError::Missing(missing));
        }

        let port = port
            .parse::<u16>()
            .map_err(|_| BackingConfigError::InvalidPort(port.clone()))?;

        Ok(Self {
            host,
            port,
            database,
            username,
            password,
        })
    }

    fn connect_options(&self) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.username)
            .password(&self.password)
    }
}

/// Whether string literals on a session with `sql_mode` treat `\\` as an
/// escape, which `quote_literal` relies on.
fn backslash_escapes_enabled(sql_mode: &str) -> bool {
    !sql_mode
        .split(',')
        .any(|m| m.trim().eq_ignore_ascii_case("NO_BACKSLASH_ESCAPES"))
}

/// Pool sizing and startup retry policy for the admin connection.
#[derive(Debug, Clone)]
pub struct AdminOptions {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub connect_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for AdminOptions {
    fn default() -> Self {
        Self {
            max_connections: 1,
            acquire_timeout: Duration::from_secs(10),
            connect_retries: 5,
            retry_backoff: Duration::from_secs(2),
        }
    }
}

/// The process-wide administrative session with the backing server.
///
/// Opened once at startup and closed at shutdown. Provisioner and issuer
/// share clones of it; clones refer to the same pool.
#[derive(Debug, Clone)]
pub struct AdminConnection {
    pool: MySqlPool,
    endpoint: ServerEndpoint,
}

impl AdminConnection {
    /// Connect, retrying up to `options.connect_retries` times.
    pub async fn connect(
        config: &BackingStoreConfig,
        options: &AdminOptions,
    ) -> Result<Self, sqlx::Error> {
        info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            user = %config.username,
            "connecting to backing store"
        );

        let mut attempt = 0;
        let pool = loop {
            attempt += 1;
            let result = MySqlPoolOptions::new()
                .max_connections(options.max_connections)
                .acquire_timeout(options.acquire_timeout)
                .connect_with(config.connect_options())
                .await;
            match result {
                Ok(pool) => break pool,
                Err(e) if attempt <= options.connect_retries => {
                    warn!(attempt, error = %e, "backing store connection failed, retrying");
                    tokio::time::sleep(options.retry_backoff).await;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "backing store connection failed, giving up");
                    return Err(e);
                }
            }
        };

        let (sql_mode,): (String,) = sqlx::query_as("SELECT @@SESSION.sql_mode")
            .fetch_one(&pool)
            .await?;
        if !backslash_escapes_enabled(&sql_mode) {
            pool.close().await;
            return Err(sqlx::Error::Configuration(
                "backing store runs with NO_BACKSLASH_ESCAPES; password literals would be mangled"
                    .into(),
            ));
        }
        info!("backing store connection established");

        Ok(Self {
            pool,
            endpoint: ServerEndpoint {
                scheme: "mysql",
                host: config.host.clone(),
                port: config.port,
            },
        })
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    pub fn endpoint(&self) -> ServerEndpoint {
        self.endpoint.clone()
    }

    /// Close the pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("backing store connection closed");
    }
}

fn is_db_exists(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => db
            .try_downcast_ref::<MySqlDatabaseError>()
            .map(|m| m.number() == ER_DB_CREATE_EXISTS)
            .unwrap_or(false),
        _ => false,
    }
}

/// Provisions one schema per instance.
#[derive(Debug, Clone)]
pub struct MySqlProvisioner {
    conn: AdminConnection,
}

impl MySqlProvisioner {
    pub fn new(conn: AdminConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl ResourceProvisioner for MySqlProvisioner {
    async fn create(&self, _parameters: &serde_json::Value) -> Result<String, ProvisionError> {
        let name = generate_schema_name();
        let stmt = format!("CREATE DATABASE {}", quote_identifier("schema name", &name)?);

        match sqlx::query(&stmt).execute(self.conn.pool()).await {
            Ok(_) => {
                debug!(schema = %name, "schema created");
                Ok(name)
            }
            Err(e) if is_db_exists(&e) => Err(ProvisionError::AlreadyExists { name }),
            Err(e) => Err(e.into()),
        }
    }

    async fn bind(
        &self,
        internal_id: &str,
        _parameters: &serde_json::Value,
    ) -> Result<String, ProvisionError> {
        quote_identifier("schema name", internal_id)?;
        Ok(BIND_PLACEHOLDER_TOKEN.to_string())
    }

    async fn get_state(&self, internal_id: &str) -> Result<RawState, ProvisionError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM information_schema.SCHEMATA WHERE SCHEMA_NAME = ?",
        )
        .bind(internal_id)
        .fetch_one(self.conn.pool())
        .await?;

        Ok(if count > 0 {
            RawState::Running
        } else {
            RawState::Other("missing".to_string())
        })
    }

    async fn delete(&self, instance: &ServiceInstance) -> Result<(), ProvisionError> {
        let stmt = format!(
            "DROP DATABASE IF EXISTS {}",
            quote_identifier("schema name", &instance.internal_id)?
        );
        sqlx::query(&stmt).execute(self.conn.pool()).await?;
        debug!(schema = %instance.internal_id, "schema dropped");
        Ok(())
    }
}

/// Issues per-schema grants to tenant principals.
#[derive(Debug, Clone)]
pub struct MySqlIssuer {
    conn: AdminConnection,
}

impl MySqlIssuer {
    pub fn new(conn: AdminConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl CredentialIssuer for MySqlIssuer {
    async fn issue(
        &self,
        username: &str,
        password: &str,
        resource: &str,
    ) -> Result<(), CredentialError> {
        let user = quote_identifier("user name", username)?;
        let secret = quote_literal("password", password)?;
        let schema = quote_identifier("schema name", resource)?;

        // One checked-out connection for the whole grant sequence; it goes
        // back to the pool when dropped.
        let mut conn = self.conn.pool().acquire().await?;

        sqlx::query(&format!(
            "CREATE USER IF NOT EXISTS {}@'%' IDENTIFIED BY {}",
            user, secret
        ))
        .execute(&mut *conn)
        .await?;
        sqlx::query(&format!(
            "GRANT ALL PRIVILEGES ON {}.* TO {}@'%'",
            schema, user
        ))
        .execute(&mut *conn)
        .await?;

        debug!(user = %username, schema = %resource, "grant issued");
        Ok(())
    }

    async fn revoke(&self, resource: &str) -> Result<(), CredentialError> {
        let stmt = format!(
            "DROP DATABASE IF EXISTS {}",
            quote_identifier("schema name", resource)?
        );
        sqlx::query(&stmt).execute(self.conn.pool()).await?;
        debug!(schema = %resource, "schema dropped on revoke");
        Ok(())
    }

    fn endpoint(&self) -> ServerEndpoint {
        self.conn.endpoint()
    }
}
