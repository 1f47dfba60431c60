//! Broker configuration file format for `broker serve`.
//!
//! Every key is optional; missing keys take the defaults below. Command-line
//! flags override the file, and `PORT` in the environment overrides the
//! file's `port`.
//!
//! # Example
//!
//! ```toml
//! port = 8080
//! backend = "mysql"
//! data_dir = "/var/lib/broker"
//! catalog_dir = "assets/catalog"
//! dashboard_base_url = "https://broker.example.com/dashboard"
//! poll_interval_seconds = 10
//! call_timeout_secs = 10
//!
//! [snapshots]
//! instances_file = "service_instances.json"
//! bindings_file = "service_bindings.json"
//! credentials_file = "service_credentials.json"
//!
//! [admin]
//! pool_size = 1
//! connect_retries = 5
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use broker_core::backend::mysql::AdminOptions;
use broker_core::{ControllerSettings, ProvisionerKind};
use broker_storage::SnapshotLayout;
use serde::{Deserialize, Serialize};

// ── Types ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrokerConfig {
    pub port: u16,
    pub backend: ProvisionerKind,
    /// Directory holding the three snapshot documents.
    pub data_dir: PathBuf,
    /// Directory holding `catalog.json` and `catalog.sandbox.json`.
    pub catalog_dir: PathBuf,
    /// Defaults to `http://localhost:<port>/dashboard`.
    pub dashboard_base_url: Option<String>,
    pub poll_interval_seconds: u64,
    pub call_timeout_secs: u64,
    /// State polls a sandbox schema stays pending before it reports running.
    pub sandbox_pending_polls: u32,
    pub snapshots: SnapshotFiles,
    pub admin: AdminSettings,
}

/// `[snapshots]` section: file names under `data_dir`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SnapshotFiles {
    pub instances_file: String,
    pub bindings_file: String,
    pub credentials_file: String,
}

/// `[admin]` section: the administrative connection to the backing server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdminSettings {
    pub pool_size: u32,
    pub connect_retries: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            backend: ProvisionerKind::Mysql,
            data_dir: PathBuf::from("data"),
            catalog_dir: PathBuf::from("assets/catalog"),
            dashboard_base_url: None,
            poll_interval_seconds: broker_core::controller::DEFAULT_POLL_INTERVAL_SECONDS,
            call_timeout_secs: broker_core::controller::DEFAULT_CALL_TIMEOUT.as_secs(),
            sandbox_pending_polls: 1,
            snapshots: SnapshotFiles::default(),
            admin: AdminSettings::default(),
        }
    }
}

impl Default for SnapshotFiles {
    fn default() -> Self {
        let layout = SnapshotLayout::new("");
        Self {
            instances_file: layout.instances_file,
            bindings_file: layout.bindings_file,
            credentials_file: layout.credentials_file,
        }
    }
}

impl Default for AdminSettings {
    fn default() -> Self {
        let defaults = AdminOptions::default();
        Self {
            pool_size: defaults.max_connections,
            connect_retries: defaults.connect_retries,
            acquire_timeout_secs: defaults.acquire_timeout.as_secs(),
        }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Read and parse a config file.
pub fn read_config(path: &Path) -> Result<BrokerConfig, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("could not read '{}': {}", path.display(), e))?;
    toml::from_str(&content).map_err(|e| format!("could not parse '{}': {}", path.display(), e))
}

impl BrokerConfig {
    /// The file at `path` if given, else defaults; then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, String> {
        let mut config = match path {
            Some(p) => read_config(p)?,
            None => BrokerConfig::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `PORT` from `lookup`, if set.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), String>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT").filter(|p| !p.is_empty()) {
            self.port = port
                .parse()
                .map_err(|_| format!("PORT is not a valid port: '{}'", port))?;
        }
        Ok(())
    }

    pub fn dashboard_base_url(&self) -> String {
        self.dashboard_base_url
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}/dashboard", self.port))
    }

    pub fn snapshot_layout(&self) -> SnapshotLayout {
        SnapshotLayout {
            data_dir: self.data_dir.clone(),
            instances_file: self.snapshots.instances_file.clone(),
            bindings_file: self.snapshots.bindings_file.clone(),
            credentials_file: self.snapshots.credentials_file.clone(),
        }
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            dashboard_base_url: self.dashboard_base_url(),
            poll_interval_seconds: self.poll_interval_seconds,
            call_timeout: Duration::from_secs(self.call_timeout_secs),
        }
    }

    pub fn admin_options(&self) -> AdminOptions {
        AdminOptions {
            max_connections: self.admin.pool_size.max(1),
            acquire_timeout: Duration::from_secs(self.admin.acquire_timeout_secs),
            connect_retries: self.admin.connect_retries,
            ..AdminOptions::default()
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
