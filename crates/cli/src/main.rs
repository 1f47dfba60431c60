mod config;
mod serve;

use std::path::PathBuf;
use std::process;

use broker_core::{Catalog, ProvisionerKind};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::config::BrokerConfig;

/// Log filter used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "broker=info,broker_core=info,broker_storage=info,tower_http=info";

/// Service broker for per-tenant databases.
#[derive(Parser)]
#[command(name = "broker", version, about = "Service broker for per-tenant databases")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Flags shared by every subcommand that reads the broker config.
#[derive(clap::Args, Debug, Clone, Default)]
struct ConfigArgs {
    /// Path to a broker.toml configuration file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Backing resource kind (mysql or sandbox)
    #[arg(long)]
    backend: Option<ProvisionerKind>,
    /// Directory holding the catalog documents
    #[arg(long)]
    catalog_dir: Option<PathBuf>,
}

impl ConfigArgs {
    fn resolve(&self) -> Result<BrokerConfig, String> {
        let mut config = BrokerConfig::load(self.config.as_deref())?;
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if let Some(dir) = &self.catalog_dir {
            config.catalog_dir = dir.clone();
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start the broker HTTP server
    Serve {
        #[command(flatten)]
        common: ConfigArgs,
        /// Port to listen on (overrides PORT and the config file)
        #[arg(long)]
        port: Option<u16>,
        /// Directory holding the snapshot documents
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// Path to TLS certificate PEM file (requires --tls-key)
        #[arg(long)]
        tls_cert: Option<PathBuf>,
        /// Path to TLS private key PEM file (requires --tls-cert)
        #[arg(long)]
        tls_key: Option<PathBuf>,
    },

    /// Print the catalog document for the configured backend
    Catalog {
        #[command(flatten)]
        common: ConfigArgs,
    },
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn runtime() -> tokio::runtime::Runtime {
    match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to create tokio runtime: {}", e);
            process::exit(1);
        }
    }
}

fn main() {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            common,
            port,
            data_dir,
            tls_cert,
            tls_key,
        } => {
            // Validate TLS flags: both must be provided or neither
            if tls_cert.is_some() != tls_key.is_some() {
                eprintln!("error: --tls-cert and --tls-key must both be provided");
                process::exit(1);
            }
            let mut config = match common.resolve() {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("error: {}", e);
                    process::exit(1);
                }
            };
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(dir) = data_dir {
                config.data_dir = dir;
            }
            if let Err(e) = runtime().block_on(serve::start_server(config, tls_cert, tls_key)) {
                eprintln!("Server error: {}", e);
                process::exit(1);
            }
        }
        Commands::Catalog { common } => {
            let config = match common.resolve() {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("error: {}", e);
                    process::exit(1);
                }
            };
            let catalog = Catalog::for_kind(&config.catalog_dir, config.backend);
            match runtime().block_on(catalog.load()) {
                Ok(doc) => match serde_json::to_string_pretty(&doc) {
                    Ok(text) => println!("{}", text),
                    Err(e) => {
                        eprintln!("error: {}", e);
                        process::exit(1);
                    }
                },
                Err(e) => {
                    eprintln!("error: {} ({})", e, catalog.path().display());
                    process::exit(1);
                }
            }
        }
    }
}
