//! `broker serve` -- HTTP server for the service broker.
//!
//! Builds the configured backend, restores the entity maps from the data
//! directory, runs a reconcile pass, and serves the broker API with `axum`.
//!
//! Endpoints (each also mounted under `/v2` with Open Service Broker paths):
//! - GET    /health                                          - Server status
//! - GET    /catalog                                         - Offerings document
//! - PUT    /instances/{instance_id}                         - Create instance (basic auth)
//! - GET    /instances/{instance_id}                         - Poll instance state
//! - DELETE /instances/{instance_id}                         - Delete instance
//! - PUT    /instances/{instance_id}/bindings/{binding_id}   - Bind
//! - DELETE /instances/{instance_id}/bindings/{binding_id}   - Unbind
//!
//! `/v2` paths: `/v2/catalog`, `/v2/service_instances/{instance_id}`,
//! `/v2/service_instances/{instance_id}/last_operation`, and
//! `/v2/service_instances/{instance_id}/service_bindings/{binding_id}`.
//!
//! All responses use Content-Type: application/json.

mod auth;
mod handlers;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use broker_core::backend::mysql::BackingStoreConfig;
use broker_core::{Backend, Catalog, LifecycleController, ProvisionerKind};
use broker_storage::FileSnapshotStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use self::handlers::{
    handle_bind, handle_catalog, handle_create_instance, handle_delete_instance,
    handle_get_instance, handle_health, handle_last_operation, handle_not_found,
    handle_osb_bind, handle_unbind,
};
use self::state::AppState;
use crate::config::BrokerConfig;

/// Maximum request body size: 1 MB.
const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Construct a JSON error response with the given status code and message.
fn json_error(status: StatusCode, message: &str) -> impl IntoResponse {
    (status, Json(serde_json::json!({"error": message})))
}

/// Build the backend selected by `config`.
///
/// The MySQL backend reads its address and admin identity from the
/// environment; a missing variable is a startup error.
pub async fn build_backend(config: &BrokerConfig) -> Result<Backend, Box<dyn std::error::Error>> {
    match config.backend {
        ProvisionerKind::Mysql => {
            let backing = BackingStoreConfig::from_env()?;
            Ok(Backend::mysql(&backing, &config.admin_options()).await?)
        }
        ProvisionerKind::Sandbox => {
            warn!("using the in-process sandbox backend; nothing is provisioned for real");
            Ok(Backend::sandbox(config.sandbox_pending_polls))
        }
    }
}

fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    let broker = Router::new()
        .route("/catalog", get(handle_catalog))
        .route(
            "/instances/{instance_id}",
            get(handle_get_instance)
                .put(handle_create_instance)
                .delete(handle_delete_instance),
        )
        .route(
            "/instances/{instance_id}/bindings/{binding_id}",
            axum::routing::put(handle_bind).delete(handle_unbind),
        );

    let osb = Router::new()
        .route("/catalog", get(handle_catalog))
        .route(
            "/service_instances/{instance_id}",
            get(handle_get_instance)
                .put(handle_create_instance)
                .delete(handle_delete_instance),
        )
        .route(
            "/service_instances/{instance_id}/last_operation",
            get(handle_last_operation),
        )
        .route(
            "/service_instances/{instance_id}/service_bindings/{binding_id}",
            axum::routing::put(handle_osb_bind).delete(handle_unbind),
        );

    Router::new()
        .route("/health", get(handle_health))
        .merge(broker)
        .nest("/v2", osb)
        .fallback(handle_not_found)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

/// Start the HTTP server described by `config`.
///
/// When TLS cert/key paths are provided, the server listens over HTTPS
/// using `axum-server` with rustls. Otherwise it uses plain HTTP.
pub async fn start_server(
    config: BrokerConfig,
    _tls_cert: Option<PathBuf>,
    _tls_key: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let backend = build_backend(&config).await?;
    let store = FileSnapshotStore::new(config.snapshot_layout());
    let catalog = Catalog::for_kind(&config.catalog_dir, backend.kind);
    info!(
        backend = %backend.kind,
        data_dir = %config.data_dir.display(),
        catalog = %catalog.path().display(),
        "starting broker"
    );

    let controller = LifecycleController::open(
        backend.provisioner.clone(),
        backend.issuer.clone(),
        store,
        catalog,
        config.controller_settings(),
    )
    .await?;
    controller.reconcile().await;

    let state = Arc::new(AppState {
        controller,
        backend: backend.kind,
    });
    let app = router(state);
    let addr = format!("0.0.0.0:{}", config.port);

    // TLS support via axum-server + rustls (requires `tls` feature)
    #[cfg(feature = "tls")]
    if let (Some(cert_path), Some(key_path)) = (&_tls_cert, &_tls_key) {
        let tls = axum_server::tls_rustls::RustlsConfig::from_pem_file(cert_path, key_path).await?;
        let socket_addr: std::net::SocketAddr = addr.parse()?;
        let handle = axum_server::Handle::new();
        let signal_handle = handle.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            signal_handle.graceful_shutdown(None);
        });
        info!("broker listening on https://{}", addr);
        let served = axum_server::bind_rustls(socket_addr, tls)
            .handle(handle)
            .serve(app.into_make_service())
            .await;
        backend.shutdown().await;
        served?;
        return Ok(());
    }

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("broker listening on http://{}", addr);
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    backend.shutdown().await;
    served?;
    info!("server shut down");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "could not install Ctrl+C handler; running until killed");
        std::future::pending::<()>().await;
    }
    info!("received shutdown signal");
}
