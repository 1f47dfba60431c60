//! HTTP route handlers: health, catalog, instances, bindings.
//!
//! Each handler is a thin adapter: decode the request, call one controller
//! operation, and encode the result or map its [`BrokerError`] to a status.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use broker_core::{BrokerError, CreateInstanceRequest, ErrorKind};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::auth::BasicAuth;
use super::json_error;
use super::state::AppState;

/// Realm advertised on 401 responses.
const AUTH_REALM: &str = "Basic realm=\"service-broker\"";

/// Status code for each failure kind.
pub(crate) fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Gone => StatusCode::GONE,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Internal | ErrorKind::Io => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: &BrokerError) -> Response {
    let status = status_for(err.kind());
    let mut response = json_error(status, &err.to_string()).into_response();
    if status == StatusCode::UNAUTHORIZED {
        response
            .headers_mut()
            .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static(AUTH_REALM));
    }
    response
}

fn empty_object() -> serde_json::Value {
    serde_json::json!({})
}

/// Decode an optional JSON body. An empty body is `T::default()`.
fn decode_body<T>(body: &Bytes) -> Result<T, Response>
where
    T: DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| {
        json_error(
            StatusCode::BAD_REQUEST,
            &format!("malformed request body: {}", e),
        )
        .into_response()
    })
}

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// GET /health
pub(crate) async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let response = serde_json::json!({
        "status": "ok",
        "backend": state.backend.as_str(),
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(response))
}

/// GET /catalog
pub(crate) async fn handle_catalog(State(state): State<Arc<AppState>>) -> Response {
    match state.controller.list_catalog().await {
        Ok(doc) => (StatusCode::OK, Json(doc)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// PUT /instances/{instance_id}
pub(crate) async fn handle_create_instance(
    State(state): State<Arc<AppState>>,
    Path(instance_id): Path<String>,
    BasicAuth(principal): BasicAuth,
    body: Bytes,
) -> Response {
    let request: CreateInstanceRequest = match decode_body(&body) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    match state
        .controller
        .create_instance(&instance_id, request, principal.as_ref())
        .await
    {
        Ok(desc) => (StatusCode::ACCEPTED, Json(desc)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// GET /instances/{instance_id}
pub(crate) async fn handle_get_instance(
    State(state): State<Arc<AppState>>,
    Path(instance_id): Path<String>,
) -> Response {
    match state.controller.get_instance_state(&instance_id).await {
        Ok(desc) => (StatusCode::OK, Json(desc)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// GET /v2/service_instances/{instance_id}/last_operation
pub(crate) async fn handle_last_operation(
    State(state): State<Arc<AppState>>,
    Path(instance_id): Path<String>,
) -> Response {
    match state.controller.get_instance_state(&instance_id).await {
        Ok(desc) => {
            let body = serde_json::json!({
                "state": desc.last_operation.state.as_str(),
                "description": desc.last_operation.description,
            });
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => error_response(&e),
    }
}

/// DELETE /instances/{instance_id}
pub(crate) async fn handle_delete_instance(
    State(state): State<Arc<AppState>>,
    Path(instance_id): Path<String>,
) -> Response {
    match state.controller.delete_instance(&instance_id).await {
        Ok(()) => (StatusCode::OK, Json(empty_object())).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Optional bind body. Accepts both the flat and the `bind_resource` form.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct BindRequest {
    #[serde(default)]
    app_guid: Option<String>,
    #[serde(default)]
    bind_resource: Option<BindResource>,
}

#[derive(Debug, Default, Deserialize)]
struct BindResource {
    #[serde(default)]
    app_guid: Option<String>,
}

impl BindRequest {
    fn app_id(self) -> Option<String> {
        self.bind_resource
            .and_then(|r| r.app_guid)
            .or(self.app_guid)
    }
}

/// PUT /instances/{instance_id}/bindings/{binding_id}
///
/// Responds with the bare credential.
pub(crate) async fn handle_bind(
    State(state): State<Arc<AppState>>,
    Path((instance_id, binding_id)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    let request: BindRequest = match decode_body(&body) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    match state
        .controller
        .bind(&binding_id, &instance_id, request.app_id())
        .await
    {
        Ok(credential) => (StatusCode::OK, Json(credential)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// PUT /v2/service_instances/{instance_id}/service_bindings/{binding_id}
///
/// Same operation, credential wrapped as `{"credentials": ...}`.
pub(crate) async fn handle_osb_bind(
    State(state): State<Arc<AppState>>,
    Path((instance_id, binding_id)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    let request: BindRequest = match decode_body(&body) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    match state
        .controller
        .bind(&binding_id, &instance_id, request.app_id())
        .await
    {
        Ok(credential) => (
            StatusCode::OK,
            Json(serde_json::json!({ "credentials": credential })),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

/// DELETE /instances/{instance_id}/bindings/{binding_id}
pub(crate) async fn handle_unbind(
    State(state): State<Arc<AppState>>,
    Path((instance_id, binding_id)): Path<(String, String)>,
) -> Response {
    match state.controller.unbind(&binding_id, &instance_id).await {
        Ok(()) => (StatusCode::OK, Json(empty_object())).into_response(),
        Err(e) => error_response(&e),
    }
}
