//! HTTP boundary
//!
//! Three surfaces share this router: the boot path nodes chain into from
//! iPXE, the config-fetch path the installer calls, and the management API
//! operators use to inspect and promote nodes.

use crate::provisioning::{Provisioner, ProvisioningError};
use crate::store::StoreError;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use bootforge_common::Node;
use serde::{Deserialize, Serialize};
use std::path::Path as FilePath;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub provisioner: Arc<Provisioner>,
}

/// Build the full router; installer images and other large artifacts are
/// served straight from the artifact directory under `/files/`.
pub fn router(state: AppState, artifact_dir: &FilePath) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/boot/{id}", get(boot_script))
        .route("/nodes", get(list_nodes))
        .route(
            "/nodes/{id}",
            get(get_node).put(replace_node).delete(delete_node),
        )
        .route("/config/{id}/config.ign", get(fetch_ignition))
        .route("/config/{id}/config.sh", get(fetch_combustion))
        .nest_service("/files", ServeDir::new(artifact_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Flat error body, the same shape on every failing route
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    message: String,
}

fn error_body(error: &str, message: impl ToString) -> Json<ErrorBody> {
    Json(ErrorBody {
        error: error.to_string(),
        message: message.to_string(),
    })
}

/// Map a provisioning failure onto a transport response
fn provisioning_response(err: ProvisioningError) -> Response {
    let (status, label) = match &err {
        ProvisioningError::UnknownNode(id) => {
            warn!(id = %id, "config fetch before boot contact");
            (StatusCode::CONFLICT, "unknown node")
        }
        ProvisioningError::UnknownFamily(_) => (StatusCode::NOT_FOUND, "unknown family"),
        _ => {
            error!(error = %err, "provisioning request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "provisioning failed")
        }
    };
    (status, error_body(label, err)).into_response()
}

/// Map a registry failure onto a transport response
fn store_response(err: StoreError) -> Response {
    error!(error = %err, "store operation failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        error_body("store failure", err),
    )
        .into_response()
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
struct BootQuery {
    mac: Option<String>,
}

async fn boot_script(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<BootQuery>,
) -> Response {
    let hwaddr = query.mac.unwrap_or_default();
    match state.provisioner.boot_contact(&id, &hwaddr) {
        Ok(artifact) => (
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            artifact.script().to_string(),
        )
            .into_response(),
        Err(err) => provisioning_response(err),
    }
}

async fn list_nodes(State(state): State<AppState>) -> Response {
    match state.provisioner.registry().list() {
        Ok(nodes) => Json(nodes).into_response(),
        Err(err) => store_response(err),
    }
}

async fn get_node(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.provisioner.registry().get(&id) {
        Ok(Some(node)) => Json(node).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            error_body("not found", format!("no node {}", id)),
        )
            .into_response(),
        Err(err) => store_response(err),
    }
}

async fn replace_node(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(node): Json<Node>,
) -> Response {
    match state.provisioner.registry().replace(&id, node) {
        Ok(stored) => Json(stored).into_response(),
        Err(err) => store_response(err),
    }
}

async fn delete_node(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.provisioner.registry().delete(&id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => store_response(err),
    }
}

async fn fetch_ignition(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    fetch_config(&state, &id, "ignition", "application/json")
}

async fn fetch_combustion(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    fetch_config(&state, &id, "combustion", "text/plain; charset=utf-8")
}

fn fetch_config(state: &AppState, id: &str, family: &str, content_type: &'static str) -> Response {
    match state.provisioner.config_fetch(id, family) {
        Ok(payload) => ([(header::CONTENT_TYPE, content_type)], payload).into_response(),
        Err(err) => provisioning_response(err),
    }
}
