//! Control-plane HTTP API.
//!
//! The host player drives the helper through this loopback-oriented JSON
//! surface. Session-modifying calls go through `spawn_blocking` because
//! the coordinator talks blocking protocol clients that may legitimately
//! take tens of seconds.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::coordinator::SharedCoordinator;
use crate::discovery::DiscoveryManager;
use crate::errors::CastControlError;
use crate::registry::SharedDirectory;
use beamserver::Server;

#[derive(Clone)]
struct ApiState {
    coordinator: SharedCoordinator,
    directory: SharedDirectory,
    discovery: Arc<DiscoveryManager>,
}

/// Registers the cast control API on the server.
#[allow(async_fn_in_trait)]
pub trait CastControlExt {
    async fn init_cast_api(
        &mut self,
        coordinator: SharedCoordinator,
        directory: SharedDirectory,
        discovery: Arc<DiscoveryManager>,
    );
}

impl CastControlExt for Server {
    async fn init_cast_api(
        &mut self,
        coordinator: SharedCoordinator,
        directory: SharedDirectory,
        discovery: Arc<DiscoveryManager>,
    ) {
        let state = ApiState {
            coordinator,
            directory,
            discovery,
        };
        let router = Router::new()
            .route("/health", get(health).options(beamserver::preflight))
            .route("/devices", get(list_devices).options(beamserver::preflight))
            .route("/devices/refresh", post(refresh_devices).options(beamserver::preflight))
            .route("/devices/{id}", get(get_device).options(beamserver::preflight))
            .route("/cast", post(cast).options(beamserver::preflight))
            .route("/control", post(control).options(beamserver::preflight))
            .route("/status", get(status).options(beamserver::preflight))
            .route("/stop", post(stop).options(beamserver::preflight))
            .route("/shutdown", post(shutdown).options(beamserver::preflight))
            .with_state(state);
        self.add_router("/", router).await;
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn list_devices(State(state): State<ApiState>) -> Response {
    let devices = state.directory.lock().unwrap().list();
    Json(devices).into_response()
}

async fn get_device(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    if id.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Empty device id"})),
        )
            .into_response();
    }
    match state.directory.lock().unwrap().get(&id) {
        Some(device) => Json(device).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("Device not found: {}", id)})),
        )
            .into_response(),
    }
}

async fn refresh_devices(State(state): State<ApiState>) -> Json<serde_json::Value> {
    state.discovery.refresh();
    Json(json!({"status": "refreshing"}))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CastRequest {
    device_id: String,
    media_url: String,
    #[serde(default)]
    position: Option<f64>,
}

async fn cast(State(state): State<ApiState>, Json(request): Json<CastRequest>) -> Response {
    if request.media_url.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "mediaUrl must not be empty"})),
        )
            .into_response();
    }

    let coordinator = state.coordinator.clone();
    let result = tokio::task::spawn_blocking(move || {
        coordinator
            .lock()
            .unwrap()
            .start(&request.device_id, &request.media_url, request.position)
    })
    .await;

    match result {
        Ok(Ok(())) => Json(json!({"status": "casting"})).into_response(),
        Ok(Err(e)) => coordinator_error(e),
        Err(e) => join_error(e),
    }
}

#[derive(Debug, Deserialize)]
struct ControlRequest {
    action: String,
    #[serde(default)]
    value: Option<f64>,
}

async fn control(State(state): State<ApiState>, Json(request): Json<ControlRequest>) -> Response {
    let coordinator = state.coordinator.clone();
    let result = tokio::task::spawn_blocking(move || {
        coordinator
            .lock()
            .unwrap()
            .control(&request.action, request.value)
    })
    .await;

    match result {
        Ok(Ok(())) => Json(json!({"status": "ok"})).into_response(),
        Ok(Err(e)) => coordinator_error(e),
        Err(e) => join_error(e),
    }
}

async fn status(State(state): State<ApiState>) -> Response {
    let coordinator = state.coordinator.clone();
    match tokio::task::spawn_blocking(move || coordinator.lock().unwrap().status()).await {
        Ok(status) => Json(status).into_response(),
        Err(e) => join_error(e),
    }
}

async fn stop(State(state): State<ApiState>) -> Response {
    let coordinator = state.coordinator.clone();
    let result = tokio::task::spawn_blocking(move || coordinator.lock().unwrap().stop()).await;
    match result {
        Ok(Ok(())) => Json(json!({"status": "stopped"})).into_response(),
        Ok(Err(e)) => coordinator_error(e),
        Err(e) => join_error(e),
    }
}

async fn shutdown(State(state): State<ApiState>) -> Json<serde_json::Value> {
    info!("Shutdown requested on the control plane");
    let coordinator = state.coordinator.clone();
    tokio::spawn(async move {
        // Give the response time to flush, then exit for real.
        let _ = tokio::task::spawn_blocking(move || coordinator.lock().unwrap().stop()).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        std::process::exit(0);
    });
    Json(json!({"status": "shutting_down"}))
}

fn coordinator_error(error: CastControlError) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"error": error.to_string()})),
    )
        .into_response()
}

fn join_error(error: tokio::task::JoinError) -> Response {
    warn!("Coordinator task failed: {}", error);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "internal error"})),
    )
        .into_response()
}
