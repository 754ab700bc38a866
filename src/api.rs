//! HTTP API for the control plane.
//!
//! A thin layer over [`Supervisor`], [`ActivityLog`] and [`ConfigStore`];
//! every endpoint answers JSON.

use crate::activity::{self, ActivityLog, LogEntry};
use crate::config::{ConfigStore, ConfigStoreError};
use crate::model::{ActionReply, StatusSnapshot};
use crate::orchestrator::{StartOutcome, StopOutcome, Supervisor};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared state for the API handlers.
#[derive(Clone)]
pub struct AppState {
    pub supervisor: Arc<Supervisor>,
    pub activity: ActivityLog,
    pub config: ConfigStore,
}

/// Errors surfaced to API callers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Config(#[from] ConfigStoreError),

    #[error("configuration cannot be represented as JSON: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Config(ConfigStoreError::InvalidYaml(_) | ConfigStoreError::Invalid(_)) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = serde_json::json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/start", post(start_worker))
        .route("/api/stop", post(stop_worker))
        .route("/api/logs", get(get_logs))
        .route("/api/config", get(get_config).post(update_config))
        .route("/health", get(health_check))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "ok"
}

async fn get_status(State(state): State<AppState>) -> Json<StatusSnapshot> {
    Json(state.supervisor.status().await)
}

async fn start_worker(State(state): State<AppState>) -> (StatusCode, Json<ActionReply>) {
    let reply = match state.supervisor.start().await {
        StartOutcome::Started => ActionReply::new("started", "Worker is starting"),
        StartOutcome::AlreadyRunning => {
            ActionReply::new("already_running", "Worker is already running")
        }
        StartOutcome::Rejected(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ActionReply::new("invalid_config", e.to_string())),
            );
        }
    };
    (StatusCode::OK, Json(reply))
}

async fn stop_worker(State(state): State<AppState>) -> Json<ActionReply> {
    let reply = match state.supervisor.stop().await {
        StopOutcome::Stopped => ActionReply::new("stopped", "Worker has been stopped"),
        StopOutcome::NotRunning => ActionReply::new("not_running", "Worker is not running"),
        StopOutcome::Error(e) => ActionReply::new("error", format!("Error stopping worker: {e}")),
    };
    Json(reply)
}

#[derive(Debug, Deserialize)]
struct LogsQuery {
    limit: Option<usize>,
}

impl LogsQuery {
    fn limit(&self) -> usize {
        self.limit
            .unwrap_or(activity::DEFAULT_LIMIT)
            .min(activity::MAX_LIMIT)
    }
}

async fn get_logs(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<Vec<LogEntry>>, ApiError> {
    let limit = query.limit();
    let log = state.activity.clone();
    let entries = tokio::task::spawn_blocking(move || log.read(limit)).await?;
    Ok(Json(entries))
}

async fn get_config(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let store = state.config.clone();
    let document = tokio::task::spawn_blocking(move || store.load()).await??;
    Ok(Json(serde_json::to_value(document)?))
}

#[derive(Debug, Deserialize)]
struct ConfigUpdate {
    config_yaml: String,
}

async fn update_config(
    State(state): State<AppState>,
    Json(update): Json<ConfigUpdate>,
) -> Result<Json<ActionReply>, ApiError> {
    let store = state.config.clone();
    tokio::task::spawn_blocking(move || store.replace_from_yaml(&update.config_yaml)).await??;
    Ok(Json(ActionReply::new(
        "success",
        "Configuration updated successfully",
    )))
}
