//! Operator control API.
//!
//! The only way to re-arm the engine after a stop or an environment switch.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::watch;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

use crate::core::Scheduler;
use crate::errors::EngineError;
use crate::store::ConfigStore;
use crate::types::{EngineConfig, EngineConfigPatch, EngineStatus, ScanOutcome, TradingEnvironment};

#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    pub store: Arc<dyn ConfigStore>,
    pub environment: Arc<watch::Sender<TradingEnvironment>>,
}

/// JSON error body with a status derived from the engine error.
pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EngineError::Config(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EnvironmentBody {
    pub environment: TradingEnvironment,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EnvironmentChange {
    pub environment: TradingEnvironment,
    pub changed: bool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/config", get(get_config).put(update_config))
        .route("/start", post(start))
        .route("/stop", post(stop))
        .route("/stop-all", post(stop_all))
        .route("/scan", post(scan))
        .route("/environment", get(get_environment).put(set_environment))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "service": "autopilot" }))
}

async fn status(State(state): State<AppState>) -> Json<EngineStatus> {
    Json(state.scheduler.status().await)
}

async fn get_config(State(state): State<AppState>) -> Result<Json<EngineConfig>, ApiError> {
    Ok(Json(state.store.get().await?))
}

/// Settings update. The armed flag is routed through start/stop so the loop
/// follows it; the environment can only change through `/environment`.
async fn update_config(
    State(state): State<AppState>,
    Json(mut patch): Json<EngineConfigPatch>,
) -> Result<Json<EngineConfig>, ApiError> {
    if let Some(requested) = patch.environment.take() {
        let stored = state.store.get().await?.environment;
        if requested != stored {
            return Err(EngineError::Config(
                "environment changes go through PUT /environment".into(),
            )
            .into());
        }
    }

    let enabled = patch.enabled.take();
    let mut config = state.store.update(&patch).await?;
    state.scheduler.remember_config(&config);

    match enabled {
        Some(true) => config = state.scheduler.start().await?,
        Some(false) => config = state.scheduler.stop().await?,
        None => {}
    }

    info!(enabled = config.enabled, "engine config updated via API");
    Ok(Json(config))
}

async fn start(State(state): State<AppState>) -> Result<Json<EngineStatus>, ApiError> {
    state.scheduler.start().await?;
    Ok(Json(state.scheduler.status().await))
}

async fn stop(State(state): State<AppState>) -> Result<Json<EngineStatus>, ApiError> {
    state.scheduler.stop().await?;
    Ok(Json(state.scheduler.status().await))
}

/// Emergency stop. Same guarantees as `/stop`, logged loudly.
async fn stop_all(State(state): State<AppState>) -> Result<Json<EngineStatus>, ApiError> {
    warn!("emergency stop requested");
    state.scheduler.stop().await?;
    Ok(Json(state.scheduler.status().await))
}

async fn scan(State(state): State<AppState>) -> Json<ScanOutcome> {
    Json(state.scheduler.manual_scan().await)
}

async fn get_environment(State(state): State<AppState>) -> Json<EnvironmentBody> {
    Json(EnvironmentBody {
        environment: *state.environment.borrow(),
    })
}

/// Publish a new environment. The guard does the disarm.
async fn set_environment(
    State(state): State<AppState>,
    Json(body): Json<EnvironmentBody>,
) -> Json<EnvironmentChange> {
    let changed = state.environment.send_if_modified(|current| {
        if *current == body.environment {
            return false;
        }
        *current = body.environment;
        true
    });
    if changed {
        info!(environment = body.environment.as_str(), "environment switch requested");
    }
    Json(EnvironmentChange {
        environment: body.environment,
        changed,
    })
}
