//! HTTP API for the SWIFT FIN mock's control plane.
//!
//! A thin `axum` adapter over `fin_engine::control`'s four named operations:
//! `GET /status`, `GET /messages`, `POST /inject-error`, `POST /reset`.

use fin_engine::control;
use fin_engine::engine::Engine;
use fin_engine::fault::ErrorMode;

use axum::{
    extract::State,
    http::{Method, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Deserialize)]
pub struct InjectErrorRequest {
    pub error_type: String,
    #[serde(default)]
    pub sequences: Vec<i64>,
    pub latency_ms: Option<u64>,
}

/// GET /status — sessions, active fault state, and a recent message tail.
async fn get_status(State(engine): State<Arc<Engine>>) -> Json<control::StatusSnapshot> {
    Json(control::status(&engine))
}

/// GET /messages — the full bounded audit log.
async fn get_messages(State(engine): State<Arc<Engine>>) -> Json<Vec<fin_engine::store::AuditEntry>> {
    Json(control::messages(&engine))
}

/// POST /inject-error — arm a fault mode, optionally with ignored sequences
/// or a latency value.
async fn post_inject_error(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<InjectErrorRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    let mode = ErrorMode::parse(&req.error_type)
        .ok_or_else(|| (StatusCode::BAD_REQUEST, format!("unknown error_type: {}", req.error_type)))?;
    control::inject_error(&engine, mode, &req.sequences, req.latency_ms);
    Ok(StatusCode::OK)
}

/// POST /reset — clears sessions, audit log, and all fault state.
async fn post_reset(State(engine): State<Arc<Engine>>) -> StatusCode {
    control::reset(&engine);
    StatusCode::OK
}

/// Build the axum router with CORS enabled, matching the teacher's
/// permissive-any policy for a local mock server.
pub fn build_router(engine: Arc<Engine>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/status", get(get_status))
        .route("/messages", get(get_messages))
        .route("/inject-error", post(post_inject_error))
        .route("/reset", post(post_reset))
        .layer(cors)
        .with_state(engine)
}
