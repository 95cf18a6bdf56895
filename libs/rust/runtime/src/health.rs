//! Liveness, readiness, status and metrics endpoints for a node.

use std::{
    net::SocketAddr,
    sync::{atomic::{AtomicBool, Ordering}, Arc},
};

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use field_core::DeviceId;
use serde_json::json;

use crate::actuator::FieldRecorder;
use crate::metrics;

static NODE_LIVENESS: AtomicBool = AtomicBool::new(true);
static NODE_READINESS: AtomicBool = AtomicBool::new(false);

pub fn mark_ready() { NODE_READINESS.store(true, Ordering::SeqCst); }
pub fn clear_ready() { NODE_READINESS.store(false, Ordering::SeqCst); }
pub fn mark_not_live() { NODE_LIVENESS.store(false, Ordering::SeqCst); }

#[derive(Clone)]
pub struct HealthState {
    pub device: DeviceId,
    pub recorder: Arc<FieldRecorder>,
}

pub fn status(state: &HealthState) -> serde_json::Value {
    json!({
        "device": state.device.as_str(),
        "live": NODE_LIVENESS.load(Ordering::SeqCst),
        "ready": NODE_READINESS.load(Ordering::SeqCst),
        "view": state.recorder.view(&state.device),
    })
}

pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/live", get(|| async { Json(json!({"live": NODE_LIVENESS.load(Ordering::SeqCst)})) }))
        .route("/ready", get(|| async { Json(json!({"ready": NODE_READINESS.load(Ordering::SeqCst)})) }))
        .route("/status", get(|State(s): State<HealthState>| async move { Json(status(&s)) }))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

async fn metrics_handler() -> impl IntoResponse {
    match metrics::render() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub async fn start_health_server(port: u16, state: HealthState) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(?addr, "health_server_listening");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router(state)).await {
            tracing::error!(error = ?e, "health_server_failed");
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_reports_device_view() {
        let state = HealthState { device: DeviceId::new("n1"), recorder: Arc::new(FieldRecorder::new()) };
        let body = status(&state);
        assert_eq!(body["device"], "n1");
        assert!(body["view"].is_null());
    }
}
