use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::state::AppState;

/// `GET /metrics` — Prometheus text exposition, version 0.0.4 (spec §4.7,
/// §6). Reads the registry through a shared-reader lock internal to
/// `prometheus::Registry`; never blocks the pipeline.
pub async fn metrics(State(state): State<AppState>) -> (StatusCode, [(&'static str, &'static str); 1], String) {
    match state.metrics.encode_text() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            body,
        ),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics registry");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain; version=0.0.4")],
                String::new(),
            )
        }
    }
}

/// `GET /healthz` — ambient liveness probe, standard on every teacher
/// HTTP surface but outside spec.md's instrument table.
pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// `GET /workers` — JSON snapshot of every `WorkerState`, consumed by
/// the out-of-scope desktop UI (spec §6). The UI polls; no subscription
/// protocol is implemented here.
pub async fn workers(State(state): State<AppState>) -> Json<Vec<sentinel_core::WorkerState>> {
    Json(state.supervisor.snapshot())
}
