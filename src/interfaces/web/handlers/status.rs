use axum::{Json, extract::State};
use chrono::Utc;
use serde_json::json;

use super::super::AppState;

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "success": true,
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

pub async fn worker_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let workers: Vec<serde_json::Value> = state
        .supervisor
        .status()
        .await
        .into_iter()
        .map(|w| {
            json!({
                "name": w.name,
                "running": w.is_running(),
                "restart_count": w.restart_count,
                "pid": w.pid,
                "phase": w.phase,
                "last_exit_code": w.last_exit_code,
                "started_at": w.started_at,
                "next_restart_at": w.next_restart_at
            })
        })
        .collect();

    Json(json!({
        "success": true,
        "uptime_secs": (Utc::now() - state.started_at).num_seconds(),
        "workers": workers
    }))
}
