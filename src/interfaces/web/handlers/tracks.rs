use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::super::AppState;
use super::super::error::{ApiError, ApiResult};
use super::clamp_limit;
use crate::core::store::SnapshotDraft;

pub async fn list_tracks(State(state): State<AppState>) -> ApiResult {
    let stats = state.store.stats().await?;
    Ok(Json(json!({ "success": true, "tracks": stats })))
}

pub async fn append_snapshot(
    Path(track): Path<String>,
    State(state): State<AppState>,
    payload: Result<Json<SnapshotDraft>, JsonRejection>,
) -> ApiResult {
    let Json(draft) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let snapshot = state.store.append(&track, draft).await?;
    debug!("Appended snapshot {} to [{}] via API", snapshot.id, track);
    Ok(Json(json!({ "success": true, "snapshot": snapshot })))
}

pub async fn latest_snapshot(Path(track): Path<String>, State(state): State<AppState>) -> ApiResult {
    match state.store.latest(&track).await? {
        Some(snapshot) => Ok(Json(json!({ "success": true, "snapshot": snapshot }))),
        None => Err(ApiError::NotFound(format!(
            "track '{}' has no snapshots yet",
            track
        ))),
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    hours: Option<u32>,
    limit: Option<usize>,
}

pub async fn track_history(
    Path(track): Path<String>,
    State(state): State<AppState>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> ApiResult {
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let hours = params.hours.unwrap_or(24);
    let since = Utc::now()
        .checked_sub_signed(Duration::hours(i64::from(hours)))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    let snapshots = state
        .store
        .query(&track, since, clamp_limit(params.limit, 100))
        .await?;
    Ok(Json(json!({
        "success": true,
        "track": track,
        "hours": hours,
        "snapshots": snapshots
    })))
}
