use axum::{
    Json,
    extract::{Path, Query, State, rejection::QueryRejection},
};
use serde::Deserialize;
use serde_json::json;

use super::super::AppState;
use super::super::error::{ApiError, ApiResult};
use super::clamp_limit;

/// Path segment selecting every track instead of a single one.
const ALL_TRACKS: &str = "all";
const DEFAULT_FIELD: &str = "confidence";

#[derive(Debug, Deserialize)]
pub struct RankedParams {
    field: Option<String>,
    min: Option<f64>,
    limit: Option<usize>,
}

pub async fn ranked_snapshots(
    Path(track): Path<String>,
    State(state): State<AppState>,
    params: Result<Query<RankedParams>, QueryRejection>,
) -> ApiResult {
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let min = params.min.unwrap_or(f64::MIN);
    let limit = clamp_limit(params.limit, 20);

    let (field, snapshots) = if track == ALL_TRACKS {
        let field = params.field.unwrap_or_else(|| DEFAULT_FIELD.to_string());
        let ranked = state.store.ranked_across_tracks(&field, min, limit).await?;
        (field, ranked)
    } else {
        // Without an explicit field, rank by the track's own score field.
        let field = match params.field {
            Some(field) => field,
            None => state
                .store
                .registry()
                .get(&track)
                .map(|def| def.kind.ranking_field().to_string())
                .unwrap_or_else(|| DEFAULT_FIELD.to_string()),
        };
        let ranked = state
            .store
            .ranked_by_field(&track, &field, min, limit)
            .await?;
        (field, ranked)
    };

    Ok(Json(json!({
        "success": true,
        "track": track,
        "field": field,
        "snapshots": snapshots
    })))
}
