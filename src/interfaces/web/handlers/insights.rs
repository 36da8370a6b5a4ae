use axum::{
    Json,
    extract::{Query, State, rejection::QueryRejection},
};
use serde::Deserialize;
use serde_json::json;

use super::super::AppState;
use super::super::error::{ApiError, ApiResult};
use super::clamp_limit;

#[derive(Debug, Deserialize)]
pub struct InsightParams {
    limit: Option<usize>,
    min_confidence: Option<f64>,
}

pub async fn get_insights(
    State(state): State<AppState>,
    params: Result<Query<InsightParams>, QueryRejection>,
) -> ApiResult {
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let min_confidence = params.min_confidence.unwrap_or(0.0);
    let insights = state
        .consolidator
        .consolidate(min_confidence, clamp_limit(params.limit, 20))
        .await?;
    Ok(Json(json!({
        "success": true,
        "count": insights.len(),
        "insights": insights
    })))
}
