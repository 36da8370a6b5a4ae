use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde_json::json;
use tracing::info;

use super::super::AppState;
use super::super::error::{ApiError, ApiResult};
use crate::core::store::RetentionPolicy;

/// Body is a retention policy: `{"keep_days": 7}`, `{"keep_latest": 10}` or
/// `"wipe"`.
pub async fn run_cleanup(
    State(state): State<AppState>,
    payload: Result<Json<RetentionPolicy>, JsonRejection>,
) -> ApiResult {
    let Json(policy) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    info!("Admin cleanup requested ({})", policy);
    let deleted = state.store.cleanup(policy).await?;
    let total: usize = deleted.values().sum();
    Ok(Json(json!({
        "success": true,
        "policy": policy.to_string(),
        "deleted": deleted,
        "total": total
    })))
}
