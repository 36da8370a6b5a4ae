use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use sha2::{Digest, Sha256};

use super::AppState;
use super::error::ApiError;

pub(crate) fn is_loopback(host: &str) -> bool {
    matches!(host, "127.0.0.1" | "::1" | "localhost")
}

fn digest(value: &str) -> Vec<u8> {
    Sha256::digest(value.as_bytes()).to_vec()
}

/// Guards administrative routes.
///
/// With an admin token configured, requests must carry
/// `Authorization: Bearer <token>`. Without one, admin routes are only served
/// when the API listens on a loopback address.
pub async fn require_admin(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    let Some(expected) = state.admin_token.as_deref() else {
        if is_loopback(&state.api_host) {
            return next.run(req).await;
        }
        return ApiError::Unauthorized(
            "No admin token configured. Set api.admin_token before exposing admin routes on a non-loopback address."
                .to_string(),
        )
        .into_response();
    };

    let presented = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "));

    match presented {
        None => ApiError::Unauthorized(
            "Missing or invalid Authorization header. Use: Bearer <token>".to_string(),
        )
        .into_response(),
        // Compare digests so the check does not short-circuit on a prefix.
        Some(token) if digest(token.trim()) == digest(expected) => next.run(req).await,
        Some(_) => ApiError::Unauthorized("Invalid admin token".to_string()).into_response(),
    }
}
