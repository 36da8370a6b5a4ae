use axum::{
    Router,
    body::Body,
    http::{HeaderValue, Method, Request, header},
    middleware,
    middleware::Next,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

use super::AppState;
use super::auth;
use super::handlers::{admin, insights, ranked, status, tracks};

fn build_localhost_cors(api_port: u16) -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        format!("http://127.0.0.1:{}", api_port),
        format!("http://localhost:{}", api_port),
    ]
    .iter()
    .filter_map(|o| o.parse().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any)
}

pub fn build_api_router(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/api/admin/cleanup", post(admin::run_cleanup))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_admin,
        ))
        .with_state(state.clone());

    let read_routes = Router::new()
        .route("/api/health", get(status::health))
        .route("/api/status", get(status::worker_status))
        .route("/api/tracks", get(tracks::list_tracks))
        .route(
            "/api/tracks/{track}/snapshots",
            post(tracks::append_snapshot),
        )
        .route("/api/tracks/{track}/latest", get(tracks::latest_snapshot))
        .route("/api/tracks/{track}/history", get(tracks::track_history))
        .route("/api/ranked/{track}", get(ranked::ranked_snapshots))
        .route("/api/insights", get(insights::get_insights))
        .route("/api/logs", get(super::sse_logs_endpoint))
        .with_state(state.clone());

    read_routes
        .merge(admin_routes)
        .layer(middleware::from_fn(security_headers))
        .layer(build_localhost_cors(state.api_port))
}

async fn security_headers(req: Request<Body>, next: Next) -> axum::response::Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
    );
    response
}
