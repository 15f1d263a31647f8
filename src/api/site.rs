//! Liveness and diagnostic endpoints
//!
//! - GET / - Plain text liveness
//! - GET /health - `{"status": "ok"}`
//! - GET /api/cors-test - Echo of the caller's origin and method
//! - GET /api/diagnostics - Database status, configured upstreams, request stats

use axum::{
    extract::State,
    http::{header, HeaderMap, Method},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tracing::warn;

use crate::api::middleware::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorsTestResponse {
    pub message: &'static str,
    pub origin: Option<String>,
    pub method: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsResponse {
    pub version: &'static str,
    pub database: DatabaseStatus,
    pub upstreams: UpstreamStatus,
    pub uptime_seconds: u64,
    pub requests: RequestStatsResponse,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseStatus {
    pub driver: String,
    pub connected: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamStatus {
    pub text_generation: bool,
    pub image_search: bool,
    pub cron_secret: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestStatsResponse {
    pub total: u64,
    pub server_errors: u64,
    pub avg_response_time_ms: f64,
}

/// Routes mounted at the server root
pub fn root_router() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
}

/// Diagnostic routes mounted under `/api`
pub fn diagnostics_router() -> Router<AppState> {
    Router::new()
        .route("/cors-test", get(cors_test))
        .route("/diagnostics", get(diagnostics))
}

async fn root() -> &'static str {
    "Backend is running!"
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// GET /api/cors-test
async fn cors_test(method: Method, headers: HeaderMap) -> Json<CorsTestResponse> {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    Json(CorsTestResponse {
        message: "CORS is working",
        origin,
        method: method.to_string(),
    })
}

/// GET /api/diagnostics
async fn diagnostics(State(state): State<AppState>) -> Json<DiagnosticsResponse> {
    let connected = match state.pool.ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!("Diagnostics database ping failed: {:#}", e);
            false
        }
    };
    let generator = state.blog_service.generator();
    let stats = &state.request_stats;

    Json(DiagnosticsResponse {
        version: env!("CARGO_PKG_VERSION"),
        database: DatabaseStatus {
            driver: format!("{:?}", state.pool.driver()).to_lowercase(),
            connected,
        },
        upstreams: UpstreamStatus {
            text_generation: generator.text_generation_configured(),
            image_search: generator.image_search_configured(),
            cron_secret: state.cron_secret.is_some(),
        },
        uptime_seconds: stats.uptime_seconds(),
        requests: RequestStatsResponse {
            total: stats.total_requests(),
            server_errors: stats.server_errors(),
            avg_response_time_ms: stats.avg_response_time_us() / 1000.0,
        },
    })
}
