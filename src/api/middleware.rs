//! API middleware
//!
//! Contains:
//! - Shared application state and request statistics
//! - `ApiError`, the JSON error body every handler returns
//! - Bearer token authentication, including the cron secret bypass
//! - Admin authorization
//! - ETag helpers for conditional GETs

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

use crate::models::{User, UserRole};
use crate::services::blog::{BlogService, BlogServiceError};
use crate::services::generator::GenerationError;
use crate::services::user::{UserService, UserServiceError};

/// Email of the synthetic admin the cron secret authenticates as
pub const CRON_USER_EMAIL: &str = "cron@techinsightsai.local";

// ============================================================================
// Request Statistics
// ============================================================================

/// Lightweight request statistics using atomic operations (no locks)
pub struct RequestStats {
    total_requests: AtomicU64,
    /// Responses with a 5xx status
    server_errors: AtomicU64,
    /// Total response time in microseconds (for calculating average)
    total_response_time_us: AtomicU64,
    start_time: Instant,
}

impl RequestStats {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            server_errors: AtomicU64::new(0),
            total_response_time_us: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a finished request
    pub fn record(&self, duration_us: u64, status: StatusCode) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_response_time_us
            .fetch_add(duration_us, Ordering::Relaxed);
        if status.is_server_error() {
            self.server_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn server_errors(&self) -> u64 {
        self.server_errors.load(Ordering::Relaxed)
    }

    /// Average response time in microseconds
    pub fn avg_response_time_us(&self) -> f64 {
        let total = self.total_requests.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        let total_time = self.total_response_time_us.load(Ordering::Relaxed);
        total_time as f64 / total as f64
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl Default for RequestStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: crate::db::DynDatabasePool,
    pub user_service: Arc<UserService>,
    pub blog_service: Arc<BlogService>,
    /// Bearer value that authenticates scheduled jobs as an admin
    pub cron_secret: Option<Arc<str>>,
    pub request_stats: Arc<RequestStats>,
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl AuthenticatedUser {
    /// True for the synthetic cron admin, which has no stored account
    pub fn is_cron(&self) -> bool {
        self.0.id == 0 && self.0.email == CRON_USER_EMAIL
    }
}

impl<S> axum::extract::FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" | "USER_EXISTS" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<UserServiceError> for ApiError {
    fn from(e: UserServiceError) -> Self {
        match e {
            UserServiceError::AuthenticationError(msg) => ApiError::unauthorized(msg),
            UserServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            UserServiceError::UserExists => ApiError::new("USER_EXISTS", "User already exists"),
            UserServiceError::NotFound(what) => ApiError::not_found(format!("{} not found", what)),
            UserServiceError::InternalError(e) => {
                error!("User service error: {:#}", e);
                ApiError::internal_error("Internal server error")
            }
        }
    }
}

impl From<BlogServiceError> for ApiError {
    fn from(e: BlogServiceError) -> Self {
        match e {
            BlogServiceError::NotFound => ApiError::not_found("Blog not found"),
            BlogServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            BlogServiceError::Generation(GenerationError::NotConfigured(what)) => {
                error!("Generation unavailable: {} is not configured", what);
                ApiError::internal_error("Blog generation is not configured")
            }
            BlogServiceError::Generation(e) => {
                error!("Blog generation failed: {}", e);
                ApiError::internal_error("Failed to generate blog")
            }
            BlogServiceError::InternalError(e) => {
                error!("Blog service error: {:#}", e);
                ApiError::internal_error("Internal server error")
            }
        }
    }
}

/// Extract the bearer token from the `Authorization` header
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn cron_user() -> User {
    let now = Utc::now();
    User {
        id: 0,
        email: CRON_USER_EMAIL.to_string(),
        password_hash: String::new(),
        role: UserRole::Admin,
        preferences: Vec::new(),
        created_at: now,
        updated_at: now,
    }
}

/// Authentication middleware
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Not authorized, no token provided"))?
        .to_string();

    let user = match state.cron_secret.as_deref() {
        Some(secret) if secret == token => {
            debug!("Request authenticated with cron secret");
            cron_user()
        }
        _ => state.user_service.authenticate(&token).await.map_err(|e| match e {
            UserServiceError::InternalError(_) => ApiError::from(e),
            _ => ApiError::unauthorized("Not authorized, token failed"),
        })?,
    };

    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}

/// Admin authorization middleware
pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    if !user.0.is_admin() {
        return Err(ApiError::forbidden("Not authorized as an admin"));
    }

    Ok(next.run(request).await)
}

/// Request statistics middleware
pub async fn request_stats_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let response = next.run(request).await;

    let duration_us = start.elapsed().as_micros() as u64;
    state.request_stats.record(duration_us, response.status());

    response
}

// ============================================================================
// HTTP Cache Headers
// ============================================================================

/// Generate ETag from content
pub fn generate_etag(content: &[u8]) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    format!("\"{:x}\"", hasher.finish())
}

/// Check an `If-None-Match` value against an ETag. Weak prefixes are
/// ignored and `*` matches anything.
pub fn etag_matches(request_etag: Option<&str>, response_etag: &str) -> bool {
    let Some(value) = request_etag else {
        return false;
    };
    let normalized_response = response_etag.trim_start_matches("W/");
    value.split(',').map(str::trim).any(|candidate| {
        candidate == "*" || candidate.trim_start_matches("W/") == normalized_response
    })
}

/// Build Cache-Control header for API responses
pub fn cache_control_api(max_age: u32) -> String {
    format!("public, max-age={}", max_age)
}

/// 304 response when the request's `If-None-Match` matches
pub fn check_if_none_match(headers: &HeaderMap, etag: &str) -> Option<Response> {
    let if_none_match = headers.get(header::IF_NONE_MATCH)?.to_str().ok();
    if etag_matches(if_none_match, etag) {
        return Some((StatusCode::NOT_MODIFIED, [(header::ETAG, etag.to_string())]).into_response());
    }
    None
}

// ============================================================================
// Tests
// ============================================================================
