//! Authentication API endpoints
//!
//! Handles HTTP requests for reader accounts:
//! - POST /api/auth/register - Create an account and return a token
//! - POST /api/auth/login - Exchange credentials for a token
//! - GET /api/auth/profile - Current user with bookmarked posts
//! - PUT /api/auth/preferences - Replace the preferred genres
//! - POST /api/auth/bookmarks/{id} - Bookmark a post
//! - DELETE /api/auth/bookmarks/{id} - Remove a bookmark

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::api::responses::{AuthResponse, MessageResponse, ProfileResponse, UserResponse};
use crate::services::user::{LoginInput, RegisterInput};

/// Request body for registration and login
#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

/// Request body for preference updates
#[derive(Debug, Deserialize)]
pub struct PreferencesRequest {
    pub preferences: Vec<String>,
}

/// Build public auth routes (no auth required)
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

/// Build protected auth routes (requires auth middleware)
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/profile", get(profile))
        .route("/preferences", put(update_preferences))
        .route("/bookmarks/{id}", post(add_bookmark).delete(remove_bookmark))
}

/// POST /api/auth/register
async fn register(
    State(state): State<AppState>,
    Json(body): Json<CredentialsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .user_service
        .register(RegisterInput {
            email: body.email,
            password: body.password,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(AuthResponse::from(session))))
}

/// POST /api/auth/login
async fn login(
    State(state): State<AppState>,
    Json(body): Json<CredentialsRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let session = state
        .user_service
        .login(LoginInput {
            email: body.email,
            password: body.password,
        })
        .await?;

    Ok(Json(session.into()))
}

/// GET /api/auth/profile
async fn profile(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<ProfileResponse>, ApiError> {
    let profile = state.user_service.profile(account_id(&user)?).await?;
    Ok(Json(profile.into()))
}

/// PUT /api/auth/preferences
async fn update_preferences(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<PreferencesRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let updated = state
        .user_service
        .update_preferences(account_id(&user)?, &body.preferences)
        .await?;
    Ok(Json(updated.into()))
}

/// POST /api/auth/bookmarks/{id}
async fn add_bookmark(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(blog_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let blog_id = parse_blog_id(&blog_id)?;
    state.user_service.add_bookmark(account_id(&user)?, blog_id).await?;
    Ok(Json(MessageResponse::ok("Bookmark added")))
}

/// DELETE /api/auth/bookmarks/{id}
async fn remove_bookmark(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(blog_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let blog_id = parse_blog_id(&blog_id)?;
    state.user_service.remove_bookmark(account_id(&user)?, blog_id).await?;
    Ok(Json(MessageResponse::ok("Bookmark removed")))
}

/// Stored account id of the caller. The cron identity has no account.
fn account_id(user: &AuthenticatedUser) -> Result<i64, ApiError> {
    if user.is_cron() {
        return Err(ApiError::not_found("User not found"));
    }
    Ok(user.0.id)
}

/// Parse a post id path segment; anything non-numeric cannot exist
pub(crate) fn parse_blog_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| ApiError::not_found("Blog not found"))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::{insert_blog, test_server, TestContext};
    use axum::http::StatusCode;
    use serde_json::{json, Value};

    async fn register(ctx: &TestContext, email: &str) -> String {
        let response = ctx
            .server
            .post("/api/auth/register")
            .json(&json!({"email": email, "password": "secret123"}))
            .await;
        response.assert_status(StatusCode::CREATED);
        let body: Value = response.json();
        body["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_register_returns_user_and_token() {
        let ctx = test_server().await;
        let response = ctx
            .server
            .post("/api/auth/register")
            .json(&json!({"email": "Reader@Example.com", "password": "secret123"}))
            .await;

        response.assert_status(StatusCode::CREATED);
        let body: Value = response.json();
        assert_eq!(body["email"], "reader@example.com");
        assert_eq!(body["role"], "user");
        assert_eq!(body["preferences"], json!([]));
        assert!(body["id"].as_i64().unwrap() > 0);
        assert!(body["token"].as_str().unwrap().split('.').count() == 3);
    }

    #[tokio::test]
    async fn test_register_duplicate_and_invalid_input() {
        let ctx = test_server().await;
        register(&ctx, "dup@example.com").await;

        let dup = ctx
            .server
            .post("/api/auth/register")
            .json(&json!({"email": "dup@example.com", "password": "secret123"}))
            .await;
        dup.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = dup.json();
        assert_eq!(body["error"]["code"], "USER_EXISTS");

        let bad_email = ctx
            .server
            .post("/api/auth/register")
            .json(&json!({"email": "not-an-email", "password": "secret123"}))
            .await;
        bad_email.assert_status(StatusCode::BAD_REQUEST);

        let short_password = ctx
            .server
            .post("/api/auth/register")
            .json(&json!({"email": "short@example.com", "password": "123"}))
            .await;
        short_password.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_login() {
        let ctx = test_server().await;
        register(&ctx, "login@example.com").await;

        let ok = ctx
            .server
            .post("/api/auth/login")
            .json(&json!({"email": "login@example.com", "password": "secret123"}))
            .await;
        ok.assert_status_ok();
        let body: Value = ok.json();
        assert!(body["token"].is_string());

        let wrong = ctx
            .server
            .post("/api/auth/login")
            .json(&json!({"email": "login@example.com", "password": "wrong-pass"}))
            .await;
        wrong.assert_status(StatusCode::UNAUTHORIZED);

        let unknown = ctx
            .server
            .post("/api/auth/login")
            .json(&json!({"email": "nobody@example.com", "password": "secret123"}))
            .await;
        unknown.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_profile_requires_valid_token() {
        let ctx = test_server().await;
        let token = register(&ctx, "profile@example.com").await;

        ctx.server.get("/api/auth/profile").await.assert_status(StatusCode::UNAUTHORIZED);
        ctx.server
            .get("/api/auth/profile")
            .authorization_bearer("garbage")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        let response = ctx.server.get("/api/auth/profile").authorization_bearer(&token).await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["email"], "profile@example.com");
        assert_eq!(body["bookmarks"], json!([]));
    }

    #[tokio::test]
    async fn test_preferences_and_bookmarks() {
        let ctx = test_server().await;
        let token = register(&ctx, "prefs@example.com").await;
        let blog = insert_blog(&ctx, "Bookmarked post").await;

        let prefs = ctx
            .server
            .put("/api/auth/preferences")
            .authorization_bearer(&token)
            .json(&json!({"preferences": ["coding", "ai-ml"]}))
            .await;
        prefs.assert_status_ok();
        let body: Value = prefs.json();
        assert_eq!(body["preferences"], json!(["coding", "ai-ml"]));

        ctx.server
            .put("/api/auth/preferences")
            .authorization_bearer(&token)
            .json(&json!({"preferences": ["sports"]}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        ctx.server
            .post(&format!("/api/auth/bookmarks/{}", blog.id))
            .authorization_bearer(&token)
            .await
            .assert_status_ok();
        ctx.server
            .post("/api/auth/bookmarks/9999")
            .authorization_bearer(&token)
            .await
            .assert_status(StatusCode::NOT_FOUND);

        let profile: Value = ctx
            .server
            .get("/api/auth/profile")
            .authorization_bearer(&token)
            .await
            .json();
        assert_eq!(profile["bookmarks"][0]["title"], "Bookmarked post");

        ctx.server
            .delete(&format!("/api/auth/bookmarks/{}", blog.id))
            .authorization_bearer(&token)
            .await
            .assert_status_ok();
        let profile: Value = ctx
            .server
            .get("/api/auth/profile")
            .authorization_bearer(&token)
            .await
            .json();
        assert_eq!(profile["bookmarks"], json!([]));
    }

    #[tokio::test]
    async fn test_cron_identity_has_no_profile() {
        let ctx = test_server().await;
        ctx.server
            .get("/api/auth/profile")
            .authorization_bearer(crate::api::test_support::CRON_SECRET)
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }
}
