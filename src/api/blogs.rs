//! Blog API endpoints
//!
//! - GET /api/blogs/latest - Cache-gated latest post
//! - GET /api/blogs/all - Paginated, filterable listing
//! - POST /api/blogs/generate - Start a background generation run (admin)
//! - GET /api/blogs/{id} - Single post with ETag support

use axum::{
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tracing::info;

use crate::api::auth::parse_blog_id;
use crate::api::common::{GenerateRequest, GenreQuery, ListBlogsQuery};
use crate::api::middleware::{
    cache_control_api, check_if_none_match, generate_etag, ApiError, AppState, AuthenticatedUser,
};
use crate::api::responses::{BlogListResponse, GenerateResponse};
use crate::services::blog::{BlogService, LatestBlog};

/// Posts never change, so detail responses may be cached for a while
const DETAIL_MAX_AGE: u32 = 300;

/// Public blog routes
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/latest", get(latest))
        .route("/all", get(list_all))
        .route("/{id}", get(get_by_id))
}

/// Admin-only blog routes
pub fn admin_router() -> Router<AppState> {
    Router::new().route("/generate", post(generate))
}

/// GET /api/blogs/latest
async fn latest(
    State(state): State<AppState>,
    Query(query): Query<GenreQuery>,
) -> Result<Json<LatestBlog>, ApiError> {
    let genre = BlogService::parse_genre(query.genre.as_deref())?;
    let latest = state.blog_service.latest(genre).await?;
    Ok(Json(latest))
}

/// GET /api/blogs/all
async fn list_all(
    State(state): State<AppState>,
    Query(query): Query<ListBlogsQuery>,
) -> Result<Json<BlogListResponse>, ApiError> {
    let result = state.blog_service.list(&query.into()).await?;
    Ok(Json(result.into()))
}

/// POST /api/blogs/generate
///
/// Responds 202 immediately. The JSON body `{"genre": ...}` is optional.
async fn generate(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let request: GenerateRequest = if body.iter().all(u8::is_ascii_whitespace) {
        GenerateRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::validation_error(format!("Invalid request body: {}", e)))?
    };
    let genre = BlogService::parse_genre(request.genre.as_deref())?;

    let ticket = state.blog_service.start_generation(genre);
    info!(
        request_id = %ticket.request_id,
        requested_by = %user.0.email,
        "Blog generation requested"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(GenerateResponse {
            success: true,
            message: "Blog generation started".to_string(),
            request_id: ticket.request_id,
            genre: ticket
                .genre
                .map(|g| g.to_string())
                .unwrap_or_else(|| "general".to_string()),
        }),
    ))
}

/// GET /api/blogs/{id}
async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let id = parse_blog_id(&id)?;
    let blog = state.blog_service.get_by_id(id).await?;

    let json = serde_json::to_vec(&blog)
        .map_err(|e| ApiError::internal_error(format!("Failed to encode blog: {}", e)))?;
    let etag = generate_etag(&json);

    if let Some(not_modified) = check_if_none_match(&headers, &etag) {
        return Ok(not_modified);
    }

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (header::ETAG, etag),
            (header::CACHE_CONTROL, cache_control_api(DETAIL_MAX_AGE)),
        ],
        Body::from(json),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::{backdate_blog, insert_blog, test_server, CRON_SECRET};
    use axum::http::{header, HeaderValue, StatusCode};
    use serde_json::{json, Value};
    use std::time::Duration;

    #[tokio::test]
    async fn test_latest_serves_fresh_post() {
        let ctx = test_server().await;
        let blog = insert_blog(&ctx, "Fresh post").await;

        let response = ctx.server.get("/api/blogs/latest").await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["blog"]["id"], blog.id);
        assert_eq!(body["fresh"], false);
        assert!(body["nextRefresh"].is_string());
        assert_eq!(ctx.llm_calls(), 0);
    }

    #[tokio::test]
    async fn test_latest_generates_when_stale() {
        let ctx = test_server().await;
        let blog = insert_blog(&ctx, "Old post").await;
        backdate_blog(&ctx, blog.id, chrono::Duration::hours(2)).await;

        let body: Value = ctx.server.get("/api/blogs/latest").await.json();
        assert_eq!(body["fresh"], true);
        assert_ne!(body["blog"]["id"], blog.id);
        assert_eq!(body["blog"]["imageAlt"], "Blog post image about Generated post");
        assert_eq!(ctx.llm_calls(), 1);
    }

    #[tokio::test]
    async fn test_latest_rejects_unknown_genre() {
        let ctx = test_server().await;
        ctx.server
            .get("/api/blogs/latest")
            .add_query_param("genre", "sports")
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_list_all_pagination_shape() {
        let ctx = test_server().await;
        for i in 0..12 {
            insert_blog(&ctx, &format!("Post {}", i)).await;
        }

        let body: Value = ctx
            .server
            .get("/api/blogs/all")
            .add_query_param("page", "2")
            .add_query_param("limit", "5")
            .await
            .json();
        assert_eq!(body["total"], 12);
        assert_eq!(body["totalPages"], 3);
        assert_eq!(body["currentPage"], 2);
        assert_eq!(body["blogs"].as_array().unwrap().len(), 5);
        assert_eq!(body["blogs"][0]["title"], "Post 6");
    }

    #[tokio::test]
    async fn test_list_all_search_and_bad_since() {
        let ctx = test_server().await;
        insert_blog(&ctx, "Rust 2.0 released").await;
        insert_blog(&ctx, "Kotlin news").await;

        let body: Value = ctx
            .server
            .get("/api/blogs/all")
            .add_query_param("search", "rust")
            .add_query_param("since", "week")
            .await
            .json();
        assert_eq!(body["total"], 1);
        assert_eq!(body["blogs"][0]["title"], "Rust 2.0 released");

        ctx.server
            .get("/api/blogs/all")
            .add_query_param("since", "forever")
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_get_by_id_with_etag() {
        let ctx = test_server().await;
        let blog = insert_blog(&ctx, "Cached").await;
        let url = format!("/api/blogs/{}", blog.id);

        let first = ctx.server.get(&url).await;
        first.assert_status_ok();
        let etag = first.header(header::ETAG);
        let body: Value = first.json();
        assert_eq!(body["title"], "Cached");

        let second = ctx
            .server
            .get(&url)
            .add_header(header::IF_NONE_MATCH, etag.clone())
            .await;
        second.assert_status(StatusCode::NOT_MODIFIED);

        let stale = ctx
            .server
            .get(&url)
            .add_header(header::IF_NONE_MATCH, HeaderValue::from_static("\"other\""))
            .await;
        stale.assert_status_ok();

        ctx.server.get("/api/blogs/424242").await.assert_status(StatusCode::NOT_FOUND);
        ctx.server.get("/api/blogs/not-a-number").await.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_generate_requires_admin() {
        let ctx = test_server().await;
        ctx.server.post("/api/blogs/generate").await.assert_status(StatusCode::UNAUTHORIZED);

        let token: Value = ctx
            .server
            .post("/api/auth/register")
            .json(&json!({"email": "user@example.com", "password": "secret123"}))
            .await
            .json();
        ctx.server
            .post("/api/blogs/generate")
            .authorization_bearer(token["token"].as_str().unwrap())
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_generate_with_cron_secret() {
        let ctx = test_server().await;

        let response = ctx
            .server
            .post("/api/blogs/generate")
            .authorization_bearer(CRON_SECRET)
            .json(&json!({"genre": "coding"}))
            .await;
        response.assert_status(StatusCode::ACCEPTED);
        let body: Value = response.json();
        assert_eq!(body["success"], true);
        assert_eq!(body["genre"], "coding");
        assert_eq!(body["requestId"].as_str().unwrap().len(), 8);

        for _ in 0..50 {
            if ctx.llm_calls() == 1 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("background generation did not run");
    }

    #[tokio::test]
    async fn test_generate_without_body_defaults_to_general() {
        let ctx = test_server().await;
        let body: Value = ctx
            .server
            .post("/api/blogs/generate")
            .authorization_bearer(CRON_SECRET)
            .await
            .json();
        assert_eq!(body["genre"], "general");
    }
}
