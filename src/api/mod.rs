//! API layer - HTTP handlers and routing
//!
//! Routes:
//! - `/api/auth/*` - Registration, login, profile, preferences, bookmarks
//! - `/api/blogs/*` - Latest, listing, generation, single post
//! - `/api/cors-test`, `/api/diagnostics` - Diagnostics
//! - `/`, `/health` - Liveness

pub mod auth;
pub mod blogs;
pub mod common;
pub mod middleware;
pub mod responses;
pub mod site;

use axum::{
    extract::OriginalUri,
    http::{header, HeaderValue, Method, StatusCode},
    middleware as axum_middleware,
    Json, Router,
};
use serde_json::json;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

pub use middleware::{ApiError, AppState, AuthenticatedUser, RequestStats};

/// Build the `/api` router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    let auth_routes = auth::public_router().merge(auth::protected_router().route_layer(
        axum_middleware::from_fn_with_state(state.clone(), middleware::require_auth),
    ));

    let blog_routes = blogs::public_router().merge(
        blogs::admin_router()
            .route_layer(axum_middleware::from_fn(middleware::require_admin))
            .route_layer(axum_middleware::from_fn_with_state(
                state,
                middleware::require_auth,
            )),
    );

    Router::new()
        .nest("/auth", auth_routes)
        .nest("/blogs", blog_routes)
        .merge(site::diagnostics_router())
}

/// CORS layer for the configured origin. `*` allows any origin; otherwise a
/// comma-separated list of origins.
pub fn cors_layer(cors_origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    if cors_origin.trim() == "*" {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = cors_origin
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    Router::new()
        .nest("/api", build_api_router(state.clone()))
        .merge(site::root_router())
        .fallback(not_found)
        .layer(cors_layer(cors_origin))
        .layer(TraceLayer::new_for_http())
        // Request stats middleware (outermost layer, runs for all requests)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::request_stats_middleware,
        ))
        .with_state(state)
}

async fn not_found(
    method: Method,
    OriginalUri(uri): OriginalUri,
) -> (StatusCode, Json<serde_json::Value>) {
    let route = uri.path_and_query().map_or(uri.path(), |p| p.as_str());
    debug!("Route not found: {} {}", method, route);
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "Not Found",
            "message": format!("Route {} does not exist", route),
        })),
    )
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Router-level test harness: in-memory database, fake upstreams.

    use super::*;
    use crate::cache::MemoryCache;
    use crate::db::repositories::{BlogRepository, SqlxBlogRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations, DynDatabasePool};
    use crate::models::{Blog, Genre, NewBlog};
    use crate::services::generator::{BlogGenerator, GenerationError};
    use crate::services::image::ImageSearch;
    use crate::services::llm::TextGenerator;
    use crate::services::{BlogService, TokenService, UserService};
    use async_trait::async_trait;
    use axum_test::TestServer;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    pub const CRON_SECRET: &str = "cron-test-secret";

    pub struct FakeLlm(AtomicUsize);

    #[async_trait]
    impl TextGenerator for FakeLlm {
        async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(r#"Here you go: {"title": "Generated post", "body": "<p>New framework released.</p>"}"#
                .to_string())
        }

        fn is_configured(&self) -> bool {
            true
        }
    }

    struct NoImages;

    #[async_trait]
    impl ImageSearch for NoImages {
        async fn search(&self, _query: &str) -> anyhow::Result<Option<String>> {
            Ok(None)
        }

        fn is_configured(&self) -> bool {
            false
        }
    }

    pub struct TestContext {
        pub server: TestServer,
        pub pool: DynDatabasePool,
        pub blog_repo: Arc<dyn BlogRepository>,
        llm: Arc<FakeLlm>,
    }

    impl TestContext {
        pub fn llm_calls(&self) -> usize {
            self.llm.0.load(Ordering::SeqCst)
        }
    }

    pub async fn test_server() -> TestContext {
        let (state, blog_repo, llm) = test_state().await;
        let pool = state.pool.clone();
        let server = TestServer::new(build_router(state, "*")).unwrap();
        TestContext {
            server,
            pool,
            blog_repo,
            llm,
        }
    }

    pub async fn test_state() -> (AppState, Arc<dyn BlogRepository>, Arc<FakeLlm>) {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();

        let blog_repo = SqlxBlogRepository::boxed(pool.clone());
        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let llm = Arc::new(FakeLlm(AtomicUsize::new(0)));

        let generator = Arc::new(BlogGenerator::new(
            llm.clone(),
            Arc::new(NoImages),
            blog_repo.clone(),
            chrono::Duration::minutes(60),
        ));
        let blog_service = Arc::new(BlogService::new(
            blog_repo.clone(),
            generator,
            Arc::new(MemoryCache::new()),
        ));
        let user_service = Arc::new(UserService::new(
            user_repo,
            blog_repo.clone(),
            TokenService::new("test-secret", chrono::Duration::days(30)),
        ));

        let state = AppState {
            pool,
            user_service,
            blog_service,
            cron_secret: Some(Arc::from(CRON_SECRET)),
            request_stats: Arc::new(RequestStats::new()),
        };
        (state, blog_repo, llm)
    }

    pub async fn insert_blog(ctx: &TestContext, title: &str) -> Blog {
        ctx.blog_repo
            .create(&NewBlog {
                title: title.to_string(),
                body: format!("<p>{}</p>", title),
                image: "https://img.example/cover.jpg".to_string(),
                image_alt: NewBlog::default_image_alt(title),
                image_caption: String::new(),
                genre: Genre::General,
                links: vec![],
            })
            .await
            .unwrap()
    }

    pub async fn backdate_blog(ctx: &TestContext, id: i64, age: chrono::Duration) {
        sqlx::query("UPDATE blogs SET created_at = ? WHERE id = ?")
            .bind(chrono::Utc::now() - age)
            .bind(id)
            .execute(ctx.pool.sqlite().unwrap())
            .await
            .unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::build_router;
    use super::test_support::{test_server, test_state};
    use axum::body::Body;
    use axum::http::{header, HeaderValue, Method, Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_cors_allows_any_origin_by_default() {
        let ctx = test_server().await;
        let response = ctx
            .server
            .get("/health")
            .add_header(header::ORIGIN, HeaderValue::from_static("https://reader.example"))
            .await;

        assert_eq!(response.header(header::ACCESS_CONTROL_ALLOW_ORIGIN), "*");
    }

    #[tokio::test]
    async fn test_cors_preflight_for_configured_origins() {
        let (state, _, _) = test_state().await;
        let app = build_router(state, "https://reader.example, https://admin.example");

        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/blogs/latest")
            .header(header::ORIGIN, "https://admin.example")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://admin.example"
        );

        let request = Request::builder()
            .uri("/health")
            .header(header::ORIGIN, "https://elsewhere.example")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert!(response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none());
    }
}
