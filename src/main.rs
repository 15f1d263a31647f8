//! TechInsights - An AI-generated technology blog

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use techinsights::{
    api::{self, middleware::RequestStats, AppState},
    cache::create_cache,
    config::Config,
    db::{
        self,
        repositories::{SqlxBlogRepository, SqlxUserRepository},
    },
    services::{
        spawn_scheduler, BlogGenerator, BlogService, GeminiClient, TextGenerator, TokenService,
        UnsplashClient, UserService,
    },
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "techinsights=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting TechInsights backend...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    config.auth.validate()?;
    tracing::info!("Configuration loaded");

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    // Run migrations
    db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    // Initialize cache
    let cache = create_cache(&config.cache);
    tracing::info!("Cache initialized");

    // Create repositories
    let blog_repo = SqlxBlogRepository::boxed(pool.clone());
    let user_repo = SqlxUserRepository::boxed(pool.clone());

    // Upstream clients
    let llm = Arc::new(GeminiClient::from_config(&config.generation)?);
    let images = Arc::new(UnsplashClient::from_config(&config.images)?);
    if !llm.is_configured() {
        tracing::warn!("No generation API key configured; new posts cannot be generated");
    }

    let generator = Arc::new(BlogGenerator::new(
        llm,
        images,
        blog_repo.clone(),
        config.generation.cache_window(),
    ));

    // Initialize services
    let blog_service = Arc::new(BlogService::new(
        blog_repo.clone(),
        generator.clone(),
        cache.clone(),
    ));
    let user_service = Arc::new(UserService::new(
        user_repo,
        blog_repo,
        TokenService::from_config(&config.auth)?,
    ));

    // Periodic generation
    if config.generation.schedule_interval_secs > 0 {
        let every = Duration::from_secs(config.generation.schedule_interval_secs);
        spawn_scheduler(generator, cache, every);
        tracing::info!("Scheduled generation every {:?}", every);
    }

    // Build application state
    let state = AppState {
        pool,
        user_service,
        blog_service,
        cron_secret: config
            .auth
            .cron_secret
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(Arc::from),
        request_stats: Arc::new(RequestStats::new()),
    };

    // Build router
    let app = api::build_router(state, &config.server.cors_origin);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
