//! Blog service
//!
//! Read side of the blog: the cache-gated latest post, filtered listings and
//! single-post lookups, plus the entry points that start generation runs.
//!
//! Single posts never change after insertion, so `blog:{id}` entries live for
//! the full cache TTL. Unfiltered listing pages are cached under
//! `blogs:list:{epoch}:*`, keyed by the generator epoch, and dropped
//! whenever a new post is stored.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::cache::{CacheLayer, SharedCache};
use crate::db::repositories::BlogRepository;
use crate::models::{Blog, BlogFilter, Genre, ListParams, PagedResult, Since};
use crate::services::generator::{is_fresh, BlogGenerator, GenerationError, GenerationOutcome};

const LIST_CACHE_PATTERN: &str = "blogs:list:*";
const DEFAULT_PAGE_SIZE: u32 = 10;

/// Blog service errors
#[derive(Debug, thiserror::Error)]
pub enum BlogServiceError {
    #[error("Blog not found")]
    NotFound,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Response of the cache-gated latest lookup
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestBlog {
    pub blog: Blog,
    /// Whether the post was generated by this request
    pub fresh: bool,
    /// When the post stops counting as fresh
    pub next_refresh: DateTime<Utc>,
}

/// Raw listing query, validated by [`BlogService::list`]
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub genre: Option<String>,
    pub search: Option<String>,
    pub since: Option<String>,
}

/// Acknowledgement for a background generation run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationTicket {
    pub request_id: String,
    pub genre: Option<Genre>,
}

/// Blog service
pub struct BlogService {
    repo: Arc<dyn BlogRepository>,
    generator: Arc<BlogGenerator>,
    cache: SharedCache,
}

impl BlogService {
    pub fn new(
        repo: Arc<dyn BlogRepository>,
        generator: Arc<BlogGenerator>,
        cache: SharedCache,
    ) -> Self {
        Self {
            repo,
            generator,
            cache,
        }
    }

    pub fn generator(&self) -> &Arc<BlogGenerator> {
        &self.generator
    }

    /// Parse an optional genre query value. Empty means no filter.
    pub fn parse_genre(value: Option<&str>) -> Result<Option<Genre>, BlogServiceError> {
        match value.map(str::trim).filter(|v| !v.is_empty()) {
            Some(v) => v
                .parse()
                .map(Some)
                .map_err(|e: anyhow::Error| BlogServiceError::ValidationError(e.to_string())),
            None => Ok(None),
        }
    }

    /// Latest post for a genre, generating one if the newest is stale.
    ///
    /// A post that is still inside the window is returned with
    /// `fresh = false`; a post generated by this call has `fresh = true`.
    pub async fn latest(&self, genre: Option<Genre>) -> Result<LatestBlog, BlogServiceError> {
        let window = self.generator.window();
        let now = Utc::now();

        if let Some(blog) = self.repo.latest(genre).await? {
            if is_fresh(blog.created_at, now, window) {
                return Ok(cached_latest(blog, window));
            }
        }

        let outcome = generate_and_invalidate(&self.generator, &self.cache, genre).await?;
        Ok(match outcome {
            GenerationOutcome::Existing(blog) => cached_latest(blog, window),
            GenerationOutcome::Generated(blog) => LatestBlog {
                blog,
                fresh: true,
                next_refresh: Utc::now() + window,
            },
        })
    }

    /// Paginated listing, newest first
    pub async fn list(&self, query: &ListQuery) -> Result<PagedResult<Blog>, BlogServiceError> {
        let params = ListParams::new(
            lenient_number(query.page.as_deref(), 1),
            lenient_number(query.limit.as_deref(), DEFAULT_PAGE_SIZE),
        );
        let genre = Self::parse_genre(query.genre.as_deref())?;
        let since = match query.since.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            Some(v) => Some(
                v.parse::<Since>()
                    .map_err(|e| BlogServiceError::ValidationError(e.to_string()))?,
            ),
            None => None,
        };
        let search = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let cacheable = search.is_none() && since.is_none();
        let cache_key = list_cache_key(self.generator.epoch(), genre, &params);
        if cacheable {
            if let Ok(Some(cached)) = self.cache.get::<PagedResult<Blog>>(&cache_key).await {
                return Ok(cached);
            }
        }

        let filter = BlogFilter {
            genre,
            search,
            created_after: since.map(|s| s.cutoff(Utc::now())),
        };
        let total = self.repo.count(&filter).await?;
        let items = self.repo.list(&filter, params.offset(), params.limit()).await?;
        let result = PagedResult::new(items, total, &params);

        if cacheable {
            self.cache_put(&cache_key, &result).await;
        }

        Ok(result)
    }

    /// Single post by id
    pub async fn get_by_id(&self, id: i64) -> Result<Blog, BlogServiceError> {
        let cache_key = format!("blog:{}", id);
        if let Ok(Some(blog)) = self.cache.get::<Blog>(&cache_key).await {
            return Ok(blog);
        }

        let blog = self
            .repo
            .get_by_id(id)
            .await?
            .ok_or(BlogServiceError::NotFound)?;
        self.cache_put(&cache_key, &blog).await;
        Ok(blog)
    }

    /// Start a freshness-gated generation run in the background.
    ///
    /// Returns immediately; failures are logged with the request id.
    pub fn start_generation(&self, genre: Option<Genre>) -> GenerationTicket {
        let request_id = new_request_id();
        let generator = self.generator.clone();
        let cache = self.cache.clone();
        let id = request_id.clone();

        tokio::spawn(async move {
            info!(request_id = %id, genre = ?genre, "Background generation started");
            match generate_and_invalidate(&generator, &cache, genre).await {
                Ok(GenerationOutcome::Generated(blog)) => {
                    info!(request_id = %id, blog_id = blog.id, "Background generation finished");
                }
                Ok(GenerationOutcome::Existing(blog)) => {
                    info!(request_id = %id, blog_id = blog.id, "Fresh post exists, nothing generated");
                }
                Err(e) => {
                    error!(request_id = %id, "Background generation failed: {}", e);
                }
            }
        });

        GenerationTicket { request_id, genre }
    }

    async fn cache_put<T: Serialize + Send + Sync>(&self, key: &str, value: &T) {
        let ttl = self.cache.default_ttl();
        if let Err(e) = self.cache.set(key, value, ttl).await {
            warn!("Failed to cache {}: {}", key, e);
        }
    }
}

/// Listing cache key. The generator epoch is read before the database, so a
/// page computed before a new post lands under a key nobody reads again.
fn list_cache_key(epoch: u64, genre: Option<Genre>, params: &ListParams) -> String {
    format!(
        "blogs:list:{}:{}:{}:{}",
        epoch,
        genre.map(|g| g.as_str()).unwrap_or("all"),
        params.page,
        params.per_page
    )
}

fn cached_latest(blog: Blog, window: Duration) -> LatestBlog {
    let next_refresh = blog.created_at + window;
    LatestBlog {
        blog,
        fresh: false,
        next_refresh,
    }
}

/// Run a gated generation and drop cached listings if a post was stored
pub(crate) async fn generate_and_invalidate(
    generator: &BlogGenerator,
    cache: &SharedCache,
    genre: Option<Genre>,
) -> Result<GenerationOutcome, GenerationError> {
    let outcome = generator.generate_if_stale(genre).await?;
    if let GenerationOutcome::Generated(_) = outcome {
        if let Err(e) = cache.delete_pattern(LIST_CACHE_PATTERN).await {
            warn!("Failed to invalidate listing cache: {}", e);
        }
    }
    Ok(outcome)
}

/// Short id tying background-run log lines together
fn new_request_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Parse a numeric query value, falling back to `default` when absent, zero
/// or not a number. Negative values clamp to zero.
fn lenient_number(value: Option<&str>, default: u32) -> u32 {
    value
        .and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|n| *n != 0)
        .map(|n| n.clamp(0, u32::MAX as i64) as u32)
        .unwrap_or(default)
}
