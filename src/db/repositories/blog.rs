//! Blog repository
//!
//! Database operations for generated posts.
//!
//! This module provides:
//! - `BlogRepository` trait defining the interface for post data access
//! - `SqlxBlogRepository` implementing the trait for SQLite and MySQL
//!
//! Related links are stored as a JSON array in the `links` column.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Blog, BlogFilter, Genre, NewBlog, RelatedLink};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Blog repository trait
#[async_trait]
pub trait BlogRepository: Send + Sync {
    /// Insert a post and return it with its assigned id
    async fn create(&self, input: &NewBlog) -> Result<Blog>;

    /// Get post by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Blog>>;

    /// Most recent post, optionally restricted to one genre
    async fn latest(&self, genre: Option<Genre>) -> Result<Option<Blog>>;

    /// List posts matching the filter, newest first
    async fn list(&self, filter: &BlogFilter, offset: i64, limit: i64) -> Result<Vec<Blog>>;

    /// Count posts matching the filter
    async fn count(&self, filter: &BlogFilter) -> Result<i64>;
}

/// SQLx-based blog repository implementation
pub struct SqlxBlogRepository {
    pool: DynDatabasePool,
}

impl SqlxBlogRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn BlogRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl BlogRepository for SqlxBlogRepository {
    async fn create(&self, input: &NewBlog) -> Result<Blog> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_blog_sqlite(self.pool.sqlite()?, input).await,
            DatabaseDriver::Mysql => create_blog_mysql(self.pool.mysql()?, input).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Blog>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_blog_by_id_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => get_blog_by_id_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn latest(&self, genre: Option<Genre>) -> Result<Option<Blog>> {
        let filter = BlogFilter {
            genre,
            ..Default::default()
        };
        let mut blogs = self.list(&filter, 0, 1).await?;
        Ok(blogs.pop())
    }

    async fn list(&self, filter: &BlogFilter, offset: i64, limit: i64) -> Result<Vec<Blog>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                list_blogs_sqlite(self.pool.sqlite()?, filter, offset, limit).await
            }
            DatabaseDriver::Mysql => {
                list_blogs_mysql(self.pool.mysql()?, filter, offset, limit).await
            }
        }
    }

    async fn count(&self, filter: &BlogFilter) -> Result<i64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => count_blogs_sqlite(self.pool.sqlite()?, filter).await,
            DatabaseDriver::Mysql => count_blogs_mysql(self.pool.mysql()?, filter).await,
        }
    }
}

const BLOG_COLUMNS: &str =
    "id, title, body, image, image_alt, image_caption, genre, links, created_at";

/// Value bound to a `?` placeholder produced by [`filter_clause`]
enum FilterArg {
    Text(String),
    Time(DateTime<Utc>),
}

/// Build a `WHERE ...` clause (or an empty string) and its bind values.
///
/// `escape` is the driver-specific `ESCAPE` literal for LIKE patterns.
fn filter_clause(filter: &BlogFilter, escape: &str) -> (String, Vec<FilterArg>) {
    let mut conditions = Vec::new();
    let mut args = Vec::new();

    if let Some(genre) = filter.genre {
        conditions.push("genre = ?".to_string());
        args.push(FilterArg::Text(genre.as_str().to_string()));
    }

    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", escape_like(&search.to_lowercase()));
        conditions.push(format!(
            "(LOWER(title) LIKE ? ESCAPE {escape} OR LOWER(body) LIKE ? ESCAPE {escape})"
        ));
        args.push(FilterArg::Text(pattern.clone()));
        args.push(FilterArg::Text(pattern));
    }

    if let Some(after) = filter.created_after {
        conditions.push("created_at >= ?".to_string());
        args.push(FilterArg::Time(after));
    }

    if conditions.is_empty() {
        (String::new(), args)
    } else {
        (format!("WHERE {}", conditions.join(" AND ")), args)
    }
}

/// Escape LIKE wildcards with a backslash
fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn links_to_json(links: &[RelatedLink]) -> Result<String> {
    serde_json::to_string(links).context("Failed to serialize related links")
}

fn links_from_json(raw: &str) -> Result<Vec<RelatedLink>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(raw).context("Failed to parse stored related links")
}

// ============================================================================
// SQLite implementations
// ============================================================================

const SQLITE_ESCAPE: &str = r"'\'";

async fn create_blog_sqlite(pool: &SqlitePool, input: &NewBlog) -> Result<Blog> {
    let now = Utc::now();
    let links = links_to_json(&input.links)?;

    let result = sqlx::query(
        r#"
        INSERT INTO blogs (title, body, image, image_alt, image_caption, genre, links, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&input.title)
    .bind(&input.body)
    .bind(&input.image)
    .bind(&input.image_alt)
    .bind(&input.image_caption)
    .bind(input.genre.as_str())
    .bind(&links)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create blog")?;

    Ok(Blog {
        id: result.last_insert_rowid(),
        title: input.title.clone(),
        body: input.body.clone(),
        image: input.image.clone(),
        image_alt: input.image_alt.clone(),
        image_caption: input.image_caption.clone(),
        genre: input.genre,
        links: input.links.clone(),
        created_at: now,
    })
}

async fn get_blog_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<Blog>> {
    let row = sqlx::query(&format!("SELECT {BLOG_COLUMNS} FROM blogs WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get blog by ID")?;

    row.as_ref().map(row_to_blog_sqlite).transpose()
}

async fn list_blogs_sqlite(
    pool: &SqlitePool,
    filter: &BlogFilter,
    offset: i64,
    limit: i64,
) -> Result<Vec<Blog>> {
    let (clause, args) = filter_clause(filter, SQLITE_ESCAPE);
    let sql = format!(
        "SELECT {BLOG_COLUMNS} FROM blogs {clause} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
    );

    let mut query = sqlx::query(&sql);
    for arg in args {
        query = match arg {
            FilterArg::Text(s) => query.bind(s),
            FilterArg::Time(t) => query.bind(t),
        };
    }

    let rows = query
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
        .context("Failed to list blogs")?;

    rows.iter().map(row_to_blog_sqlite).collect()
}

async fn count_blogs_sqlite(pool: &SqlitePool, filter: &BlogFilter) -> Result<i64> {
    let (clause, args) = filter_clause(filter, SQLITE_ESCAPE);
    let sql = format!("SELECT COUNT(*) as count FROM blogs {clause}");

    let mut query = sqlx::query(&sql);
    for arg in args {
        query = match arg {
            FilterArg::Text(s) => query.bind(s),
            FilterArg::Time(t) => query.bind(t),
        };
    }

    let row = query
        .fetch_one(pool)
        .await
        .context("Failed to count blogs")?;

    Ok(row.get("count"))
}

pub(crate) fn row_to_blog_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Blog> {
    let genre: String = row.get("genre");
    let links: String = row.get("links");

    Ok(Blog {
        id: row.get("id"),
        title: row.get("title"),
        body: row.get("body"),
        image: row.get("image"),
        image_alt: row.get("image_alt"),
        image_caption: row.get("image_caption"),
        genre: genre.parse()?,
        links: links_from_json(&links)?,
        created_at: row.get("created_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

const MYSQL_ESCAPE: &str = r"'\\'";

async fn create_blog_mysql(pool: &MySqlPool, input: &NewBlog) -> Result<Blog> {
    let now = Utc::now();
    let links = links_to_json(&input.links)?;

    let result = sqlx::query(
        r#"
        INSERT INTO blogs (title, body, image, image_alt, image_caption, genre, links, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&input.title)
    .bind(&input.body)
    .bind(&input.image)
    .bind(&input.image_alt)
    .bind(&input.image_caption)
    .bind(input.genre.as_str())
    .bind(&links)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create blog")?;

    Ok(Blog {
        id: result.last_insert_id() as i64,
        title: input.title.clone(),
        body: input.body.clone(),
        image: input.image.clone(),
        image_alt: input.image_alt.clone(),
        image_caption: input.image_caption.clone(),
        genre: input.genre,
        links: input.links.clone(),
        created_at: now,
    })
}

async fn get_blog_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<Blog>> {
    let row = sqlx::query(&format!("SELECT {BLOG_COLUMNS} FROM blogs WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get blog by ID")?;

    row.as_ref().map(row_to_blog_mysql).transpose()
}

async fn list_blogs_mysql(
    pool: &MySqlPool,
    filter: &BlogFilter,
    offset: i64,
    limit: i64,
) -> Result<Vec<Blog>> {
    let (clause, args) = filter_clause(filter, MYSQL_ESCAPE);
    let sql = format!(
        "SELECT {BLOG_COLUMNS} FROM blogs {clause} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
    );

    let mut query = sqlx::query(&sql);
    for arg in args {
        query = match arg {
            FilterArg::Text(s) => query.bind(s),
            FilterArg::Time(t) => query.bind(t),
        };
    }

    let rows = query
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
        .context("Failed to list blogs")?;

    rows.iter().map(row_to_blog_mysql).collect()
}

async fn count_blogs_mysql(pool: &MySqlPool, filter: &BlogFilter) -> Result<i64> {
    let (clause, args) = filter_clause(filter, MYSQL_ESCAPE);
    let sql = format!("SELECT COUNT(*) as count FROM blogs {clause}");

    let mut query = sqlx::query(&sql);
    for arg in args {
        query = match arg {
            FilterArg::Text(s) => query.bind(s),
            FilterArg::Time(t) => query.bind(t),
        };
    }

    let row = query
        .fetch_one(pool)
        .await
        .context("Failed to count blogs")?;

    Ok(row.get("count"))
}

pub(crate) fn row_to_blog_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Blog> {
    let genre: String = row.get("genre");
    let links: String = row.get("links");

    Ok(Blog {
        id: row.get("id"),
        title: row.get("title"),
        body: row.get("body"),
        image: row.get("image"),
        image_alt: row.get("image_alt"),
        image_caption: row.get("image_caption"),
        genre: genre.parse()?,
        links: links_from_json(&links)?,
        created_at: row.get("created_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use chrono::Duration;

    async fn setup_test_repo() -> (DynDatabasePool, SqlxBlogRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxBlogRepository::new(pool.clone());
        (pool, repo)
    }

    fn new_blog(title: &str, body: &str, genre: Genre) -> NewBlog {
        NewBlog {
            title: title.to_string(),
            body: body.to_string(),
            image: "https://images.example/cover.jpg".to_string(),
            image_alt: NewBlog::default_image_alt(title),
            image_caption: String::new(),
            genre,
            links: vec![RelatedLink {
                title: "Source".to_string(),
                url: "https://news.example/a".to_string(),
                description: Some("Original report".to_string()),
                image: None,
                image_alt: None,
                image_caption: None,
            }],
        }
    }

    /// Rewrite a post's timestamp to simulate an older insertion
    async fn backdate(pool: &DynDatabasePool, id: i64, created_at: DateTime<Utc>) {
        sqlx::query("UPDATE blogs SET created_at = ? WHERE id = ?")
            .bind(created_at)
            .bind(id)
            .execute(pool.sqlite().unwrap())
            .await
            .expect("Failed to backdate blog");
    }

    #[tokio::test]
    async fn test_create_and_get_blog() {
        let (_pool, repo) = setup_test_repo().await;

        let created = repo
            .create(&new_blog("Rust in the kernel", "<p>Body</p>", Genre::Coding))
            .await
            .expect("Failed to create blog");
        assert!(created.id > 0);

        let fetched = repo
            .get_by_id(created.id)
            .await
            .expect("Failed to get blog")
            .expect("Blog should exist");

        assert_eq!(fetched.title, "Rust in the kernel");
        assert_eq!(fetched.genre, Genre::Coding);
        assert_eq!(fetched.links.len(), 1);
        assert_eq!(fetched.links[0].description.as_deref(), Some("Original report"));
        assert_eq!(fetched.image_alt, "Blog post image about Rust in the kernel");
    }

    #[tokio::test]
    async fn test_get_missing_blog() {
        let (_pool, repo) = setup_test_repo().await;
        assert!(repo.get_by_id(404).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_latest_respects_genre() {
        let (pool, repo) = setup_test_repo().await;

        let older = repo.create(&new_blog("Old AI", "b", Genre::AiMl)).await.unwrap();
        backdate(&pool, older.id, Utc::now() - Duration::hours(5)).await;
        repo.create(&new_blog("New coding", "b", Genre::Coding)).await.unwrap();

        let latest = repo.latest(None).await.unwrap().unwrap();
        assert_eq!(latest.title, "New coding");

        let latest_ai = repo.latest(Some(Genre::AiMl)).await.unwrap().unwrap();
        assert_eq!(latest_ai.title, "Old AI");

        assert!(repo.latest(Some(Genre::Cybersecurity)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_newest_first_with_paging() {
        let (pool, repo) = setup_test_repo().await;

        for i in 0..5 {
            let blog = repo
                .create(&new_blog(&format!("Post {}", i), "b", Genre::General))
                .await
                .unwrap();
            backdate(&pool, blog.id, Utc::now() - Duration::hours(10 - i)).await;
        }

        let filter = BlogFilter::default();
        let page1 = repo.list(&filter, 0, 2).await.unwrap();
        let page3 = repo.list(&filter, 4, 2).await.unwrap();

        assert_eq!(page1.iter().map(|b| b.title.as_str()).collect::<Vec<_>>(), ["Post 4", "Post 3"]);
        assert_eq!(page3.len(), 1);
        assert_eq!(page3[0].title, "Post 0");
        assert_eq!(repo.count(&filter).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_list_search_is_case_insensitive() {
        let (_pool, repo) = setup_test_repo().await;

        repo.create(&new_blog("Quantum Chips", "<p>qubits</p>", Genre::EmergingTech)).await.unwrap();
        repo.create(&new_blog("Patch Tuesday", "<p>A QUANTUM-safe update</p>", Genre::Cybersecurity)).await.unwrap();
        repo.create(&new_blog("Frameworks", "<p>react</p>", Genre::Coding)).await.unwrap();

        let filter = BlogFilter {
            search: Some("quantum".to_string()),
            ..Default::default()
        };
        assert_eq!(repo.count(&filter).await.unwrap(), 2);

        let filter = BlogFilter {
            search: Some("QUANTUM".to_string()),
            genre: Some(Genre::Cybersecurity),
            ..Default::default()
        };
        let found = repo.list(&filter, 0, 10).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "Patch Tuesday");
    }

    #[tokio::test]
    async fn test_list_search_treats_wildcards_literally() {
        let (_pool, repo) = setup_test_repo().await;

        repo.create(&new_blog("100% uptime", "b", Genre::TechNews)).await.unwrap();
        repo.create(&new_blog("1000 servers", "b", Genre::TechNews)).await.unwrap();

        let filter = BlogFilter {
            search: Some("100%".to_string()),
            ..Default::default()
        };
        let found = repo.list(&filter, 0, 10).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "100% uptime");
    }

    #[tokio::test]
    async fn test_list_created_after() {
        let (pool, repo) = setup_test_repo().await;

        let old = repo.create(&new_blog("Old", "b", Genre::General)).await.unwrap();
        backdate(&pool, old.id, Utc::now() - Duration::days(10)).await;
        repo.create(&new_blog("Recent", "b", Genre::General)).await.unwrap();

        let filter = BlogFilter {
            created_after: Some(Utc::now() - Duration::days(7)),
            ..Default::default()
        };
        let found = repo.list(&filter, 0, 10).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "Recent");
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn test_filter_clause_empty() {
        let (clause, args) = filter_clause(&BlogFilter::default(), SQLITE_ESCAPE);
        assert!(clause.is_empty());
        assert!(args.is_empty());
    }
}
