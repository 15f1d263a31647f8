//! User repository
//!
//! Database operations for users and their bookmarks.
//!
//! This module provides:
//! - `UserRepository` trait defining the interface for user data access
//! - `SqlxUserRepository` implementing the trait for SQLite and MySQL

use super::blog::{row_to_blog_mysql, row_to_blog_sqlite};
use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Blog, Genre, User, UserRole};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

/// Returned inside the `anyhow::Error` of [`UserRepository::create`] when
/// the email is already registered
#[derive(Debug, thiserror::Error)]
#[error("Email already registered")]
pub struct DuplicateEmail;

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a new user
    async fn create(&self, user: &User) -> Result<User>;

    /// Get user by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Get user by email (exact match on the stored, normalized address)
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Replace the user's preferred genres
    async fn update_preferences(&self, id: i64, preferences: &[Genre]) -> Result<()>;

    /// Add a bookmark. Returns false if it already existed.
    async fn add_bookmark(&self, user_id: i64, blog_id: i64) -> Result<bool>;

    /// Remove a bookmark. Returns false if there was none.
    async fn remove_bookmark(&self, user_id: i64, blog_id: i64) -> Result<bool>;

    /// Bookmarked posts, most recently bookmarked first
    async fn bookmarks(&self, user_id: i64) -> Result<Vec<Blog>>;
}

/// SQLx-based user repository implementation
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_user_sqlite(self.pool.sqlite()?, user).await,
            DatabaseDriver::Mysql => create_user_mysql(self.pool.mysql()?, user).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
                    .bind(id)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to get user by ID")?;
                row.as_ref().map(row_to_user_sqlite).transpose()
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
                    .bind(id)
                    .fetch_optional(self.pool.mysql()?)
                    .await
                    .context("Failed to get user by ID")?;
                row.as_ref().map(row_to_user_mysql).transpose()
            }
        }
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?"))
                    .bind(email)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to get user by email")?;
                row.as_ref().map(row_to_user_sqlite).transpose()
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?"))
                    .bind(email)
                    .fetch_optional(self.pool.mysql()?)
                    .await
                    .context("Failed to get user by email")?;
                row.as_ref().map(row_to_user_mysql).transpose()
            }
        }
    }

    async fn update_preferences(&self, id: i64, preferences: &[Genre]) -> Result<()> {
        let encoded = serde_json::to_string(preferences).context("Failed to encode preferences")?;
        let sql = "UPDATE users SET preferences = ?, updated_at = ? WHERE id = ?";
        let now = Utc::now();

        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(&encoded)
                    .bind(now)
                    .bind(id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to update preferences")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(&encoded)
                    .bind(now)
                    .bind(id)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to update preferences")?;
            }
        }
        Ok(())
    }

    async fn add_bookmark(&self, user_id: i64, blog_id: i64) -> Result<bool> {
        let now = Utc::now();
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(
                "INSERT OR IGNORE INTO user_bookmarks (user_id, blog_id, created_at) VALUES (?, ?, ?)",
            )
            .bind(user_id)
            .bind(blog_id)
            .bind(now)
            .execute(self.pool.sqlite()?)
            .await
            .context("Failed to add bookmark")?
            .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(
                "INSERT IGNORE INTO user_bookmarks (user_id, blog_id, created_at) VALUES (?, ?, ?)",
            )
            .bind(user_id)
            .bind(blog_id)
            .bind(now)
            .execute(self.pool.mysql()?)
            .await
            .context("Failed to add bookmark")?
            .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn remove_bookmark(&self, user_id: i64, blog_id: i64) -> Result<bool> {
        let sql = "DELETE FROM user_bookmarks WHERE user_id = ? AND blog_id = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(user_id)
                .bind(blog_id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to remove bookmark")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(user_id)
                .bind(blog_id)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to remove bookmark")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn bookmarks(&self, user_id: i64) -> Result<Vec<Blog>> {
        let sql = r#"
            SELECT b.id, b.title, b.body, b.image, b.image_alt, b.image_caption,
                   b.genre, b.links, b.created_at
            FROM user_bookmarks ub
            JOIN blogs b ON b.id = ub.blog_id
            WHERE ub.user_id = ?
            ORDER BY ub.created_at DESC, b.id DESC
        "#;

        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(sql)
                    .bind(user_id)
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to load bookmarks")?;
                rows.iter().map(row_to_blog_sqlite).collect()
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(sql)
                    .bind(user_id)
                    .fetch_all(self.pool.mysql()?)
                    .await
                    .context("Failed to load bookmarks")?;
                rows.iter().map(row_to_blog_mysql).collect()
            }
        }
    }
}

const USER_COLUMNS: &str = "id, email, password_hash, role, preferences, created_at, updated_at";

fn parse_role(raw: &str) -> Result<UserRole> {
    UserRole::from_str(raw).with_context(|| format!("Invalid role in database: {}", raw))
}

/// Unknown genres left over from older data are dropped
fn parse_preferences(raw: &str) -> Vec<Genre> {
    serde_json::from_str::<Vec<String>>(raw)
        .unwrap_or_default()
        .iter()
        .filter_map(|g| g.parse().ok())
        .collect()
}

/// Unique violations on insert become [`DuplicateEmail`]
fn insert_error(e: sqlx::Error) -> anyhow::Error {
    let duplicate = e
        .as_database_error()
        .map_or(false, |db| db.is_unique_violation());
    if duplicate {
        anyhow::Error::new(DuplicateEmail)
    } else {
        anyhow::Error::new(e).context("Failed to insert user")
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_user_sqlite(pool: &SqlitePool, user: &User) -> Result<User> {
    let now = Utc::now();
    let preferences = serde_json::to_string(&user.preferences)?;

    let result = sqlx::query(
        r#"
        INSERT INTO users (email, password_hash, role, preferences, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.role.to_string())
    .bind(&preferences)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .map_err(insert_error)?;

    Ok(User {
        id: result.last_insert_rowid(),
        created_at: now,
        updated_at: now,
        ..user.clone()
    })
}

fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    let role: String = row.get("role");
    let preferences: String = row.get("preferences");

    Ok(User {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role: parse_role(&role)?,
        preferences: parse_preferences(&preferences),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_user_mysql(pool: &MySqlPool, user: &User) -> Result<User> {
    let now = Utc::now();
    let preferences = serde_json::to_string(&user.preferences)?;

    let result = sqlx::query(
        r#"
        INSERT INTO users (email, password_hash, role, preferences, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.role.to_string())
    .bind(&preferences)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .map_err(insert_error)?;

    Ok(User {
        id: result.last_insert_id() as i64,
        created_at: now,
        updated_at: now,
        ..user.clone()
    })
}

fn row_to_user_mysql(row: &sqlx::mysql::MySqlRow) -> Result<User> {
    let role: String = row.get("role");
    let preferences: String = row.get("preferences");

    Ok(User {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role: parse_role(&role)?,
        preferences: parse_preferences(&preferences),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
