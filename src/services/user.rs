//! User service
//!
//! Implements business logic for reader accounts:
//! - Registration with email validation and argon2 password hashing
//! - Login, issuing a signed access token
//! - Token authentication for protected routes
//! - Profile with populated bookmarks
//! - Genre preferences and bookmark edits

use crate::db::repositories::{BlogRepository, DuplicateEmail, UserRepository};
use crate::models::{Blog, Genre, User, UserRole};
use crate::services::password::{hash_password, verify_password, MIN_PASSWORD_LEN};
use crate::services::token::{TokenError, TokenService};
use anyhow::Context;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\w+([.-]?\w+)*@\w+([.-]?\w+)*(\.\w{2,3})+$")
        .expect("valid regex")
});

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Authentication failed (invalid credentials or token)
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    /// Validation error (invalid input)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// User already exists
    #[error("User already exists")]
    UserExists,

    /// Referenced user or post does not exist
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Input for user registration
#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub email: String,
    pub password: String,
}

/// Input for user login
#[derive(Debug, Clone)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

/// A user together with a freshly issued access token
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user: User,
    pub token: String,
}

/// A user with bookmarks resolved to posts
#[derive(Debug, Clone)]
pub struct Profile {
    pub user: User,
    pub bookmarks: Vec<Blog>,
}

/// User service for accounts and authentication
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    blog_repo: Arc<dyn BlogRepository>,
    tokens: TokenService,
}

impl UserService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        blog_repo: Arc<dyn BlogRepository>,
        tokens: TokenService,
    ) -> Self {
        Self {
            user_repo,
            blog_repo,
            tokens,
        }
    }

    /// Register a new reader account.
    ///
    /// The email is trimmed and lowercased before the uniqueness check.
    ///
    /// # Errors
    ///
    /// - `ValidationError` if the email is malformed or the password too short
    /// - `UserExists` if the email is already registered
    /// - `InternalError` for database errors
    pub async fn register(&self, input: RegisterInput) -> Result<AuthSession, UserServiceError> {
        let email = normalize_email(&input.email);
        validate_email(&email)?;
        validate_password(&input.password)?;

        if self
            .user_repo
            .get_by_email(&email)
            .await
            .context("Failed to check email")?
            .is_some()
        {
            return Err(UserServiceError::UserExists);
        }

        let password_hash = hash_password(&input.password).context("Failed to hash password")?;
        let user = User::new(email, password_hash, UserRole::User);

        // A concurrent registration can win between the check above and here
        let created = self.user_repo.create(&user).await.map_err(|e| {
            if e.is::<DuplicateEmail>() {
                UserServiceError::UserExists
            } else {
                UserServiceError::InternalError(e.context("Failed to create user"))
            }
        })?;

        tracing::info!(user_id = created.id, "Registered new user");

        let token = self.issue_token(created.id)?;
        Ok(AuthSession {
            user: created,
            token,
        })
    }

    /// Check credentials and issue a token.
    ///
    /// Unknown email and wrong password produce the same error.
    pub async fn login(&self, input: LoginInput) -> Result<AuthSession, UserServiceError> {
        let invalid = || UserServiceError::AuthenticationError("Invalid email or password".to_string());

        let email = normalize_email(&input.email);
        let user = self
            .user_repo
            .get_by_email(&email)
            .await
            .context("Failed to get user by email")?
            .ok_or_else(invalid)?;

        if !verify_password(&input.password, &user.password_hash)
            .context("Failed to verify password")?
        {
            tracing::debug!(user_id = user.id, "Login rejected: wrong password");
            return Err(invalid());
        }

        let token = self.issue_token(user.id)?;
        Ok(AuthSession { user, token })
    }

    /// Resolve a bearer token to its user
    pub async fn authenticate(&self, token: &str) -> Result<User, UserServiceError> {
        let claims = self.tokens.verify(token).map_err(|e| match e {
            TokenError::Expired => UserServiceError::AuthenticationError("Token expired".to_string()),
            _ => UserServiceError::AuthenticationError("Not authorized, token failed".to_string()),
        })?;

        let user_id = claims.user_id().ok_or_else(|| {
            UserServiceError::AuthenticationError("Not authorized, token failed".to_string())
        })?;

        self.user_repo
            .get_by_id(user_id)
            .await
            .context("Failed to get user by ID")?
            .ok_or_else(|| {
                UserServiceError::AuthenticationError("Not authorized, user not found".to_string())
            })
    }

    /// Load a user and resolve their bookmarks
    pub async fn profile(&self, user_id: i64) -> Result<Profile, UserServiceError> {
        let user = self
            .user_repo
            .get_by_id(user_id)
            .await
            .context("Failed to get user by ID")?
            .ok_or(UserServiceError::NotFound("User"))?;

        let bookmarks = self
            .user_repo
            .bookmarks(user_id)
            .await
            .context("Failed to load bookmarks")?;

        Ok(Profile { user, bookmarks })
    }

    /// Replace the preferred genres. Duplicates are collapsed, order kept.
    ///
    /// # Errors
    ///
    /// `ValidationError` if any entry is not a known genre
    pub async fn update_preferences(
        &self,
        user_id: i64,
        preferences: &[String],
    ) -> Result<User, UserServiceError> {
        let mut genres: Vec<Genre> = Vec::with_capacity(preferences.len());
        for raw in preferences {
            let genre: Genre = raw
                .parse()
                .map_err(|_| UserServiceError::ValidationError(format!("Unknown genre '{}'", raw)))?;
            if !genres.contains(&genre) {
                genres.push(genre);
            }
        }

        self.user_repo
            .update_preferences(user_id, &genres)
            .await
            .context("Failed to update preferences")?;

        self.user_repo
            .get_by_id(user_id)
            .await
            .context("Failed to get user by ID")?
            .ok_or(UserServiceError::NotFound("User"))
    }

    /// Bookmark a post. Bookmarking twice is not an error.
    pub async fn add_bookmark(&self, user_id: i64, blog_id: i64) -> Result<(), UserServiceError> {
        if self
            .blog_repo
            .get_by_id(blog_id)
            .await
            .context("Failed to get blog by ID")?
            .is_none()
        {
            return Err(UserServiceError::NotFound("Blog"));
        }

        self.user_repo
            .add_bookmark(user_id, blog_id)
            .await
            .context("Failed to add bookmark")?;
        Ok(())
    }

    /// Remove a bookmark. Removing a missing bookmark is not an error.
    pub async fn remove_bookmark(&self, user_id: i64, blog_id: i64) -> Result<(), UserServiceError> {
        self.user_repo
            .remove_bookmark(user_id, blog_id)
            .await
            .context("Failed to remove bookmark")?;
        Ok(())
    }

    fn issue_token(&self, user_id: i64) -> Result<String, UserServiceError> {
        self.tokens
            .issue(user_id)
            .map_err(|e| UserServiceError::InternalError(anyhow::anyhow!(e)))
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_email(email: &str) -> Result<(), UserServiceError> {
    if email.is_empty() {
        return Err(UserServiceError::ValidationError("Please provide an email".to_string()));
    }
    if !EMAIL_RE.is_match(email) {
        return Err(UserServiceError::ValidationError("Please provide a valid email".to_string()));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), UserServiceError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(UserServiceError::ValidationError(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}
