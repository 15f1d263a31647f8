//! Shared API response types
//!
//! Wire shapes of the JSON API. Field names are camelCase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Blog, Genre, PagedResult, User};
use crate::services::user::{AuthSession, Profile};

// ============================================================================
// User Response Types
// ============================================================================

/// Public view of a user
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
    pub role: String,
    pub preferences: Vec<Genre>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            role: user.role.to_string(),
            preferences: user.preferences,
        }
    }
}

/// Register and login response: the user fields plus an access token
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    #[serde(flatten)]
    pub user: UserResponse,
    pub token: String,
}

impl From<AuthSession> for AuthResponse {
    fn from(session: AuthSession) -> Self {
        Self {
            user: session.user.into(),
            token: session.token,
        }
    }
}

/// Profile with bookmarks resolved to posts
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    #[serde(flatten)]
    pub user: UserResponse,
    pub bookmarks: Vec<Blog>,
    pub created_at: DateTime<Utc>,
}

impl From<Profile> for ProfileResponse {
    fn from(profile: Profile) -> Self {
        let created_at = profile.user.created_at;
        Self {
            user: profile.user.into(),
            bookmarks: profile.bookmarks,
            created_at,
        }
    }
}

/// Simple success acknowledgement
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

// ============================================================================
// Blog Response Types
// ============================================================================

/// Paginated post listing
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogListResponse {
    pub blogs: Vec<Blog>,
    pub total_pages: i64,
    pub current_page: u32,
    pub total: i64,
}

impl From<PagedResult<Blog>> for BlogListResponse {
    fn from(result: PagedResult<Blog>) -> Self {
        Self {
            total_pages: result.total_pages(),
            current_page: result.page,
            total: result.total,
            blogs: result.items,
        }
    }
}

/// Acknowledgement of a background generation request
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub success: bool,
    pub message: String,
    pub request_id: String,
    /// Requested genre, `general` when none was given
    pub genre: String,
}
