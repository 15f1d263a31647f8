//! Blog post model
//!
//! This module provides:
//! - `Blog` entity, the generated post as stored and served
//! - `Genre` enum with the six supported genres
//! - `NewBlog` input produced by the generator
//! - Listing filters and pagination types

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A generated blog post. Posts are never updated after insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blog {
    pub id: i64,
    pub title: String,
    /// HTML body
    pub body: String,
    /// Cover image URL
    pub image: String,
    pub image_alt: String,
    #[serde(default)]
    pub image_caption: String,
    pub genre: Genre,
    #[serde(default)]
    pub links: Vec<RelatedLink>,
    pub created_at: DateTime<Utc>,
}

/// A related link attached to a post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedLink {
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_alt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_caption: Option<String>,
}

/// Input for inserting a new post
#[derive(Debug, Clone)]
pub struct NewBlog {
    pub title: String,
    pub body: String,
    pub image: String,
    pub image_alt: String,
    pub image_caption: String,
    pub genre: Genre,
    pub links: Vec<RelatedLink>,
}

impl NewBlog {
    /// Alt text used when the model does not provide one
    pub fn default_image_alt(title: &str) -> String {
        format!("Blog post image about {}", title)
    }
}

/// Post genre
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Genre {
    TechNews,
    AiMl,
    Cybersecurity,
    Coding,
    EmergingTech,
    #[default]
    General,
}

impl Genre {
    pub const ALL: [Genre; 6] = [
        Genre::TechNews,
        Genre::AiMl,
        Genre::Cybersecurity,
        Genre::Coding,
        Genre::EmergingTech,
        Genre::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Genre::TechNews => "tech-news",
            Genre::AiMl => "ai-ml",
            Genre::Cybersecurity => "cybersecurity",
            Genre::Coding => "coding",
            Genre::EmergingTech => "emerging-tech",
            Genre::General => "general",
        }
    }
}

impl fmt::Display for Genre {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Genre {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        Genre::ALL
            .into_iter()
            .find(|g| g.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("Invalid genre: {}", s))
    }
}

/// Relative age filter for listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Since {
    Week,
    Month,
    Year,
}

impl Since {
    /// Oldest creation time still included by this filter
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Since::Week => now - Duration::days(7),
            Since::Month => now.checked_sub_months(Months::new(1)).unwrap_or(now),
            Since::Year => now.checked_sub_months(Months::new(12)).unwrap_or(now),
        }
    }
}

impl FromStr for Since {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "week" => Ok(Since::Week),
            "month" => Ok(Since::Month),
            "year" => Ok(Since::Year),
            other => Err(anyhow::anyhow!("Invalid date filter: {}", other)),
        }
    }
}

/// Listing filter. All conditions are combined with AND.
#[derive(Debug, Clone, Default)]
pub struct BlogFilter {
    pub genre: Option<Genre>,
    /// Case-insensitive substring over title and body
    pub search: Option<String>,
    /// Only posts created at or after this instant
    pub created_after: Option<DateTime<Utc>>,
}

/// Pagination parameters for list queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListParams {
    /// Page number (1-indexed)
    pub page: u32,
    /// Number of items per page
    pub per_page: u32,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 10,
        }
    }
}

impl ListParams {
    /// Create pagination parameters, clamping page to >= 1 and size to 1..=100
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, 100),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page.saturating_sub(1) as i64) * self.per_page as i64
    }

    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }
}

/// Paginated result container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

impl<T> PagedResult<T> {
    pub fn new(items: Vec<T>, total: i64, params: &ListParams) -> Self {
        Self {
            items,
            total,
            page: params.page,
            per_page: params.per_page,
        }
    }

    /// `ceil(total / per_page)`
    pub fn total_pages(&self) -> i64 {
        if self.per_page == 0 || self.total <= 0 {
            return 0;
        }
        let per_page = self.per_page as i64;
        (self.total + per_page - 1) / per_page
    }
}
