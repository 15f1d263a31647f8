//! Content generator
//!
//! One generation run is: prompt → text generation → JSON extraction → cover
//! image lookup → genre assignment → insert. Every stage except the image
//! lookup propagates its error, and nothing is stored unless all of them
//! succeed.
//!
//! Runs are serialized through an async mutex. [`BlogGenerator::generate_if_stale`]
//! repeats the freshness check after taking the lock, so requests that race on
//! a stale post produce one new post per process instead of several.

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::db::repositories::BlogRepository;
use crate::models::{Blog, Genre, NewBlog, RelatedLink};
use crate::services::genre;
use crate::services::image::{cover_image, ImageSearch};
use crate::services::llm::TextGenerator;

static JSON_OBJECT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{[\s\S]*\}").expect("valid regex")
});

const PROMPT: &str = "You are a technology journalist writing for a tech news blog. \
Write an original, engaging and informative blog post about a current topic in technology. \
Respond ONLY with a JSON object in this exact structure:
{
  \"title\": \"A catchy headline\",
  \"body\": \"The full article as HTML using <h2>, <p>, <ul> and <li> tags, at least 600 words\",
  \"imageAlt\": \"Alt text describing the cover image\",
  \"imageCaption\": \"A short caption for the cover image\",
  \"links\": [
    {
      \"title\": \"Title of a related article\",
      \"url\": \"https://example.com/related-article\",
      \"description\": \"One sentence on why it is relevant\"
    }
  ]
}
Include 2 to 4 related links. Do not wrap the JSON in markdown code fences.";

/// Generation failures
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
    #[error("{0}")]
    Upstream(String),
    #[error("Generation API returned no content")]
    EmptyResponse,
    #[error("Failed to parse generated content: {0}")]
    ContentParse(String),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Post fields as the model returns them
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedContent {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub image_alt: Option<String>,
    #[serde(default)]
    pub image_caption: Option<String>,
    #[serde(default)]
    pub links: Option<Vec<RelatedLink>>,
}

/// Result of a freshness-gated run
#[derive(Debug, Clone)]
pub enum GenerationOutcome {
    /// A fresh post already existed; nothing was generated
    Existing(Blog),
    /// A new post was generated and stored
    Generated(Blog),
}

/// A post is fresh while `now - created_at < window`
pub fn is_fresh(created_at: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
    now - created_at < window
}

/// Prompt sent to the text generator
pub fn build_prompt(genre: Option<Genre>) -> String {
    match genre {
        Some(genre) => format!("{}\nFocus specifically on {}.", PROMPT, genre),
        None => PROMPT.to_string(),
    }
}

/// First-`{`-to-last-`}` slice of a free-text model answer
pub fn extract_json(text: &str) -> Option<&str> {
    JSON_OBJECT_RE.find(text).map(|m| m.as_str())
}

/// Extract and parse the post JSON embedded in a model answer
pub fn parse_content(text: &str) -> Result<GeneratedContent, GenerationError> {
    let json = extract_json(text)
        .ok_or_else(|| GenerationError::ContentParse("no JSON object in response".to_string()))?;

    let content: GeneratedContent =
        serde_json::from_str(json).map_err(|e| GenerationError::ContentParse(e.to_string()))?;

    if content.title.trim().is_empty() {
        return Err(GenerationError::ContentParse("title is empty".to_string()));
    }
    if content.body.trim().is_empty() {
        return Err(GenerationError::ContentParse("body is empty".to_string()));
    }

    Ok(content)
}

/// Generates and stores posts
pub struct BlogGenerator {
    llm: Arc<dyn TextGenerator>,
    images: Arc<dyn ImageSearch>,
    blogs: Arc<dyn BlogRepository>,
    window: Duration,
    run_lock: Mutex<()>,
    /// Bumped after every stored post
    epoch: AtomicU64,
}

impl BlogGenerator {
    pub fn new(
        llm: Arc<dyn TextGenerator>,
        images: Arc<dyn ImageSearch>,
        blogs: Arc<dyn BlogRepository>,
        window: Duration,
    ) -> Self {
        Self {
            llm,
            images,
            blogs,
            window,
            run_lock: Mutex::new(()),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Number of posts stored by this generator so far. Cached listings are
    /// keyed by it so a page read before a new post can never be served after.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    pub fn text_generation_configured(&self) -> bool {
        self.llm.is_configured()
    }

    pub fn image_search_configured(&self) -> bool {
        self.images.is_configured()
    }

    /// Generate a post unless a fresh one exists for this genre
    pub async fn generate_if_stale(
        &self,
        genre: Option<Genre>,
    ) -> Result<GenerationOutcome, GenerationError> {
        let _guard = self.run_lock.lock().await;

        if let Some(latest) = self.blogs.latest(genre).await? {
            if is_fresh(latest.created_at, Utc::now(), self.window) {
                debug!("Post {} is still fresh, skipping generation", latest.id);
                return Ok(GenerationOutcome::Existing(latest));
            }
        }

        self.run(genre).await.map(GenerationOutcome::Generated)
    }

    /// Generate a post regardless of freshness
    #[cfg(test)]
    pub async fn generate(&self, genre: Option<Genre>) -> Result<Blog, GenerationError> {
        let _guard = self.run_lock.lock().await;
        self.run(genre).await
    }

    async fn run(&self, genre: Option<Genre>) -> Result<Blog, GenerationError> {
        let prompt = build_prompt(genre);
        let text = self.llm.generate(&prompt).await?;
        let content = parse_content(&text)?;

        let image = cover_image(self.images.as_ref(), &content.title).await;
        let genre = genre.unwrap_or_else(|| genre::classify(&content.title, &content.body));

        let input = NewBlog {
            image_alt: content
                .image_alt
                .filter(|alt| !alt.trim().is_empty())
                .unwrap_or_else(|| NewBlog::default_image_alt(&content.title)),
            image_caption: content.image_caption.unwrap_or_default(),
            links: content.links.unwrap_or_default(),
            title: content.title,
            body: content.body,
            image,
            genre,
        };

        let blog = self.blogs.create(&input).await?;
        self.epoch.fetch_add(1, Ordering::Release);
        info!("Generated post {} ({}): {}", blog.id, blog.genre, blog.title);
        Ok(blog)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn freshness_matches_age_comparison(age_secs in 0i64..10_000, window_secs in 1i64..10_000) {
            let now = Utc::now();
            let fresh = is_fresh(now - Duration::seconds(age_secs), now, Duration::seconds(window_secs));
            prop_assert_eq!(fresh, age_secs < window_secs);
        }

        #[test]
        fn extracted_json_is_braced(prefix in "[^{}]{0,20}", inner in "[a-z0-9 :,\"]{0,30}", suffix in "[^{}]{0,20}") {
            let text = format!("{}{{{}}}{}", prefix, inner, suffix);
            let json = extract_json(&text).unwrap();
            prop_assert_eq!(json.chars().next(), Some('{'));
            prop_assert_eq!(json.chars().last(), Some('}'));
            prop_assert_eq!(json.len(), inner.len() + 2);
        }
    }
}
