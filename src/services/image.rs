//! Cover image lookup
//!
//! Searches an Unsplash-style `search/photos` endpoint for one landscape photo
//! matching the post title. Lookup never fails the generation run: any error
//! or empty result falls back to a randomized `source.unsplash.com` URL.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ImageConfig;

const FALLBACK_BASE: &str = "https://source.unsplash.com/random/1200x800/";
const QUERY_WORDS: usize = 5;
const FALLBACK_WORDS: usize = 3;
const DEFAULT_QUERY: &str = "technology";

static NON_WORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[^\w\s]").expect("valid regex")
});

/// A photo search endpoint
#[async_trait]
pub trait ImageSearch: Send + Sync {
    /// URL of the best matching photo, `None` when nothing matched
    async fn search(&self, query: &str) -> anyhow::Result<Option<String>>;

    /// Whether an access key is configured
    fn is_configured(&self) -> bool;
}

/// Unsplash search client
pub struct UnsplashClient {
    client: Client,
    api_url: String,
    access_key: Option<String>,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Photo>,
}

#[derive(Deserialize)]
struct Photo {
    urls: PhotoUrls,
}

#[derive(Deserialize)]
struct PhotoUrls {
    regular: Option<String>,
}

impl UnsplashClient {
    pub fn from_config(config: &ImageConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            access_key: config
                .access_key
                .as_deref()
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string),
        })
    }
}

#[async_trait]
impl ImageSearch for UnsplashClient {
    async fn search(&self, query: &str) -> anyhow::Result<Option<String>> {
        let key = self
            .access_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("Image API access key is not configured"))?;

        let response = self
            .client
            .get(format!("{}/search/photos", self.api_url))
            .query(&[("query", query), ("per_page", "1"), ("orientation", "landscape")])
            .header("Authorization", format!("Client-ID {}", key))
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Image search request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Image API returned {}: {}", status, error_text);
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Invalid image search response: {}", e))?;

        Ok(body.results.into_iter().next().and_then(|p| p.urls.regular))
    }

    fn is_configured(&self) -> bool {
        self.access_key.is_some()
    }
}

/// Search query for a title: punctuation stripped, first five words
pub fn search_query(title: &str) -> String {
    let stripped = NON_WORD_RE.replace_all(title, "");
    let query = stripped
        .split_whitespace()
        .take(QUERY_WORDS)
        .collect::<Vec<_>>()
        .join(" ");

    if query.is_empty() {
        DEFAULT_QUERY.to_string()
    } else {
        query
    }
}

/// Randomized image URL keyed by the first three title words
pub fn fallback_image_url(title: &str) -> String {
    let words = title
        .split_whitespace()
        .take(FALLBACK_WORDS)
        .collect::<Vec<_>>()
        .join(" ");
    let words = if words.is_empty() { DEFAULT_QUERY.to_string() } else { words };

    format!("{}?{}", FALLBACK_BASE, urlencoding::encode(&words))
}

/// Find a cover image for a post, falling back on any failure
pub async fn cover_image(search: &dyn ImageSearch, title: &str) -> String {
    if !search.is_configured() {
        debug!("Image search not configured, using fallback image");
        return fallback_image_url(title);
    }

    let query = search_query(title);
    match search.search(&query).await {
        Ok(Some(url)) => url,
        Ok(None) => {
            debug!("No image found for '{}', using fallback", query);
            fallback_image_url(title)
        }
        Err(e) => {
            warn!("Image search failed for '{}': {}", query, e);
            fallback_image_url(title)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(url: &str, key: Option<&str>) -> UnsplashClient {
        UnsplashClient::from_config(&ImageConfig {
            api_url: url.to_string(),
            access_key: key.map(str::to_string),
            timeout_secs: 10,
        })
        .unwrap()
    }

    #[test]
    fn test_search_query_strips_punctuation_and_truncates() {
        assert_eq!(
            search_query("Rust 2.0: What's new, and why it matters today"),
            "Rust 20 Whats new and"
        );
        assert_eq!(search_query("!!!"), "technology");
    }

    #[test]
    fn test_fallback_url_uses_first_three_words() {
        assert_eq!(
            fallback_image_url("Quantum chips arrive early"),
            "https://source.unsplash.com/random/1200x800/?Quantum%20chips%20arrive"
        );
        assert_eq!(
            fallback_image_url(""),
            "https://source.unsplash.com/random/1200x800/?technology"
        );
    }

    #[tokio::test]
    async fn test_search_sends_client_id_and_reads_regular_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/photos"))
            .and(query_param("query", "AI chips"))
            .and(query_param("per_page", "1"))
            .and(query_param("orientation", "landscape"))
            .and(header("Authorization", "Client-ID abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [{"urls": {"regular": "https://images.example/1.jpg"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let search = client(&server.uri(), Some("abc"));
        let url = cover_image(&search, "AI chips!").await;
        assert_eq!(url, "https://images.example/1.jpg");
    }

    #[tokio::test]
    async fn test_empty_results_fall_back() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"results": []})))
            .mount(&server)
            .await;

        let search = client(&server.uri(), Some("abc"));
        assert_eq!(search.search("anything").await.unwrap(), None);
        assert_eq!(
            cover_image(&search, "Edge AI rollout").await,
            fallback_image_url("Edge AI rollout")
        );
    }

    #[tokio::test]
    async fn test_error_status_falls_back() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let search = client(&server.uri(), Some("bad"));
        assert!(search.search("x").await.is_err());
        assert!(cover_image(&search, "Title here")
            .await
            .starts_with("https://source.unsplash.com/random/1200x800/"));
    }

    #[tokio::test]
    async fn test_unconfigured_skips_request() {
        let search = client("http://127.0.0.1:1", None);
        assert!(!search.is_configured());
        assert_eq!(cover_image(&search, "Chips").await, fallback_image_url("Chips"));
    }
}
