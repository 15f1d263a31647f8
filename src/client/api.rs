//! HTTP client for the blog API
//!
//! Every call goes through the retry policy. Successful responses are copied
//! into the offline store when one is attached; when the network keeps
//! failing, the stored copy is served instead and marked as offline data.

use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::monitor::ApiMonitor;
use super::offline::OfflineStore;
use super::retry::RetryPolicy;
use super::ClientError;
use crate::api::responses::BlogListResponse;
use crate::models::{Blog, Genre};
use crate::services::blog::LatestBlog;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Requests in flight at once for [`BlogApiClient::fetch_many`]
const PREFETCH_CONCURRENCY: usize = 4;

/// Where a result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Network,
    Offline,
}

#[derive(Debug, Clone)]
pub struct Fetched<T> {
    pub data: T,
    pub source: DataSource,
}

impl<T> Fetched<T> {
    fn network(data: T) -> Self {
        Self {
            data,
            source: DataSource::Network,
        }
    }

    fn offline(data: T) -> Self {
        Self {
            data,
            source: DataSource::Offline,
        }
    }

    pub fn is_offline(&self) -> bool {
        self.source == DataSource::Offline
    }
}

pub struct BlogApiClient {
    client: Client,
    /// API root, e.g. `http://localhost:5000/api`
    base_url: String,
    retry: RetryPolicy,
    monitor: Arc<ApiMonitor>,
    offline: Option<Arc<OfflineStore>>,
}

impl BlogApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let client = Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry: RetryPolicy::default(),
            monitor: Arc::new(ApiMonitor::new()),
            offline: None,
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_offline_store(mut self, store: Arc<OfflineStore>) -> Self {
        self.offline = Some(store);
        self
    }

    pub fn with_monitor(mut self, monitor: Arc<ApiMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn monitor(&self) -> &ApiMonitor {
        &self.monitor
    }

    /// GET /blogs/latest
    pub async fn fetch_latest(&self, genre: Option<Genre>) -> Result<Fetched<Blog>, ClientError> {
        let query = genre_query(genre);
        match self
            .get_json::<LatestBlog>("/blogs/latest", "/blogs/latest", &query)
            .await
        {
            Ok(latest) => {
                if let Some(store) = &self.offline {
                    if let Err(e) = store.save_latest(&latest.blog).await {
                        warn!("Failed to store latest post offline: {:#}", e);
                    }
                }
                Ok(Fetched::network(latest.blog))
            }
            Err(e) if e.is_retryable() => match &self.offline {
                Some(store) => match store.latest().await {
                    Some(blog) => {
                        warn!("Serving latest post from offline storage: {}", e);
                        Ok(Fetched::offline(blog))
                    }
                    None => Err(e),
                },
                None => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    /// GET /blogs/all
    ///
    /// Offline, every stored post (of the requested genre) is returned as a
    /// single page.
    pub async fn fetch_archive(
        &self,
        page: u32,
        limit: u32,
        genre: Option<Genre>,
    ) -> Result<Fetched<BlogListResponse>, ClientError> {
        let mut query = genre_query(genre);
        query.push(("page", page.to_string()));
        query.push(("limit", limit.to_string()));

        match self
            .get_json::<BlogListResponse>("/blogs/all", "/blogs/all", &query)
            .await
        {
            Ok(list) => {
                if let Some(store) = &self.offline {
                    if let Err(e) = store.save_all(&list.blogs).await {
                        warn!("Failed to store archive page offline: {:#}", e);
                    }
                }
                Ok(Fetched::network(list))
            }
            Err(e) if e.is_retryable() => match &self.offline {
                Some(store) => {
                    let blogs = store.all(genre).await;
                    if blogs.is_empty() {
                        return Err(e);
                    }
                    warn!("Serving archive from offline storage: {}", e);
                    let total = blogs.len() as i64;
                    Ok(Fetched::offline(BlogListResponse {
                        blogs,
                        total_pages: 1,
                        current_page: 1,
                        total,
                    }))
                }
                None => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    /// GET /blogs/{id}
    pub async fn fetch_by_id(&self, id: i64) -> Result<Fetched<Blog>, ClientError> {
        let path = format!("/blogs/{}", id);
        match self.get_json::<Blog>("/blogs/{id}", &path, &[]).await {
            Ok(blog) => {
                if let Some(store) = &self.offline {
                    if let Err(e) = store.save(&blog).await {
                        warn!("Failed to store post {} offline: {:#}", id, e);
                    }
                }
                Ok(Fetched::network(blog))
            }
            Err(e) if e.is_retryable() => match &self.offline {
                Some(store) => match store.get(id).await {
                    Some(blog) => {
                        warn!("Serving post {} from offline storage: {}", id, e);
                        Ok(Fetched::offline(blog))
                    }
                    None => Err(e),
                },
                None => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    /// Fetch several posts concurrently, e.g. to warm the offline store.
    /// Results come back in the order of `ids`.
    pub async fn fetch_many(&self, ids: &[i64]) -> Vec<Result<Fetched<Blog>, ClientError>> {
        stream::iter(ids.iter().copied())
            .map(|id| self.fetch_by_id(id))
            .buffered(PREFETCH_CONCURRENCY)
            .collect()
            .await
    }

    /// GET `path` with retries, recording every attempt under `endpoint`
    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        let url = url.as_str();
        self.retry
            .run(move |attempt| {
                async move {
                    debug!("GET {} (attempt {})", url, attempt + 1);
                    let started = Instant::now();
                    let result = self.send::<T>(url, query).await;
                    self.monitor
                        .record_request(endpoint, result.is_ok(), started.elapsed());
                    result
                }
            })
            .await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, ClientError> {
        let response = self.client.get(url).query(query).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))
    }
}

fn genre_query(genre: Option<Genre>) -> Vec<(&'static str, String)> {
    genre
        .map(|g| vec![("genre", g.to_string())])
        .unwrap_or_default()
}

/// Pull a readable message out of an API error body
fn error_message(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    parsed
        .as_ref()
        .and_then(|v| {
            v.pointer("/error/message")
                .or_else(|| v.get("message"))
                .and_then(|m| m.as_str())
        })
        .map(str::to_string)
        .unwrap_or_else(|| body.trim().to_string())
}
