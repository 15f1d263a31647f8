//! Client data services
//!
//! A consumer-side library for the blog API:
//! - `BlogApiClient` with retry and exponential backoff
//! - `ApiMonitor` tracking per-endpoint health
//! - `OfflineStore` keeping the last fetched posts on disk

pub mod api;
pub mod monitor;
pub mod offline;
pub mod retry;

pub use api::{BlogApiClient, DataSource, Fetched};
pub use monitor::{ApiMonitor, EndpointStats};
pub use offline::OfflineStore;
pub use retry::RetryPolicy;

/// Client errors
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Server responded {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid response body: {0}")]
    Decode(String),

    #[error("Offline storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl ClientError {
    /// Transport failures and server errors are worth another attempt;
    /// client errors (4xx) are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Transport(_) => true,
            ClientError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
