//! Endpoint health monitor
//!
//! Keeps per-endpoint request statistics and recommends how long a caller
//! should wait before retrying an endpoint that keeps failing.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

/// Recommended waits, indexed by consecutive failures minus one
const BACKOFF_TABLE: [Duration; 4] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(5),
    Duration::from_secs(10),
];

/// Consecutive failures after which an endpoint counts as unstable
const UNSTABLE_AFTER: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EndpointStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// Running average over successful requests
    pub avg_response_time: Duration,
    pub consecutive_failures: u32,
    pub last_status: Option<RequestStatus>,
}

impl Default for EndpointStats {
    fn default() -> Self {
        Self {
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            avg_response_time: Duration::ZERO,
            consecutive_failures: 0,
            last_status: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct ApiMonitor {
    endpoints: RwLock<HashMap<String, EndpointStats>>,
}

impl ApiMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of one request
    pub fn record_request(&self, endpoint: &str, success: bool, response_time: Duration) {
        let mut endpoints = self
            .endpoints
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let stats = endpoints.entry(endpoint.to_string()).or_default();
        stats.total_requests += 1;

        if success {
            stats.successful_requests += 1;
            stats.consecutive_failures = 0;
            let n = u128::from(stats.successful_requests);
            let total = stats.avg_response_time.as_nanos() * (n - 1) + response_time.as_nanos();
            stats.avg_response_time =
                Duration::from_nanos(u64::try_from(total / n).unwrap_or(u64::MAX));
            stats.last_status = Some(RequestStatus::Success);
        } else {
            stats.failed_requests += 1;
            stats.consecutive_failures = stats.consecutive_failures.saturating_add(1);
            stats.last_status = Some(RequestStatus::Failure);
        }
    }

    /// Recommended wait before the next request to `endpoint`
    pub fn backoff_for(&self, endpoint: &str) -> Duration {
        let failures = self
            .stats(endpoint)
            .map(|s| s.consecutive_failures)
            .unwrap_or(0);
        match failures {
            0 => Duration::ZERO,
            n => BACKOFF_TABLE[(n as usize - 1).min(BACKOFF_TABLE.len() - 1)],
        }
    }

    pub fn is_unstable(&self, endpoint: &str) -> bool {
        self.stats(endpoint)
            .map(|s| s.consecutive_failures >= UNSTABLE_AFTER)
            .unwrap_or(false)
    }

    /// Forget everything recorded for `endpoint`
    pub fn reset(&self, endpoint: &str) {
        self.endpoints
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(endpoint);
    }

    pub fn stats(&self, endpoint: &str) -> Option<EndpointStats> {
        self.endpoints
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(endpoint)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LATEST: &str = "/blogs/latest";

    #[test]
    fn test_unknown_endpoint() {
        let monitor = ApiMonitor::new();
        assert!(monitor.stats(LATEST).is_none());
        assert_eq!(monitor.backoff_for(LATEST), Duration::ZERO);
        assert!(!monitor.is_unstable(LATEST));
    }

    #[test]
    fn test_backoff_follows_table() {
        let monitor = ApiMonitor::new();
        let expected = [1, 2, 5, 10, 10, 10];
        for secs in expected {
            monitor.record_request(LATEST, false, Duration::from_millis(50));
            assert_eq!(monitor.backoff_for(LATEST), Duration::from_secs(secs));
        }
        assert!(monitor.is_unstable(LATEST));

        monitor.record_request(LATEST, true, Duration::from_millis(50));
        assert_eq!(monitor.backoff_for(LATEST), Duration::ZERO);
        assert!(!monitor.is_unstable(LATEST));
    }

    #[test]
    fn test_unstable_at_three_failures() {
        let monitor = ApiMonitor::new();
        monitor.record_request(LATEST, false, Duration::ZERO);
        monitor.record_request(LATEST, false, Duration::ZERO);
        assert!(!monitor.is_unstable(LATEST));
        monitor.record_request(LATEST, false, Duration::ZERO);
        assert!(monitor.is_unstable(LATEST));
    }

    #[test]
    fn test_stats_and_average() {
        let monitor = ApiMonitor::new();
        monitor.record_request(LATEST, true, Duration::from_millis(100));
        monitor.record_request(LATEST, false, Duration::from_millis(900));
        monitor.record_request(LATEST, true, Duration::from_millis(300));

        let stats = monitor.stats(LATEST).unwrap();
        assert_eq!(stats.total_requests, 3);
        assert_eq!(stats.successful_requests, 2);
        assert_eq!(stats.failed_requests, 1);
        assert_eq!(stats.consecutive_failures, 0);
        assert_eq!(stats.last_status, Some(RequestStatus::Success));
        assert_eq!(stats.avg_response_time.as_millis(), 200);
    }

    #[test]
    fn test_reset_is_per_endpoint() {
        let monitor = ApiMonitor::new();
        monitor.record_request(LATEST, false, Duration::ZERO);
        monitor.record_request("/blogs/all", false, Duration::ZERO);

        monitor.reset(LATEST);
        assert!(monitor.stats(LATEST).is_none());
        assert!(monitor.stats("/blogs/all").is_some());
    }
}
