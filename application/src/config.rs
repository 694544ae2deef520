//! Application-level configuration.
//!
//! Timeouts that control how the use cases talk to providers.

use std::time::Duration;

/// Default time allowed for one provider to connect and list its tools.
pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 30;

/// Default time allowed for a single request to a tool server.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Aggregation behavior configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregationConfig {
    /// Applied to each provider on its own, never to the batch as a whole.
    pub provider_timeout: Duration,
    /// Applied to each request/response round trip on a client.
    pub request_timeout: Duration,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            provider_timeout: Duration::from_secs(DEFAULT_PROVIDER_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl AggregationConfig {
    /// Creates an AggregationConfig from timeouts in seconds.
    pub fn from_seconds(provider_timeout_secs: u64, request_timeout_secs: u64) -> Self {
        Self {
            provider_timeout: Duration::from_secs(provider_timeout_secs),
            request_timeout: Duration::from_secs(request_timeout_secs),
        }
    }

    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }
}
