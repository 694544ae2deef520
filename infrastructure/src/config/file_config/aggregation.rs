//! Aggregation timeouts from TOML (`[aggregation]` section)
//!
//! ```toml
//! [aggregation]
//! provider_timeout_secs = 30   # per provider: connect + list tools
//! request_timeout_secs = 60    # per JSON-RPC request
//! ```

use serde::{Deserialize, Serialize};
use toolgate_application::AggregationConfig;
use toolgate_application::config::{DEFAULT_PROVIDER_TIMEOUT_SECS, DEFAULT_REQUEST_TIMEOUT_SECS};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileAggregationConfig {
    pub provider_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for FileAggregationConfig {
    fn default() -> Self {
        Self {
            provider_timeout_secs: DEFAULT_PROVIDER_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl FileAggregationConfig {
    pub fn to_aggregation_config(&self) -> AggregationConfig {
        AggregationConfig::from_seconds(self.provider_timeout_secs, self.request_timeout_secs)
    }
}
