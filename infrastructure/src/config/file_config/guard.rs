//! Loop guard configuration from TOML (`[guard]` section)
//!
//! ```toml
//! [guard]
//! max_identical_tool_calls = 3
//! max_total_tool_calls = 10
//! ```

use serde::{Deserialize, Serialize};
use toolgate_domain::{GuardLimits, MAX_IDENTICAL_TOOL_CALLS, MAX_TOTAL_TOOL_CALLS};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileGuardConfig {
    /// Occurrences of one call signature allowed per turn
    pub max_identical_tool_calls: u32,
    /// Tool calls allowed per turn
    pub max_total_tool_calls: u32,
}

impl Default for FileGuardConfig {
    fn default() -> Self {
        Self {
            max_identical_tool_calls: MAX_IDENTICAL_TOOL_CALLS,
            max_total_tool_calls: MAX_TOTAL_TOOL_CALLS,
        }
    }
}

impl FileGuardConfig {
    pub fn to_limits(&self) -> GuardLimits {
        GuardLimits::default()
            .with_max_identical_tool_calls(self.max_identical_tool_calls)
            .with_max_total_tool_calls(self.max_total_tool_calls)
    }
}
