//! Per-turn call counts keyed by [`CallSignature`].
//!
//! Updates never touch the receiver: [`CallCountTable::record`] hands back a
//! new table, so a table can be reused speculatively without aliasing.

use crate::tool::entities::ToolCallRequest;
use crate::tool::signature::CallSignature;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallCountTable {
    counts: BTreeMap<CallSignature, u32>,
}

impl CallCountTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with `signature` preset to `count`.
    pub fn with_count(mut self, signature: CallSignature, count: u32) -> Self {
        self.counts.insert(signature, count);
        self
    }

    /// New table with `call`'s signature incremented by one.
    pub fn record(&self, call: &ToolCallRequest) -> Self {
        let mut counts = self.counts.clone();
        *counts.entry(call.signature()).or_insert(0) += 1;
        Self { counts }
    }

    pub fn count_of(&self, signature: &CallSignature) -> u32 {
        self.counts.get(signature).copied().unwrap_or(0)
    }

    /// Sum of all counts.
    pub fn total(&self) -> u32 {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CallSignature, u32)> {
        self.counts.iter().map(|(sig, count)| (sig, *count))
    }
}
