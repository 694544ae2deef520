//! Loop and budget checks for proposed tool calls.

use super::conversation::ConversationEntry;
use super::count_table::CallCountTable;
use crate::tool::entities::ToolCallRequest;
use serde::{Deserialize, Serialize};

/// Identical calls allowed per turn (including the proposed one).
pub const MAX_IDENTICAL_TOOL_CALLS: u32 = 3;

/// Tool calls allowed per turn, regardless of signature.
pub const MAX_TOTAL_TOOL_CALLS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardLimits {
    pub max_identical_tool_calls: u32,
    pub max_total_tool_calls: u32,
}

impl Default for GuardLimits {
    fn default() -> Self {
        Self {
            max_identical_tool_calls: MAX_IDENTICAL_TOOL_CALLS,
            max_total_tool_calls: MAX_TOTAL_TOOL_CALLS,
        }
    }
}

impl GuardLimits {
    pub fn with_max_identical_tool_calls(mut self, max: u32) -> Self {
        self.max_identical_tool_calls = max;
        self
    }

    pub fn with_max_total_tool_calls(mut self, max: u32) -> Self {
        self.max_total_tool_calls = max;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    /// The same call keeps being proposed
    IdenticalLoop,
    /// The turn has used up its tool call budget
    TotalBudget,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardVerdict {
    Allow,
    Deny {
        reason: DenialReason,
        /// Explanation to surface to the model or user
        message: String,
    },
}

impl GuardVerdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GuardVerdict::Allow)
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            GuardVerdict::Allow => None,
            GuardVerdict::Deny { message, .. } => Some(message),
        }
    }
}

/// Stateless validator; all state lives in the history and the count table.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoopRateGuard {
    limits: GuardLimits,
}

impl LoopRateGuard {
    pub fn new(limits: GuardLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &GuardLimits {
        &self.limits
    }

    /// Check `proposed` against `history` and `counts`. First failing check wins.
    pub fn validate<M: ConversationEntry>(
        &self,
        history: &[M],
        counts: &CallCountTable,
        proposed: &ToolCallRequest,
    ) -> GuardVerdict {
        let signature = proposed.signature();

        if self.repeats_across_turns(history, proposed) {
            return self.loop_denial(proposed);
        }

        let total = counts.total();
        if total >= self.limits.max_total_tool_calls {
            return GuardVerdict::Deny {
                reason: DenialReason::TotalBudget,
                message: format!(
                    "I've reached the maximum of {} tool calls for this turn. \
                     I'll stop calling tools and work with the results I already have.",
                    self.limits.max_total_tool_calls
                ),
            };
        }

        if counts.count_of(&signature) >= self.limits.max_identical_tool_calls {
            return self.loop_denial(proposed);
        }

        GuardVerdict::Allow
    }

    /// Walk history backward from the second-to-last message while messages
    /// are assistant tool calls, counting the ones matching `proposed`.
    fn repeats_across_turns<M: ConversationEntry>(
        &self,
        history: &[M],
        proposed: &ToolCallRequest,
    ) -> bool {
        let threshold = self.limits.max_identical_tool_calls.saturating_sub(1);
        if history.len() < 2 {
            return false;
        }

        let signature = proposed.signature();
        let mut matches = 0u32;
        for message in history[..history.len() - 1].iter().rev() {
            if !message.is_assistant_tool_call() {
                break;
            }
            let Some(call) = message.tool_call_request() else {
                break;
            };
            if call.signature() == signature {
                matches += 1;
                if matches >= threshold {
                    return true;
                }
            }
        }
        false
    }

    fn loop_denial(&self, proposed: &ToolCallRequest) -> GuardVerdict {
        GuardVerdict::Deny {
            reason: DenialReason::IdenticalLoop,
            message: format!(
                "I've detected that I'm making the same tool call repeatedly ({}). \
                 I seem to be stuck in a loop, so I'll stop and try a different approach.",
                proposed.tool_name
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::conversation::ConversationMessage;

    fn search(query: &str) -> ToolCallRequest {
        ToolCallRequest::new("search").with_param("query", query)
    }

    fn tool_turn(id: &str, call: ToolCallRequest) -> ConversationMessage {
        ConversationMessage::assistant_tool_call(id, call)
    }

    fn table_with_total(total: u32) -> CallCountTable {
        (0..total).fold(CallCountTable::new(), |table, i| {
            table.record(&ToolCallRequest::new(format!("tool_{}", i)))
        })
    }

    #[test]
    fn test_defaults() {
        let limits = GuardLimits::default();
        assert_eq!(limits.max_identical_tool_calls, 3);
        assert_eq!(limits.max_total_tool_calls, 10);
    }

    #[test]
    fn test_empty_history_allows() {
        let guard = LoopRateGuard::default();
        let history: Vec<ConversationMessage> = Vec::new();
        let verdict = guard.validate(&history, &CallCountTable::new(), &search("rust"));
        assert!(verdict.is_allowed());
    }

    #[test]
    fn test_cross_turn_loop_denies() {
        let guard = LoopRateGuard::default();
        let history = vec![
            ConversationMessage::user("find rust docs"),
            tool_turn("c1", search("rust")),
            tool_turn("c2", search("rust")),
            tool_turn("c3", search("rust")),
        ];

        let verdict = guard.validate(&history, &CallCountTable::new(), &search("rust"));
        match verdict {
            GuardVerdict::Deny { reason, message } => {
                assert_eq!(reason, DenialReason::IdenticalLoop);
                assert!(message.contains("stuck in a loop"));
                assert!(message.contains("search"));
            }
            GuardVerdict::Allow => panic!("expected a loop denial"),
        }
    }

    #[test]
    fn test_alternating_signatures_allow() {
        let guard = LoopRateGuard::default();
        let history = vec![
            tool_turn("c1", search("rust")),
            tool_turn("c2", search("go")),
            tool_turn("c3", search("zig")),
            tool_turn("c4", search("go")),
        ];

        let verdict = guard.validate(&history, &CallCountTable::new(), &search("rust"));
        assert!(verdict.is_allowed());
    }

    #[test]
    fn test_non_tool_message_breaks_the_run() {
        let guard = LoopRateGuard::default();
        let history = vec![
            tool_turn("c1", search("rust")),
            tool_turn("c2", search("rust")),
            ConversationMessage::assistant("Here is what I found."),
            tool_turn("c3", search("rust")),
            tool_turn("c4", search("rust")),
        ];

        // Only c3 is walked before the plain reply stops the scan
        let verdict = guard.validate(&history, &CallCountTable::new(), &search("rust"));
        assert!(verdict.is_allowed());
    }

    #[test]
    fn test_tool_result_message_breaks_the_run() {
        let guard = LoopRateGuard::default();
        let history = vec![
            tool_turn("c1", search("rust")),
            ConversationMessage::tool_result("c1", "..."),
            tool_turn("c2", search("rust")),
            ConversationMessage::tool_result("c2", "..."),
        ];

        let verdict = guard.validate(&history, &CallCountTable::new(), &search("rust"));
        assert!(verdict.is_allowed());
    }

    #[test]
    fn test_parameter_order_does_not_hide_a_loop() {
        let guard = LoopRateGuard::default();
        let a = ToolCallRequest::new("read").with_param("path", "/a").with_param("lines", 10);
        let b = ToolCallRequest::new("read").with_param("lines", 10).with_param("path", "/a");
        let history = vec![tool_turn("c1", a.clone()), tool_turn("c2", b), tool_turn("c3", a.clone())];

        assert!(!guard.validate(&history, &CallCountTable::new(), &a).is_allowed());
    }

    #[test]
    fn test_total_budget_boundary() {
        let guard = LoopRateGuard::default();
        let history: Vec<ConversationMessage> = Vec::new();
        let call = search("rust");

        let at_limit = guard.validate(&history, &table_with_total(MAX_TOTAL_TOOL_CALLS), &call);
        match at_limit {
            GuardVerdict::Deny { reason, message } => {
                assert_eq!(reason, DenialReason::TotalBudget);
                assert!(message.contains(&MAX_TOTAL_TOOL_CALLS.to_string()));
            }
            GuardVerdict::Allow => panic!("expected a budget denial"),
        }

        let below = guard.validate(&history, &table_with_total(MAX_TOTAL_TOOL_CALLS - 1), &call);
        assert!(below.is_allowed());
    }

    #[test]
    fn test_identical_budget_boundary() {
        let guard = LoopRateGuard::default();
        let history: Vec<ConversationMessage> = Vec::new();
        let call = search("rust");

        let at_limit = CallCountTable::new().with_count(call.signature(), MAX_IDENTICAL_TOOL_CALLS);
        let verdict = guard.validate(&history, &at_limit, &call);
        assert!(matches!(
            verdict,
            GuardVerdict::Deny {
                reason: DenialReason::IdenticalLoop,
                ..
            }
        ));
        assert!(verdict.message().unwrap().contains("stuck in a loop"));

        let below =
            CallCountTable::new().with_count(call.signature(), MAX_IDENTICAL_TOOL_CALLS - 1);
        assert!(guard.validate(&history, &below, &call).is_allowed());
    }

    #[test]
    fn test_loop_check_runs_before_budget() {
        let guard = LoopRateGuard::default();
        let history = vec![
            tool_turn("c1", search("rust")),
            tool_turn("c2", search("rust")),
            tool_turn("c3", search("rust")),
        ];

        let verdict = guard.validate(&history, &table_with_total(MAX_TOTAL_TOOL_CALLS), &search("rust"));
        assert!(matches!(
            verdict,
            GuardVerdict::Deny {
                reason: DenialReason::IdenticalLoop,
                ..
            }
        ));
    }

    #[test]
    fn test_custom_limits() {
        let guard = LoopRateGuard::new(
            GuardLimits::default()
                .with_max_identical_tool_calls(5)
                .with_max_total_tool_calls(2),
        );
        let history = vec![
            tool_turn("c1", search("rust")),
            tool_turn("c2", search("rust")),
            tool_turn("c3", search("rust")),
        ];

        // Two walked matches are below the raised threshold of four
        assert!(guard.validate(&history, &CallCountTable::new(), &search("rust")).is_allowed());

        let verdict = guard.validate(&history, &table_with_total(2), &search("rust"));
        assert!(verdict.message().unwrap().contains('2'));
    }

    #[test]
    fn test_validate_does_not_mutate_counts() {
        let guard = LoopRateGuard::default();
        let counts = table_with_total(3);
        let snapshot = counts.clone();
        let history: Vec<ConversationMessage> = Vec::new();
        guard.validate(&history, &counts, &search("rust"));
        assert_eq!(counts, snapshot);
    }
}
