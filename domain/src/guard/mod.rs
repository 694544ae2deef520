//! Loop and rate guard
//!
//! Decides whether a proposed tool call may be dispatched, given the
//! conversation so far and the per-turn [`CallCountTable`].
//!
//! ```text
//! validate(history, counts, proposed)
//!   1. cross-turn identical-loop scan   -> Deny(IdenticalLoop)
//!   2. total calls >= max_total         -> Deny(TotalBudget)
//!   3. count(signature) >= max_identical -> Deny(IdenticalLoop)
//!   4. Allow
//! ```
//!
//! A denial is a normal verdict carrying a first-person explanation meant
//! to be fed back to the model, not an error.

pub mod conversation;
pub mod count_table;
pub mod loop_guard;

pub use conversation::{ConversationEntry, ConversationMessage, MessageRole};
pub use count_table::CallCountTable;
pub use loop_guard::{
    DenialReason, GuardLimits, GuardVerdict, LoopRateGuard, MAX_IDENTICAL_TOOL_CALLS,
    MAX_TOTAL_TOOL_CALLS,
};
