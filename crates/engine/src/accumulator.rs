//! Tool-call fragment accumulator.
//!
//! A tool call arrives shredded across stream deltas: the name usually comes
//! whole on the first fragment, the JSON argument string trickles in piece by
//! piece, and fragments for different calls can interleave. Fragments sharing
//! an `index` belong to the same logical call.
//!
//! The accumulator merges fragments per index: id and name overwrite,
//! argument pieces append in arrival order. A fresh accumulator is created
//! for every inference round — no state crosses rounds.

use std::collections::BTreeMap;
use veilwright_core::message::MessageToolCall;
use veilwright_core::provider::ToolCallFragment;

#[derive(Debug, Default)]
struct PendingCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Merges [`ToolCallFragment`]s into complete [`MessageToolCall`]s.
#[derive(Debug, Default)]
pub struct FragmentAccumulator {
    pending: BTreeMap<u32, PendingCall>,
}

impl FragmentAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one fragment into the call it belongs to.
    pub fn apply(&mut self, fragment: ToolCallFragment) {
        let entry = self.pending.entry(fragment.index).or_default();
        if let Some(id) = fragment.id {
            entry.id = Some(id);
        }
        if let Some(name) = fragment.name {
            entry.name = name;
        }
        if let Some(arguments) = fragment.arguments {
            entry.arguments.push_str(&arguments);
        }
    }

    /// Whether any fragments have been accumulated this round.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Finalize the turn: the complete set of tool calls, ordered by index.
    ///
    /// Each call's `arguments` is the full concatenation; whether it parses
    /// as valid JSON is checked at execution time, where a failure becomes
    /// an error result for the model rather than an aborted round.
    pub fn finish(self) -> Vec<MessageToolCall> {
        self.pending
            .into_values()
            .map(|p| MessageToolCall {
                id: p.id,
                name: p.name,
                arguments: p.arguments,
            })
            .collect()
    }
}
