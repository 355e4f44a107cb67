//! Narration-level streaming events.
//!
//! `NarrationEvent` wraps provider-level stream events into the sequence the
//! caller consumes: live narration deltas, tool-call progress, and exactly
//! one terminal event (`final`, `round_limit`, or `error`).

use serde::{Deserialize, Serialize};
use veilwright_core::message::Conversation;

/// Events emitted by the narrator during one player turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NarrationEvent {
    /// Partial narration text from the LLM.
    Delta { content: String },

    /// The narrator is invoking a tool.
    ToolCall {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        name: String,
        arguments: String,
    },

    /// Tool execution completed.
    ToolResult { name: String, content: String },

    /// The turn is complete — final narration and the grown conversation.
    Final {
        content: String,
        conversation: Conversation,
        rounds: u32,
    },

    /// The round safety bound was hit before the narrator finished.
    RoundLimit { rounds: u32 },

    /// A terminal error occurred; deltas already emitted remain valid.
    Error { message: String },
}

impl NarrationEvent {
    /// Wire event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Delta { .. } => "delta",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Final { .. } => "final",
            Self::RoundLimit { .. } => "round_limit",
            Self::Error { .. } => "error",
        }
    }

    /// Whether this event ends the sequence.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Final { .. } | Self::RoundLimit { .. } | Self::Error { .. }
        )
    }
}
