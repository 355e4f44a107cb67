//! Provider trait — the abstraction over LLM backends.
//!
//! A Provider knows how to send a conversation to an LLM and stream the
//! response back as a sequence of typed events: narration text deltas,
//! tool-call fragments, and the turn-finished signal.
//!
//! The provider emits *raw* deltas exactly as they arrive on the wire;
//! merging tool-call fragments that share an index is the engine's job.

use crate::error::ProviderError;
use crate::message::Message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Configuration for a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "glm-4.6", "gpt-4o")
    pub model: String,

    /// The conversation messages
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Available tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

fn default_temperature() -> f32 {
    0.8
}

impl ProviderRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: default_temperature(),
            tools: Vec::new(),
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// One fragment of a tool call, as it arrives in a single stream delta.
///
/// Fragments sharing an `index` within one turn belong to the same logical
/// call: the name typically arrives whole on the first fragment, while the
/// argument string trickles in piece by piece.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallFragment {
    /// Which logical tool call this fragment belongs to
    pub index: u32,

    /// Call ID part (usually complete on the first fragment)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Name part (usually complete on the first fragment)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// A piece of the JSON argument string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// A typed event decoded from the provider's response stream.
///
/// Transient: these flow over a channel from the stream reader to the
/// narration loop and are never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamEvent {
    /// A piece of narration text.
    Content(String),

    /// A fragment of a tool call.
    ToolCallFragment(ToolCallFragment),

    /// The turn finished, with the provider's reason ("stop", "tool_calls", ...).
    Finished(String),
}

/// The core Provider trait.
///
/// Every LLM backend implements this trait. The narration loop calls
/// `stream()` without knowing which provider is being used.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "nanogpt", "openai").
    fn name(&self) -> &str;

    /// Send a request and stream back typed response events.
    ///
    /// The returned receiver yields events until the turn finishes or an
    /// error occurs; dropping it cancels the underlying body read.
    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<StreamEvent, ProviderError>>,
        ProviderError,
    >;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_builder_defaults() {
        let req = ProviderRequest::new("glm-4.6", vec![]);
        assert!((req.temperature - 0.8).abs() < f32::EPSILON);
        assert!(req.tools.is_empty());
    }

    #[test]
    fn request_builder_with_tools() {
        let req = ProviderRequest::new("glm-4.6", vec![]).with_tools(vec![ToolDefinition {
            name: "roll_d6".into(),
            description: "Roll a d6".into(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        }]);
        assert_eq!(req.tools.len(), 1);
        assert_eq!(req.tools[0].name, "roll_d6");
    }

    #[test]
    fn fragment_default_is_empty() {
        let frag = ToolCallFragment::default();
        assert_eq!(frag.index, 0);
        assert!(frag.id.is_none() && frag.name.is_none() && frag.arguments.is_none());
    }

    #[test]
    fn stream_event_equality() {
        assert_eq!(
            StreamEvent::Finished("stop".into()),
            StreamEvent::Finished("stop".into())
        );
        assert_ne!(
            StreamEvent::Content("a".into()),
            StreamEvent::Content("b".into())
        );
    }
}
