//! The narration loop — streaming inference and tool orchestration.
//!
//! One player turn drives repeated request/stream/tool-execute rounds over a
//! growing conversation:
//!
//! 1. **Request** — send the entire conversation plus the tool catalogue
//! 2. **Stream** — forward narration deltas to the caller as they arrive;
//!    feed tool-call fragments to the accumulator
//! 3. **Execute** — on a `tool_calls` finish, run each completed call in
//!    order and append the results
//! 4. Loop back to 1, until the model stops or the round cap is hit
//!
//! The conversation is the single source of truth fed into every request;
//! it only ever grows.

use crate::accumulator::FragmentAccumulator;
use crate::stream_event::NarrationEvent;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use veilwright_config::Config;
use veilwright_core::error::{Error, ToolError};
use veilwright_core::message::{Conversation, Message, MessageToolCall};
use veilwright_core::provider::{Provider, ProviderRequest, StreamEvent};
use veilwright_core::tool::{ToolRegistry, ToolResult};
use veilwright_providers::OpenAiCompatProvider;

/// Finish reason signalling the model wants tools executed.
const FINISH_TOOL_CALLS: &str = "tool_calls";

/// The completed result of one player turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrationOutcome {
    /// The full narration text accumulated across all rounds
    pub content: String,

    /// The conversation including everything this turn appended
    pub conversation: Conversation,

    /// How many tool-execution rounds ran
    pub rounds: u32,
}

/// The narration loop controller.
#[derive(Clone)]
pub struct Narrator {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    tools: Arc<ToolRegistry>,
    max_rounds: u32,
}

impl std::fmt::Debug for Narrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Narrator")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_rounds", &self.max_rounds)
            .finish()
    }
}

impl Narrator {
    /// Create a new narrator.
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.8,
            tools,
            max_rounds: 8,
        }
    }

    /// Build a narrator from configuration: an OpenAI-compatible provider
    /// pointed at the configured endpoint, with the default tool registry.
    ///
    /// Fails before any network call if credentials are missing.
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let (api_key, api_url, model) = config.credentials().map_err(|e| Error::Config {
            message: e.to_string(),
        })?;
        let provider = OpenAiCompatProvider::new("openai-compat", api_url, api_key)?;

        Ok(Self {
            provider: Arc::new(provider),
            model: model.to_string(),
            temperature: config.temperature,
            tools: Arc::new(veilwright_tools::default_registry()),
            max_rounds: config.max_rounds,
        })
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the maximum number of tool-execution rounds per turn.
    pub fn with_max_rounds(mut self, max: u32) -> Self {
        self.max_rounds = max;
        self
    }

    /// Run one player turn, streaming events to the returned receiver.
    ///
    /// The sequence is zero or more `Delta`/`ToolCall`/`ToolResult` events
    /// followed by exactly one terminal event. Dropping the receiver cancels
    /// the turn and releases the underlying stream.
    pub fn narrate(&self, conversation: Conversation) -> mpsc::Receiver<NarrationEvent> {
        let (tx, rx) = mpsc::channel(64);
        let narrator = self.clone();
        tokio::spawn(async move {
            narrator.run(conversation, tx).await;
        });
        rx
    }

    /// Run one player turn to completion, discarding intermediate events.
    pub async fn process(&self, conversation: Conversation) -> Result<NarrationOutcome, Error> {
        let mut rx = self.narrate(conversation);
        while let Some(event) = rx.recv().await {
            match event {
                NarrationEvent::Final {
                    content,
                    conversation,
                    rounds,
                } => {
                    return Ok(NarrationOutcome {
                        content,
                        conversation,
                        rounds,
                    });
                }
                NarrationEvent::RoundLimit { rounds } => {
                    return Err(Error::RoundLimit { rounds });
                }
                NarrationEvent::Error { message } => return Err(Error::Internal(message)),
                _ => {}
            }
        }
        Err(Error::Internal(
            "narration stream ended without a terminal event".into(),
        ))
    }

    async fn run(&self, mut conversation: Conversation, tx: mpsc::Sender<NarrationEvent>) {
        info!(
            conversation_id = %conversation.id,
            messages = conversation.messages.len(),
            "Starting narration turn"
        );

        let tool_definitions = self.tools.definitions();
        let mut narration = String::new();
        let mut rounds: u32 = 0;

        loop {
            debug!(conversation_id = %conversation.id, round = rounds, "Requesting");

            let request = ProviderRequest::new(self.model.clone(), conversation.messages.clone())
                .with_temperature(self.temperature)
                .with_tools(tool_definitions.clone());

            let mut stream = match self.provider.stream(request).await {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = tx
                        .send(NarrationEvent::Error {
                            message: e.to_string(),
                        })
                        .await;
                    return;
                }
            };

            // Streaming: surface deltas immediately, collect fragments.
            let mut round_text = String::new();
            let mut accumulator = FragmentAccumulator::new();
            let mut finish_reason: Option<String> = None;

            while let Some(event) = stream.recv().await {
                match event {
                    Ok(StreamEvent::Content(text)) => {
                        round_text.push_str(&text);
                        if tx
                            .send(NarrationEvent::Delta { content: text })
                            .await
                            .is_err()
                        {
                            return; // caller gone
                        }
                    }
                    Ok(StreamEvent::ToolCallFragment(fragment)) => {
                        accumulator.apply(fragment);
                    }
                    Ok(StreamEvent::Finished(reason)) => {
                        finish_reason = Some(reason);
                        break;
                    }
                    Err(e) => {
                        let _ = tx
                            .send(NarrationEvent::Error {
                                message: e.to_string(),
                            })
                            .await;
                        return;
                    }
                }
            }

            narration.push_str(&round_text);

            // A body that ends without a finish signal still counts as a
            // finished turn if it produced narration.
            let reason = match finish_reason {
                Some(reason) => reason,
                None if !round_text.is_empty() => "stop".to_string(),
                None => {
                    let _ = tx
                        .send(NarrationEvent::Error {
                            message: "stream ended without a finish signal".into(),
                        })
                        .await;
                    return;
                }
            };

            if reason != FINISH_TOOL_CALLS {
                conversation.push(Message::assistant(&round_text));
                debug!(conversation_id = %conversation.id, %reason, rounds, "Turn complete");
                let _ = tx
                    .send(NarrationEvent::Final {
                        content: narration,
                        conversation,
                        rounds,
                    })
                    .await;
                return;
            }

            let calls = accumulator.finish();
            if calls.is_empty() {
                warn!(conversation_id = %conversation.id, "tool_calls finish with no tool calls");
                conversation.push(Message::assistant(&round_text));
                let _ = tx
                    .send(NarrationEvent::Final {
                        content: narration,
                        conversation,
                        rounds,
                    })
                    .await;
                return;
            }

            let mut assistant = Message::assistant_tool_calls(calls.clone());
            assistant.content = round_text;
            conversation.push(assistant);

            // Execute in index order: dice rolls are narratively
            // order-sensitive, so no parallelism here.
            for call in calls {
                let _ = tx
                    .send(NarrationEvent::ToolCall {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    })
                    .await;

                let result = execute_call(&self.tools, &call).await;

                let _ = tx
                    .send(NarrationEvent::ToolResult {
                        name: result.name.clone(),
                        content: result.content.clone(),
                    })
                    .await;

                conversation.push(Message::tool_result(
                    result.call_id,
                    result.name,
                    result.content,
                ));
            }

            rounds += 1;
            if rounds >= self.max_rounds {
                warn!(
                    conversation_id = %conversation.id,
                    rounds,
                    "Round limit reached, aborting turn"
                );
                let _ = tx.send(NarrationEvent::RoundLimit { rounds }).await;
                return;
            }
        }
    }
}

/// Execute one finalized tool call, converting every failure into an
/// `{"error": ...}` result the model can recover from conversationally.
async fn execute_call(tools: &ToolRegistry, call: &MessageToolCall) -> ToolResult {
    // Providers send an empty argument string for no-argument tools.
    let arguments: serde_json::Value = if call.arguments.trim().is_empty() {
        serde_json::json!({})
    } else {
        match serde_json::from_str(&call.arguments) {
            Ok(value) => value,
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Malformed tool arguments");
                return ToolResult::error(
                    call.id.clone(),
                    &call.name,
                    format!("Invalid tool arguments: {e}"),
                );
            }
        }
    };

    match tools.execute(&call.name, arguments).await {
        Ok(value) => ToolResult {
            call_id: call.id.clone(),
            name: call.name.clone(),
            content: value.to_string(),
        },
        Err(ToolError::NotFound(name)) => {
            warn!(tool = %name, "Unknown tool requested");
            ToolResult::error(call.id.clone(), &call.name, format!("Unknown tool: {name}"))
        }
        Err(e) => {
            warn!(tool = %call.name, error = %e, "Tool execution failed");
            ToolResult::error(call.id.clone(), &call.name, e.to_string())
        }
    }
}
