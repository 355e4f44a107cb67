//! OpenAI-compatible provider implementation.
//!
//! Works with any endpoint exposing the OpenAI `/chat/completions` streaming
//! convention: NanoGPT, OpenAI, OpenRouter, Ollama, vLLM, and friends.
//!
//! The provider issues one streaming request per narration round and decodes
//! the SSE body into typed [`StreamEvent`]s. Tool-call fragments are passed
//! through raw — merging fragments that share an index happens downstream in
//! the engine, once the whole turn has arrived.

use crate::sse::SseDecoder;
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};
use veilwright_core::error::ProviderError;
use veilwright_core::message::{Message, Role};
use veilwright_core::provider::{
    Provider, ProviderRequest, StreamEvent, ToolCallFragment, ToolDefinition,
};

/// How much of an error response body to keep when reporting a failure.
const ERROR_BODY_LIMIT: usize = 512;

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    /// Create a NanoGPT provider (convenience constructor).
    pub fn nanogpt(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::new("nanogpt", "https://nano-gpt.com/api/v1", api_key)
    }

    /// Convert our Message types to OpenAI API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| {
                let tool_calls = if m.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        m.tool_calls
                            .iter()
                            .map(|tc| ApiToolCall {
                                id: tc.id.clone(),
                                r#type: "function".into(),
                                function: ApiFunction {
                                    name: tc.name.clone(),
                                    arguments: tc.arguments.clone(),
                                },
                            })
                            .collect(),
                    )
                };

                // An assistant turn that only requests tools carries no content.
                let content = if m.role == Role::Assistant && m.content.is_empty() && tool_calls.is_some()
                {
                    None
                } else {
                    Some(m.content.clone())
                };

                ApiMessage {
                    role: match m.role {
                        Role::User => "user".into(),
                        Role::Assistant => "assistant".into(),
                        Role::System => "system".into(),
                        Role::Tool => "tool".into(),
                    },
                    content,
                    tool_calls,
                    tool_call_id: m.tool_call_id.clone(),
                    name: m.tool_name.clone(),
                }
            })
            .collect()
    }

    /// Convert tool definitions to OpenAI API format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<StreamEvent, ProviderError>>,
        ProviderError,
    > {
        let url = format!("{}/chat/completions", self.base_url);

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": true,
        });

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
            body["tool_choice"] = serde_json::json!("auto");
        }

        debug!(provider = %self.name, model = %request.model, "Sending streaming request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider streaming error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: truncate(&error_body, ERROR_BODY_LIMIT),
            });
        }

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let provider_name = self.name.clone();

        // Read the SSE byte stream and forward typed events until the body
        // ends, [DONE] arrives, or the receiver is dropped.
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut decoder = SseDecoder::new();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                for payload in decoder.feed(&bytes) {
                    let parsed: StreamPayload = match serde_json::from_str(&payload) {
                        Ok(p) => p,
                        Err(e) => {
                            trace!(
                                provider = %provider_name,
                                data = %payload,
                                error = %e,
                                "Ignoring unparseable SSE chunk"
                            );
                            continue;
                        }
                    };

                    for event in interpret_payload(parsed) {
                        if tx.send(Ok(event)).await.is_err() {
                            return; // receiver dropped
                        }
                    }
                }

                if decoder.is_done() {
                    return;
                }
            }
        });

        Ok(rx)
    }
}

/// Interpret one parsed stream payload into zero or more events.
///
/// Rules, applied to the first choice:
/// - non-empty `delta.content` → [`StreamEvent::Content`]
/// - `delta.tool_calls` → one [`StreamEvent::ToolCallFragment`] per element,
///   the index defaulting to the element's position when omitted
/// - non-null `finish_reason` → [`StreamEvent::Finished`], *after* any event
///   from the same payload
///
/// Heartbeat payloads produce nothing.
pub fn interpret_payload(payload: StreamPayload) -> Vec<StreamEvent> {
    let mut events = Vec::new();

    let Some(choice) = payload.choices.into_iter().next() else {
        return events;
    };

    if let Some(content) = choice.delta.content {
        if !content.is_empty() {
            events.push(StreamEvent::Content(content));
        }
    }

    if let Some(tool_calls) = choice.delta.tool_calls {
        for (position, tc) in tool_calls.into_iter().enumerate() {
            let (name, arguments) = match tc.function {
                Some(f) => (f.name, f.arguments),
                None => (None, None),
            };
            events.push(StreamEvent::ToolCallFragment(ToolCallFragment {
                index: tc.index.unwrap_or(position as u32),
                id: tc.id,
                name,
                arguments,
            }));
        }
    }

    if let Some(reason) = choice.finish_reason {
        events.push(StreamEvent::Finished(reason));
    }

    events
}

fn truncate(s: &str, limit: usize) -> String {
    if s.len() <= limit {
        return s.to_string();
    }
    let mut end = limit;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` payload from a streaming response.
#[derive(Debug, Deserialize)]
pub struct StreamPayload {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCallDelta>>,
}

/// A tool call delta — arrives incrementally across chunks.
#[derive(Debug, Deserialize)]
struct WireToolCallDelta {
    #[serde(default)]
    index: Option<u32>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<WireFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct WireFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use veilwright_core::message::MessageToolCall;

    fn parse(data: &str) -> StreamPayload {
        serde_json::from_str(data).unwrap()
    }

    #[test]
    fn nanogpt_constructor() {
        let provider = OpenAiCompatProvider::nanogpt("sk-test").unwrap();
        assert_eq!(provider.name(), "nanogpt");
        assert!(provider.base_url.contains("nano-gpt.com"));
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let provider =
            OpenAiCompatProvider::new("local", "http://localhost:11434/v1/", "ollama").unwrap();
        assert_eq!(provider.base_url, "http://localhost:11434/v1");
    }

    // --- Delta interpretation ---

    #[test]
    fn interpret_content_delta() {
        let payload = parse(r#"{"choices":[{"delta":{"content":"You awaken"},"finish_reason":null}]}"#);
        let events = interpret_payload(payload);
        assert_eq!(events, vec![StreamEvent::Content("You awaken".into())]);
    }

    #[test]
    fn interpret_empty_content_yields_nothing() {
        let payload = parse(r#"{"choices":[{"delta":{"content":""},"finish_reason":null}]}"#);
        assert!(interpret_payload(payload).is_empty());
    }

    #[test]
    fn interpret_finish_reason() {
        let payload = parse(r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#);
        let events = interpret_payload(payload);
        assert_eq!(events, vec![StreamEvent::Finished("stop".into())]);
    }

    #[test]
    fn interpret_content_and_finish_in_one_payload() {
        // A single payload may carry both the final delta and the finish signal.
        let payload =
            parse(r#"{"choices":[{"delta":{"content":"the end."},"finish_reason":"stop"}]}"#);
        let events = interpret_payload(payload);
        assert_eq!(
            events,
            vec![
                StreamEvent::Content("the end.".into()),
                StreamEvent::Finished("stop".into()),
            ]
        );
    }

    #[test]
    fn interpret_tool_call_fragment() {
        let payload = parse(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_abc","function":{"name":"roll_d6","arguments":""}}]},"finish_reason":null}]}"#,
        );
        let events = interpret_payload(payload);
        assert_eq!(
            events,
            vec![StreamEvent::ToolCallFragment(ToolCallFragment {
                index: 0,
                id: Some("call_abc".into()),
                name: Some("roll_d6".into()),
                arguments: Some("".into()),
            })]
        );
    }

    #[test]
    fn interpret_arguments_only_fragment() {
        // Later fragments carry only argument pieces.
        let payload = parse(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"sides\""}}]},"finish_reason":null}]}"#,
        );
        let events = interpret_payload(payload);
        match &events[0] {
            StreamEvent::ToolCallFragment(frag) => {
                assert!(frag.id.is_none());
                assert!(frag.name.is_none());
                assert_eq!(frag.arguments.as_deref(), Some("{\"sides\""));
            }
            other => panic!("Expected fragment, got {other:?}"),
        }
    }

    #[test]
    fn interpret_missing_index_defaults_to_position() {
        let payload = parse(
            r#"{"choices":[{"delta":{"tool_calls":[{"function":{"name":"roll_d6"}},{"function":{"name":"roll_dice"}}]},"finish_reason":null}]}"#,
        );
        let events = interpret_payload(payload);
        let indices: Vec<u32> = events
            .iter()
            .map(|e| match e {
                StreamEvent::ToolCallFragment(f) => f.index,
                other => panic!("Expected fragment, got {other:?}"),
            })
            .collect();
        assert_eq!(indices, vec![0, 1]);
    }

    #[test]
    fn interpret_heartbeat_yields_nothing() {
        let payload = parse(r#"{"choices":[{"delta":{},"finish_reason":null}]}"#);
        assert!(interpret_payload(payload).is_empty());
    }

    #[test]
    fn interpret_empty_choices_yields_nothing() {
        let payload = parse(r#"{"choices":[]}"#);
        assert!(interpret_payload(payload).is_empty());
    }

    #[test]
    fn content_reconstruction_in_order() {
        // Concatenating Content events must equal the concatenation of every
        // delta.content field in arrival order.
        let payloads = [
            r#"{"choices":[{"delta":{"content":"You "},"finish_reason":null}]}"#,
            r#"{"choices":[{"delta":{"content":"rolled "},"finish_reason":null}]}"#,
            r#"{"choices":[{"delta":{},"finish_reason":null}]}"#,
            r#"{"choices":[{"delta":{"content":"a 6."},"finish_reason":"stop"}]}"#,
        ];
        let mut narration = String::new();
        for p in payloads {
            for event in interpret_payload(parse(p)) {
                if let StreamEvent::Content(text) = event {
                    narration.push_str(&text);
                }
            }
        }
        assert_eq!(narration, "You rolled a 6.");
    }

    // --- Outbound serialization ---

    #[test]
    fn message_conversion() {
        let messages = vec![
            Message::system("You are the Narrator"),
            Message::user("I open the door"),
        ];
        let api_messages = OpenAiCompatProvider::to_api_messages(&messages);
        assert_eq!(api_messages.len(), 2);
        assert_eq!(api_messages[0].role, "system");
        assert_eq!(api_messages[1].role, "user");
        assert_eq!(api_messages[1].content.as_deref(), Some("I open the door"));
    }

    #[test]
    fn tool_call_only_assistant_message_has_no_content() {
        let msg = Message::assistant_tool_calls(vec![MessageToolCall {
            id: Some("call_1".into()),
            name: "roll_d6".into(),
            arguments: "{}".into(),
        }]);
        let api_msgs = OpenAiCompatProvider::to_api_messages(&[msg]);
        assert!(api_msgs[0].content.is_none());
        let tc = api_msgs[0].tool_calls.as_ref().unwrap();
        assert_eq!(tc.len(), 1);
        assert_eq!(tc[0].function.name, "roll_d6");
        assert_eq!(tc[0].r#type, "function");
    }

    #[test]
    fn tool_result_message_conversion() {
        let msg = Message::tool_result(
            Some("call_1".into()),
            "roll_d6",
            r#"{"die":6,"value":6,"success":true}"#,
        );
        let api_msgs = OpenAiCompatProvider::to_api_messages(&[msg]);
        assert_eq!(api_msgs[0].role, "tool");
        assert_eq!(api_msgs[0].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(api_msgs[0].name.as_deref(), Some("roll_d6"));
    }

    #[test]
    fn tool_definition_conversion() {
        let tools = vec![ToolDefinition {
            name: "roll_d6".into(),
            description: "Roll a d6".into(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        }];
        let api_tools = OpenAiCompatProvider::to_api_tools(&tools);
        assert_eq!(api_tools.len(), 1);
        assert_eq!(api_tools[0].function.name, "roll_d6");
        assert_eq!(api_tools[0].r#type, "function");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let s = "é".repeat(400); // 800 bytes
        let out = truncate(&s, ERROR_BODY_LIMIT);
        assert!(out.len() <= ERROR_BODY_LIMIT);
        assert!(out.chars().all(|c| c == 'é'));
    }
}
