//! LLM provider implementation for Veilwright.
//!
//! The provider implements the `veilwright_core::Provider` trait against any
//! OpenAI-compatible `/chat/completions` endpoint, decoding the SSE response
//! body into typed stream events.

pub mod openai_compat;
pub mod sse;

pub use openai_compat::OpenAiCompatProvider;
pub use sse::SseDecoder;
