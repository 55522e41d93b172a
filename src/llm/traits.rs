//! LLM Provider trait for abstracting different backends
//!
//! A provider opens per-turn chat sessions and answers one-shot
//! classification requests. Sessions stream their replies chunk by chunk.

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::core::{AgentTool, Content, Part, Result, ToolCall};

/// A chunk from a streaming response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamChunk {
    /// Text fragment, if the chunk carried one
    pub text: Option<String>,
    /// Function calls surfaced in this chunk, in order
    pub function_calls: Vec<ToolCall>,
}

impl StreamChunk {
    /// Create a text-only chunk
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            function_calls: Vec::new(),
        }
    }

    /// Create a chunk carrying function calls only
    pub fn calls(function_calls: Vec<ToolCall>) -> Self {
        Self {
            text: None,
            function_calls,
        }
    }

    /// Whether the chunk has nothing in it (keep-alives, usage-only frames)
    pub fn is_empty(&self) -> bool {
        self.text.as_deref().map_or(true, str::is_empty) && self.function_calls.is_empty()
    }
}

/// Type alias for a boxed stream of chunks
pub type StreamResponse = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// Everything a session needs up front
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Model to talk to
    pub model: String,
    /// Agent instruction text
    pub system_instruction: String,
    /// Tools the model may use
    pub tools: Vec<AgentTool>,
    /// Prior turns, already converted
    pub history: Vec<Content>,
}

/// A live exchange with the model for one turn.
///
/// The session remembers what it sent and what the model streamed back,
/// so each `send_streaming` continues the same logical turn.
#[async_trait]
pub trait ChatSession: Send {
    /// Send this round's input and get the reply as a stream of chunks.
    ///
    /// The returned stream is finite and not restartable.
    async fn send_streaming(&mut self, parts: Vec<Part>) -> Result<StreamResponse>;
}

/// Trait for LLM providers
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Open a session scoped to one agent and the prior history
    fn create_session(&self, config: SessionConfig) -> Box<dyn ChatSession>;

    /// Single-shot request whose answer must match `schema`
    async fn classify(&self, prompt: &str, schema: &serde_json::Value) -> Result<serde_json::Value>;

    /// Get the provider name
    fn name(&self) -> &str;
}
