//! LLM module - Language Model integrations
//!
//! Provides the provider/session abstraction and the Gemini implementation.

pub mod provider;
pub mod traits;

pub use provider::create_provider;
pub use provider::gemini::GeminiProvider;
pub use traits::{ChatSession, LLMProvider, SessionConfig, StreamChunk, StreamResponse};
