//! LLM Provider implementations and factory
//!
//! Submodules implement specific providers.

pub mod gemini;

use std::sync::Arc;

use crate::core::{Config, Result};
use crate::llm::traits::LLMProvider;

use self::gemini::GeminiProvider;

/// Create a new LLM provider based on configuration
pub fn create_provider(config: &Config) -> Result<Arc<dyn LLMProvider>> {
    let provider: Arc<dyn LLMProvider> = Arc::new(GeminiProvider::from_config(config)?);
    tracing::debug!(provider = provider.name(), "provider ready");
    Ok(provider)
}
