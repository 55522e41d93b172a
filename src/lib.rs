//! Switchboard - multi-agent chat assistant
//!
//! Routes each user message to one of several specialised agents, each a
//! Gemini session with its own instructions and tools, and streams the
//! reply while running any tools the model asks for.
//!
//! # Architecture
//!
//! - **Core**: Shared types, configuration, and error handling
//! - **LLM**: Provider abstraction with a Gemini REST implementation
//! - **Tools**: Tool registry with the calculator and car search tools
//! - **Agent**: Catalog, routing, the turn engine and the conversation store
//! - **CLI**: Command-line interface and REPL
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use switchboard::{Assistant, Config, ConversationStore, ToolRegistry, TurnEngine};
//!
//! #[tokio::main]
//! async fn main() -> switchboard::Result<()> {
//!     let config = Config::load();
//!     let provider = switchboard::llm::create_provider(&config)?;
//!     let tools = Arc::new(ToolRegistry::with_builtin(&config)?);
//!     let store = ConversationStore::new(config.agent.default_agent);
//!     let assistant = Assistant::new(TurnEngine::new(provider, tools, store, &config));
//!
//!     let outcome = assistant.submit("What is 2+2*10?").await?;
//!     let turn = assistant.store().get(&outcome.turn_id).await;
//!     println!("{}", turn.map(|t| t.content).unwrap_or_default());
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod cli;
pub mod core;
pub mod llm;
pub mod tools;

// Re-export commonly used items
pub use agent::{Assistant, ConversationStore, TurnEngine, TurnOutcome};
pub use cli::Repl;
pub use core::{AgentId, Config, Result, SwitchboardError};
pub use tools::ToolRegistry;
