//! Agent module - routing, turn execution and conversation state
//!
//! Contains the agent catalog, the orchestrator that picks an agent per
//! message, and the engine that streams replies and runs tools.

pub mod assistant;
pub mod catalog;
pub mod conversation;
pub mod engine;
pub mod loop_state;
pub mod orchestrator;

pub use assistant::Assistant;
pub use catalog::AgentProfile;
pub use conversation::{ConversationStore, StoreEvent, TurnUpdate};
pub use engine::{TurnEngine, TurnOutcome, ERROR_NOTICE};
pub use loop_state::{TurnLoopState, TurnPhase};
pub use orchestrator::Orchestrator;
