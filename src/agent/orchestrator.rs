//! Agent orchestrator
//!
//! Decides which agent handles a user message. A manual choice wins
//! outright; otherwise one structured classification request is made
//! against the catalog. Routing is best effort: any failure falls back to
//! the default agent instead of aborting the turn.

use std::sync::Arc;

use crate::agent::catalog;
use crate::core::{AgentId, Result, SwitchboardError, Turn};
use crate::llm::LLMProvider;

/// Prior turns quoted in the routing prompt
const CONTEXT_TURNS: usize = 4;
/// Characters kept from each quoted turn
const CONTEXT_CHARS: usize = 200;

/// Routes user messages to agents
#[derive(Clone)]
pub struct Orchestrator {
    provider: Arc<dyn LLMProvider>,
    default_agent: AgentId,
}

impl Orchestrator {
    /// Create an orchestrator that falls back to `default_agent`
    pub fn new(provider: Arc<dyn LLMProvider>, default_agent: AgentId) -> Self {
        Self {
            provider,
            default_agent,
        }
    }

    /// Agent used when routing fails
    pub fn default_agent(&self) -> AgentId {
        self.default_agent
    }

    /// Select the agent for `message`.
    ///
    /// Never fails: a manual override is returned without any model call,
    /// and classification errors resolve to the default agent.
    pub async fn select_agent(
        &self,
        message: &str,
        prior_turns: &[Turn],
        manual_override: Option<AgentId>,
    ) -> AgentId {
        if let Some(agent) = manual_override {
            tracing::debug!(agent = %agent, "manual agent override, skipping classification");
            return agent;
        }

        match self.classify(message, prior_turns).await {
            Ok(agent) => {
                tracing::info!(agent = %agent, "routed message");
                agent
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    fallback = %self.default_agent,
                    "routing failed, using default agent"
                );
                self.default_agent
            }
        }
    }

    async fn classify(&self, message: &str, prior_turns: &[Turn]) -> Result<AgentId> {
        let prompt = routing_prompt(message, prior_turns);
        let value = self.provider.classify(&prompt, &routing_schema()).await?;
        parse_agent_id(&value)
    }
}

/// Prompt listing each agent's routing hint, recent context and the message
pub fn routing_prompt(message: &str, prior_turns: &[Turn]) -> String {
    let mut prompt = String::from(
        "You are the Orchestrator. Your job is to route the user's request to the best specialized agent.\n\nAgents:\n",
    );

    for profile in catalog::all() {
        prompt.push_str(&format!("- {}: {}\n", profile.id, profile.routing_hint));
    }

    let start = prior_turns.len().saturating_sub(CONTEXT_TURNS);
    let recent = &prior_turns[start..];
    if !recent.is_empty() {
        prompt.push_str("\nRecent conversation:\n");
        for turn in recent {
            prompt.push_str(&format!("{}: {}\n", turn.role, truncate(&turn.content, CONTEXT_CHARS)));
        }
    }

    prompt.push_str(&format!("\nUser Request: \"{}\"\n", message));
    prompt
}

/// Response schema constraining the answer to one catalog id
pub fn routing_schema() -> serde_json::Value {
    let ids: Vec<&str> = AgentId::ALL.iter().map(AgentId::as_str).collect();
    serde_json::json!({
        "type": "OBJECT",
        "properties": {
            "agentId": {
                "type": "STRING",
                "enum": ids
            }
        },
        "required": ["agentId"]
    })
}

fn parse_agent_id(value: &serde_json::Value) -> Result<AgentId> {
    value
        .get("agentId")
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            SwitchboardError::provider(format!("classification response has no agentId: {}", value))
        })?
        .parse()
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}
