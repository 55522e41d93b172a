//! Turn execution engine
//!
//! Runs one user turn end to end: route to an agent, open a session over
//! the prior history, stream the reply into a placeholder turn, execute any
//! requested tools and feed their results back, until the model answers
//! without calling anything.
//!
//! Every failure is caught at the turn boundary. The placeholder always
//! leaves the streaming state, either finalized or with an error notice.

use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::agent::catalog::{self, AgentProfile};
use crate::agent::conversation::{ConversationStore, TurnUpdate};
use crate::agent::loop_state::{TurnLoopState, TurnPhase};
use crate::agent::orchestrator::Orchestrator;
use crate::core::{AgentId, CallResult, Config, Part, Result, SwitchboardError, ToolCall, Turn};
use crate::llm::{ChatSession, LLMProvider, SessionConfig};
use crate::tools::ToolRegistry;

/// Notice appended to a turn that failed mid-stream
pub const ERROR_NOTICE: &str = "[Error generating response. Please try again.]";

/// How a turn ended
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    /// Id of the model turn that was streamed into
    pub turn_id: String,
    pub agent_id: AgentId,
    /// `Finalized` or `Errored`
    pub phase: TurnPhase,
    /// Rounds started
    pub rounds: usize,
    /// Tool calls answered, across rounds
    pub calls_executed: usize,
    /// Stopped early by cancellation
    pub cancelled: bool,
    /// Failure that ended the turn, if it errored
    pub error: Option<String>,
}

/// Drives turns against a provider, a tool registry and a conversation
pub struct TurnEngine {
    provider: Arc<dyn LLMProvider>,
    tools: Arc<ToolRegistry>,
    store: ConversationStore,
    orchestrator: Orchestrator,
    model: String,
    max_rounds: usize,
    round_timeout: Option<Duration>,
}

impl TurnEngine {
    /// Create an engine from configuration
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        tools: Arc<ToolRegistry>,
        store: ConversationStore,
        config: &Config,
    ) -> Self {
        let orchestrator = Orchestrator::new(Arc::clone(&provider), config.agent.default_agent);
        Self {
            provider,
            tools,
            store,
            orchestrator,
            model: config.gemini.model.clone(),
            max_rounds: config.agent.max_rounds,
            round_timeout: config.agent.round_timeout_secs.map(Duration::from_secs),
        }
    }

    /// Conversation this engine writes to
    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    /// Run one user turn to completion.
    ///
    /// Appends `user_turn`, routes it, and streams the reply into a new
    /// model turn. Only returns once that turn is no longer streaming.
    pub async fn run_turn(&self, user_turn: Turn, cancel: CancellationToken) -> TurnOutcome {
        let prior_turns = self.store.list().await;
        let first_input = user_turn.to_content().parts;
        let message = user_turn.content.clone();
        self.store.append(user_turn).await;

        let mut state = TurnLoopState::new(self.max_rounds);

        // Routing
        let manual = self.store.manual_agent().await;
        let agent_id = self
            .orchestrator
            .select_agent(&message, &prior_turns, manual)
            .await;
        self.store.set_active_agent(agent_id).await;
        let profile = catalog::get(agent_id);

        let placeholder = Turn::placeholder(agent_id);
        let turn_id = placeholder.id.clone();
        self.store.append(placeholder).await;
        let mut guard = AbandonGuard::new(self.store.clone(), turn_id.clone());

        tracing::info!(turn_id = %turn_id, agent = %agent_id, "turn started");

        let mut session = self.provider.create_session(SessionConfig {
            model: self.model.clone(),
            system_instruction: profile.system_instruction.to_string(),
            tools: profile.tools.clone(),
            history: prior_turns.iter().map(Turn::to_content).collect(),
        });

        let result = self
            .drive(profile, session.as_mut(), first_input, &turn_id, &mut state, &cancel)
            .await;

        let error = match result {
            Ok(()) => match self.store.update_by_id(&turn_id, TurnUpdate::Finish).await {
                Ok(()) => {
                    state.phase = TurnPhase::Finalized;
                    None
                }
                Err(e) => Some(e),
            },
            Err(e) => Some(e),
        };

        let error = match error {
            Some(e) => {
                state.phase = TurnPhase::Errored;
                tracing::error!(turn_id = %turn_id, round = state.round, error = %e, "turn failed");
                // content may be partial; the notice goes after it
                if let Err(mark_err) = self
                    .store
                    .update_by_id(&turn_id, TurnUpdate::Fail(ERROR_NOTICE.to_string()))
                    .await
                {
                    tracing::warn!(turn_id = %turn_id, error = %mark_err, "could not mark failed turn");
                }
                Some(e.to_string())
            }
            None => None,
        };
        guard.disarm();

        tracing::info!(
            turn_id = %turn_id,
            phase = %state.phase,
            rounds = state.round,
            calls = state.calls_executed,
            cancelled = state.cancelled,
            "turn finished"
        );

        TurnOutcome {
            turn_id,
            agent_id,
            phase: state.phase,
            rounds: state.round,
            calls_executed: state.calls_executed,
            cancelled: state.cancelled,
            error,
        }
    }

    /// Loop rounds until the model stops calling tools
    async fn drive(
        &self,
        profile: &AgentProfile,
        session: &mut dyn ChatSession,
        first_input: Vec<Part>,
        turn_id: &str,
        state: &mut TurnLoopState,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut input = first_input;

        loop {
            state.begin_round()?;
            tracing::debug!(turn_id, round = state.round, "round started");

            let round = self.round(profile, session, input, turn_id, state, cancel);
            let results = match self.round_timeout {
                Some(limit) => tokio::time::timeout(limit, round)
                    .await
                    .map_err(|_| SwitchboardError::RoundTimeout(limit.as_secs()))??,
                None => round.await?,
            };

            match results {
                Some(results) => input = results.iter().map(CallResult::to_part).collect(),
                None => return Ok(()),
            }
        }
    }

    /// Stream one round; returns the call results to send next, or `None`
    /// when the turn is complete
    async fn round(
        &self,
        profile: &AgentProfile,
        session: &mut dyn ChatSession,
        input: Vec<Part>,
        turn_id: &str,
        state: &mut TurnLoopState,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<CallResult>>> {
        state.phase = TurnPhase::Streaming;
        let mut stream = session.send_streaming(input).await?;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(turn_id, round = state.round, "turn cancelled while streaming");
                    state.cancelled = true;
                    return Ok(None);
                }
                next = stream.next() => next,
            };

            let Some(chunk) = next else { break };
            if let Some(delta) = state.apply(chunk?) {
                self.store
                    .update_by_id(turn_id, TurnUpdate::Append(delta))
                    .await?;
            }
        }

        if !state.has_pending_calls() {
            return Ok(None);
        }

        state.phase = TurnPhase::ToolPending;
        if cancel.is_cancelled() {
            tracing::info!(turn_id, round = state.round, "turn cancelled before tool execution");
            state.cancelled = true;
            return Ok(None);
        }

        state.phase = TurnPhase::ToolExecuting;
        let calls = state.take_calls();
        tracing::info!(turn_id, round = state.round, count = calls.len(), "executing tool calls");

        let results = self.execute_calls(profile, calls).await;
        state.calls_executed += results.len();
        Ok(Some(results))
    }

    /// Execute one round's calls concurrently.
    ///
    /// Every call gets exactly one result, in collection order. Calls the
    /// agent may not run, failures and panics all become failure results.
    async fn execute_calls(&self, profile: &AgentProfile, calls: Vec<ToolCall>) -> Vec<CallResult> {
        let mut results: Vec<Option<CallResult>> = vec![None; calls.len()];
        let mut set = JoinSet::new();
        let mut slots = HashMap::new();

        for (index, call) in calls.iter().enumerate() {
            if !profile.can_execute(&call.name) || !self.tools.contains(&call.name) {
                tracing::warn!(
                    call_id = %call.id,
                    tool = %call.name,
                    agent = %profile.id,
                    "model requested a tool this agent cannot run"
                );
                results[index] = Some(CallResult::failure(
                    call,
                    format!("Tool '{}' is not available to this agent", call.name),
                ));
                continue;
            }

            let tools = Arc::clone(&self.tools);
            let call = call.clone();
            let handle = set.spawn(async move {
                let outcome = tools.execute(&call.name, &call.arguments).await;
                CallResult {
                    call_id: call.id,
                    tool_name: call.name,
                    outcome,
                }
            });
            slots.insert(handle.id(), index);
        }

        while let Some(joined) = set.join_next_with_id().await {
            let (index, result) = match joined {
                Ok((task_id, result)) => (slots.get(&task_id).copied(), result),
                Err(e) => {
                    let index = slots.get(&e.id()).copied();
                    let Some(call) = index.map(|i| &calls[i]) else {
                        continue;
                    };
                    (index, CallResult::failure(call, format!("Tool '{}' crashed: {}", call.name, e)))
                }
            };

            if let Some(index) = index {
                match &result.outcome {
                    Ok(_) => tracing::debug!(call_id = %result.call_id, tool = %result.tool_name, "tool succeeded"),
                    Err(message) => tracing::warn!(
                        call_id = %result.call_id,
                        tool = %result.tool_name,
                        error = %message,
                        "tool failed"
                    ),
                }
                results[index] = Some(result);
            }
        }

        results.into_iter().flatten().collect()
    }
}

/// Finalizes the placeholder when a turn is dropped before it ends, so no
/// turn is left streaming.
struct AbandonGuard {
    store: ConversationStore,
    turn_id: Option<String>,
}

impl AbandonGuard {
    fn new(store: ConversationStore, turn_id: String) -> Self {
        Self {
            store,
            turn_id: Some(turn_id),
        }
    }

    fn disarm(&mut self) {
        self.turn_id = None;
    }
}

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        let Some(turn_id) = self.turn_id.take() else {
            return;
        };

        tracing::info!(turn_id = %turn_id, "turn dropped before finishing");
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let store = self.store.clone();
                handle.spawn(async move {
                    if let Err(e) = store.update_by_id(&turn_id, TurnUpdate::Finish).await {
                        tracing::debug!(turn_id = %turn_id, error = %e, "could not finalize dropped turn");
                    }
                });
            }
            Err(_) => tracing::warn!(turn_id = %turn_id, "no runtime to finalize dropped turn"),
        }
    }
}
