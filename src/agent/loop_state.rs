//! Turn loop state management
//!
//! Tracks one turn's progress through the streaming tool loop: which phase
//! it is in, how many rounds have run, the text accumulated so far and the
//! calls collected in the current round.

use std::collections::HashMap;
use std::fmt;

use crate::core::{merge_arguments, Result, SwitchboardError, ToolCall};
use crate::llm::StreamChunk;

/// Phase of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Routing,
    Streaming,
    ToolPending,
    ToolExecuting,
    Finalized,
    Errored,
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TurnPhase::Routing => "routing",
            TurnPhase::Streaming => "streaming",
            TurnPhase::ToolPending => "tool_pending",
            TurnPhase::ToolExecuting => "tool_executing",
            TurnPhase::Finalized => "finalized",
            TurnPhase::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// State of one turn's tool loop
#[derive(Debug, Clone)]
pub struct TurnLoopState {
    pub phase: TurnPhase,
    /// Rounds started so far (1-indexed once streaming begins)
    pub round: usize,
    /// Maximum allowed rounds
    pub max_rounds: usize,
    /// All text streamed in this turn, across rounds
    pub content: String,
    /// Calls executed in this turn, across rounds
    pub calls_executed: usize,
    /// Set when the turn was cancelled cooperatively
    pub cancelled: bool,
    pending: Vec<ToolCall>,
    pending_index: HashMap<String, usize>,
}

impl TurnLoopState {
    /// Create a new loop state with the given round limit
    pub fn new(max_rounds: usize) -> Self {
        Self {
            phase: TurnPhase::Routing,
            round: 0,
            max_rounds: max_rounds.max(1),
            content: String::new(),
            calls_executed: 0,
            cancelled: false,
            pending: Vec::new(),
            pending_index: HashMap::new(),
        }
    }

    /// Start the next round, failing once the round limit is used up
    pub fn begin_round(&mut self) -> Result<()> {
        if self.round >= self.max_rounds {
            return Err(SwitchboardError::RoundLimit(self.max_rounds));
        }
        self.round += 1;
        self.phase = TurnPhase::Streaming;
        Ok(())
    }

    /// Fold one streamed chunk into the state.
    ///
    /// Returns the text delta to publish, if the chunk carried any. Calls
    /// are keyed by id: a repeated id updates the call already collected
    /// instead of adding a new one.
    pub fn apply(&mut self, chunk: StreamChunk) -> Option<String> {
        for call in chunk.function_calls {
            self.collect(call);
        }

        match chunk.text {
            Some(text) if !text.is_empty() => {
                self.content.push_str(&text);
                Some(text)
            }
            _ => None,
        }
    }

    fn collect(&mut self, call: ToolCall) {
        match self.pending_index.get(&call.id) {
            Some(&index) => {
                let existing = &mut self.pending[index];
                merge_arguments(&mut existing.arguments, call.arguments);
            }
            None => {
                self.pending_index.insert(call.id.clone(), self.pending.len());
                self.pending.push(call);
            }
        }
    }

    /// Whether the current round collected any calls
    pub fn has_pending_calls(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Distinct calls collected this round, in first-seen order
    pub fn pending_calls(&self) -> &[ToolCall] {
        &self.pending
    }

    /// Hand the collected calls over for execution and reset the round
    pub fn take_calls(&mut self) -> Vec<ToolCall> {
        self.pending_index.clear();
        std::mem::take(&mut self.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_loop_state_new() {
        let state = TurnLoopState::new(10);
        assert_eq!(state.round, 0);
        assert_eq!(state.max_rounds, 10);
        assert_eq!(state.phase, TurnPhase::Routing);
        assert!(!state.has_pending_calls());
    }

    #[test]
    fn test_round_limit() {
        let mut state = TurnLoopState::new(2);
        assert!(state.begin_round().is_ok());
        assert!(state.begin_round().is_ok());
        assert!(matches!(
            state.begin_round(),
            Err(SwitchboardError::RoundLimit(2))
        ));
        assert_eq!(state.round, 2);
    }

    #[test]
    fn test_apply_accumulates_text_in_order() {
        let mut state = TurnLoopState::new(4);
        assert_eq!(state.apply(StreamChunk::text("one ")), Some("one ".to_string()));
        assert_eq!(state.apply(StreamChunk::text("")), None);
        assert_eq!(state.apply(StreamChunk::text("two")), Some("two".to_string()));
        assert_eq!(state.content, "one two");
    }

    #[test]
    fn test_repeated_call_ids_collapse_and_merge() {
        let mut state = TurnLoopState::new(4);
        state.apply(StreamChunk::calls(vec![ToolCall::new(
            "c1",
            "search_cars",
            json!({"query": "Clio"}),
        )]));
        state.apply(StreamChunk::calls(vec![
            ToolCall::new("c1", "search_cars", json!({"sortByPrice": "desc"})),
            ToolCall::new("c2", "search_cars", json!({"query": "208"})),
        ]));

        let calls = state.take_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].arguments, json!({"query": "Clio", "sortByPrice": "desc"}));
        assert_eq!(calls[1].id, "c2");
        assert!(!state.has_pending_calls());
    }

    #[test]
    fn test_null_arguments_do_not_erase() {
        let mut args = json!({"expression": "1+1"});
        merge_arguments(&mut args, serde_json::Value::Null);
        assert_eq!(args, json!({"expression": "1+1"}));

        let mut scalar = json!("old");
        merge_arguments(&mut scalar, json!("new"));
        assert_eq!(scalar, json!("new"));
    }

    #[test]
    fn test_same_name_different_ids_are_distinct() {
        let mut state = TurnLoopState::new(4);
        state.apply(StreamChunk::calls(vec![
            ToolCall::new("a", "calculator", json!({"expression": "1+1"})),
            ToolCall::new("b", "calculator", json!({"expression": "2+2"})),
        ]));
        assert_eq!(state.pending_calls().len(), 2);
    }
}
