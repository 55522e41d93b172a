//! Conversation store
//!
//! Ordered list of turns shared between the turn engine (the only writer of
//! streaming content) and the rendering layer. Every change is published as
//! a `StoreEvent` so readers can follow partial content as it arrives.

use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

use crate::core::{AgentId, Result, SwitchboardError, Turn};

/// Separator placed between partial content and an error notice
const NOTICE_SEPARATOR: &str = "\n\n";

const EVENT_CAPACITY: usize = 1024;

/// Change applied to a streaming turn
#[derive(Debug, Clone, PartialEq)]
pub enum TurnUpdate {
    /// Append a text fragment
    Append(String),
    /// Mark the turn as no longer streaming
    Finish,
    /// Append a visible error notice after any partial content, then finish
    Fail(String),
}

/// Something that happened in the store
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    Appended(Turn),
    TextAppended { turn_id: String, delta: String },
    Finalized { turn_id: String },
    Cleared,
    AgentChanged { active: AgentId, manual: Option<AgentId> },
}

#[derive(Debug)]
struct StoreState {
    turns: Vec<Turn>,
    default_agent: AgentId,
    active_agent: AgentId,
    manual_agent: Option<AgentId>,
}

/// Cloneable handle to the shared conversation
#[derive(Debug, Clone)]
pub struct ConversationStore {
    state: Arc<RwLock<StoreState>>,
    events: broadcast::Sender<StoreEvent>,
}

impl ConversationStore {
    /// Create an empty conversation
    pub fn new(default_agent: AgentId) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Arc::new(RwLock::new(StoreState {
                turns: Vec::new(),
                default_agent,
                active_agent: default_agent,
                manual_agent: None,
            })),
            events,
        }
    }

    /// Receive every subsequent change
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: StoreEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    /// Append a turn at the end
    pub async fn append(&self, turn: Turn) {
        self.state.write().await.turns.push(turn.clone());
        self.publish(StoreEvent::Appended(turn));
    }

    /// Apply an update to a streaming turn.
    ///
    /// Only streaming turns may change, content only grows, and a turn
    /// leaves the streaming state exactly once.
    pub async fn update_by_id(&self, id: &str, update: TurnUpdate) -> Result<()> {
        let mut events = Vec::with_capacity(2);
        {
            let mut state = self.state.write().await;
            let turn = state
                .turns
                .iter_mut()
                .find(|turn| turn.id == id)
                .ok_or_else(|| SwitchboardError::TurnNotFound(id.to_string()))?;

            if !turn.is_streaming {
                return Err(SwitchboardError::TurnFinalized(id.to_string()));
            }

            match update {
                TurnUpdate::Append(delta) => {
                    if delta.is_empty() {
                        return Ok(());
                    }
                    turn.content.push_str(&delta);
                    events.push(StoreEvent::TextAppended {
                        turn_id: id.to_string(),
                        delta,
                    });
                }
                TurnUpdate::Finish => {
                    turn.is_streaming = false;
                    events.push(StoreEvent::Finalized {
                        turn_id: id.to_string(),
                    });
                }
                TurnUpdate::Fail(notice) => {
                    let delta = if turn.content.is_empty() {
                        notice
                    } else {
                        format!("{}{}", NOTICE_SEPARATOR, notice)
                    };
                    turn.content.push_str(&delta);
                    turn.is_streaming = false;
                    events.push(StoreEvent::TextAppended {
                        turn_id: id.to_string(),
                        delta,
                    });
                    events.push(StoreEvent::Finalized {
                        turn_id: id.to_string(),
                    });
                }
            }
        }

        for event in events {
            self.publish(event);
        }
        Ok(())
    }

    /// Remove every turn; the active agent falls back to the default
    /// unless a manual agent is set
    pub async fn clear(&self) {
        let agents = {
            let mut state = self.state.write().await;
            state.turns.clear();
            if state.manual_agent.is_none() {
                state.active_agent = state.default_agent;
            }
            (state.active_agent, state.manual_agent)
        };
        self.publish(StoreEvent::Cleared);
        self.publish(StoreEvent::AgentChanged {
            active: agents.0,
            manual: agents.1,
        });
    }

    /// Snapshot of all turns, in order
    pub async fn list(&self) -> Vec<Turn> {
        self.state.read().await.turns.clone()
    }

    /// Snapshot of one turn
    pub async fn get(&self, id: &str) -> Option<Turn> {
        self.state
            .read()
            .await
            .turns
            .iter()
            .find(|turn| turn.id == id)
            .cloned()
    }

    /// Number of turns
    pub async fn len(&self) -> usize {
        self.state.read().await.turns.len()
    }

    /// Whether the conversation has no turns
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.turns.is_empty()
    }

    /// Agent that handled (or is handling) the latest turn
    pub async fn active_agent(&self) -> AgentId {
        self.state.read().await.active_agent
    }

    /// Agent fixed by the user, if any
    pub async fn manual_agent(&self) -> Option<AgentId> {
        self.state.read().await.manual_agent
    }

    /// Record the agent chosen for the current turn
    pub async fn set_active_agent(&self, id: AgentId) {
        let manual = {
            let mut state = self.state.write().await;
            state.active_agent = id;
            state.manual_agent
        };
        self.publish(StoreEvent::AgentChanged { active: id, manual });
    }

    /// Fix the agent for future turns, or return to automatic routing
    pub async fn set_manual_agent(&self, id: Option<AgentId>) {
        let active = {
            let mut state = self.state.write().await;
            state.manual_agent = id;
            if let Some(id) = id {
                state.active_agent = id;
            }
            state.active_agent
        };
        self.publish(StoreEvent::AgentChanged { active, manual: id });
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(AgentId::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_and_stream_updates() {
        let store = ConversationStore::default();
        let mut events = store.subscribe();

        store.append(Turn::user("hi", Vec::new())).await;
        let placeholder = Turn::placeholder(AgentId::Generalist);
        let id = placeholder.id.clone();
        store.append(placeholder).await;

        store.update_by_id(&id, TurnUpdate::Append("Hel".into())).await.unwrap();
        store.update_by_id(&id, TurnUpdate::Append("lo".into())).await.unwrap();
        store.update_by_id(&id, TurnUpdate::Finish).await.unwrap();

        let turns = store.list().await;
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].content, "Hello");
        assert!(!turns[1].is_streaming);

        assert!(matches!(events.recv().await.unwrap(), StoreEvent::Appended(_)));
        assert!(matches!(events.recv().await.unwrap(), StoreEvent::Appended(_)));
        assert_eq!(
            events.recv().await.unwrap(),
            StoreEvent::TextAppended { turn_id: id.clone(), delta: "Hel".into() }
        );
    }

    #[tokio::test]
    async fn test_finalized_turn_is_immutable() {
        let store = ConversationStore::default();
        let placeholder = Turn::placeholder(AgentId::Coder);
        let id = placeholder.id.clone();
        store.append(placeholder).await;
        store.update_by_id(&id, TurnUpdate::Finish).await.unwrap();

        let err = store
            .update_by_id(&id, TurnUpdate::Append("late".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchboardError::TurnFinalized(_)));
        assert!(store.update_by_id(&id, TurnUpdate::Finish).await.is_err());
        assert!(matches!(
            store.update_by_id("nope", TurnUpdate::Finish).await,
            Err(SwitchboardError::TurnNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_fail_appends_notice_after_content() {
        let store = ConversationStore::default();
        let placeholder = Turn::placeholder(AgentId::Generalist);
        let id = placeholder.id.clone();
        store.append(placeholder).await;

        store.update_by_id(&id, TurnUpdate::Append("partial".into())).await.unwrap();
        store.update_by_id(&id, TurnUpdate::Fail("[oops]".into())).await.unwrap();

        let turn = store.get(&id).await.unwrap();
        assert_eq!(turn.content, "partial\n\n[oops]");
        assert!(!turn.is_streaming);
    }

    #[tokio::test]
    async fn test_clear_resets_active_agent_unless_manual() {
        let store = ConversationStore::new(AgentId::Generalist);
        store.append(Turn::user("hi", Vec::new())).await;
        store.set_active_agent(AgentId::Analyst).await;
        store.clear().await;
        assert!(store.is_empty().await);
        assert_eq!(store.active_agent().await, AgentId::Generalist);

        store.set_manual_agent(Some(AgentId::Coder)).await;
        store.clear().await;
        assert_eq!(store.active_agent().await, AgentId::Coder);
        assert_eq!(store.manual_agent().await, Some(AgentId::Coder));
    }
}
