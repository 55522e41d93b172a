//! Chat front-end
//!
//! What a user interface drives: pending attachments, agent selection and
//! submission. Only one turn may be in flight at a time; a second submit
//! is rejected rather than queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::agent::conversation::ConversationStore;
use crate::agent::engine::{TurnEngine, TurnOutcome};
use crate::core::{AgentId, Attachment, Result, SwitchboardError, Turn};

/// Cloneable chat handle
#[derive(Clone)]
pub struct Assistant {
    engine: Arc<TurnEngine>,
    pending: Arc<Mutex<Vec<Attachment>>>,
    loading: Arc<AtomicBool>,
}

/// Clears the loading flag even if the turn future is dropped
struct LoadingGuard(Arc<AtomicBool>);

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Assistant {
    /// Wrap an engine
    pub fn new(engine: TurnEngine) -> Self {
        Self {
            engine: Arc::new(engine),
            pending: Arc::new(Mutex::new(Vec::new())),
            loading: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The conversation being displayed
    pub fn store(&self) -> &ConversationStore {
        self.engine.store()
    }

    /// Whether a turn is in flight
    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    /// Queue an attachment for the next submission
    pub async fn add_attachment(&self, attachment: Attachment) {
        self.pending.lock().await.push(attachment);
    }

    /// Drop a queued attachment by position
    pub async fn remove_attachment(&self, index: usize) -> Option<Attachment> {
        let mut pending = self.pending.lock().await;
        (index < pending.len()).then(|| pending.remove(index))
    }

    /// Attachments queued for the next submission
    pub async fn attachments(&self) -> Vec<Attachment> {
        self.pending.lock().await.clone()
    }

    /// Fix the agent (`Some`) or return to automatic routing (`None`)
    pub async fn set_agent(&self, id: Option<AgentId>) {
        self.store().set_manual_agent(id).await;
    }

    /// Agent of the latest turn
    pub async fn active_agent(&self) -> AgentId {
        self.store().active_agent().await
    }

    /// Agent fixed by the user, if any
    pub async fn manual_agent(&self) -> Option<AgentId> {
        self.store().manual_agent().await
    }

    /// Forget the conversation
    pub async fn clear(&self) -> Result<()> {
        if self.is_loading() {
            return Err(SwitchboardError::TurnInFlight);
        }
        self.store().clear().await;
        Ok(())
    }

    /// Send `text` with the queued attachments
    pub async fn submit(&self, text: &str) -> Result<TurnOutcome> {
        self.submit_with_cancel(text, CancellationToken::new()).await
    }

    /// Send `text` with the queued attachments; `cancel` stops the turn
    /// between chunks and before tool execution
    pub async fn submit_with_cancel(&self, text: &str, cancel: CancellationToken) -> Result<TurnOutcome> {
        if self
            .loading
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SwitchboardError::TurnInFlight);
        }
        let _guard = LoadingGuard(Arc::clone(&self.loading));

        let attachments = {
            let mut pending = self.pending.lock().await;
            if text.trim().is_empty() && pending.is_empty() {
                return Err(SwitchboardError::EmptySubmission);
            }
            std::mem::take(&mut *pending)
        };

        let turn = Turn::user(text, attachments);
        Ok(self.engine.run_turn(turn, cancel).await)
    }
}
