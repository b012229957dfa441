//! Graph nodes
//!
//! Each node reads the current [`TurnState`] and returns a [`StateUpdate`].
//! Nodes absorb their own failures; whatever went wrong is expressed in the
//! update (an apology message, the termination flag) rather than returned.

mod orchestrator;
mod respond;
mod retrieval;
mod summarize;

pub use orchestrator::OrchestratorNode;
pub use respond::RespondNode;
pub use retrieval::RetrievalNode;
pub use summarize::SummarizeNode;

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{ChatMessage, OutputUnit, StateUpdate, TurnError, TurnState, APOLOGY};
use crate::llm::{LlmMessage, LlmService};
use crate::tools::ToolInvoker;

/// Identifies a node in the turn graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeId {
    Orchestrator,
    Retrieval,
    Summarize,
    Respond,
    End,
}

/// Sending half of the turn's output stream
#[derive(Clone)]
pub struct OutputSink {
    tx: mpsc::Sender<OutputUnit>,
    emitted: Arc<AtomicBool>,
}

impl OutputSink {
    pub fn new(tx: mpsc::Sender<OutputUnit>) -> Self {
        Self {
            tx,
            emitted: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn send(&self, unit: OutputUnit) -> Result<(), TurnError> {
        self.tx
            .send(unit)
            .await
            .map_err(|_| TurnError::Disconnected)?;
        self.emitted.store(true, Ordering::Release);
        Ok(())
    }

    /// Whether any unit has reached the consumer
    pub fn has_emitted(&self) -> bool {
        self.emitted.load(Ordering::Acquire)
    }
}

/// Collaborators shared by every node of a turn
pub struct NodeContext<'a> {
    pub llm: Arc<dyn LlmService>,
    pub tools: &'a ToolInvoker,
    pub output: &'a OutputSink,
    pub cancel: CancellationToken,
}

#[async_trait]
pub trait Node: Send + Sync {
    fn id(&self) -> NodeId;

    async fn run(&self, state: &TurnState, ctx: &NodeContext<'_>) -> StateUpdate;
}

/// Conversation history as model messages; retrieved context is left out
pub(crate) fn history_messages(state: &TurnState) -> Vec<LlmMessage> {
    state
        .messages()
        .iter()
        .filter_map(|m| match m {
            ChatMessage::User(text) => Some(LlmMessage::user(text.clone())),
            ChatMessage::Assistant(text) => Some(LlmMessage::assistant(text.clone())),
            ChatMessage::ToolResult { .. } => None,
        })
        .collect()
}

/// Update for a node whose model call failed for good
pub(crate) fn failure_update() -> StateUpdate {
    StateUpdate::new()
        .with_message(ChatMessage::assistant(APOLOGY))
        .clear_pending_tool_requests()
        .terminate()
}
