//! Per-turn state and its merge rules
//!
//! Nodes never mutate [`TurnState`] directly. They return a
//! [`StateUpdate`] which the executor applies in one step, so a node that
//! is interrupted leaves no trace.

use serde_json::Value;

use crate::documents::DocumentDescriptor;

/// An entry in the turn's conversation history
#[derive(Debug, Clone, PartialEq)]
pub enum ChatMessage {
    User(String),
    Assistant(String),
    /// Retrieved context, correlated with the tool request that produced it
    ToolResult {
        call_id: String,
        tool: String,
        content: String,
    },
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self::User(text.into())
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::Assistant(text.into())
    }

    fn call_id(&self) -> Option<&str> {
        match self {
            Self::ToolResult { call_id, .. } => Some(call_id.as_str()),
            _ => None,
        }
    }

    pub fn is_tool_result(&self) -> bool {
        matches!(self, Self::ToolResult { .. })
    }
}

/// A tool invocation requested by the orchestrator
#[derive(Debug, Clone, PartialEq)]
pub struct ToolRequest {
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// Everything needed to start a turn
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub user_message: String,
    pub model_id: String,
    pub persona_condition: String,
    pub talkativeness: String,
    pub patient_details: String,
    pub patient_document_index: Vec<DocumentDescriptor>,
    /// History from earlier turns, oldest first
    pub prior_messages: Vec<ChatMessage>,
}

/// State threaded through one turn
#[derive(Debug, Clone)]
pub struct TurnState {
    messages: Vec<ChatMessage>,
    model_id: String,
    persona_condition: String,
    talkativeness: String,
    patient_details: String,
    patient_document_index: Vec<DocumentDescriptor>,
    pending_tool_requests: Vec<ToolRequest>,
    retrieved_digest: Option<String>,
    attach_documents: bool,
    terminated_with_error: bool,
}

impl TurnState {
    pub fn new(request: TurnRequest) -> Self {
        let mut messages = request.prior_messages;
        messages.push(ChatMessage::User(request.user_message));
        Self {
            messages,
            model_id: request.model_id,
            persona_condition: request.persona_condition,
            talkativeness: request.talkativeness,
            patient_details: request.patient_details,
            patient_document_index: request.patient_document_index,
            pending_tool_requests: Vec::new(),
            retrieved_digest: None,
            attach_documents: false,
            terminated_with_error: false,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn persona_condition(&self) -> &str {
        &self.persona_condition
    }

    pub fn talkativeness(&self) -> &str {
        &self.talkativeness
    }

    pub fn patient_details(&self) -> &str {
        &self.patient_details
    }

    pub fn documents(&self) -> &[DocumentDescriptor] {
        &self.patient_document_index
    }

    pub fn pending_tool_requests(&self) -> &[ToolRequest] {
        &self.pending_tool_requests
    }

    pub fn retrieved_digest(&self) -> Option<&str> {
        self.retrieved_digest.as_deref()
    }

    pub fn attach_documents(&self) -> bool {
        self.attach_documents
    }

    pub fn terminated_with_error(&self) -> bool {
        self.terminated_with_error
    }

    /// Retrieved-context entries currently in the history
    pub fn tool_results(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter().filter(|m| m.is_tool_result())
    }

    /// The most recent assistant entry, i.e. the reply of this turn once it ends
    pub fn last_assistant_message(&self) -> Option<&str> {
        self.messages.iter().rev().find_map(|m| match m {
            ChatMessage::Assistant(text) => Some(text.as_str()),
            _ => None,
        })
    }

    /// The assistant entry that answers the latest user message, if the
    /// turn produced one
    pub fn reply(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .take_while(|m| !matches!(m, ChatMessage::User(_)))
            .find_map(|m| match m {
                ChatMessage::Assistant(text) => Some(text.as_str()),
                _ => None,
            })
    }

    /// Apply a node's update.
    ///
    /// Tool results are dropped first when requested, then new messages are
    /// merged: entries whose call id is already present replace it in place,
    /// everything else is appended.
    pub fn apply(&mut self, update: StateUpdate) {
        if update.remove_tool_results {
            self.messages.retain(|m| !m.is_tool_result());
        }

        for message in update.messages {
            let existing = message
                .call_id()
                .and_then(|id| self.messages.iter().position(|m| m.call_id() == Some(id)));
            match existing {
                Some(index) => self.messages[index] = message,
                None => self.messages.push(message),
            }
        }

        if let Some(requests) = update.pending_tool_requests {
            self.pending_tool_requests = requests;
        }

        if let Some(digest) = update.retrieved_digest {
            if self.retrieved_digest.is_some() {
                tracing::warn!("Digest already set for this turn, keeping the first one");
            } else {
                self.retrieved_digest = Some(digest);
            }
        }

        self.attach_documents |= update.attach_documents;
        self.terminated_with_error |= update.terminate;
    }
}

/// Delta returned by a node
#[derive(Debug, Clone, Default)]
#[must_use]
pub struct StateUpdate {
    messages: Vec<ChatMessage>,
    remove_tool_results: bool,
    pending_tool_requests: Option<Vec<ToolRequest>>,
    retrieved_digest: Option<String>,
    attach_documents: bool,
    terminate: bool,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_messages(mut self, messages: impl IntoIterator<Item = ChatMessage>) -> Self {
        self.messages.extend(messages);
        self
    }

    pub fn with_pending_tool_requests(mut self, requests: Vec<ToolRequest>) -> Self {
        self.pending_tool_requests = Some(requests);
        self
    }

    pub fn clear_pending_tool_requests(self) -> Self {
        self.with_pending_tool_requests(Vec::new())
    }

    pub fn with_digest(mut self, digest: impl Into<String>) -> Self {
        self.retrieved_digest = Some(digest.into());
        self
    }

    pub fn remove_tool_results(mut self) -> Self {
        self.remove_tool_results = true;
        self
    }

    pub fn attach_documents(mut self) -> Self {
        self.attach_documents = true;
        self
    }

    pub fn terminate(mut self) -> Self {
        self.terminate = true;
        self
    }
}
