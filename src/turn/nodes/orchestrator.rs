//! Decides whether the doctor's message needs document retrieval

use async_trait::async_trait;

use super::{failure_update, history_messages, Node, NodeContext, NodeId};
use crate::llm::{LlmRequest, LlmResponse};
use crate::turn::{strip_reasoning, StateUpdate, ToolRequest, TurnError, TurnState};

/// Literal reply meaning "no tool needed"
const NO_TOOL: &str = "NO_TOOL";

pub const ORCHESTRATOR_PROMPT: &str = r#"You are the orchestrator of a doctor-patient simulation. The user plays the doctor; a separate model plays the patient.

You are an internal decision component. You never speak as the patient and never write text meant for the doctor. Your only job:
1. Read the most recent doctor message.
2. Decide whether one of the available tools should be called for it, following each tool's description.
3. If no tool applies, answer with exactly "NO_TOOL" and nothing else.

Do not produce dialogue."#;

/// Outcome of the orchestrator's model call
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    NoTool,
    Invoke(Vec<ToolRequest>),
}

/// Interpret the model's reply.
///
/// Tool calls win. Plain content is never shown to the user: the sentinel
/// and any other note both mean no retrieval.
pub fn decide(response: &LlmResponse) -> Decision {
    let requests: Vec<ToolRequest> = response
        .tool_uses()
        .into_iter()
        .map(|(id, name, input)| ToolRequest {
            id: if id.is_empty() {
                uuid::Uuid::new_v4().to_string()
            } else {
                id.to_string()
            },
            name: name.to_string(),
            input: input.clone(),
        })
        .collect();

    if !requests.is_empty() {
        return Decision::Invoke(requests);
    }

    let text = strip_reasoning(&response.text());
    let text = text.trim();
    if text != NO_TOOL && !text.is_empty() {
        tracing::debug!(note = %text, "Orchestrator replied with a note, treating as no tool");
    }
    Decision::NoTool
}

pub struct OrchestratorNode;

#[async_trait]
impl Node for OrchestratorNode {
    fn id(&self) -> NodeId {
        NodeId::Orchestrator
    }

    async fn run(&self, state: &TurnState, ctx: &NodeContext<'_>) -> StateUpdate {
        let request = LlmRequest::new(history_messages(state))
            .with_system(ORCHESTRATOR_PROMPT)
            .with_tools(ctx.tools.definitions());

        match ctx.llm.complete(&request).await {
            Ok(response) => match decide(&response) {
                Decision::Invoke(requests) => {
                    tracing::debug!(
                        tools = ?requests.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
                        "Orchestrator requested tools"
                    );
                    StateUpdate::new().with_pending_tool_requests(requests)
                }
                Decision::NoTool => StateUpdate::new().clear_pending_tool_requests(),
            },
            Err(e) => {
                let error = TurnError::ModelUnavailable(e);
                tracing::error!(error = %error, "Orchestrator failed, aborting turn");
                failure_update()
            }
        }
    }
}
