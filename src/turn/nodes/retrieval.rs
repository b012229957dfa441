//! Runs the tools requested by the orchestrator

use async_trait::async_trait;

use super::{Node, NodeContext, NodeId};
use crate::turn::{ChatMessage, StateUpdate, TurnError, TurnState};

pub struct RetrievalNode;

#[async_trait]
impl Node for RetrievalNode {
    fn id(&self) -> NodeId {
        NodeId::Retrieval
    }

    async fn run(&self, state: &TurnState, ctx: &NodeContext<'_>) -> StateUpdate {
        let mut results = Vec::new();

        for request in state.pending_tool_requests() {
            let output = ctx
                .tools
                .invoke(&request.name, request.input.clone(), ctx.cancel.clone())
                .await;

            match output {
                Some(output) => {
                    tracing::debug!(
                        tool = %request.name,
                        call_id = %request.id,
                        success = output.success,
                        bytes = output.output.len(),
                        "Tool finished"
                    );
                    results.push(ChatMessage::ToolResult {
                        call_id: request.id.clone(),
                        tool: request.name.clone(),
                        content: output.output,
                    });
                }
                None => {
                    let error = TurnError::UnknownToolRequested(request.name.clone());
                    tracing::warn!(call_id = %request.id, error = %error, "Skipping tool request");
                }
            }
        }

        StateUpdate::new()
            .with_messages(results)
            .clear_pending_tool_requests()
            .attach_documents()
    }
}
