//! Streams the persona's reply

use async_trait::async_trait;
use futures::StreamExt;

use super::{history_messages, Node, NodeContext, NodeId};
use crate::llm::{LlmError, LlmRequest};
use crate::persona::{build_persona_prompt, few_shot_messages, Condition, PersonaConfig};
use crate::turn::{
    ChatMessage, Multiplexer, OutputUnit, ReasoningFilter, StateUpdate, TurnError, TurnState,
    APOLOGY,
};

pub struct RespondNode;

impl RespondNode {
    /// Persona instruction, few-shot dialogue, then the real history
    pub fn build_request(state: &TurnState) -> LlmRequest {
        let condition = Condition::from_name_or_default(state.persona_condition());
        let system = build_persona_prompt(&PersonaConfig {
            condition,
            talkativeness: state.talkativeness(),
            patient_details: state.patient_details(),
            documents: state.documents(),
            digest: state.retrieved_digest(),
        });

        let mut messages = few_shot_messages(condition);
        messages.extend(history_messages(state));
        LlmRequest::new(messages).with_system(system)
    }

    async fn stream_reply(
        &self,
        request: &LlmRequest,
        ctx: &NodeContext<'_>,
        reply: &mut String,
    ) -> Result<(), TurnError> {
        let mut stream = ctx.llm.stream(request).await?;
        let mut filter = ReasoningFilter::new();
        let mut mux = Multiplexer::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            let visible = filter
                .push(&chunk)
                .map_err(|e| LlmError::unknown(e.to_string()))?;
            if let Some(unit) = mux.push(&visible) {
                emit(unit, ctx, reply).await?;
            }
        }

        let rest = filter.finish();
        if let Some(unit) = mux.push(&rest) {
            emit(unit, ctx, reply).await?;
        }
        if let Some(unit) = mux.finish() {
            emit(unit, ctx, reply).await?;
        }
        Ok(())
    }
}

/// Send a unit downstream, keeping the text part of the reply
async fn emit(
    unit: OutputUnit,
    ctx: &NodeContext<'_>,
    reply: &mut String,
) -> Result<(), TurnError> {
    if let OutputUnit::Text(text) = &unit {
        reply.push_str(text);
    }
    ctx.output.send(unit).await
}

#[async_trait]
impl Node for RespondNode {
    fn id(&self) -> NodeId {
        NodeId::Respond
    }

    async fn run(&self, state: &TurnState, ctx: &NodeContext<'_>) -> StateUpdate {
        let request = Self::build_request(state);
        let mut reply = String::new();

        match self.stream_reply(&request, ctx, &mut reply).await {
            Ok(()) => StateUpdate::new().with_message(ChatMessage::assistant(reply)),
            Err(TurnError::Disconnected) => {
                tracing::info!(streamed = reply.len(), "Output consumer went away mid-reply");
                ctx.cancel.cancel();
                StateUpdate::new()
            }
            Err(error) => {
                tracing::error!(error = %error, streamed = reply.len(), "Response failed");
                let apology = if reply.is_empty() {
                    APOLOGY.to_string()
                } else {
                    format!("\n\n{APOLOGY}")
                };
                if ctx.output.send(OutputUnit::text(apology.clone())).await.is_err() {
                    ctx.cancel.cancel();
                }
                reply.push_str(&apology);
                StateUpdate::new()
                    .with_message(ChatMessage::assistant(reply))
                    .terminate()
            }
        }
    }
}
