//! Condenses retrieved documents into an extractive digest

use async_trait::async_trait;

use super::{Node, NodeContext, NodeId};
use crate::llm::{LlmMessage, LlmRequest};
use crate::persona::NO_DIGEST;
use crate::turn::{strip_reasoning, ChatMessage, StateUpdate, TurnError, TurnState};

pub const SUMMARIZER_PROMPT: &str = r"/nothink
Die letzte Nachricht enthält den vollständigen Rohtext medizinischer Dokumente.
Erstelle daraus eine kurze, sachliche und streng extraktive Zusammenfassung.

Regeln:
* Verwende nur Informationen, die wörtlich im Text stehen.
* Erfinde nichts, interpretiere nichts und ergänze kein Fachwissen.
* Leite keine Diagnosen ab. Nenne Diagnosen nur, wenn sie ausdrücklich im Text stehen.
* Was nicht im Text steht, gilt als unbekannt.

Stil:
* Kurz, klar und gegliedert.
* Gib die relevanten Inhalte so wieder, wie sie im Text beschrieben sind.
* Enthält der Text keine medizinischen Informationen, antworte nur: „Keine auswertbaren medizinischen Informationen.“";

pub struct SummarizeNode;

#[async_trait]
impl Node for SummarizeNode {
    fn id(&self) -> NodeId {
        NodeId::Summarize
    }

    async fn run(&self, state: &TurnState, ctx: &NodeContext<'_>) -> StateUpdate {
        let retrieved: Vec<&str> = state
            .tool_results()
            .filter_map(|m| match m {
                ChatMessage::ToolResult { content, .. } => Some(content.as_str()),
                _ => None,
            })
            .collect();

        let digest = if retrieved.is_empty() {
            NO_DIGEST.to_string()
        } else {
            let request = LlmRequest::new(vec![LlmMessage::user(retrieved.join("\n\n"))])
                .with_system(SUMMARIZER_PROMPT);

            match ctx.llm.complete(&request).await {
                Ok(response) => {
                    let text = strip_reasoning(&response.text()).trim().to_string();
                    if text.is_empty() {
                        NO_DIGEST.to_string()
                    } else {
                        text
                    }
                }
                Err(e) => {
                    let error = TurnError::ModelUnavailable(e);
                    tracing::warn!(
                        error = %error,
                        "Summarization failed, continuing without digest"
                    );
                    NO_DIGEST.to_string()
                }
            }
        };

        tracing::debug!(digest_len = digest.len(), "Digest ready");
        StateUpdate::new().remove_tool_results().with_digest(digest)
    }
}
