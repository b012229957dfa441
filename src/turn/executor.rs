//! Runs a turn through the node graph
//!
//! Each turn is one spawned task. Output flows through a bounded channel,
//! so a slow consumer applies backpressure to the model stream. Dropping
//! the [`TurnStream`] cancels the task: no further node starts, and the
//! node in flight is abandoned without touching the state.

use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::{CancellationToken, DropGuard};

use super::nodes::{
    failure_update, Node, NodeContext, NodeId, OrchestratorNode, OutputSink, RespondNode,
    RetrievalNode, SummarizeNode,
};
use super::{route, Multiplexer, OutputUnit, Route, TurnError, TurnRequest, TurnState};
use crate::documents::{load_attachments, DocumentExtractor};
use crate::llm::{LlmError, ModelRegistry};
use crate::tools::ToolInvoker;

const OUTPUT_BUFFER: usize = 64;

/// Entry point for running turns
#[derive(Clone)]
pub struct TurnExecutor {
    registry: Arc<ModelRegistry>,
    extractor: Arc<dyn DocumentExtractor>,
}

impl TurnExecutor {
    pub fn new(registry: Arc<ModelRegistry>, extractor: Arc<dyn DocumentExtractor>) -> Self {
        Self {
            registry,
            extractor,
        }
    }

    /// Start a turn. Output is produced as the graph runs.
    pub fn run_turn(&self, request: TurnRequest) -> TurnStream {
        let (tx, rx) = mpsc::channel(OUTPUT_BUFFER);
        let (done_tx, done_rx) = oneshot::channel();
        let cancel = CancellationToken::new();

        let runner = TurnRunner {
            registry: self.registry.clone(),
            extractor: self.extractor.clone(),
            sink: OutputSink::new(tx),
            cancel: cancel.clone(),
        };
        let state = TurnState::new(request);

        tokio::spawn(async move {
            let state = runner.run(state).await;
            let _ = done_tx.send(state);
        });

        TurnStream {
            output: ReceiverStream::new(rx),
            final_state: done_rx,
            _cancel_on_drop: cancel.drop_guard(),
        }
    }
}

/// Output of a running turn
pub struct TurnStream {
    output: ReceiverStream<OutputUnit>,
    final_state: oneshot::Receiver<TurnState>,
    _cancel_on_drop: DropGuard,
}

impl TurnStream {
    /// Drain remaining output and return the state the turn ended in.
    ///
    /// `None` if the turn task died without reporting.
    pub async fn finish(mut self) -> Option<TurnState> {
        while self.output.next().await.is_some() {}
        (&mut self.final_state).await.ok()
    }
}

impl Stream for TurnStream {
    type Item = OutputUnit;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.output).poll_next(cx)
    }
}

struct TurnRunner {
    registry: Arc<ModelRegistry>,
    extractor: Arc<dyn DocumentExtractor>,
    sink: OutputSink,
    cancel: CancellationToken,
}

impl TurnRunner {
    async fn run(self, mut state: TurnState) -> TurnState {
        let Some(llm) = self.registry.resolve(state.model_id()) else {
            let error = TurnError::ModelUnavailable(LlmError::unknown("no model configured"));
            tracing::error!(model = %state.model_id(), error = %error, "Turn aborted");
            state.apply(failure_update());
            self.finish(&state).await;
            return state;
        };

        let tools = ToolInvoker::for_patient(state.documents().to_vec(), self.extractor.clone());
        let ctx = NodeContext {
            llm,
            tools: &tools,
            output: &self.sink,
            cancel: self.cancel.clone(),
        };

        let mut node = NodeId::Orchestrator;
        while node != NodeId::End {
            let update = tokio::select! {
                biased;
                () = self.cancel.cancelled() => None,
                update = execute(node, &state, &ctx) => Some(update),
            };
            let Some(update) = update else {
                tracing::info!(node = ?node, "Turn cancelled");
                return state;
            };
            state.apply(update);

            let next = next_node(node, &state);
            tracing::debug!(from = ?node, to = ?next, "Node transition");
            node = next;
        }

        if !self.cancel.is_cancelled() {
            self.finish(&state).await;
        }
        state
    }

    /// Closing output: the apology for a turn that failed silently, or the
    /// attachments for a turn that used documents.
    async fn finish(&self, state: &TurnState) {
        let result = if state.terminated_with_error() {
            match state.last_assistant_message() {
                Some(apology) if !self.sink.has_emitted() => {
                    self.sink.send(OutputUnit::text(apology)).await
                }
                _ => Ok(()),
            }
        } else if state.attach_documents() {
            let documents = load_attachments(self.extractor.as_ref(), state.documents()).await;
            tracing::debug!(count = documents.len(), "Attaching documents");
            match Multiplexer::documents_attached(documents) {
                Some(unit) => self.sink.send(unit).await,
                None => Ok(()),
            }
        } else {
            Ok(())
        };

        if let Err(e) = result {
            tracing::debug!(error = %e, "Closing output dropped");
        }
    }
}

async fn execute(node: NodeId, state: &TurnState, ctx: &NodeContext<'_>) -> super::StateUpdate {
    let Some(node) = node_impl(node) else {
        return super::StateUpdate::new();
    };
    tracing::debug!(node = ?node.id(), "Running node");
    node.run(state, ctx).await
}

fn node_impl(id: NodeId) -> Option<&'static dyn Node> {
    match id {
        NodeId::Orchestrator => Some(&OrchestratorNode),
        NodeId::Retrieval => Some(&RetrievalNode),
        NodeId::Summarize => Some(&SummarizeNode),
        NodeId::Respond => Some(&RespondNode),
        NodeId::End => None,
    }
}

/// Fixed graph: orchestrator, router, optional retrieval and summary, response
fn next_node(current: NodeId, state: &TurnState) -> NodeId {
    if state.terminated_with_error() {
        return NodeId::End;
    }
    match current {
        NodeId::Orchestrator => match route(state) {
            Route::Abort => NodeId::End,
            Route::Retrieve => NodeId::Retrieval,
            Route::Respond => NodeId::Respond,
        },
        NodeId::Retrieval => NodeId::Summarize,
        NodeId::Summarize => NodeId::Respond,
        NodeId::Respond | NodeId::End => NodeId::End,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ContentBlock, LlmResponse, Usage};
    use crate::persona::NO_DIGEST;
    use crate::turn::testing::{turn_request, turn_request_with_docs, MockExtractor, MockLlmClient};
    use crate::turn::{TurnEvent, APOLOGY};
    use serde_json::json;

    fn executor(
        llm: MockLlmClient,
        extractor: MockExtractor,
    ) -> (TurnExecutor, Arc<MockLlmClient>) {
        let llm = Arc::new(llm);
        let service: Arc<dyn crate::llm::LlmService> = llm.clone();
        let registry = ModelRegistry::from_services([service], "mock-model");
        (
            TurnExecutor::new(Arc::new(registry), Arc::new(extractor)),
            llm,
        )
    }

    async fn collect(stream: TurnStream) -> (Vec<OutputUnit>, TurnState) {
        let mut stream = stream;
        let mut units = Vec::new();
        while let Some(unit) = stream.next().await {
            units.push(unit);
        }
        let state = stream.finish().await.unwrap();
        (units, state)
    }

    fn tool_call_response() -> LlmResponse {
        LlmResponse {
            content: vec![ContentBlock::ToolUse {
                id: "call-1".to_string(),
                name: "load_patient_docs".to_string(),
                input: json!({"file_paths": ["irgendwas.pdf"]}),
            }],
            usage: Usage::default(),
        }
    }

    #[tokio::test]
    async fn test_direct_reply_without_tools() {
        let llm = MockLlmClient::new("mock-model");
        llm.queue_text("NO_TOOL");
        llm.queue_stream(["Ich ... *kratzt sich den Kopf* ...", " ich weiß es nicht ..."]);
        let (executor, llm) = executor(llm, MockExtractor::default());

        let mut request = turn_request("Wissen Sie was passiert ist?");
        request.persona_condition = "alzheimer".to_string();
        let (units, state) = collect(executor.run_turn(request)).await;

        assert!(units.iter().all(|u| matches!(u, OutputUnit::Text(_))));
        assert_eq!(
            state.last_assistant_message(),
            Some("Ich ... *kratzt sich den Kopf* ... ich weiß es nicht ...")
        );
        assert!(!state.attach_documents());
        assert!(state.retrieved_digest().is_none());
        assert_eq!(llm.recorded_requests().len(), 2);
    }

    #[tokio::test]
    async fn test_orchestrator_failure_yields_only_apology() {
        let llm = MockLlmClient::new("mock-model");
        llm.queue_error(LlmError::network("unreachable"));
        let (executor, llm) = executor(llm, MockExtractor::default());

        let (units, state) = collect(executor.run_turn(turn_request("Hallo"))).await;

        assert_eq!(units, vec![OutputUnit::text(APOLOGY)]);
        assert!(state.terminated_with_error());
        assert!(state.pending_tool_requests().is_empty());
        assert_eq!(llm.recorded_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_retrieval_branch() {
        let llm = MockLlmClient::new("mock-model");
        llm.queue_response(tool_call_response());
        llm.queue_text("Sturz mit Hüftfraktur links.");
        llm.queue_stream(["Ich bin ... hingefallen, glaub ich."]);
        let extractor = MockExtractor::default()
            .with_text("brief.txt", "Aufnahme nach Sturz, Hüftfraktur links.")
            .with_text("labor.txt", "CRP erhöht.");
        let (executor, llm) = executor(llm, extractor);

        let request = turn_request_with_docs(
            "Was ist passiert?",
            vec![
                MockExtractor::descriptor(1, "brief.txt"),
                MockExtractor::descriptor(2, "labor.txt"),
            ],
        );
        let (units, state) = collect(executor.run_turn(request)).await;

        assert_eq!(state.retrieved_digest(), Some("Sturz mit Hüftfraktur links."));
        assert_eq!(state.tool_results().count(), 0);
        assert!(state.attach_documents());

        let text: String = units
            .iter()
            .filter_map(|u| match u {
                OutputUnit::Text(t) => Some(t.as_str()),
                OutputUnit::Event(_) => None,
            })
            .collect();
        assert_eq!(text, "Ich bin ... hingefallen, glaub ich.");
        assert!(!text.contains("CRP"));

        let Some(OutputUnit::Event(TurnEvent::DocumentsAttached { documents })) = units.last()
        else {
            panic!("expected documents event last, got {units:?}");
        };
        let names: Vec<_> = documents.iter().map(|d| d.filename.as_str()).collect();
        assert_eq!(names, vec!["brief.txt", "labor.txt"]);

        let requests = llm.recorded_requests();
        assert_eq!(requests.len(), 3);
        let persona_prompt = requests[2].system.as_deref().unwrap();
        assert!(persona_prompt.contains("Sturz mit Hüftfraktur links."));
        assert!(!persona_prompt.contains("CRP erhöht"));
    }

    #[tokio::test]
    async fn test_summary_failure_still_answers() {
        let llm = MockLlmClient::new("mock-model");
        llm.queue_response(tool_call_response());
        llm.queue_error(LlmError::server_error("overloaded"));
        llm.queue_stream(["Weiß nicht."]);
        let (executor, _llm) = executor(llm, MockExtractor::default());

        let request =
            turn_request_with_docs("Befunde?", vec![MockExtractor::descriptor(1, "a.txt")]);
        let (_, state) = collect(executor.run_turn(request)).await;

        assert_eq!(state.retrieved_digest(), Some(NO_DIGEST));
        assert_eq!(state.last_assistant_message(), Some("Weiß nicht."));
        assert!(!state.terminated_with_error());
    }

    #[tokio::test]
    async fn test_unknown_condition_uses_default_persona() {
        let llm = MockLlmClient::new("mock-model");
        llm.queue_text("NO_TOOL");
        llm.queue_stream(["Hm?"]);
        let (executor, llm) = executor(llm, MockExtractor::default());

        let mut request = turn_request("Guten Morgen");
        request.persona_condition = "unknown_value".to_string();
        let (_, state) = collect(executor.run_turn(request)).await;

        assert!(!state.terminated_with_error());
        let system = llm.recorded_requests()[1].system.clone().unwrap();
        assert!(!system.contains("Alzheimer"));
        assert!(system.contains("Substantiv"));
    }

    #[tokio::test]
    async fn test_unknown_model_falls_back_to_default() {
        let llm = MockLlmClient::new("mock-model");
        llm.queue_text("NO_TOOL");
        llm.queue_stream(["Ja?"]);
        let (executor, _llm) = executor(llm, MockExtractor::default());

        let mut request = turn_request("Hallo");
        request.model_id = "gpt-17".to_string();
        let (units, _) = collect(executor.run_turn(request)).await;

        assert_eq!(units, vec![OutputUnit::text("Ja?")]);
    }

    #[tokio::test]
    async fn test_no_models_configured() {
        let registry = ModelRegistry::from_services(Vec::new(), "mock-model");
        let executor = TurnExecutor::new(Arc::new(registry), Arc::new(MockExtractor::default()));

        let (units, state) = collect(executor.run_turn(turn_request("Hallo"))).await;

        assert_eq!(units, vec![OutputUnit::text(APOLOGY)]);
        assert!(state.terminated_with_error());
    }

    #[tokio::test]
    async fn test_dropping_stream_stops_turn() {
        let llm = MockLlmClient::new("mock-model");
        llm.queue_text("NO_TOOL");
        llm.queue_stream((0..500).map(|i| format!("Wort{i} ")));
        let (executor, llm) = executor(llm, MockExtractor::default());

        let mut stream = executor.run_turn(turn_request("Erzählen Sie mal"));
        let first = stream.next().await;
        assert!(matches!(first, Some(OutputUnit::Text(_))));
        drop(stream);

        // the turn task notices the cancellation and makes no further calls
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(llm.recorded_requests().len(), 2);
    }
}
