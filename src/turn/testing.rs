//! Mock implementations for testing
//!
//! These mocks let the nodes and the executor run without a model gateway
//! or a document store.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::nodes::{NodeContext, OutputSink};
use super::{OutputUnit, TurnRequest, TurnState};
use crate::documents::{DocumentDescriptor, DocumentExtractor, ExtractionError};
use crate::llm::{
    ContentBlock, LlmError, LlmRequest, LlmResponse, LlmService, LlmStream, Usage,
};
use crate::tools::ToolInvoker;

// ============================================================================
// Turn fixtures
// ============================================================================

/// A turn request with one earlier exchange and no documents
pub fn turn_request(message: &str) -> TurnRequest {
    turn_request_with_docs(message, Vec::new())
}

pub fn turn_request_with_docs(message: &str, documents: Vec<DocumentDescriptor>) -> TurnRequest {
    TurnRequest {
        user_message: message.to_string(),
        model_id: "mock-model".to_string(),
        persona_condition: "default".to_string(),
        talkativeness: "ausgewogen".to_string(),
        patient_details: "Name: Erika Musterfrau\nAlter: 79".to_string(),
        patient_document_index: documents,
        prior_messages: vec![
            super::ChatMessage::user("Guten Tag, wie geht es Ihnen?"),
            super::ChatMessage::assistant("Ach ... geht so."),
        ],
    }
}

// ============================================================================
// Mock LLM Client
// ============================================================================

type StreamScript = Result<Vec<Result<String, LlmError>>, LlmError>;

/// Mock model client that returns queued responses.
///
/// `complete` and `stream` have separate queues; an empty queue yields a
/// network error.
pub struct MockLlmClient {
    model_id: String,
    responses: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    streams: Mutex<VecDeque<StreamScript>>,
    /// Record of all requests made
    requests: Mutex<Vec<LlmRequest>>,
}

impl MockLlmClient {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            responses: Mutex::new(VecDeque::new()),
            streams: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a successful completion
    pub fn queue_response(&self, response: LlmResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    /// Queue a plain-text completion
    pub fn queue_text(&self, text: &str) {
        self.queue_response(LlmResponse {
            content: vec![ContentBlock::text(text)],
            usage: Usage::default(),
        });
    }

    /// Queue a failed completion
    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    /// Queue a stream delivering the given chunks
    pub fn queue_stream<I, S>(&self, chunks: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let chunks = chunks.into_iter().map(|c| Ok(c.into())).collect();
        self.streams.lock().unwrap().push_back(Ok(chunks));
    }

    /// Queue a stream that delivers some chunks, then fails
    pub fn queue_stream_failing_after<I, S>(&self, chunks: I, error: LlmError)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut items: Vec<_> = chunks.into_iter().map(|c| Ok(c.into())).collect();
        items.push(Err(error));
        self.streams.lock().unwrap().push_back(Ok(items));
    }

    /// Queue a stream that fails to open
    pub fn queue_stream_error(&self, error: LlmError) {
        self.streams.lock().unwrap().push_back(Err(error));
    }

    /// Get recorded requests
    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmService for MockLlmClient {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::network("No mock response queued")))
    }

    async fn stream(&self, request: &LlmRequest) -> Result<LlmStream, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        let script = self
            .streams
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::network("No mock stream queued")))?;
        Ok(Box::pin(futures::stream::iter(script)))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// ============================================================================
// Mock Document Extractor
// ============================================================================

/// Extractor with per-path outcomes; unknown paths are not found
#[derive(Default)]
pub struct MockExtractor {
    texts: HashMap<String, String>,
    failures: Vec<String>,
}

impl MockExtractor {
    pub fn descriptor(id: i64, path: &str) -> DocumentDescriptor {
        DocumentDescriptor {
            id,
            patient_file_id: 1,
            path: path.to_string(),
            kind: "Arztbrief".to_string(),
            description: format!("Dokument {id}"),
        }
    }

    pub fn with_text(mut self, path: &str, text: &str) -> Self {
        self.texts.insert(path.to_string(), text.to_string());
        self
    }

    /// Make `path` fail with an I/O error
    pub fn with_failure(mut self, path: &str) -> Self {
        self.failures.push(path.to_string());
        self
    }

    fn lookup(&self, doc: &DocumentDescriptor) -> Result<&str, ExtractionError> {
        if self.failures.contains(&doc.path) {
            return Err(ExtractionError::Io(std::io::Error::other("disk on fire")));
        }
        self.texts
            .get(&doc.path)
            .map(String::as_str)
            .ok_or_else(|| ExtractionError::NotFound(doc.path.clone()))
    }
}

#[async_trait]
impl DocumentExtractor for MockExtractor {
    async fn extract_text(&self, doc: &DocumentDescriptor) -> Result<String, ExtractionError> {
        self.lookup(doc).map(str::to_string)
    }

    async fn read_blob(&self, doc: &DocumentDescriptor) -> Result<Vec<u8>, ExtractionError> {
        self.lookup(doc).map(|text| text.as_bytes().to_vec())
    }
}

// ============================================================================
// Node harness
// ============================================================================

/// Collaborators for running a single node outside the executor
pub struct NodeHarness {
    pub llm: Arc<MockLlmClient>,
    extractor: Arc<MockExtractor>,
    tools: ToolInvoker,
    sink: OutputSink,
    rx: mpsc::Receiver<OutputUnit>,
    cancel: CancellationToken,
}

impl NodeHarness {
    pub fn new(llm: MockLlmClient) -> Self {
        Self::with_extractor(llm, MockExtractor::default())
    }

    pub fn with_extractor(llm: MockLlmClient, extractor: MockExtractor) -> Self {
        let (tx, rx) = mpsc::channel(256);
        let extractor = Arc::new(extractor);
        Self {
            llm: Arc::new(llm),
            tools: ToolInvoker::for_patient(Vec::new(), extractor.clone()),
            extractor,
            sink: OutputSink::new(tx),
            rx,
            cancel: CancellationToken::new(),
        }
    }

    /// Tool invoker bound to the documents of `state`
    pub fn invoker_for(&self, state: &TurnState) -> ToolInvoker {
        ToolInvoker::for_patient(state.documents().to_vec(), self.extractor.clone())
    }

    /// Context with a tool invoker bound to no documents
    pub fn context(&self) -> NodeContext<'_> {
        self.context_with(&self.tools)
    }

    pub fn context_with<'a>(&'a self, tools: &'a ToolInvoker) -> NodeContext<'a> {
        NodeContext {
            llm: self.llm.clone(),
            tools,
            output: &self.sink,
            cancel: self.cancel.clone(),
        }
    }

    /// Everything the node has emitted so far
    pub fn drain_output(&mut self) -> Vec<OutputUnit> {
        let mut units = Vec::new();
        while let Ok(unit) = self.rx.try_recv() {
            units.push(unit);
        }
        units
    }
}
