//! Tools the orchestrator may request mid-turn
//!
//! Tools are stateless; everything a call needs arrives in a
//! [`ToolContext`] built by the per-turn [`ToolInvoker`].

mod load_patient_docs;

pub use load_patient_docs::LoadPatientDocsTool;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::documents::{DocumentDescriptor, DocumentExtractor};
use crate::llm::ToolDefinition;

/// Result from tool execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub success: bool,
    pub output: String,
}

impl ToolOutput {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: message.into(),
        }
    }
}

/// All context needed for a tool invocation.
///
/// Created fresh for each call from the turn's document index.
#[derive(Clone)]
pub struct ToolContext {
    /// Cancellation signal for long-running operations
    pub cancel: CancellationToken,

    /// Documents bound to the current patient
    pub documents: Arc<[DocumentDescriptor]>,

    extractor: Arc<dyn DocumentExtractor>,
}

impl ToolContext {
    pub fn new(
        cancel: CancellationToken,
        documents: Arc<[DocumentDescriptor]>,
        extractor: Arc<dyn DocumentExtractor>,
    ) -> Self {
        Self {
            cancel,
            documents,
            extractor,
        }
    }

    pub fn extractor(&self) -> &dyn DocumentExtractor {
        self.extractor.as_ref()
    }
}

/// Trait for tools that can be requested by the model
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name
    fn name(&self) -> &str;

    /// Tool description for the model
    fn description(&self) -> String;

    /// JSON schema for tool input
    fn input_schema(&self) -> Value;

    /// Execute the tool with all context provided via `ToolContext`
    async fn run(&self, input: Value, ctx: ToolContext) -> ToolOutput;
}

/// Tools bound to one patient's documents for the duration of a turn
pub struct ToolInvoker {
    tools: Vec<Arc<dyn Tool>>,
    documents: Arc<[DocumentDescriptor]>,
    extractor: Arc<dyn DocumentExtractor>,
}

impl ToolInvoker {
    /// Standard tool set for a patient
    pub fn for_patient(
        documents: Vec<DocumentDescriptor>,
        extractor: Arc<dyn DocumentExtractor>,
    ) -> Self {
        Self {
            tools: vec![Arc::new(LoadPatientDocsTool)],
            documents: documents.into(),
            extractor,
        }
    }

    /// Get all tool definitions for the model
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    /// Execute a tool by name; `None` if no such tool exists
    pub async fn invoke(
        &self,
        name: &str,
        input: Value,
        cancel: CancellationToken,
    ) -> Option<ToolOutput> {
        let tool = self.tools.iter().find(|t| t.name() == name)?;
        let ctx = ToolContext::new(cancel, self.documents.clone(), self.extractor.clone());
        Some(tool.run(input, ctx).await)
    }
}
