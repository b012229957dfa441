//! Patient documents
//!
//! Descriptors come from the session store; their content is read through a
//! [`DocumentExtractor`]. Retrieval renders extracted text into delimited
//! sections for the model, while attachments carry the raw bytes back to
//! the caller.

mod filesystem;
mod pdf;

pub use filesystem::FsDocumentExtractor;

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::turn::TurnError;

/// A document available to the current patient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentDescriptor {
    pub id: i64,
    pub patient_file_id: i64,
    /// Location relative to the document root
    pub path: String,
    /// Document type, e.g. "Arztbrief" or "Laborbefund"
    pub kind: String,
    pub description: String,
}

impl DocumentDescriptor {
    /// Final path component, used as the attachment filename
    pub fn filename(&self) -> &str {
        Path::new(&self.path)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(&self.path)
    }
}

/// Failure to read a single document
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("document not found: {0}")]
    NotFound(String),

    #[error("unsupported document format: {0}")]
    Unsupported(String),

    #[error("unreadable PDF: {0}")]
    Pdf(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reads document content on behalf of retrieval and attachments
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    /// Extract the plain text of a document
    async fn extract_text(&self, doc: &DocumentDescriptor) -> Result<String, ExtractionError>;

    /// Read the raw bytes of a document
    async fn read_blob(&self, doc: &DocumentDescriptor) -> Result<Vec<u8>, ExtractionError>;
}

/// Document payload relayed to the user alongside the reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachedDocument {
    pub filename: String,
    pub content_b64: String,
}

/// Wrap extracted text in the delimiters the prompts refer to
pub fn document_section(doc: &DocumentDescriptor, text: &str) -> String {
    format!(
        "--- BEGIN DOCUMENT: {} ({}) ---\n{}\n--- END DOCUMENT ---",
        doc.kind, doc.description, text
    )
}

/// Stand-in for a document that could not be read
pub fn error_placeholder(error: &ExtractionError) -> String {
    format!("[Fehler beim Laden des Dokuments: {error}]")
}

/// Extract every document into its own section.
///
/// A failing document contributes a placeholder section; this never fails
/// as a whole.
pub async fn extract_sections(
    extractor: &dyn DocumentExtractor,
    docs: &[DocumentDescriptor],
) -> Vec<String> {
    let mut sections = Vec::with_capacity(docs.len());
    for doc in docs {
        let text = match extractor.extract_text(doc).await {
            Ok(text) => text,
            Err(e) => {
                let placeholder = error_placeholder(&e);
                let error = TurnError::Extraction(e);
                tracing::warn!(
                    document_id = doc.id,
                    path = %doc.path,
                    error = %error,
                    "Document extraction failed"
                );
                placeholder
            }
        };
        sections.push(document_section(doc, &text));
    }
    sections
}

/// Load every readable document as a base64 attachment; unreadable ones are skipped
pub async fn load_attachments(
    extractor: &dyn DocumentExtractor,
    docs: &[DocumentDescriptor],
) -> Vec<AttachedDocument> {
    let mut attached = Vec::with_capacity(docs.len());
    for doc in docs {
        match extractor.read_blob(doc).await {
            Ok(bytes) => attached.push(AttachedDocument {
                filename: doc.filename().to_string(),
                content_b64: base64::engine::general_purpose::STANDARD.encode(bytes),
            }),
            Err(e) => {
                tracing::warn!(
                    document_id = doc.id,
                    path = %doc.path,
                    error = %e,
                    "Skipping attachment"
                );
            }
        }
    }
    attached
}

/// Render the document index for the persona prompt.
///
/// Only kind and description are shown; ids and storage paths stay internal.
pub fn render_document_index(docs: &[DocumentDescriptor]) -> String {
    if docs.is_empty() {
        return "Keine Dokumente vorhanden.".to_string();
    }
    docs.iter()
        .map(|doc| format!("- {}: {}", doc.kind, doc.description))
        .collect::<Vec<_>>()
        .join("\n")
}
