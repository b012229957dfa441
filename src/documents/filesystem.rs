//! Documents stored below a local directory

use super::pdf::extract_pdf_text;
use super::{DocumentDescriptor, DocumentExtractor, ExtractionError};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

/// Reads documents relative to a fixed root directory.
///
/// PDFs are parsed page by page and plain-text files are read as UTF-8.
/// Other binary formats report [`ExtractionError::Unsupported`] for text but
/// are still readable as blobs.
pub struct FsDocumentExtractor {
    root: PathBuf,
}

impl FsDocumentExtractor {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Join `path` onto the root, refusing anything that could leave it
    fn resolve(&self, path: &str) -> Result<PathBuf, ExtractionError> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if path.is_empty() || escapes {
            return Err(ExtractionError::NotFound(path.to_string()));
        }
        Ok(self.root.join(relative))
    }

    async fn read(&self, doc: &DocumentDescriptor) -> Result<Vec<u8>, ExtractionError> {
        let full = self.resolve(&doc.path)?;
        match tokio::fs::read(&full).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ExtractionError::NotFound(doc.path.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl DocumentExtractor for FsDocumentExtractor {
    async fn extract_text(&self, doc: &DocumentDescriptor) -> Result<String, ExtractionError> {
        let is_pdf = Path::new(&doc.path)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        let bytes = self.read(doc).await?;
        if is_pdf {
            return tokio::task::spawn_blocking(move || extract_pdf_text(&bytes))
                .await
                .map_err(|e| ExtractionError::Pdf(e.to_string()))?;
        }

        String::from_utf8(bytes)
            .map_err(|_| ExtractionError::Unsupported(format!("{} is not UTF-8 text", doc.path)))
    }

    async fn read_blob(&self, doc: &DocumentDescriptor) -> Result<Vec<u8>, ExtractionError> {
        self.read(doc).await
    }
}
