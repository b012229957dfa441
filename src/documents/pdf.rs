//! Text extraction from PDF patient documents

use super::ExtractionError;
use lopdf::Document;

/// Extract the text of every page.
///
/// Each page becomes a `--- PAGE n ---` block followed by its text and one
/// `[IMAGE i ON PAGE n]` marker per embedded image. Pages are separated by a
/// blank line.
pub fn extract_pdf_text(bytes: &[u8]) -> Result<String, ExtractionError> {
    let doc = Document::load_mem(bytes).map_err(|e| ExtractionError::Pdf(e.to_string()))?;

    let mut pages = Vec::new();
    for (page_no, page_id) in doc.get_pages() {
        let mut text = doc.extract_text(&[page_no]).unwrap_or_else(|e| {
            tracing::debug!(page = page_no, error = %e, "No text on page");
            String::new()
        });

        let images = doc.get_page_images(page_id).map_or(0, |images| images.len());
        for index in 1..=images {
            text.push_str(&format!("\n[IMAGE {index} ON PAGE {page_no}]\n"));
        }

        pages.push(format!("--- PAGE {page_no} ---\n{text}"));
    }

    Ok(pages.join("\n\n"))
}
