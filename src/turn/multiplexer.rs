//! Splits visible model output into text and structured events

use serde_json::Value;

use crate::documents::AttachedDocument;

/// Upper bound on a buffered JSON candidate before it is treated as prose
const MAX_EVENT_BYTES: usize = 16 * 1024;

/// One item of turn output
#[derive(Debug, Clone, PartialEq)]
pub enum OutputUnit {
    Text(String),
    Event(TurnEvent),
}

impl OutputUnit {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }
}

/// Structured output relayed next to the text
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    /// Documents the reply was based on
    DocumentsAttached { documents: Vec<AttachedDocument> },
    /// A JSON object the model emitted instead of prose
    Structured(Value),
}

/// Classifies filtered model output at chunk boundaries.
///
/// A segment that starts with `{` is held back while it could still become
/// a complete JSON object. Once it parses it is emitted as an event; as soon
/// as it cannot parse it is released as text. Events arrive on a single line,
/// so an unfinished candidate that already spans a line break is prose.
#[derive(Debug, Default)]
pub struct Multiplexer {
    buffer: String,
}

impl Multiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed visible text from one chunk
    pub fn push(&mut self, visible: &str) -> Option<OutputUnit> {
        self.buffer.push_str(visible);

        let candidate = self.buffer.trim();
        if candidate.is_empty() {
            return None;
        }

        if candidate.starts_with('{') {
            match serde_json::from_str::<Value>(candidate) {
                Ok(value) if value.is_object() => {
                    self.buffer.clear();
                    return Some(OutputUnit::Event(TurnEvent::Structured(value)));
                }
                Err(e)
                    if e.is_eof()
                        && !self.buffer.contains('\n')
                        && self.buffer.len() < MAX_EVENT_BYTES =>
                {
                    return None;
                }
                _ => {}
            }
        }

        Some(OutputUnit::Text(std::mem::take(&mut self.buffer)))
    }

    /// Release whatever is still held back as text
    pub fn finish(&mut self) -> Option<OutputUnit> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(OutputUnit::Text(std::mem::take(&mut self.buffer)))
        }
    }

    /// Turn the documents-attached signal into an event; nothing for an empty set
    pub fn documents_attached(documents: Vec<AttachedDocument>) -> Option<OutputUnit> {
        if documents.is_empty() {
            None
        } else {
            Some(OutputUnit::Event(TurnEvent::DocumentsAttached { documents }))
        }
    }
}
