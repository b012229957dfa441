//! Turn execution engine
//!
//! A turn is one doctor message answered by the patient persona. The
//! executor walks a fixed graph of nodes over a per-turn [`TurnState`]:
//! orchestrator, then either straight to the response or through retrieval
//! and summarization first. Output is streamed as [`OutputUnit`]s.

mod executor;
mod multiplexer;
pub mod nodes;
mod reasoning;
mod router;
mod state;

#[cfg(test)]
mod proptests;
#[cfg(test)]
pub mod testing;

pub use executor::{TurnExecutor, TurnStream};
pub use multiplexer::{Multiplexer, OutputUnit, TurnEvent};
pub use reasoning::{strip_reasoning, ReasoningFilter};
pub use router::{route, Route};
pub use state::{ChatMessage, StateUpdate, ToolRequest, TurnRequest, TurnState};

use thiserror::Error;

use crate::documents::ExtractionError;
use crate::llm::LlmError;

/// Shown to the user whenever a turn cannot produce a real reply
pub const APOLOGY: &str =
    "Entschuldigung, ein Fehler ist aufgetreten. Bitte versuchen Sie es erneut.";

/// Failures inside a turn. Each is recovered by the node that sees it;
/// none leaves the executor.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("model unavailable: {0}")]
    ModelUnavailable(#[from] LlmError),

    #[error("document extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("unknown tool requested: {0}")]
    UnknownToolRequested(String),

    #[error("output consumer disconnected")]
    Disconnected,
}
