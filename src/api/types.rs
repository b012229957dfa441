//! API request and response types

use serde::{Deserialize, Serialize};

use crate::evaluation::EvalMessage;

/// Request to run one chat turn
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub model: String,
    pub condition: String,
    pub talkativeness: String,
    pub patient_file_id: i64,
    pub session_id: String,
}

/// Request to assess a conversation
#[derive(Debug, Deserialize)]
pub struct EvalRequest {
    pub messages: Vec<EvalMessage>,
}

/// Response for session reset
#[derive(Debug, Serialize)]
pub struct ResetResponse {
    /// Whether a session was deleted
    pub reset: bool,
}

/// Model information with metadata
#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub description: String,
}

/// Response for model list
#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelInfo>,
    pub default: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
