//! HTTP request handlers

use super::sse::{text_sse, turn_sse};
use super::types::{
    ChatRequest, ErrorResponse, EvalRequest, ModelInfo, ModelsResponse, ResetResponse,
};
use super::AppState;
use crate::db::{format_patient_details, DbError, MessageRole};
use crate::evaluation::{stream_evaluation, transcript};
use crate::llm::{find_model, ModelRegistry};
use crate::persona::{Condition, TALKATIVENESS_VALUES};
use crate::turn::TurnRequest;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Streamed chat turn
        .route("/api/chat", post(chat))
        .route("/api/eval", post(eval_chat))
        .route("/api/reset/:session_id", post(reset_session))
        .route("/api/models", get(list_models))
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Chat
// ============================================================

async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Response, AppError> {
    let model_id = validate_chat(&req, &state.llm_registry)?;

    let patient = state.db.get_patient_file(req.patient_file_id).map_err(db_error)?;
    state
        .db
        .get_or_create_session(&req.session_id, patient.id)
        .map_err(db_error)?;

    let prior_messages = state
        .db
        .get_messages(&req.session_id)
        .map_err(db_error)?
        .iter()
        .map(crate::db::StoredMessage::to_turn_message)
        .collect();
    let documents = state.db.list_patient_documents(patient.id).map_err(db_error)?;

    state
        .db
        .add_message(&req.session_id, MessageRole::User, &req.message)
        .map_err(db_error)?;

    tracing::info!(
        session_id = %req.session_id,
        patient_file_id = patient.id,
        model = %model_id,
        condition = %req.condition,
        documents = documents.len(),
        "Starting turn"
    );

    let turn = state.executor.run_turn(TurnRequest {
        user_message: req.message,
        model_id,
        persona_condition: req.condition,
        talkativeness: req.talkativeness,
        patient_details: format_patient_details(&patient),
        patient_document_index: documents,
        prior_messages,
    });

    Ok(turn_sse(turn, state.db.clone(), req.session_id).into_response())
}

/// Check a chat request and pick the model it runs on
fn validate_chat(req: &ChatRequest, registry: &ModelRegistry) -> Result<String, AppError> {
    if req.message.trim().is_empty() {
        return Err(AppError::BadRequest("Message must not be empty".to_string()));
    }
    if req.session_id.trim().is_empty() {
        return Err(AppError::BadRequest("Session id must not be empty".to_string()));
    }

    if !registry.has_model(&req.model) {
        return Err(AppError::BadRequest(format!("Unknown model: {}", req.model)));
    }

    if Condition::parse(&req.condition).is_none() {
        return Err(AppError::BadRequest(format!(
            "Unknown condition: {}",
            req.condition
        )));
    }
    if !TALKATIVENESS_VALUES.contains(&req.talkativeness.as_str()) {
        return Err(AppError::BadRequest(format!(
            "Unknown talkativeness: {}",
            req.talkativeness
        )));
    }

    Ok(req.model.clone())
}

// ============================================================
// Evaluation
// ============================================================

async fn eval_chat(
    State(state): State<AppState>,
    Json(req): Json<EvalRequest>,
) -> Result<Response, AppError> {
    let Some(transcript) = transcript(&req.messages) else {
        return Err(AppError::BadRequest(
            "Conversation has no messages to evaluate".to_string(),
        ));
    };

    let model_id = state.llm_registry.default_model_id();
    let Some(llm) = state.llm_registry.resolve(model_id) else {
        return Err(AppError::Internal("No model configured".to_string()));
    };

    tracing::info!(model = %model_id, messages = req.messages.len(), "Evaluating conversation");
    Ok(text_sse(stream_evaluation(llm, &transcript)).into_response())
}

// ============================================================
// Sessions
// ============================================================

async fn reset_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ResetResponse>, AppError> {
    let reset = state.db.reset_session(&session_id).map_err(db_error)?;
    tracing::info!(session_id = %session_id, reset, "Session reset");
    Ok(Json(ResetResponse { reset }))
}

// ============================================================
// Model Info
// ============================================================

async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    let models = state
        .llm_registry
        .available_models()
        .into_iter()
        .map(|id| ModelInfo {
            description: find_model(&id)
                .map(|m| m.description.to_string())
                .unwrap_or_default(),
            id,
        })
        .collect();

    Json(ModelsResponse {
        models,
        default: state.llm_registry.default_model_id().to_string(),
    })
}

// ============================================================
// Version
// ============================================================

async fn get_version() -> &'static str {
    concat!("symptex ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

fn db_error(e: DbError) -> AppError {
    match e {
        DbError::PatientNotFound(_) => AppError::NotFound(e.to_string()),
        DbError::SessionPatientMismatch { .. } => AppError::BadRequest(e.to_string()),
        DbError::Sqlite(_) | DbError::Seed(_) => {
            tracing::error!(error = %e, "Database failure");
            AppError::Internal(e.to_string())
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmService;
    use crate::turn::testing::MockLlmClient;
    use std::sync::Arc;

    fn registry() -> ModelRegistry {
        let services: Vec<Arc<dyn LlmService>> = vec![
            Arc::new(MockLlmClient::new("qwq-32b")),
            Arc::new(MockLlmClient::new("llama-3.3-70b-instruct")),
        ];
        ModelRegistry::from_services(services, "llama-3.3-70b-instruct")
    }

    fn request(message: &str) -> ChatRequest {
        ChatRequest {
            message: message.to_string(),
            model: "llama-3.3-70b-instruct".to_string(),
            condition: "alzheimer".to_string(),
            talkativeness: "kurz angebunden".to_string(),
            patient_file_id: 1,
            session_id: "s1".to_string(),
        }
    }

    #[test]
    fn test_valid_request_runs_requested_model() {
        assert_eq!(
            validate_chat(&request("Hallo"), &registry()).unwrap(),
            "llama-3.3-70b-instruct"
        );

        let mut req = request("Hallo");
        req.model = "qwq-32b".to_string();
        assert_eq!(validate_chat(&req, &registry()).unwrap(), "qwq-32b");
    }

    #[test]
    fn test_model_must_be_known() {
        for model in ["gpt-9", ""] {
            let mut req = request("Hallo");
            req.model = model.to_string();
            assert!(matches!(
                validate_chat(&req, &registry()),
                Err(AppError::BadRequest(_))
            ));
        }
    }

    #[test]
    fn test_rejects_blank_message() {
        assert!(matches!(
            validate_chat(&request("   "), &registry()),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn test_rejects_unknown_persona_settings() {
        let mut req = request("Hallo");
        req.condition = "schizophrenie".to_string();
        assert!(validate_chat(&req, &registry()).is_err());

        let mut req = request("Hallo");
        req.talkativeness = "sehr gesprächig".to_string();
        assert!(validate_chat(&req, &registry()).is_err());

        let mut req = request("Hallo");
        req.condition = "schwerhoerig".to_string();
        assert!(validate_chat(&req, &registry()).is_ok());
    }

    #[test]
    fn test_db_error_mapping() {
        assert!(matches!(
            db_error(DbError::PatientNotFound(7)),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            db_error(DbError::SessionPatientMismatch {
                session_id: "s".to_string(),
                patient_file_id: 2
            }),
            AppError::BadRequest(_)
        ));
    }
}
