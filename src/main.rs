//! Symptex - simulated patient for anamnesis training
//!
//! Serves a chat API where a language model plays a patient. Each doctor
//! message runs a short node graph that may pull the patient's documents
//! before the persona answers.

mod api;
mod config;
mod db;
mod documents;
mod evaluation;
mod llm;
mod persona;
mod tools;
mod turn;

use api::{create_router, AppState};
use config::AppConfig;
use db::Database;
use documents::FsDocumentExtractor;
use llm::{LlmConfig, ModelRegistry};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use turn::TurnExecutor;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "symptex=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = AppConfig::from_env();

    // Ensure database directory exists
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.db_path.display(), "Opening database");
    let db = Database::open(&config.db_path)?;

    if let Some(seed) = &config.seed_file {
        db.seed_from_file(seed)?;
    }

    // Initialize LLM registry
    let llm_config = LlmConfig::from_env();
    let llm_registry = Arc::new(ModelRegistry::new(&llm_config));

    if llm_registry.has_models() {
        tracing::info!(
            models = ?llm_registry.available_models(),
            default = %llm_registry.default_model_id(),
            "LLM registry initialized"
        );
    } else {
        tracing::warn!("No models configured. Set CHATAI_API_URL and CHATAI_API_KEY.");
    }

    tracing::info!(root = %config.anamnesis_dir.display(), "Serving patient documents");
    let extractor = Arc::new(FsDocumentExtractor::new(config.anamnesis_dir.clone()));
    let executor = TurnExecutor::new(llm_registry.clone(), extractor);

    let state = AppState::new(db, llm_registry, executor);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Symptex server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
