//! HTTP API
//!
//! Chat turns are streamed as Server-Sent Events; sessions can be reset and
//! the model catalogue listed.

mod handlers;
mod sse;
mod types;

pub use handlers::create_router;

use crate::db::Database;
use crate::llm::ModelRegistry;
use crate::turn::TurnExecutor;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub llm_registry: Arc<ModelRegistry>,
    pub executor: TurnExecutor,
}

impl AppState {
    pub fn new(db: Database, llm_registry: Arc<ModelRegistry>, executor: TurnExecutor) -> Self {
        Self {
            db,
            llm_registry,
            executor,
        }
    }
}
