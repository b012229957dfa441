//! Load every document of the current patient

use super::{Tool, ToolContext, ToolOutput};
use crate::documents::extract_sections;
use async_trait::async_trait;
use serde_json::{json, Value};

/// Loads the full document set of the patient.
///
/// The model may name specific files, but the arguments are ignored: the
/// tool always returns the documents bound to the turn.
pub struct LoadPatientDocsTool;

#[async_trait]
impl Tool for LoadPatientDocsTool {
    fn name(&self) -> &'static str {
        "load_patient_docs"
    }

    fn description(&self) -> String {
        "Load the content of the patient's medical documents (doctor's letters, lab results, \
         reports). Use when the doctor asks about diagnoses, findings, medication or other \
         facts recorded in the patient file."
            .to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_paths": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Documents to load"
                }
            }
        })
    }

    async fn run(&self, _input: Value, ctx: ToolContext) -> ToolOutput {
        if ctx.cancel.is_cancelled() {
            return ToolOutput::error("cancelled");
        }
        if ctx.documents.is_empty() {
            return ToolOutput::success("Keine Dokumente vorhanden.");
        }

        let sections = extract_sections(ctx.extractor(), &ctx.documents).await;
        ToolOutput::success(sections.join("\n\n"))
    }
}
