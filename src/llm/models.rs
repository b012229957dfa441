//! Model catalogue
//!
//! Every model is served by the same OpenAI-compatible gateway; the
//! catalogue only pins user-facing ids to gateway names.

/// Model definition with metadata
#[derive(Debug, Clone)]
pub struct ModelDef {
    /// User-facing model ID, also accepted by the chat endpoint
    pub id: &'static str,
    /// Name the gateway expects in the `model` field
    pub api_name: &'static str,
    /// Human-readable description
    pub description: &'static str,
}

/// Fallback when `DEFAULT_MODEL` is not set
pub const DEFAULT_MODEL_ID: &str = "llama-3.3-70b-instruct";

/// Get all available model definitions
pub fn all_models() -> &'static [ModelDef] {
    &[
        ModelDef {
            id: "gemma-3-27b-it",
            api_name: "gemma-3-27b-it",
            description: "Gemma 3 27B instruction tuned",
        },
        ModelDef {
            id: "llama-3.3-70b-instruct",
            api_name: "llama-3.3-70b-instruct",
            description: "Llama 3.3 70B instruct",
        },
        ModelDef {
            id: "llama-3.1-sauerkrautlm-70b-instruct",
            api_name: "llama-3.1-sauerkrautlm-70b-instruct",
            description: "Llama 3.1 SauerkrautLM 70B (German fine-tune)",
        },
        ModelDef {
            id: "qwq-32b",
            api_name: "qwq-32b",
            description: "QwQ 32B reasoning model",
        },
        ModelDef {
            id: "mistral-large-instruct",
            api_name: "mistral-large-instruct",
            description: "Mistral Large instruct",
        },
        ModelDef {
            id: "qwen3-235b-a22b",
            api_name: "qwen3-235b-a22b",
            description: "Qwen3 235B A22B (emits reasoning markup)",
        },
    ]
}

/// Look up a model definition by its user-facing id
pub fn find_model(id: &str) -> Option<&'static ModelDef> {
    all_models().iter().find(|m| m.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_model_ids_unique() {
        let ids: HashSet<_> = all_models().iter().map(|m| m.id).collect();
        assert_eq!(ids.len(), all_models().len());
    }

    #[test]
    fn test_default_model_in_catalogue() {
        assert!(find_model(DEFAULT_MODEL_ID).is_some());
        assert!(find_model("gpt-4o").is_none());
    }
}
