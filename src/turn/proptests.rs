//! Property-based tests for the turn engine
//!
//! - Reasoning markup never reaches the output, however the stream is split
//! - Routing is a pure function of the state
//! - Merging updates never loses or reorders conversation entries
//! - Prose passes through the multiplexer unchanged

use super::{
    route, ChatMessage, Multiplexer, OutputUnit, ReasoningFilter, StateUpdate, ToolRequest,
    TurnState,
};
use super::testing::turn_request;
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

/// Split `text` at the given (unsorted, possibly repeated) byte offsets
fn split_at_offsets(text: &str, mut offsets: Vec<usize>) -> Vec<String> {
    offsets.iter_mut().for_each(|o| *o %= text.len() + 1);
    offsets.sort_unstable();
    offsets.dedup();

    let mut chunks = Vec::new();
    let mut start = 0;
    for offset in offsets {
        chunks.push(text.get(start..offset).unwrap_or_default().to_string());
        start = offset;
    }
    chunks.push(text.get(start..).unwrap_or_default().to_string());
    chunks
}

fn arb_message() -> impl Strategy<Value = ChatMessage> {
    prop_oneof![
        "[a-zA-Z ?]{1,20}".prop_map(ChatMessage::User),
        "[a-zA-Z .]{1,20}".prop_map(ChatMessage::Assistant),
        (0u8..4, "[a-zA-Z ]{0,20}").prop_map(|(id, content)| ChatMessage::ToolResult {
            call_id: format!("call-{id}"),
            tool: "load_patient_docs".to_string(),
            content,
        }),
    ]
}

#[derive(Debug, Clone)]
struct ArbUpdate {
    messages: Vec<ChatMessage>,
    pending: usize,
    attach: bool,
    terminate: bool,
}

fn arb_update() -> impl Strategy<Value = ArbUpdate> {
    (
        proptest::collection::vec(arb_message(), 0..4),
        0usize..3,
        any::<bool>(),
        proptest::bool::weighted(0.1),
    )
        .prop_map(|(messages, pending, attach, terminate)| ArbUpdate {
            messages,
            pending,
            attach,
            terminate,
        })
}

fn to_state_update(arb: &ArbUpdate) -> StateUpdate {
    let requests = (0..arb.pending)
        .map(|i| ToolRequest {
            id: format!("req-{i}"),
            name: "load_patient_docs".to_string(),
            input: serde_json::json!({}),
        })
        .collect();
    let mut update = StateUpdate::new()
        .with_messages(arb.messages.clone())
        .with_pending_tool_requests(requests);
    if arb.attach {
        update = update.attach_documents();
    }
    if arb.terminate {
        update = update.terminate();
    }
    update
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn reasoning_never_leaks(
        prefix in "[a-zA-Z0-9 .,!?]{0,40}",
        secret in "[a-zA-Z0-9 .,<>/]{0,80}",
        suffix in "[a-zA-Z0-9.,!?][a-zA-Z0-9 .,!?]{0,40}",
        offsets in proptest::collection::vec(any::<usize>(), 0..12),
    ) {
        prop_assume!(!secret.contains("</think>"));
        let text = format!("{prefix}<think>GEHEIM{secret}</think>{suffix}");

        let mut filter = ReasoningFilter::new();
        let mut output = String::new();
        for chunk in split_at_offsets(&text, offsets) {
            let visible = filter.push(&chunk).unwrap();
            prop_assert!(!visible.contains("GEHEIM"));
            output.push_str(&visible);
        }
        output.push_str(&filter.finish());

        prop_assert_eq!(output, format!("{prefix}{suffix}"));
    }

    #[test]
    fn plain_text_survives_any_split(
        text in "[a-zA-Z0-9 .,!?<>/]{0,120}",
        offsets in proptest::collection::vec(any::<usize>(), 0..12),
    ) {
        prop_assume!(!text.contains("<think>"));
        let mut filter = ReasoningFilter::new();
        let mut output = String::new();
        for chunk in split_at_offsets(&text, offsets) {
            output.push_str(&filter.push(&chunk).unwrap());
        }
        output.push_str(&filter.finish());
        prop_assert_eq!(output, text);
    }

    #[test]
    fn routing_is_idempotent(updates in proptest::collection::vec(arb_update(), 0..6)) {
        let mut state = TurnState::new(turn_request("Hallo"));
        for update in &updates {
            state.apply(to_state_update(update));
            let first = route(&state);
            prop_assert_eq!(first, route(&state));
            prop_assert_eq!(first, route(&state.clone()));
        }
    }

    #[test]
    fn merge_preserves_history(updates in proptest::collection::vec(arb_update(), 0..8)) {
        let mut state = TurnState::new(turn_request("Hallo"));
        for update in &updates {
            let before = state.messages().to_vec();
            state.apply(to_state_update(update));
            let after = state.messages();

            prop_assert!(after.len() >= before.len());
            for (old, new) in before.iter().zip(after) {
                if old.is_tool_result() {
                    prop_assert!(new.is_tool_result());
                } else {
                    prop_assert_eq!(old, new);
                }
            }
        }
    }

    #[test]
    fn prose_passes_multiplexer_unchanged(
        chunks in proptest::collection::vec("[a-zA-Z .,!?]{0,15}", 0..10),
    ) {
        let mut mux = Multiplexer::new();
        let mut text = String::new();
        for chunk in &chunks {
            if let Some(OutputUnit::Text(t)) = mux.push(chunk) {
                text.push_str(&t);
            }
        }
        if let Some(OutputUnit::Text(t)) = mux.finish() {
            text.push_str(&t);
        }
        prop_assert_eq!(text, chunks.concat());
    }
}
