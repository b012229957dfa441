//! Server-Sent Events for streamed turns

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream, StreamExt};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::time::Duration;

use crate::db::{Database, MessageRole};
use crate::turn::{OutputUnit, TurnEvent, TurnStream};

/// Relay a running turn to the client.
///
/// The response body owns the turn: when the client goes away the body is
/// dropped, the turn is cancelled and nothing is persisted.
pub fn turn_sse(
    turn: TurnStream,
    db: Database,
    session_id: String,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = relay_events(turn, db, session_id).map(Ok::<_, Infallible>);
    Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

/// Relay plain text chunks, one text event each
pub fn text_sse(
    text: impl Stream<Item = String> + Send + 'static,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = text.map(|t| Ok::<_, Infallible>(unit_to_event(OutputUnit::Text(t))));
    Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

struct Relay {
    turn: TurnStream,
    db: Database,
    session_id: String,
}

/// One event per output unit. Once the turn's output is exhausted its reply
/// is stored as the patient's message.
fn relay_events(turn: TurnStream, db: Database, session_id: String) -> impl Stream<Item = Event> {
    let relay = Relay {
        turn,
        db,
        session_id,
    };

    stream::unfold(relay, |mut relay| async move {
        match relay.turn.next().await {
            Some(unit) => Some((unit_to_event(unit), relay)),
            None => {
                relay.persist_reply().await;
                None
            }
        }
    })
}

impl Relay {
    async fn persist_reply(self) {
        let Some(state) = self.turn.finish().await else {
            tracing::warn!(session_id = %self.session_id, "Turn ended without a final state");
            return;
        };

        let Some(reply) = state.reply().filter(|r| !r.is_empty()) else {
            return;
        };
        if let Err(e) = self.db.add_message(&self.session_id, MessageRole::Patient, reply) {
            tracing::error!(session_id = %self.session_id, error = %e, "Failed to persist reply");
        }
    }
}

fn unit_to_event(unit: OutputUnit) -> Event {
    let (event_type, data) = unit_payload(unit);
    Event::default().event(event_type).data(data.to_string())
}

fn unit_payload(unit: OutputUnit) -> (&'static str, Value) {
    match unit {
        OutputUnit::Text(text) => ("text", json!({ "type": "text", "text": text })),
        OutputUnit::Event(TurnEvent::DocumentsAttached { documents }) => (
            "documents",
            json!({ "type": "documents", "documents": documents }),
        ),
        OutputUnit::Event(TurnEvent::Structured(payload)) => {
            ("event", json!({ "type": "event", "payload": payload }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewPatientFile;
    use crate::documents::AttachedDocument;
    use crate::llm::{ContentBlock, LlmResponse, LlmService, ModelRegistry, Usage};
    use crate::turn::testing::{turn_request, turn_request_with_docs, MockExtractor, MockLlmClient};
    use crate::turn::TurnExecutor;
    use std::sync::Arc;

    fn executor(llm: MockLlmClient) -> (TurnExecutor, Arc<MockLlmClient>) {
        let llm = Arc::new(llm);
        let service: Arc<dyn LlmService> = llm.clone();
        let registry = ModelRegistry::from_services([service], "mock-model");
        let extractor = MockExtractor::default().with_text("brief.txt", "Hüftfraktur links.");
        (
            TurnExecutor::new(Arc::new(registry), Arc::new(extractor)),
            llm,
        )
    }

    fn session_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        let patient = db
            .create_patient_file(&NewPatientFile {
                first_name: "Erika".to_string(),
                last_name: "Musterfrau".to_string(),
                ..Default::default()
            })
            .unwrap();
        db.get_or_create_session("s1", patient.id).unwrap();
        db
    }

    fn retrieval_llm() -> MockLlmClient {
        let llm = MockLlmClient::new("mock-model");
        llm.queue_response(LlmResponse {
            content: vec![ContentBlock::ToolUse {
                id: "call-1".to_string(),
                name: "load_patient_docs".to_string(),
                input: json!({}),
            }],
            usage: Usage::default(),
        });
        llm.queue_text("Hüftfraktur links.");
        llm.queue_stream(["Ich bin ", "gestürzt."]);
        llm
    }

    #[tokio::test]
    async fn test_dropped_response_cancels_turn() {
        let (executor, llm) = executor(retrieval_llm());
        let turn = executor.run_turn(turn_request_with_docs(
            "Was ist passiert?",
            vec![MockExtractor::descriptor(1, "brief.txt")],
        ));

        drop(turn_sse(turn, session_db(), "s1".to_string()));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(llm.recorded_requests().is_empty());
    }

    #[tokio::test]
    async fn test_completed_turn_persists_reply() {
        let llm = MockLlmClient::new("mock-model");
        llm.queue_text("NO_TOOL");
        llm.queue_stream(["Mir geht's ", "ganz gut."]);
        let (executor, _llm) = executor(llm);
        let db = session_db();

        let turn = executor.run_turn(turn_request("Wie geht es Ihnen?"));
        let events: Vec<Event> = relay_events(turn, db.clone(), "s1".to_string())
            .collect()
            .await;
        assert!(!events.is_empty());

        let messages = db.get_messages("s1").unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, MessageRole::Patient);
        assert_eq!(messages[0].content, "Mir geht's ganz gut.");
    }

    #[tokio::test]
    async fn test_disconnect_mid_reply_persists_nothing() {
        let (executor, _llm) = executor(retrieval_llm());
        let db = session_db();

        let turn = executor.run_turn(turn_request_with_docs(
            "Was ist passiert?",
            vec![MockExtractor::descriptor(1, "brief.txt")],
        ));
        let mut events = Box::pin(relay_events(turn, db.clone(), "s1".to_string()));
        assert!(events.next().await.is_some());
        drop(events);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(db.get_messages("s1").unwrap().is_empty());
    }

    #[test]
    fn test_text_payload() {
        let (kind, data) = unit_payload(OutputUnit::text("Ach ja."));
        assert_eq!(kind, "text");
        assert_eq!(data["text"], "Ach ja.");
    }

    #[test]
    fn test_documents_payload() {
        let (kind, data) = unit_payload(OutputUnit::Event(TurnEvent::DocumentsAttached {
            documents: vec![AttachedDocument {
                filename: "brief.txt".to_string(),
                content_b64: "SGFsbG8=".to_string(),
            }],
        }));
        assert_eq!(kind, "documents");
        assert_eq!(data["documents"][0]["filename"], "brief.txt");
        assert_eq!(data["documents"][0]["content_b64"], "SGFsbG8=");
    }

    #[test]
    fn test_structured_payload() {
        let (kind, data) =
            unit_payload(OutputUnit::Event(TurnEvent::Structured(json!({"gesture": "nickt"}))));
        assert_eq!(kind, "event");
        assert_eq!(data["payload"]["gesture"], "nickt");
    }
}
