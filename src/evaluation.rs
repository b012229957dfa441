//! Feedback on a finished anamnesis conversation
//!
//! The doctor's questions and the patient's answers are rendered into one
//! transcript and handed to the model together with an assessment
//! instruction. The assessment is streamed back with reasoning markup
//! removed.

use futures::StreamExt;
use serde::Deserialize;
use std::fmt::Write;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::llm::{LlmError, LlmMessage, LlmRequest, LlmService};
use crate::turn::{ReasoningFilter, TurnError, APOLOGY};

const EVAL_BUFFER: usize = 32;

pub const EVAL_PROMPT: &str = r"Du bist eine erfahrene Ärztin und bewertest die Anamnese, die eine Medizinstudentin oder ein Medizinstudent mit einer simulierten Patientin oder einem simulierten Patienten geführt hat.

Du erhältst das vollständige Gesprächsprotokoll. Bewerte ausschließlich die Gesprächsführung der Ärztin oder des Arztes:

1. Vollständigkeit: Wurden aktuelle Beschwerden, Vorerkrankungen, Medikation, Allergien, Familien- und Sozialanamnese erfragt?
2. Struktur: Folgt das Gespräch einem nachvollziehbaren Aufbau?
3. Fragetechnik: Werden offene Fragen gestellt und Antworten gezielt vertieft?
4. Kommunikation: Ist die Sprache verständlich, empathisch und an die Patientin oder den Patienten angepasst?

Gib für jeden Punkt eine kurze Einschätzung mit konkreten Beispielen aus dem Gespräch. Schließe mit den drei wichtigsten Verbesserungsvorschlägen. Antworte auf Deutsch.";

/// One entry of the conversation as the client stored it
#[derive(Debug, Clone, Deserialize)]
pub struct EvalMessage {
    /// `user` for the doctor, `patient` for the simulated patient
    pub role: String,
    pub output: String,
}

impl EvalMessage {
    fn speaker(&self) -> Option<&'static str> {
        match self.role.as_str() {
            "user" => Some("Ärztin/Arzt"),
            "patient" => Some("Patient"),
            _ => None,
        }
    }
}

/// Render the conversation as a transcript. Entries with other roles are
/// left out; `None` if nothing remains.
pub fn transcript(messages: &[EvalMessage]) -> Option<String> {
    let mut out = String::new();
    for message in messages {
        let Some(speaker) = message.speaker() else {
            continue;
        };
        if !out.is_empty() {
            out.push('\n');
        }
        let _ = write!(out, "{speaker}: {}", message.output);
    }
    (!out.is_empty()).then_some(out)
}

pub fn build_eval_request(transcript: &str) -> LlmRequest {
    LlmRequest::new(vec![LlmMessage::user(format!(
        "Gesprächsprotokoll:\n\n{transcript}"
    ))])
    .with_system(EVAL_PROMPT)
}

/// Start streaming an assessment of `transcript`.
///
/// A failing model ends the stream with the apology. Dropping the receiver
/// stops the relay at the next chunk.
pub fn stream_evaluation(llm: Arc<dyn LlmService>, transcript: &str) -> ReceiverStream<String> {
    let (tx, rx) = mpsc::channel(EVAL_BUFFER);
    let request = build_eval_request(transcript);

    tokio::spawn(async move {
        let mut streamed = false;
        match relay(llm.as_ref(), &request, &tx, &mut streamed).await {
            Ok(()) => tracing::debug!("Evaluation complete"),
            Err(TurnError::Disconnected) => tracing::info!("Evaluation consumer went away"),
            Err(error) => {
                tracing::error!(error = %error, streamed, "Evaluation failed");
                let apology = if streamed {
                    format!("\n\n{APOLOGY}")
                } else {
                    APOLOGY.to_string()
                };
                let _ = tx.send(apology).await;
            }
        }
    });

    ReceiverStream::new(rx)
}

async fn relay(
    llm: &dyn LlmService,
    request: &LlmRequest,
    tx: &mpsc::Sender<String>,
    streamed: &mut bool,
) -> Result<(), TurnError> {
    let mut stream = llm.stream(request).await?;
    let mut filter = ReasoningFilter::new();

    while let Some(chunk) = stream.next().await {
        let visible = filter
            .push(&chunk?)
            .map_err(|e| LlmError::unknown(e.to_string()))?;
        send(tx, visible, streamed).await?;
    }
    send(tx, filter.finish(), streamed).await
}

async fn send(
    tx: &mpsc::Sender<String>,
    text: String,
    streamed: &mut bool,
) -> Result<(), TurnError> {
    if text.is_empty() {
        return Ok(());
    }
    tx.send(text).await.map_err(|_| TurnError::Disconnected)?;
    *streamed = true;
    Ok(())
}
