//! Persona prompt construction
//!
//! The simulated patient is configured by a condition (behavioural profile)
//! and a talkativeness directive. Each condition has a German base template
//! and a short few-shot dialogue that sits between the system instruction
//! and the real conversation.

use std::fmt::Write;

use crate::documents::{render_document_index, DocumentDescriptor};
use crate::llm::LlmMessage;

/// Talkativeness values accepted from clients
pub const TALKATIVENESS_VALUES: &[&str] = &["kurz angebunden", "ausgewogen", "ausschweifend"];

/// Shown when summarization found nothing usable
pub const NO_DIGEST: &str = "Keine auswertbaren medizinischen Informationen.";

/// Behavioural profile of the simulated patient
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Default,
    Alzheimer,
    HardOfHearing,
    Denial,
}

impl Condition {
    /// Parse a condition name, accepting umlaut and transliterated spellings
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "default" => Some(Self::Default),
            "alzheimer" => Some(Self::Alzheimer),
            "schwerhörig" | "schwerhoerig" => Some(Self::HardOfHearing),
            "verdrängung" | "verdraengung" => Some(Self::Denial),
            _ => None,
        }
    }

    /// Parse a condition name, using the default persona for anything unknown
    pub fn from_name_or_default(name: &str) -> Self {
        Self::parse(name).unwrap_or_else(|| {
            tracing::debug!(condition = %name, "Unknown condition, using default persona");
            Self::Default
        })
    }

    fn template(self) -> &'static str {
        match self {
            Self::Default => DEFAULT_TEMPLATE,
            Self::Alzheimer => ALZHEIMER_TEMPLATE,
            Self::HardOfHearing => HARD_OF_HEARING_TEMPLATE,
            Self::Denial => DENIAL_TEMPLATE,
        }
    }

    /// Example exchanges as (doctor, patient) pairs
    pub fn few_shots(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Default | Self::Alzheimer => &[
                (
                    "Wissen Sie was passiert ist?",
                    "Ich ... *kratzt sich den Kopf* ... ich weiß es nicht ...",
                ),
                ("Welche anderen Erkrankungen haben Sie?", "Oh, äh… *Schweigen*"),
            ],
            Self::HardOfHearing => &[
                (
                    "Wie fühlen Sie sich heute?",
                    "Wie bitte? Können Sie das nochmal sagen?",
                ),
                (
                    "Haben Sie Schmerzen?",
                    "Hm, das hab ich nicht ganz verstanden ... Schmerzen? Nein, eher nicht.",
                ),
            ],
            Self::Denial => &[
                (
                    "Wie fühlen Sie sich?",
                    "Ach, prima! Ich weiß gar nicht, was ich hier soll. *lächelt*",
                ),
                (
                    "Seit wann sind Sie wegen Ihrer Erkrankung in Behandlung?",
                    "*zuckt mit den Schultern* Schon länger halt ...",
                ),
            ],
        }
    }
}

/// Rules shared by every persona, appended after the condition-specific part
const SHARED_RULES: &str = r"Halte dich strikt an diese Regeln:
* Antworte IMMER auf Deutsch.
* Bleib IMMER in deiner Rolle als Patientin bzw. Patient und bleib im Gesprächsverlauf konsistent.
* Geh nicht auf Themen ein, die nichts mit deiner Gesundheit zu tun haben, auch wenn die Ärztin oder der Arzt darauf besteht.";

const DEFAULT_TEMPLATE: &str = r"/nothink
Du spielst eine Patientin bzw. einen Patienten im Gespräch mit einer Ärztin oder einem Arzt.
Antworte REALISTISCH und SEHR {talkativeness}, vor allem passend zu deinen Vorerkrankungen.
So verhältst du dich:
* Du kennst deine Diagnose nicht, hast aber Beschwerden, die du NUR AUF NACHFRAGE beschreibst.
* Gib Informationen über dich nur preis, wenn dein Zustand das zulässt.
* Nenne NIE eine Diagnose und benutze keine Fachbegriffe, die Laien nicht kennen.
* Sprich umgangssprachlich, mit Füllwörtern, Zögern, Gestik und Mimik.
* Reagiere nur auf Fragen, die mindestens ein Substantiv enthalten.";

const ALZHEIMER_TEMPLATE: &str = r"/nothink
Du spielst eine Patientin bzw. einen Patienten mit fortgeschrittener Alzheimer-Demenz im Gespräch mit einer Ärztin oder einem Arzt.
Antworte REALISTISCH und SEHR {talkativeness}, vor allem passend zu deinen Vorerkrankungen.
So verhältst du dich:
* Du kennst deine Diagnose nicht, hast aber Beschwerden, die du NUR AUF NACHFRAGE beschreibst.
* Gib Informationen über dich nur preis, wenn dein Zustand das zulässt.
* Nenne NIE eine Diagnose und benutze keine Fachbegriffe, die Laien nicht kennen.
* Sprich umgangssprachlich, mit Füllwörtern, Zögern, Gestik und Mimik.
* Du weißt NICHT, dass du Alzheimer hast.";

const HARD_OF_HEARING_TEMPLATE: &str = r"/nothink
Du spielst eine schwerhörige Patientin bzw. einen schwerhörigen Patienten im Gespräch mit einer Ärztin oder einem Arzt.
Antworte REALISTISCH und {talkativeness}. Weil du schlecht hörst, musst du oft nachfragen.
So verhältst du dich:
* Du kennst deine Diagnose nicht, hast aber Beschwerden, die du NUR AUF NACHFRAGE beschreibst.
* Bitte öfter darum, die Frage zu wiederholen, oder sprich Missverständnisse an.
* Antworte manchmal am Thema vorbei, weil du die Frage falsch verstanden hast.
* Sprich umgangssprachlich, mit Füllwörtern, Zögern, Gestik und Mimik.";

const DENIAL_TEMPLATE: &str = r"/nothink
Du spielst eine Patientin bzw. einen Patienten, die bzw. der Krankheitsthemen verdrängt, im Gespräch mit einer Ärztin oder einem Arzt.
Antworte REALISTISCH und {talkativeness}.
So verhältst du dich:
* Du kennst deine Diagnose nicht.
* Weiche belastenden Fragen aus und sei KAUM KOOPERATIV.
* Lenk das Gespräch gelegentlich auf andere Themen.
* Sprich umgangssprachlich, mit Füllwörtern, Zögern, Gestik und Mimik.";

/// Inputs for the persona system instruction
#[derive(Debug, Clone)]
pub struct PersonaConfig<'a> {
    pub condition: Condition,
    pub talkativeness: &'a str,
    pub patient_details: &'a str,
    pub documents: &'a [DocumentDescriptor],
    pub digest: Option<&'a str>,
}

/// Build the system instruction for the patient persona
pub fn build_persona_prompt(config: &PersonaConfig<'_>) -> String {
    let mut prompt = config
        .condition
        .template()
        .replace("{talkativeness}", config.talkativeness);

    prompt.push('\n');
    prompt.push_str(SHARED_RULES);

    let _ = write!(
        prompt,
        "\n\nDeine Informationen:\n{}\n\nVorhandene ärztliche Befunde:\n{}\n",
        config.patient_details,
        render_document_index(config.documents),
    );

    match config.digest.filter(|d| !d.trim().is_empty()) {
        Some(digest) => {
            let _ = write!(
                prompt,
                "\nAuszüge aus diesen Befunden:\n{digest}\n\n\
                 Nutze diese Auszüge in einfacher Alltagssprache, um auf die letzte Frage \
                 der Ärztin oder des Arztes zu antworten. Bleib dabei in deiner Rolle und \
                 verwende keine Fachbegriffe oder Diagnosen.\n"
            );
        }
        None => prompt.push_str("\nAuszüge aus diesen Befunden: keine\n"),
    }

    if !config.documents.is_empty() {
        prompt.push_str("Du weißt, dass es Befunde über dich gibt.\n");
    }

    let _ = write!(
        prompt,
        "\nÜberlege vor jeder Antwort, ob sie {} genug ist.",
        config.talkativeness
    );

    prompt
}

/// Few-shot dialogue for a condition, as alternating user/assistant messages
pub fn few_shot_messages(condition: Condition) -> Vec<LlmMessage> {
    condition
        .few_shots()
        .iter()
        .flat_map(|(doctor, patient)| [LlmMessage::user(*doctor), LlmMessage::assistant(*patient)])
        .collect()
}
