//! Database schema and types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Write;
use std::str::FromStr;

use crate::turn::ChatMessage;

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS patient_files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    age INTEGER,
    gender TEXT,
    address TEXT,
    medical_history TEXT,
    personal_details TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS patient_documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    patient_file_id INTEGER NOT NULL,
    file_path TEXT NOT NULL,
    kind TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',

    FOREIGN KEY (patient_file_id) REFERENCES patient_files(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_patient_documents_file ON patient_documents(patient_file_id);

CREATE TABLE IF NOT EXISTS chat_sessions (
    id TEXT PRIMARY KEY,
    patient_file_id INTEGER NOT NULL,
    created_at TEXT NOT NULL,

    FOREIGN KEY (patient_file_id) REFERENCES patient_files(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS chat_messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    role TEXT NOT NULL CHECK (role IN ('user', 'patient')),
    content TEXT NOT NULL,
    created_at TEXT NOT NULL,

    FOREIGN KEY (session_id) REFERENCES chat_sessions(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_chat_messages_session ON chat_messages(session_id, id);
";

/// Simulated patient record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientFile {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub age: Option<i64>,
    pub gender: Option<String>,
    pub address: Option<String>,
    pub medical_history: Option<String>,
    pub personal_details: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields for creating a patient file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewPatientFile {
    pub first_name: String,
    pub last_name: String,
    pub age: Option<i64>,
    pub gender: Option<String>,
    pub address: Option<String>,
    pub medical_history: Option<String>,
    pub personal_details: Option<String>,
}

/// Chat session bound to one patient file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub patient_file_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Who wrote a persisted message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Patient,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Patient => write!(f, "patient"),
        }
    }
}

impl FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(MessageRole::User),
            "patient" => Ok(MessageRole::Patient),
            _ => Err(format!("Unknown message role: {s}")),
        }
    }
}

/// Persisted chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: i64,
    pub session_id: String,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    /// History entry for a new turn
    pub fn to_turn_message(&self) -> ChatMessage {
        match self.role {
            MessageRole::User => ChatMessage::user(self.content.clone()),
            MessageRole::Patient => ChatMessage::assistant(self.content.clone()),
        }
    }
}

/// Render a patient file as the free-text details given to the persona
pub fn format_patient_details(patient: &PatientFile) -> String {
    let mut out = format!("Name: {} {}", patient.first_name, patient.last_name);
    let optional = [
        ("Alter", patient.age.map(|a| a.to_string())),
        ("Geschlecht", patient.gender.clone()),
        ("Adresse", patient.address.clone()),
        ("Vorerkrankungen", patient.medical_history.clone()),
        ("Persönliches", patient.personal_details.clone()),
    ];
    for (label, value) in optional {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            let _ = write!(out, "\n{label}: {value}");
        }
    }
    out
}
