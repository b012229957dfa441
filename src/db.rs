//! Session store
//!
//! Persists patient files, their documents, chat sessions and messages.
//! Only user and patient messages are stored; retrieved context lives and
//! dies with its turn.

mod schema;

pub use schema::*;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Deserialize;
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::documents::DocumentDescriptor;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Patient file not found: {0}")]
    PatientNotFound(i64),
    #[error("Session {session_id} belongs to patient file {patient_file_id}")]
    SessionPatientMismatch {
        session_id: String,
        patient_file_id: i64,
    },
    #[error("Invalid seed file: {0}")]
    Seed(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> DbResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // ==================== Patient Operations ====================

    /// Create a patient file
    pub fn create_patient_file(&self, patient: &NewPatientFile) -> DbResult<PatientFile> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO patient_files (first_name, last_name, age, gender, address, medical_history, personal_details, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                patient.first_name,
                patient.last_name,
                patient.age,
                patient.gender,
                patient.address,
                patient.medical_history,
                patient.personal_details,
                now.to_rfc3339()
            ],
        )?;

        Ok(PatientFile {
            id: conn.last_insert_rowid(),
            first_name: patient.first_name.clone(),
            last_name: patient.last_name.clone(),
            age: patient.age,
            gender: patient.gender.clone(),
            address: patient.address.clone(),
            medical_history: patient.medical_history.clone(),
            personal_details: patient.personal_details.clone(),
            created_at: now,
        })
    }

    /// Get patient file by ID
    pub fn get_patient_file(&self, id: i64) -> DbResult<PatientFile> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, first_name, last_name, age, gender, address, medical_history, personal_details, created_at
             FROM patient_files WHERE id = ?1",
            params![id],
            |row| {
                Ok(PatientFile {
                    id: row.get(0)?,
                    first_name: row.get(1)?,
                    last_name: row.get(2)?,
                    age: row.get(3)?,
                    gender: row.get(4)?,
                    address: row.get(5)?,
                    medical_history: row.get(6)?,
                    personal_details: row.get(7)?,
                    created_at: parse_datetime(&row.get::<_, String>(8)?),
                })
            },
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => DbError::PatientNotFound(id),
            other => DbError::Sqlite(other),
        })
    }

    /// Number of patient files
    pub fn count_patient_files(&self) -> DbResult<i64> {
        let conn = self.conn.lock().unwrap();
        Ok(conn.query_row("SELECT COUNT(*) FROM patient_files", [], |row| row.get(0))?)
    }

    /// Register a document for a patient
    pub fn add_patient_document(
        &self,
        patient_file_id: i64,
        path: &str,
        kind: &str,
        description: &str,
    ) -> DbResult<DocumentDescriptor> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO patient_documents (patient_file_id, file_path, kind, description)
             VALUES (?1, ?2, ?3, ?4)",
            params![patient_file_id, path, kind, description],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                DbError::PatientNotFound(patient_file_id)
            }
            other => DbError::Sqlite(other),
        })?;

        Ok(DocumentDescriptor {
            id: conn.last_insert_rowid(),
            patient_file_id,
            path: path.to_string(),
            kind: kind.to_string(),
            description: description.to_string(),
        })
    }

    /// Documents of a patient, in insertion order
    pub fn list_patient_documents(
        &self,
        patient_file_id: i64,
    ) -> DbResult<Vec<DocumentDescriptor>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, patient_file_id, file_path, kind, description
             FROM patient_documents WHERE patient_file_id = ?1 ORDER BY id",
        )?;

        let rows = stmt.query_map(params![patient_file_id], |row| {
            Ok(DocumentDescriptor {
                id: row.get(0)?,
                patient_file_id: row.get(1)?,
                path: row.get(2)?,
                kind: row.get(3)?,
                description: row.get(4)?,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    // ==================== Session Operations ====================

    /// Get a session, creating it for `patient_file_id` if it does not exist.
    ///
    /// An existing session must belong to the same patient file.
    pub fn get_or_create_session(
        &self,
        session_id: &str,
        patient_file_id: i64,
    ) -> DbResult<ChatSession> {
        let conn = self.conn.lock().unwrap();

        let existing = conn
            .query_row(
                "SELECT id, patient_file_id, created_at FROM chat_sessions WHERE id = ?1",
                params![session_id],
                |row| {
                    Ok(ChatSession {
                        id: row.get(0)?,
                        patient_file_id: row.get(1)?,
                        created_at: parse_datetime(&row.get::<_, String>(2)?),
                    })
                },
            )
            .optional()?;

        if let Some(session) = existing {
            if session.patient_file_id != patient_file_id {
                return Err(DbError::SessionPatientMismatch {
                    session_id: session.id,
                    patient_file_id: session.patient_file_id,
                });
            }
            return Ok(session);
        }

        let now = Utc::now();
        conn.execute(
            "INSERT INTO chat_sessions (id, patient_file_id, created_at) VALUES (?1, ?2, ?3)",
            params![session_id, patient_file_id, now.to_rfc3339()],
        )?;
        tracing::info!(session_id = %session_id, patient_file_id, "Created chat session");

        Ok(ChatSession {
            id: session_id.to_string(),
            patient_file_id,
            created_at: now,
        })
    }

    /// Delete a session and its messages. Returns whether the session existed.
    pub fn reset_session(&self, session_id: &str) -> DbResult<bool> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM chat_messages WHERE session_id = ?1",
            params![session_id],
        )?;
        let deleted = tx.execute("DELETE FROM chat_sessions WHERE id = ?1", params![session_id])?;
        tx.commit()?;
        Ok(deleted > 0)
    }

    // ==================== Message Operations ====================

    /// Append a message to a session
    pub fn add_message(
        &self,
        session_id: &str,
        role: MessageRole,
        content: &str,
    ) -> DbResult<StoredMessage> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO chat_messages (session_id, role, content, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![session_id, role.to_string(), content, now.to_rfc3339()],
        )?;

        Ok(StoredMessage {
            id: conn.last_insert_rowid(),
            session_id: session_id.to_string(),
            role,
            content: content.to_string(),
            created_at: now,
        })
    }

    /// Messages of a session, oldest first
    pub fn get_messages(&self, session_id: &str) -> DbResult<Vec<StoredMessage>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, session_id, role, content, created_at
             FROM chat_messages WHERE session_id = ?1 ORDER BY id",
        )?;

        let rows = stmt.query_map(params![session_id], |row| {
            let role_str: String = row.get(2)?;
            let role = role_str.parse().map_err(|e: String| {
                rusqlite::Error::FromSqlConversionFailure(
                    2,
                    rusqlite::types::Type::Text,
                    e.into(),
                )
            })?;
            Ok(StoredMessage {
                id: row.get(0)?,
                session_id: row.get(1)?,
                role,
                content: row.get(3)?,
                created_at: parse_datetime(&row.get::<_, String>(4)?),
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    // ==================== Seeding ====================

    /// Load patient files and their documents from a JSON file.
    ///
    /// Skipped when the store already holds patients. Returns the number of
    /// patient files created.
    pub fn seed_from_file(&self, path: &Path) -> DbResult<usize> {
        if self.count_patient_files()? > 0 {
            return Ok(0);
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|e| DbError::Seed(format!("{}: {e}", path.display())))?;
        let entries: Vec<SeedPatient> =
            serde_json::from_str(&raw).map_err(|e| DbError::Seed(e.to_string()))?;

        for entry in &entries {
            let patient = self.create_patient_file(&entry.patient)?;
            for doc in &entry.documents {
                self.add_patient_document(patient.id, &doc.path, &doc.kind, &doc.description)?;
            }
        }

        tracing::info!(count = entries.len(), path = %path.display(), "Seeded patient files");
        Ok(entries.len())
    }
}

#[derive(Debug, Deserialize)]
struct SeedPatient {
    #[serde(flatten)]
    patient: NewPatientFile,
    #[serde(default)]
    documents: Vec<SeedDocument>,
}

#[derive(Debug, Deserialize)]
struct SeedDocument {
    path: String,
    kind: String,
    #[serde(default)]
    description: String,
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
