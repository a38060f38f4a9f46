//! Session Bookkeeping Module
//!
//! File-backed records correlating built providers with attestor tasks.
//! Status is a 4-value enum; every change rewrites tracking/sessions.json
//! in full (no transactional guarantees). Attestor interactions are also
//! appended to tracking/attestor_log.jsonl for auditing.

use crate::storage::ensure_parent;
use crate::types::{AttestorLogEntry, Session, SessionStatus, SessionsFile};
use anyhow::{Context, Result};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::fs;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

const SESSIONS_FILE: &str = "tracking/sessions.json";
const ATTESTOR_LOG_FILE: &str = "tracking/attestor_log.jsonl";

/// Load sessions; a missing or corrupt file yields an empty set
pub fn load_sessions(root: &str) -> Result<SessionsFile> {
    let path = PathBuf::from(root).join(SESSIONS_FILE);

    if !path.exists() {
        return Ok(SessionsFile {
            last_updated: Utc::now().to_rfc3339(),
            sessions: vec![],
        });
    }

    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read sessions from {:?}", path))?;

    let sessions: SessionsFile = serde_json::from_str(&content).unwrap_or_else(|_| SessionsFile {
        last_updated: Utc::now().to_rfc3339(),
        sessions: vec![],
    });

    Ok(sessions)
}

/// Overwrite tracking/sessions.json with the current state
pub fn save_sessions(root: &str, sessions: &mut SessionsFile) -> Result<()> {
    sessions.last_updated = Utc::now().to_rfc3339();
    let path = PathBuf::from(root).join(SESSIONS_FILE);
    ensure_parent(&path)?;
    let json = serde_json::to_string_pretty(sessions)?;
    fs::write(&path, json).with_context(|| format!("Failed to write sessions to {:?}", path))?;
    Ok(())
}

/// Create a pending session for a provider and return its id
pub fn create_session(sessions: &mut SessionsFile, provider_id: &str) -> String {
    let now = Utc::now().to_rfc3339();
    let id = session_id(provider_id, &now, sessions.sessions.len());
    sessions.sessions.push(Session {
        id: id.clone(),
        provider_id: provider_id.to_string(),
        attestor_task_id: None,
        status: SessionStatus::Pending,
        created_at: now.clone(),
        updated_at: now,
        error: None,
    });
    id
}

/// Update a session's status in place, stamping updated_at
pub fn update_status(
    sessions: &mut SessionsFile,
    session_id: &str,
    status: SessionStatus,
    error: Option<String>,
) -> bool {
    for session in sessions.sessions.iter_mut() {
        if session.id == session_id {
            session.status = status;
            session.error = error;
            session.updated_at = Utc::now().to_rfc3339();
            return true;
        }
    }
    false
}

/// Record the attestor task id on a session
pub fn set_task_id(sessions: &mut SessionsFile, session_id: &str, task_id: &str) -> bool {
    for session in sessions.sessions.iter_mut() {
        if session.id == session_id {
            session.attestor_task_id = Some(task_id.to_string());
            session.updated_at = Utc::now().to_rfc3339();
            return true;
        }
    }
    false
}

/// Sessions still waiting for an attestor round trip
pub fn pending_sessions(sessions: &SessionsFile) -> Vec<Session> {
    sessions
        .sessions
        .iter()
        .filter(|s| s.status == SessionStatus::Pending)
        .cloned()
        .collect()
}

/// Append an audit line to tracking/attestor_log.jsonl
pub fn append_log(root: &str, entry: &AttestorLogEntry) -> Result<()> {
    let path = PathBuf::from(root).join(ATTESTOR_LOG_FILE);
    ensure_parent(&path)?;

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .context("Failed to open attestor log")?;

    let json_line = serde_json::to_string(entry).context("Failed to serialize log entry")?;
    let mut writer = std::io::BufWriter::new(file);
    writeln!(writer, "{}", json_line).context("Failed to write attestor log entry")?;
    writer.flush()?;
    Ok(())
}

pub fn log_entry(session_id: &str, provider_id: &str, event: &str, detail: Option<String>) -> AttestorLogEntry {
    AttestorLogEntry {
        timestamp: Utc::now().to_rfc3339(),
        session_id: session_id.to_string(),
        provider_id: provider_id.to_string(),
        event: event.to_string(),
        detail,
    }
}

fn session_id(provider_id: &str, created_at: &str, ordinal: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(provider_id.as_bytes());
    hasher.update(created_at.as_bytes());
    hasher.update(ordinal.to_le_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().take(6).map(|b| format!("{:02x}", b)).collect();
    format!("sess-{}", hex)
}
