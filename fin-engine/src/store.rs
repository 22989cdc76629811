//! Persisted snapshot of sessions and the bounded audit log.
//!
//! Writes are best-effort: a failure to persist is logged and swallowed,
//! never surfaced to the peer or the caller of the message-processing path.
//! On startup, a missing or unreadable state file is treated as empty
//! (logged as a warning, not an error). Unknown top-level keys in the file
//! are ignored on load, since the struct has no `deny_unknown_fields`.

use crate::session::Session;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const AUDIT_CAP_DEFAULT: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub direction: Direction,
    /// Truncated to 200 chars.
    pub message_preview: String,
    pub parsed_details: serde_json::Value,
}

impl AuditEntry {
    pub fn new(
        session_id: impl Into<String>,
        direction: Direction,
        raw_message: &str,
        parsed_details: serde_json::Value,
    ) -> Self {
        let preview: String = raw_message.chars().take(200).collect();
        Self {
            timestamp: Utc::now(),
            session_id: session_id.into(),
            direction,
            message_preview: preview,
            parsed_details,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedState {
    #[serde(default)]
    sessions: std::collections::HashMap<String, Session>,
    #[serde(default)]
    message_log: Vec<AuditEntry>,
}

/// Snapshot of everything `StateStore::save` needs to write out.
pub struct Snapshot {
    pub sessions: std::collections::HashMap<String, Session>,
    pub message_log: Vec<AuditEntry>,
}

/// Bounded ring of audit entries plus the JSON snapshot file writer.
pub struct StateStore {
    path: PathBuf,
    audit_cap: usize,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>, audit_cap: usize) -> Self {
        Self {
            path: path.into(),
            audit_cap: audit_cap.max(1),
        }
    }

    pub fn audit_cap(&self) -> usize {
        self.audit_cap
    }

    /// Load sessions and audit tail from disk. Missing/unreadable/corrupt
    /// files are treated as an empty snapshot, logging a warning.
    pub fn load(&self) -> (std::collections::HashMap<String, Session>, VecDeque<AuditEntry>) {
        if !self.path.exists() {
            return Default::default();
        }
        match std::fs::read_to_string(&self.path) {
            Ok(text) => match serde_json::from_str::<PersistedState>(&text) {
                Ok(state) => {
                    let log: VecDeque<AuditEntry> = state.message_log.into_iter().collect();
                    (state.sessions, log)
                }
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "failed to parse persisted state; starting empty");
                    Default::default()
                }
            },
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read persisted state; starting empty");
                Default::default()
            }
        }
    }

    /// Best-effort write of the snapshot, truncating the audit log to the
    /// configured cap before writing. Failures are logged and swallowed.
    pub fn save(&self, snapshot: &Snapshot) {
        let tail_start = snapshot.message_log.len().saturating_sub(self.audit_cap);
        let persisted = PersistedState {
            sessions: snapshot.sessions.clone(),
            message_log: snapshot.message_log[tail_start..].to_vec(),
        };
        match serde_json::to_string_pretty(&persisted) {
            Ok(json) => {
                if let Err(e) = write_atomic(&self.path, &json) {
                    warn!(path = %self.path.display(), error = %e, "failed to persist state");
                }
            }
            Err(e) => warn!(error = %e, "failed to serialize state for persistence"),
        }
    }
}

fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)
}
