//! The narrow control-plane hook (component 9): the five operations an
//! external API is allowed to invoke against the engine, decoupled from any
//! particular HTTP framework. `control-plane`'s axum handlers are a thin
//! JSON adapter over these functions; nothing here knows about HTTP.

use crate::engine::Engine;
use crate::fault::{ErrorMode, FaultSnapshot};
use crate::store::AuditEntry;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct StatusSnapshot {
    pub session_count: usize,
    pub connected_session_count: usize,
    pub fault: FaultSnapshot,
    pub message_count: usize,
    pub recent_messages: Vec<AuditEntry>,
}

/// `GET status`: sessions, the active fault state, and a bounded recent
/// message tail.
pub fn status(engine: &Engine) -> StatusSnapshot {
    StatusSnapshot {
        session_count: engine.session_count(),
        connected_session_count: engine.connected_session_count(),
        fault: engine.fault_table().snapshot(),
        message_count: engine.audit_len(),
        recent_messages: engine.audit_tail(50),
    }
}

/// `GET messages`: the full bounded audit tail (capped at the configured
/// `audit_cap`, already enforced by the engine).
pub fn messages(engine: &Engine) -> Vec<AuditEntry> {
    engine.audit_tail(engine.audit_len())
}

/// `lookup_message(message_id)`: the most recent audit entry whose
/// transaction reference matches, or `None`.
pub fn lookup_message(engine: &Engine, message_id: &str) -> Option<AuditEntry> {
    engine.lookup_message(message_id)
}

/// `POST inject_error {error_type, sequences?, latency_ms?}`.
pub fn inject_error(engine: &Engine, mode: ErrorMode, sequences: &[i64], latency_ms: Option<u64>) {
    engine.fault_table().set_error_mode(mode, latency_ms);
    if !sequences.is_empty() {
        engine.fault_table().add_ignored_sequences(sequences);
    }
}

/// `POST reset`: clears sessions, audit log, and all fault state.
pub fn reset(engine: &Engine) {
    engine.reset();
}
