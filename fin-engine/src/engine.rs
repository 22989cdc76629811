//! The shared engine: sessions, fault table, audit ring and persistence,
//! bundled the way `EventProcessor` groups its own related `Mutex` fields
//! (one lock per cluster rather than one lock for everything).

use crate::builder;
use crate::fault::FaultTable;
use crate::message::{self, ParsedMessage};
use crate::session::{self, Decision, Session};
use crate::store::{AuditEntry, Direction, Snapshot, StateStore};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tracing::info;

/// Outcome the connection handler acts on: whether to sleep first, what (if
/// anything) to write back, and whether the connection should be dropped.
#[derive(Debug)]
pub enum Outcome {
    DropConnection,
    /// R2: the fault table is in `Timeout` mode. The connection handler
    /// sleeps briefly before looping, per the fixed R2 delay.
    NoResponseTimeout,
    /// R5: the sequence was in the ignored set. No delay, just no reply.
    NoResponse,
    Respond(String),
}

pub struct Engine {
    mac_key: String,
    sessions: Mutex<HashMap<String, Session>>,
    fault: FaultTable,
    audit_log: Mutex<VecDeque<AuditEntry>>,
    store: StateStore,
}

impl Engine {
    pub fn new(mac_key: impl Into<String>, state_file: impl Into<std::path::PathBuf>, audit_cap: usize) -> Self {
        let store = StateStore::new(state_file, audit_cap);
        let (sessions, audit_log) = store.load();
        info!(
            sessions = sessions.len(),
            audit_entries = audit_log.len(),
            "loaded persisted state"
        );
        Self {
            mac_key: mac_key.into(),
            sessions: Mutex::new(sessions),
            fault: FaultTable::new(),
            audit_log: Mutex::new(audit_log),
            store,
        }
    }

    pub fn fault_table(&self) -> &FaultTable {
        &self.fault
    }

    /// Process one inbound message on behalf of `session_id`, creating the
    /// session on first contact. Persists the updated snapshot afterward.
    pub fn process_inbound(&self, session_id: &str, raw: &str) -> Outcome {
        let parsed = match message::parse(raw) {
            Ok(p) => p,
            Err(_) => {
                self.audit(session_id, Direction::Inbound, raw, Value::Null);
                let seq = {
                    let mut sessions = self.sessions.lock().unwrap();
                    let session = sessions
                        .entry(session_id.to_string())
                        .or_insert_with(|| Session::new(session_id));
                    session.next_output_seq()
                };
                let nack = builder::build_nack_for_malformed(seq, &self.mac_key);
                self.audit(session_id, Direction::Outbound, &nack, Value::Null);
                self.persist();
                return Outcome::Respond(nack);
            }
        };

        self.audit(session_id, Direction::Inbound, raw, parsed_details(&parsed));

        let decision = {
            let mut sessions = self.sessions.lock().unwrap();
            let session = sessions
                .entry(session_id.to_string())
                .or_insert_with(|| Session::new(session_id));
            session::decide(session, &parsed, &self.fault, &self.mac_key)
        };

        let outcome = match decision {
            Decision::DropConnection => Outcome::DropConnection,
            Decision::NoResponseTimeout => Outcome::NoResponseTimeout,
            Decision::Ignored => Outcome::NoResponse,
            Decision::Respond(body) | Decision::RespondAndAdvance(body) => {
                self.audit(session_id, Direction::Outbound, &body, Value::Null);
                Outcome::Respond(body)
            }
        };

        self.persist();
        outcome
    }

    /// Mark a session authenticated after a successful LOGIN handshake and
    /// return the LOGIN-ACK envelope.
    pub fn authenticate(&self, session_id: &str) -> String {
        let seq = {
            let mut sessions = self.sessions.lock().unwrap();
            let session = sessions
                .entry(session_id.to_string())
                .or_insert_with(|| Session::new(session_id));
            session.authenticated = true;
            session.next_output_seq()
        };
        let ack = builder::build_login_ack(seq, &self.mac_key);
        self.audit(session_id, Direction::Outbound, &ack, Value::Null);
        self.persist();
        ack
    }

    pub fn mark_disconnected(&self, session_id: &str) {
        if let Some(session) = self.sessions.lock().unwrap().get_mut(session_id) {
            session.connected = false;
        }
        self.persist();
    }

    pub fn latency_sleep_duration(&self) -> Option<std::time::Duration> {
        session::latency_sleep_duration(&self.fault)
    }

    pub fn reset(&self) {
        self.sessions.lock().unwrap().clear();
        self.audit_log.lock().unwrap().clear();
        self.fault.reset();
        self.persist();
        info!("engine state reset");
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn connected_session_count(&self) -> usize {
        self.sessions
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.connected)
            .count()
    }

    pub fn audit_tail(&self, limit: usize) -> Vec<AuditEntry> {
        let log = self.audit_log.lock().unwrap();
        log.iter().rev().take(limit).rev().cloned().collect()
    }

    pub fn audit_len(&self) -> usize {
        self.audit_log.lock().unwrap().len()
    }

    pub fn all_sessions(&self) -> HashMap<String, Session> {
        self.sessions.lock().unwrap().clone()
    }

    /// Find the most recent audit entry whose transaction reference (field
    /// `:20:`) matches `message_id`.
    pub fn lookup_message(&self, message_id: &str) -> Option<AuditEntry> {
        let log = self.audit_log.lock().unwrap();
        log.iter()
            .rev()
            .find(|entry| {
                entry
                    .parsed_details
                    .get("transaction_reference")
                    .and_then(|v| v.as_str())
                    == Some(message_id)
            })
            .cloned()
    }

    fn audit(&self, session_id: &str, direction: Direction, raw: &str, parsed_details: Value) {
        let mut log = self.audit_log.lock().unwrap();
        log.push_back(AuditEntry::new(session_id, direction, raw, parsed_details));
        while log.len() > self.store.audit_cap() {
            log.pop_front();
        }
    }

    /// Force a snapshot write, used for the final save on graceful shutdown.
    pub fn save_now(&self) {
        self.persist();
    }

    fn persist(&self) {
        let sessions = self.sessions.lock().unwrap().clone();
        let message_log: Vec<_> = self.audit_log.lock().unwrap().iter().cloned().collect();
        self.store.save(&Snapshot {
            sessions,
            message_log,
        });
    }
}

fn parsed_details(parsed: &ParsedMessage) -> Value {
    serde_json::json!({
        "sequence_number": parsed.sequence_number,
        "transaction_reference": parsed.transaction_reference,
        "uetr": parsed.uetr,
        "kind": session::classify(parsed),
    })
}
