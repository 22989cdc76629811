//! Process-wide fault-injection table, consulted by the session state
//! machine on every decision and mutated only by the control plane.
//!
//! `nack_next` and `drop_connection` are one-shot: the first matching event
//! consumes them. `timeout` and `latency` persist until explicitly cleared.
//! `ignored_sequences` consumes each integer on first match.

use std::collections::HashSet;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorMode {
    #[default]
    None,
    NackNext,
    DropConnection,
    Timeout,
    Latency,
}

impl ErrorMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(Self::None),
            "nack_next" => Some(Self::NackNext),
            "drop_connection" => Some(Self::DropConnection),
            "timeout" => Some(Self::Timeout),
            "latency" => Some(Self::Latency),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct FaultSnapshot {
    pub error_mode: ErrorMode,
    pub latency_ms: u64,
    pub ignored_sequences: Vec<i64>,
}

#[derive(Debug, Default)]
struct FaultState {
    error_mode: ErrorMode,
    latency_ms: u64,
    ignored_sequences: HashSet<i64>,
}

/// Guarded fault-injection state, shared across every connection handler.
#[derive(Debug, Default)]
pub struct FaultTable {
    state: Mutex<FaultState>,
}

impl FaultTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the active error mode. `latency_ms`, when `Some`, overwrites the
    /// persistent latency value (pass `Some(0)` to explicitly clear it);
    /// `None` leaves whatever latency was previously configured untouched.
    pub fn set_error_mode(&self, mode: ErrorMode, latency_ms: Option<u64>) {
        let mut s = self.state.lock().unwrap();
        s.error_mode = mode;
        if let Some(ms) = latency_ms {
            s.latency_ms = ms;
        }
    }

    pub fn add_ignored_sequences(&self, seqs: &[i64]) {
        let mut s = self.state.lock().unwrap();
        s.ignored_sequences.extend(seqs.iter().copied());
    }

    pub fn reset(&self) {
        let mut s = self.state.lock().unwrap();
        *s = FaultState::default();
    }

    pub fn latency_ms(&self) -> u64 {
        self.state.lock().unwrap().latency_ms
    }

    /// R1: consume `drop_connection` if currently armed.
    pub fn take_drop_connection(&self) -> bool {
        let mut s = self.state.lock().unwrap();
        if s.error_mode == ErrorMode::DropConnection {
            s.error_mode = ErrorMode::None;
            true
        } else {
            false
        }
    }

    /// Non-consuming peek at whether `drop_connection` is currently armed,
    /// for callers that need to know before R1 actually runs (e.g. gating
    /// a latency sleep that must not fire ahead of a drop).
    pub fn peek_drop_connection(&self) -> bool {
        self.state.lock().unwrap().error_mode == ErrorMode::DropConnection
    }

    /// R2: `timeout` is persistent, so this does not consume it.
    pub fn is_timeout(&self) -> bool {
        self.state.lock().unwrap().error_mode == ErrorMode::Timeout
    }

    /// R4/R5: remove `seq` from the ignored set if present, returning
    /// whether it was there.
    pub fn take_ignored_sequence(&self, seq: i64) -> bool {
        self.state.lock().unwrap().ignored_sequences.remove(&seq)
    }

    pub fn is_ignored_sequence(&self, seq: i64) -> bool {
        self.state.lock().unwrap().ignored_sequences.contains(&seq)
    }

    /// R6: consume `nack_next` if currently armed.
    pub fn take_nack_next(&self) -> bool {
        let mut s = self.state.lock().unwrap();
        if s.error_mode == ErrorMode::NackNext {
            s.error_mode = ErrorMode::None;
            true
        } else {
            false
        }
    }

    pub fn snapshot(&self) -> FaultSnapshot {
        let s = self.state.lock().unwrap();
        let mut ignored: Vec<i64> = s.ignored_sequences.iter().copied().collect();
        ignored.sort_unstable();
        FaultSnapshot {
            error_mode: s.error_mode,
            latency_ms: s.latency_ms,
            ignored_sequences: ignored,
        }
    }
}
