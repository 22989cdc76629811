//! Per-connection session state and the Active-state decision table
//! (rules R1–R7 of the spec).

use crate::builder;
use crate::fault::FaultTable;
use crate::message::ParsedMessage;
use crate::trailer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-connection session, keyed by a stable id derived from the remote
/// endpoint (`SESSION-<ip>-<port>`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub input_seq: i64,
    pub output_seq: u64,
    pub authenticated: bool,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub connected: bool,
}

impl Session {
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            input_seq: 0,
            output_seq: 0,
            authenticated: false,
            created_at: now,
            last_activity: now,
            connected: true,
        }
    }

    /// Allocate the next output sequence number for a response about to be
    /// emitted on this session.
    pub fn next_output_seq(&mut self) -> u64 {
        self.output_seq += 1;
        self.output_seq
    }
}

/// Coarse classification of an inbound frame, used to tag audit entries.
/// Distinct from the R1–R7 decision table: a frame is classified once,
/// regardless of which rule ends up handling it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Login,
    Mt103,
    Unknown,
}

/// Classify a parsed frame for audit tagging. LOGIN takes priority over the
/// MT103 heuristic (presence of a parsed `:32A:` amount), since a LOGIN
/// envelope never carries one.
pub fn classify(parsed: &ParsedMessage) -> MessageKind {
    if parsed.is_login() {
        MessageKind::Login
    } else if parsed.amount.is_some() {
        MessageKind::Mt103
    } else {
        MessageKind::Unknown
    }
}

/// Outcome of running one inbound message through the Active-state decision
/// table. The connection handler is responsible for performing the I/O
/// (sleeping, writing, closing) that each variant implies.
#[derive(Debug)]
pub enum Decision {
    /// R1: drop the TCP connection without a response.
    DropConnection,
    /// R2: no response, continue reading (timeout simulation).
    NoResponseTimeout,
    /// R5: sequence was in the ignored set; no response, no state change.
    Ignored,
    /// R3/R4/R6: emit this response, do not advance `input_seq`.
    Respond(String),
    /// R6/R7: emit this response, `input_seq` already advanced to the
    /// message's declared sequence.
    RespondAndAdvance(String),
}

/// Run one inbound message through rules R1–R7. `session.input_seq` is
/// mutated in place for R6/R7; the caller persists afterward.
///
/// The `latency_ms` sleep named in the spec ("before rules R3-R7 run") is a
/// connection-handler concern since it is a suspension point; callers should
/// peek the fault table for an armed R1/R2 condition first (without
/// consuming it) and only sleep for `fault.latency_ms()` when neither is
/// armed, so the delay never runs ahead of a drop or a timeout.
pub fn decide(session: &mut Session, parsed: &ParsedMessage, fault: &FaultTable, mac_key: &str) -> Decision {
    let s = parsed.sequence_number;
    let i = session.input_seq;

    // R1
    if fault.take_drop_connection() {
        return Decision::DropConnection;
    }

    // R2
    if fault.is_timeout() {
        return Decision::NoResponseTimeout;
    }

    // R3: trailer validation, only attempted when both mac and checksum
    // were present in the inbound message.
    if parsed.mac.is_some() && parsed.checksum.is_some() {
        if let Err(e) = trailer::validate_trailer(&parsed.raw, mac_key) {
            let seq = session.next_output_seq();
            let reference = parsed.transaction_reference.as_deref().unwrap_or("UNKNOWN");
            let nack = builder::build_nack(reference, seq, "5", &e.to_string(), mac_key);
            return Decision::Respond(nack);
        }
    }

    // Duplicate / low sequence (s <= i): no source variant specifies this.
    // ACK it so the sender stops retransmitting, but leave input_seq alone
    // and flag it for audit (the caller logs the Respond body same as any
    // other non-advancing outcome).
    if s <= i {
        let seq = session.next_output_seq();
        let ack = builder::build_ack(parsed, seq, mac_key);
        return Decision::Respond(ack);
    }

    // R4: gap detection, unless this sequence is in the ignored set.
    if s > i + 1 && !fault.is_ignored_sequence(s) {
        let seq = session.next_output_seq();
        let resend = builder::build_resend_request(seq, i + 1, s - 1, mac_key);
        return Decision::Respond(resend);
    }

    // R5
    if fault.take_ignored_sequence(s) {
        return Decision::Ignored;
    }

    // R6
    if fault.take_nack_next() {
        let seq = session.next_output_seq();
        let nack = builder::build_nack(parsed.transaction_reference.as_deref().unwrap_or("UNKNOWN"), seq, "7", "ADVERSARIAL_TEST", mac_key);
        session.input_seq = s;
        session.last_activity = Utc::now();
        return Decision::RespondAndAdvance(nack);
    }

    // R7: default.
    let seq = session.next_output_seq();
    let ack = builder::build_ack(parsed, seq, mac_key);
    session.input_seq = s;
    session.last_activity = Utc::now();
    Decision::RespondAndAdvance(ack)
}

/// `latency_ms > 0` gates a sleep before R3–R7 run, per the spec.
pub fn latency_sleep_duration(fault: &FaultTable) -> Option<Duration> {
    let ms = fault.latency_ms();
    if ms > 0 {
        Some(Duration::from_millis(ms))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::ErrorMode;
    use crate::message::parse;

    fn msg(seq: i64) -> ParsedMessage {
        let raw = format!("{{1:F01}}{{2:I01}}{{4:\n:20:X\n:34:{seq}\n-}}\n");
        parse(&raw).unwrap()
    }

    #[test]
    fn happy_path_acks_and_advances() {
        let mut session = Session::new("S");
        let fault = FaultTable::new();
        let d = decide(&mut session, &msg(1), &fault, trailer::DEFAULT_MAC_KEY);
        assert!(matches!(d, Decision::RespondAndAdvance(_)));
        assert_eq!(session.input_seq, 1);
        assert_eq!(session.output_seq, 1);
    }

    #[test]
    fn gap_yields_resend_and_does_not_advance() {
        let mut session = Session::new("S");
        session.input_seq = 10;
        let fault = FaultTable::new();
        let d = decide(&mut session, &msg(12), &fault, trailer::DEFAULT_MAC_KEY);
        match d {
            Decision::Respond(body) => {
                assert!(body.contains(":7:11"));
                assert!(body.contains(":16:11"));
            }
            other => panic!("expected Respond(resend), got {other:?}"),
        }
        assert_eq!(session.input_seq, 10);
    }

    #[test]
    fn nack_next_is_consumed_once() {
        let mut session = Session::new("S");
        let fault = FaultTable::new();
        fault.set_error_mode(ErrorMode::NackNext, None);

        let d1 = decide(&mut session, &msg(1), &fault, trailer::DEFAULT_MAC_KEY);
        match d1 {
            Decision::RespondAndAdvance(body) => assert!(body.contains(":77E:NACK")),
            other => panic!("expected NACK, got {other:?}"),
        }
        assert_eq!(session.input_seq, 1);

        let d2 = decide(&mut session, &msg(2), &fault, trailer::DEFAULT_MAC_KEY);
        match d2 {
            Decision::RespondAndAdvance(body) => assert!(body.contains(":77E:ACK")),
            other => panic!("expected ACK, got {other:?}"),
        }
    }

    #[test]
    fn ignored_sequence_produces_no_response_once() {
        let mut session = Session::new("S");
        let fault = FaultTable::new();
        fault.add_ignored_sequences(&[1]);

        let d1 = decide(&mut session, &msg(1), &fault, trailer::DEFAULT_MAC_KEY);
        assert!(matches!(d1, Decision::Ignored));
        assert_eq!(session.input_seq, 0);

        let d2 = decide(&mut session, &msg(1), &fault, trailer::DEFAULT_MAC_KEY);
        assert!(matches!(d2, Decision::RespondAndAdvance(_)));
    }

    #[test]
    fn drop_connection_is_one_shot() {
        let mut session = Session::new("S");
        let fault = FaultTable::new();
        fault.set_error_mode(ErrorMode::DropConnection, None);
        assert!(matches!(
            decide(&mut session, &msg(1), &fault, trailer::DEFAULT_MAC_KEY),
            Decision::DropConnection
        ));
        assert!(matches!(
            decide(&mut session, &msg(1), &fault, trailer::DEFAULT_MAC_KEY),
            Decision::RespondAndAdvance(_)
        ));
    }

    #[test]
    fn invalid_trailer_nacks_and_does_not_advance() {
        let mut session = Session::new("S");
        let fault = FaultTable::new();
        let raw = "{1:F01}{2:I01}{4:\n:20:X\n:34:5\n-}\n{5:{MAC:BAD}{CHK:BAD}}";
        let parsed = parse(raw).unwrap();
        let d = decide(&mut session, &parsed, &fault, trailer::DEFAULT_MAC_KEY);
        match d {
            Decision::Respond(body) => assert!(body.contains(":451:5")),
            other => panic!("expected NACK Respond, got {other:?}"),
        }
        assert_eq!(session.input_seq, 0);
    }

    #[test]
    fn duplicate_sequence_acks_without_advancing() {
        let mut session = Session::new("S");
        session.input_seq = 5;
        let fault = FaultTable::new();
        let d = decide(&mut session, &msg(5), &fault, trailer::DEFAULT_MAC_KEY);
        match d {
            Decision::Respond(body) => assert!(body.contains(":77E:ACK")),
            other => panic!("expected Respond(ack), got {other:?}"),
        }
        assert_eq!(session.input_seq, 5);
    }

    #[test]
    fn classify_distinguishes_login_mt103_and_unknown() {
        let login = parse("{1:F01}{2:I01}{4:\n:20:LOGIN\n-}\n").unwrap();
        assert_eq!(classify(&login), MessageKind::Login);

        let mt103 = msg(1);
        assert_eq!(classify(&mt103), MessageKind::Unknown);

        let with_amount = parse("{1:F01}{2:I01}{4:\n:20:X\n:32A:240107USD1000,00\n-}\n").unwrap();
        assert_eq!(classify(&with_amount), MessageKind::Mt103);
    }

    #[test]
    fn output_seq_is_monotonic_across_multiple_messages() {
        let mut session = Session::new("S");
        let fault = FaultTable::new();
        for seq in 1..=3 {
            let d = decide(&mut session, &msg(seq), &fault, trailer::DEFAULT_MAC_KEY);
            assert!(matches!(d, Decision::RespondAndAdvance(_)));
        }
        assert_eq!(session.output_seq, 3);
    }
}
