//! Response builder: ACK, NACK, Resend Request, and the unsolicited LOGIN
//! envelopes, each trailed with a block-5 computed over the full message.
//!
//! Header literals are bit-exact with the reference implementation; do not
//! change them unless the client side changes in lockstep.

use crate::message::ParsedMessage;
use crate::trailer;
use chrono::Utc;

const ACK_NACK_BLOCK1: &str = "F21MOCKSVRXXXXAXXX0000000000";
const ACK_NACK_BLOCK2: &str = "I901MOCKRCVRXXXXN";
const RESEND_BLOCK1: &str = "F02MOCKSVRXXXXAXXX0000000000";
const RESEND_BLOCK2: &str = "I2MOCKRCVRXXXXN";

fn with_trailer(body: String, mac_key: &str) -> String {
    let chk = trailer::checksum(&body);
    let mac = trailer::mac(&body, mac_key);
    format!("{body}{{5:{{MAC:{mac}}}{{CHK:{chk}}}}}")
}

/// Build an ACK (F21) for `inbound`, with the given fresh `output_seq`.
pub fn build_ack(inbound: &ParsedMessage, output_seq: u64, mac_key: &str) -> String {
    let now = Utc::now();
    let reference = inbound
        .transaction_reference
        .clone()
        .unwrap_or_else(|| "UNKNOWN".to_string());
    let uetr = inbound
        .uetr
        .clone()
        .unwrap_or_else(|| format!("ACK-{}", now.format("%Y%m%d%H%M%S")));

    let body = format!(
        "{{1:{ACK_NACK_BLOCK1}}}{{2:{ACK_NACK_BLOCK2}}}{{4:\n\
         :20:{reference}\n:34:{output_seq}\n:77E:ACK\n:108:{uetr}\n\
         :177:{}\n:451:0\n-}}\n",
        now.format("%y%m%d%H%M")
    );
    with_trailer(body, mac_key)
}

/// Build a NACK (F21, non-zero `:451:`) for the given transaction
/// reference (pass `"UNKNOWN"` when the inbound message carried none, or
/// could not be parsed at all — see [`build_nack_for_malformed`]).
pub fn build_nack(
    reference: &str,
    output_seq: u64,
    error_code: &str,
    reason: &str,
    mac_key: &str,
) -> String {
    let now = Utc::now();

    let body = format!(
        "{{1:{ACK_NACK_BLOCK1}}}{{2:{ACK_NACK_BLOCK2}}}{{4:\n\
         :20:{reference}\n:34:{output_seq}\n:77E:NACK\n\
         :177:{}\n:451:{error_code}\n:79:{reason}\n-}}\n",
        now.format("%y%m%d%H%M")
    );
    with_trailer(body, mac_key)
}

/// Build the NACK emitted for a framed message that has no block 4 — the
/// one structural parse error the engine recognizes (error kind 2, §7).
pub fn build_nack_for_malformed(output_seq: u64, mac_key: &str) -> String {
    build_nack("UNKNOWN", output_seq, "1", "malformed", mac_key)
}

/// Build a Resend Request (MsgType 2) asking for `[from_seq, to_seq]`.
pub fn build_resend_request(output_seq: u64, from_seq: i64, to_seq: i64, mac_key: &str) -> String {
    let body = format!(
        "{{1:{RESEND_BLOCK1}}}{{2:{RESEND_BLOCK2}}}{{4:\n\
         :34:{output_seq}\n:7:{from_seq}\n:16:{to_seq}\n-}}\n"
    );
    with_trailer(body, mac_key)
}

/// Build the unsolicited LOGIN-OK greeting emitted on connection accept.
/// The spec marks the trailer optional for this one message; it is emitted
/// without one, matching the reference server's handshake.
pub fn build_login_ok() -> String {
    "{1:F21MOCKSVRXXXXAXXX0000000000}{2:I901MOCKRCVRXXXXN}{4:\n:20:LOGIN_OK\n:79:LOGIN_SUCCESSFUL\n-}\n".to_string()
}

/// Build the LOGIN-ACK sent once a session authenticates.
pub fn build_login_ack(output_seq: u64, mac_key: &str) -> String {
    let now = Utc::now();
    let body = format!(
        "{{1:{ACK_NACK_BLOCK1}}}{{2:{ACK_NACK_BLOCK2}}}{{4:\n\
         :20:LOGIN_ACK\n:34:{output_seq}\n:77E:ACK\n:79:LOGIN_SUCCESSFUL\n\
         :177:{}\n:451:0\n-}}\n",
        now.format("%y%m%d%H%M")
    );
    with_trailer(body, mac_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::parse;

    fn inbound(seq: &str) -> ParsedMessage {
        let raw = format!(
            "{{1:F01}}{{2:I01}}{{3:{{108:U-1}}}}{{4:\n:20:REF-1\n:34:{seq}\n-}}\n"
        );
        parse(&raw).unwrap()
    }

    #[test]
    fn ack_round_trips_its_own_trailer() {
        let msg = build_ack(&inbound("1"), 1, trailer::DEFAULT_MAC_KEY);
        assert!(trailer::validate_trailer(&msg, trailer::DEFAULT_MAC_KEY).is_ok());
        assert!(msg.contains(":77E:ACK"));
        assert!(msg.contains(":20:REF-1"));
        assert!(msg.contains(":34:1"));
        assert!(msg.contains(":108:U-1"));
    }

    #[test]
    fn ack_synthesizes_uetr_when_absent() {
        let raw = "{1:F01}{2:I01}{4:\n:20:REF-2\n:34:1\n-}\n";
        let parsed = parse(raw).unwrap();
        let msg = build_ack(&parsed, 1, trailer::DEFAULT_MAC_KEY);
        assert!(msg.contains(":108:ACK-"));
    }

    #[test]
    fn nack_carries_error_code_and_reason() {
        let msg = build_nack("REF-2", 2, "7", "ADVERSARIAL_TEST", trailer::DEFAULT_MAC_KEY);
        assert!(msg.contains(":77E:NACK"));
        assert!(msg.contains(":451:7"));
        assert!(msg.contains(":79:ADVERSARIAL_TEST"));
        assert!(trailer::validate_trailer(&msg, trailer::DEFAULT_MAC_KEY).is_ok());
    }

    #[test]
    fn resend_request_carries_the_gap_range() {
        let msg = build_resend_request(3, 11, 11, trailer::DEFAULT_MAC_KEY);
        assert!(msg.contains(":7:11"));
        assert!(msg.contains(":16:11"));
        assert!(msg.contains(":34:3"));
        assert!(trailer::validate_trailer(&msg, trailer::DEFAULT_MAC_KEY).is_ok());
    }

    #[test]
    fn malformed_nack_uses_unknown_reference() {
        let msg = build_nack_for_malformed(1, trailer::DEFAULT_MAC_KEY);
        assert!(msg.contains(":20:UNKNOWN"));
        assert!(msg.contains(":451:1"));
        assert!(msg.contains(":79:malformed"));
    }
}
