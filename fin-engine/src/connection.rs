//! Per-connection task: byte framing, the LOGIN handshake, and dispatch into
//! the shared [`Engine`].

use crate::builder;
use crate::engine::{Engine, Outcome};
use crate::message;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{info, warn};

const READ_CHUNK: usize = 8192;
/// R2's fixed delay: "sleep briefly (~2s), send no response, continue loop".
const TIMEOUT_SLEEP: Duration = Duration::from_secs(2);

/// Find the end index of the first complete frame in `buf`, per the naive
/// substring-based detection this mock server uses: the buffer must contain
/// `{1:`, `{2:`, `{4:`, and either a `-}` terminator or at least three `}`
/// closing braces. The frame end prefers the end of a trailing block-5
/// trailer (`}}`), falling back to the block-4 terminator, falling back to
/// the whole buffer.
fn find_frame_end(buf: &str) -> Option<usize> {
    if !buf.contains("{1:") || !buf.contains("{2:") || !buf.contains("{4:") {
        return None;
    }
    let has_terminator = buf.contains("-}");
    if !has_terminator && buf.matches('}').count() < 3 {
        return None;
    }
    if let Some(pos) = buf.rfind("}}") {
        return Some(pos + 2);
    }
    if let Some(pos) = buf.find("-}") {
        return Some(pos + 2);
    }
    Some(buf.len())
}

/// Run one accepted connection to completion: emits the unsolicited
/// LOGIN-OK greeting, then reads frames until the peer closes, a fault
/// forces a drop, or the server starts draining for shutdown.
pub async fn handle(engine: Arc<Engine>, mut socket: TcpStream, peer: SocketAddr, draining: Arc<AtomicBool>) {
    let session_id = format!("SESSION-{}-{}", peer.ip(), peer.port());
    info!(session = %session_id, "connection accepted");

    if let Err(e) = socket.write_all(builder::build_login_ok().as_bytes()).await {
        warn!(session = %session_id, error = %e, "failed to send LOGIN-OK greeting");
        return;
    }

    let mut buf = String::new();
    let mut authenticated = false;
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        if draining.load(Ordering::Relaxed) {
            info!(session = %session_id, "draining; closing connection");
            break;
        }

        let n = match socket.read(&mut chunk).await {
            Ok(0) => {
                info!(session = %session_id, "peer closed connection");
                break;
            }
            Ok(n) => n,
            Err(e) => {
                warn!(session = %session_id, error = %e, "socket read error");
                break;
            }
        };
        buf.push_str(&String::from_utf8_lossy(&chunk[..n]));

        while let Some(end) = find_frame_end(&buf) {
            let frame: String = buf.drain(..end).collect();

            if !authenticated {
                if let Ok(parsed) = message::parse(&frame) {
                    if parsed.is_login() {
                        authenticated = true;
                        let ack = engine.authenticate(&session_id);
                        if socket.write_all(ack.as_bytes()).await.is_err() {
                            engine.mark_disconnected(&session_id);
                            return;
                        }
                        continue;
                    }
                }
            }

            // R1/R2 take priority over the latency fault: peek at the fault
            // table (without consuming drop_connection) so a spurious sleep
            // never runs ahead of a drop or a timeout.
            let fault = engine.fault_table();
            let immediate_fault = fault.peek_drop_connection() || fault.is_timeout();
            if !immediate_fault {
                if let Some(dur) = engine.latency_sleep_duration() {
                    tokio::time::sleep(dur).await;
                }
            }

            match engine.process_inbound(&session_id, &frame) {
                Outcome::DropConnection => {
                    info!(session = %session_id, "drop_connection fault fired; closing");
                    engine.mark_disconnected(&session_id);
                    return;
                }
                Outcome::NoResponseTimeout => {
                    tokio::time::sleep(TIMEOUT_SLEEP).await;
                }
                Outcome::NoResponse => {}
                Outcome::Respond(body) => {
                    if socket.write_all(body.as_bytes()).await.is_err() {
                        engine.mark_disconnected(&session_id);
                        return;
                    }
                }
            }
        }
    }

    engine.mark_disconnected(&session_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incomplete_frame_is_not_detected() {
        assert_eq!(find_frame_end("{1:F01}{2:I01}{4:\n:20:X"), None);
    }

    #[test]
    fn block4_terminator_completes_a_frame() {
        let buf = "{1:F01}{2:I01}{4:\n:20:X\n-}\n";
        assert_eq!(find_frame_end(buf), Some(buf.len()));
    }

    #[test]
    fn trailing_block5_is_preferred_as_the_frame_boundary() {
        let frame = "{1:F01}{2:I01}{4:\n:20:X\n-}\n{5:{MAC:AAAA}{CHK:BBBB}}";
        let buf = format!("{frame}EXTRA_PENDING_BYTES");
        assert_eq!(find_frame_end(&buf), Some(frame.len()));
    }

    #[test]
    fn three_closing_braces_complete_a_frame_without_a_terminator() {
        let buf = "{1:F01}{2:I01}{4:abc}}}";
        assert!(find_frame_end(buf).is_some());
    }
}
