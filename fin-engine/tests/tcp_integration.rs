//! End-to-end exercise of the FIN wire protocol against a real bound
//! `TcpListener`: the LOGIN handshake, a normal ACK round trip, and gap
//! detection triggering a Resend Request.

use fin_engine::connection;
use fin_engine::engine::Engine;
use fin_engine::fault::ErrorMode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn spawn_one_connection(name: &str) -> (Arc<Engine>, std::net::SocketAddr) {
    let path = std::env::temp_dir().join(format!("fin-engine-integration-{name}-{}.json", std::process::id()));
    let _ = std::fs::remove_file(&path);
    let engine = Arc::new(Engine::new(fin_engine::trailer::DEFAULT_MAC_KEY, path, 100));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let engine_for_task = Arc::clone(&engine);
    tokio::spawn(async move {
        let (stream, peer) = listener.accept().await.unwrap();
        let draining = Arc::new(AtomicBool::new(false));
        connection::handle(engine_for_task, stream, peer, draining).await;
    });

    (engine, addr)
}

async fn read_frame(stream: &mut TcpStream) -> String {
    let mut buf = vec![0u8; 4096];
    let n = stream.read(&mut buf).await.unwrap();
    String::from_utf8_lossy(&buf[..n]).to_string()
}

#[tokio::test]
async fn handshake_then_ack_round_trip() {
    let (_engine, addr) = spawn_one_connection("handshake").await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let greeting = read_frame(&mut stream).await;
    assert!(greeting.contains("LOGIN_OK"));

    stream
        .write_all(b"{1:F01}{2:I01}{4:\n:20:LOGIN\n-}\n")
        .await
        .unwrap();
    let login_ack = read_frame(&mut stream).await;
    assert!(login_ack.contains("LOGIN_ACK"));

    stream
        .write_all(b"{1:F01}{2:I01}{4:\n:20:TX-1\n:34:1\n-}\n")
        .await
        .unwrap();
    let ack = read_frame(&mut stream).await;
    assert!(ack.contains(":77E:ACK"));
    assert!(ack.contains(":34:1"));
}

#[tokio::test]
async fn sequence_gap_triggers_resend_request() {
    let (_engine, addr) = spawn_one_connection("gap").await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let _ = read_frame(&mut stream).await; // LOGIN-OK greeting

    stream
        .write_all(b"{1:F01}{2:I01}{4:\n:20:LOGIN\n-}\n")
        .await
        .unwrap();
    let _ = read_frame(&mut stream).await; // LOGIN-ACK

    stream
        .write_all(b"{1:F01}{2:I01}{4:\n:20:TX-5\n:34:5\n-}\n")
        .await
        .unwrap();
    let resend = read_frame(&mut stream).await;
    assert!(resend.contains(":7:1"));
    assert!(resend.contains(":16:4"));
}

#[tokio::test]
async fn timeout_fault_sends_no_response_after_the_fixed_delay() {
    let (engine, addr) = spawn_one_connection("timeout").await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let _ = read_frame(&mut stream).await; // LOGIN-OK greeting

    stream
        .write_all(b"{1:F01}{2:I01}{4:\n:20:LOGIN\n-}\n")
        .await
        .unwrap();
    let _ = read_frame(&mut stream).await; // LOGIN-ACK

    engine.fault_table().set_error_mode(ErrorMode::Timeout, None);

    stream
        .write_all(b"{1:F01}{2:I01}{4:\n:20:TX-1\n:34:1\n-}\n")
        .await
        .unwrap();

    let mut buf = vec![0u8; 4096];
    let result = tokio::time::timeout(Duration::from_millis(500), stream.read(&mut buf)).await;
    assert!(result.is_err(), "expected no response within R2's delay window");

    let result = tokio::time::timeout(Duration::from_millis(2000), stream.read(&mut buf)).await;
    assert!(result.is_err(), "expected no response at all for a timeout fault");
}

#[tokio::test]
async fn drop_connection_fault_fires_immediately_despite_a_configured_latency() {
    let (engine, addr) = spawn_one_connection("drop_latency").await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let _ = read_frame(&mut stream).await; // LOGIN-OK greeting

    stream
        .write_all(b"{1:F01}{2:I01}{4:\n:20:LOGIN\n-}\n")
        .await
        .unwrap();
    let _ = read_frame(&mut stream).await; // LOGIN-ACK

    engine
        .fault_table()
        .set_error_mode(ErrorMode::DropConnection, Some(5000));

    stream
        .write_all(b"{1:F01}{2:I01}{4:\n:20:TX-1\n:34:1\n-}\n")
        .await
        .unwrap();

    // The drop must not wait on the 5s latency value; the socket should
    // close (read returns Ok(0)) well within that window.
    let mut buf = vec![0u8; 4096];
    let result = tokio::time::timeout(Duration::from_millis(500), stream.read(&mut buf)).await;
    match result {
        Ok(Ok(0)) => {}
        other => panic!("expected the peer to close promptly, got {other:?}"),
    }
}

#[tokio::test]
async fn peer_close_marks_the_session_disconnected() {
    let (engine, addr) = spawn_one_connection("close").await;
    {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let _ = read_frame(&mut stream).await; // LOGIN-OK greeting
        stream
            .write_all(b"{1:F01}{2:I01}{4:\n:20:LOGIN\n-}\n")
            .await
            .unwrap();
        let _ = read_frame(&mut stream).await; // LOGIN-ACK, session now exists
    } // stream dropped here, closing the socket

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(engine.session_count(), 1);
    assert_eq!(engine.connected_session_count(), 0);
}
