//! TCP accept loop: one [`tokio::spawn`]'d task per connection, isolated so
//! a panic in one handler can never take the listener down with it.

use crate::connection;
use crate::engine::Engine;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpSocket;
use tracing::{error, info, warn};

/// Bind `{host}:{port}` with `SO_REUSEADDR` set and accept connections until
/// `draining` is flipped, spawning an isolated task per connection.
pub async fn run(engine: Arc<Engine>, host: &str, port: u16, draining: Arc<AtomicBool>) -> anyhow::Result<()> {
    let addr: std::net::SocketAddr = format!("{host}:{port}").parse()?;
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    let listener = socket.listen(1024)?;
    info!(%addr, "FIN TCP listener bound");

    loop {
        if draining.load(Ordering::Relaxed) {
            info!("accept loop draining; no longer accepting new connections");
            break;
        }

        let (stream, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                error!(error = %e, "accept failed");
                continue;
            }
        };

        let engine = Arc::clone(&engine);
        let draining = Arc::clone(&draining);
        tokio::spawn(async move {
            let handle = tokio::spawn(connection::handle(engine, stream, peer, draining));
            if let Err(e) = handle.await {
                warn!(peer = %peer, error = %e, "connection task panicked; isolated, other connections unaffected");
            }
        });
    }

    Ok(())
}
