//! Process entry point for the SWIFT FIN mock server (`swift-mock`).
//!
//! Owns the single OS process: builds the shared engine, then runs the TCP
//! FIN listener and the HTTP control plane as two tasks over the same
//! `Arc<Engine>`, since the concurrency model requires one shared mutable
//! state, not two processes.

use anyhow::Result;
use control_plane::api;
use fin_engine::{Config, Engine};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    info!(
        host = %config.host,
        port = config.port,
        control_port = config.control_port,
        "SWIFT FIN mock server starting"
    );

    let engine = Arc::new(Engine::new(
        config.mac_key.clone(),
        config.state_file.clone(),
        config.audit_cap,
    ));

    let draining = Arc::new(AtomicBool::new(false));

    let tcp_engine = Arc::clone(&engine);
    let tcp_draining = Arc::clone(&draining);
    let tcp_host = config.host.clone();
    let tcp_port = config.port;
    let tcp_task = tokio::spawn(async move {
        fin_engine::server::run(tcp_engine, &tcp_host, tcp_port, tcp_draining).await
    });

    let http_engine = Arc::clone(&engine);
    let http_addr: std::net::SocketAddr = format!("{}:{}", config.host, config.control_port).parse()?;
    let http_task = tokio::spawn(async move {
        let router = api::build_router(http_engine);
        let listener = tokio::net::TcpListener::bind(http_addr).await?;
        info!(%http_addr, "control-plane HTTP listener bound");
        axum::serve(listener, router).await?;
        Ok::<(), anyhow::Error>(())
    });

    let shutdown_engine = Arc::clone(&engine);
    let shutdown_draining = Arc::clone(&draining);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl_c received; draining connections");
            shutdown_draining.store(true, Ordering::Relaxed);
            shutdown_engine.save_now();
        }
    });

    tokio::try_join!(flatten(tcp_task), flatten(http_task))?;

    engine.save_now();
    Ok(())
}

async fn flatten<T>(handle: tokio::task::JoinHandle<Result<T>>) -> Result<T> {
    match handle.await {
        Ok(inner) => inner,
        Err(e) => Err(anyhow::anyhow!("task panicked: {e}")),
    }
}
