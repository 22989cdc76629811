//! Configuration for the SWIFT FIN mock engine.

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Host the TCP FIN listener binds to.
    pub host: String,

    /// Port the TCP FIN listener binds to.
    pub port: u16,

    /// Port the control-plane HTTP server binds to.
    pub control_port: u16,

    /// Path to the JSON snapshot file used to persist sessions and the
    /// audit log across restarts.
    pub state_file: String,

    /// MAC key used by the trailer codec. Overridable so tests (and anyone
    /// probing determinism) can vary it without touching the binary.
    pub mac_key: String,

    /// Number of audit log entries retained across a persistence cycle.
    pub audit_cap: usize,

    /// Verbose (debug-level) tracing.
    pub debug: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            host: std::env::var("SWIFT_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("SWIFT_PORT")
                .unwrap_or_else(|_| "10103".into())
                .parse()
                .context("Invalid SWIFT_PORT")?,
            control_port: std::env::var("SWIFT_CONTROL_PORT")
                .unwrap_or_else(|_| "8888".into())
                .parse()
                .context("Invalid SWIFT_CONTROL_PORT")?,
            state_file: std::env::var("SWIFT_STATE_FILE")
                .unwrap_or_else(|_| "/tmp/swift_mock_state.json".into()),
            mac_key: std::env::var("SWIFT_MAC_KEY")
                .unwrap_or_else(|_| crate::trailer::DEFAULT_MAC_KEY.to_string()),
            audit_cap: std::env::var("SWIFT_AUDIT_CAP")
                .unwrap_or_else(|_| "1000".into())
                .parse()
                .unwrap_or(crate::store::AUDIT_CAP_DEFAULT),
            debug: std::env::var("SWIFT_DEBUG")
                .unwrap_or_else(|_| "false".into())
                .parse()
                .unwrap_or(false),
        })
    }
}
