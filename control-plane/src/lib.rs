//! HTTP control-plane adapter for the SWIFT FIN mock: status, message log,
//! fault injection, and reset, served over `axum` against the shared
//! `fin_engine::Engine`.

pub mod api;
