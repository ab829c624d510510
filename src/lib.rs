//! Realtime update client for the CLMM LP strategy-optimizer dashboard.
//!
//! The crate delivers server-pushed position valuations and operator alerts
//! to any number of UI consumers over two independent websocket channels,
//! surviving transport failures with bounded exponential reconnects.
//! Snapshot state comes from the REST API and is out of scope here; events
//! missed while disconnected are never replayed, so consumers re-fetch a
//! snapshot after a reconnect.
//!
//! The crate is organized by concern:
//! - `backoff`: reconnect delay scheduling.
//! - `stream`: channels, wire protocol, subscriber fan-out, orchestration.

/// Reconnect backoff scheduling.
pub mod backoff;
/// Realtime stream client modules.
pub mod stream;
