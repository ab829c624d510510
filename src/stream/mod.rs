//! Realtime stream modules.
//!
//! - `channel`: per-channel websocket lifecycle and reconnect handling.
//! - `connector`: socket factory seam and transport errors.
//! - `hub`: dual-channel orchestrator bound to the dashboard lifecycle.
//! - `proto`: wire protocol messages and the frame decoder.
//! - `registry`: subscriber fan-out.

/// Channel connection state machine.
pub mod channel;
/// Socket factory abstraction and the default websocket connector.
pub mod connector;
/// Dual-channel orchestrator and page-URL mapping.
pub mod hub;
/// Wire protocol messages and decoder.
pub mod proto;
/// Subscriber registry and dispatch.
pub mod registry;
