//! Dual-channel orchestrator bound to the dashboard view lifecycle.
//!
//! The dashboard consumes two independent streams: position valuations and
//! operator alerts. [`DashboardStream`] owns one channel for each and
//! exposes the connect-all / disconnect-all hooks the view calls on mount
//! and unmount. The channels share no socket, state, or backoff counter, so
//! a failure on one never affects the other.

use std::sync::Arc;

use crate::stream::channel::{ChannelConfig, ChannelConnection};
use crate::stream::connector::{Connector, StreamError, WsConnector};
use crate::stream::proto::Envelope;
use crate::stream::registry::SubscriberHandle;

/// Endpoint path for the position valuation channel.
pub const POSITIONS_PATH: &str = "/ws/positions";
/// Endpoint path for the operator alert channel.
pub const ALERTS_PATH: &str = "/ws/alerts";

/// Maps a page address onto its websocket base URL.
///
/// `http` upgrades to `ws` and `https` to `wss`; already-websocket schemes
/// pass through unchanged. Trailing slashes are trimmed so endpoint paths
/// can be appended directly.
pub fn ws_base_url(page_url: &str) -> Result<String, StreamError> {
    let trimmed = page_url.trim().trim_end_matches('/');
    if let Some(rest) = trimmed.strip_prefix("https://") {
        Ok(format!("wss://{rest}"))
    } else if let Some(rest) = trimmed.strip_prefix("http://") {
        Ok(format!("ws://{rest}"))
    } else if trimmed.starts_with("ws://") || trimmed.starts_with("wss://") {
        Ok(trimmed.to_string())
    } else {
        Err(StreamError::InvalidUrl(page_url.to_string()))
    }
}

/// Entry point for opening dashboard streams.
#[derive(Clone)]
pub struct DashboardClient {
    base_url: String,
    connector: Arc<dyn Connector>,
    positions: ChannelConfig,
    alerts: ChannelConfig,
}

impl DashboardClient {
    /// Creates a client for the dashboard served at `page_url`.
    pub fn new(page_url: &str) -> Result<Self, StreamError> {
        Ok(Self {
            base_url: ws_base_url(page_url)?,
            connector: Arc::new(WsConnector),
            positions: ChannelConfig::new(POSITIONS_PATH),
            alerts: ChannelConfig::new(ALERTS_PATH),
        })
    }

    /// Replaces the socket factory. Intended for tests and embedding.
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    /// Overrides reconnect settings for the positions channel.
    ///
    /// The endpoint path stays fixed at [`POSITIONS_PATH`].
    pub fn with_positions_config(mut self, config: ChannelConfig) -> Self {
        self.positions = ChannelConfig {
            endpoint_path: POSITIONS_PATH.to_string(),
            ..config
        };
        self
    }

    /// Overrides reconnect settings for the alerts channel.
    ///
    /// The endpoint path stays fixed at [`ALERTS_PATH`].
    pub fn with_alerts_config(mut self, config: ChannelConfig) -> Self {
        self.alerts = ChannelConfig {
            endpoint_path: ALERTS_PATH.to_string(),
            ..config
        };
        self
    }

    /// Builds the two channels without connecting them.
    pub fn open(&self) -> DashboardStream {
        DashboardStream {
            positions: ChannelConnection::new(
                &self.base_url,
                self.positions.clone(),
                Arc::clone(&self.connector),
            ),
            alerts: ChannelConnection::new(
                &self.base_url,
                self.alerts.clone(),
                Arc::clone(&self.connector),
            ),
        }
    }
}

/// The two independently configured dashboard channels.
pub struct DashboardStream {
    positions: ChannelConnection,
    alerts: ChannelConnection,
}

impl DashboardStream {
    /// Connects both channels. Bound to the view's mount.
    pub fn connect_all(&self) {
        self.positions.connect();
        self.alerts.connect();
    }

    /// Disconnects both channels. Bound to the view's unmount.
    ///
    /// Sockets are closed and pending reconnect timers cancelled; no
    /// further dispatch occurs on either channel after this returns.
    pub fn disconnect_all(&self) {
        self.positions.disconnect();
        self.alerts.disconnect();
    }

    /// Subscribes to position valuation envelopes.
    pub fn subscribe_positions<F>(&self, handler: F) -> SubscriberHandle
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.positions.subscribe(handler)
    }

    /// Subscribes to operator alert envelopes.
    pub fn subscribe_alerts<F>(&self, handler: F) -> SubscriberHandle
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.alerts.subscribe(handler)
    }

    /// The position valuation channel.
    pub fn positions(&self) -> &ChannelConnection {
        &self.positions
    }

    /// The operator alert channel.
    pub fn alerts(&self) -> &ChannelConnection {
        &self.alerts
    }
}
