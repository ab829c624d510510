//! Per-channel websocket lifecycle: connect, receive, dispatch, scheduled
//! reconnect, disconnect.
//!
//! Each [`ChannelConnection`] runs at most one worker task. The worker owns
//! the socket and the reconnect timer, so there is never more than one live
//! socket or pending timer per channel; aborting the worker is what
//! `disconnect` means.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::backoff::reconnect_delay;
use crate::stream::connector::{Connector, StreamError, WsSink, WsSource};
use crate::stream::proto::{decode_frame, Envelope};
use crate::stream::registry::{SubscriberHandle, SubscriberRegistry};

/// Connection lifecycle state of one channel.
///
/// Owned exclusively by the channel; callers observe it through
/// [`ChannelConnection::state`] and never set it directly.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnectionState {
    /// No socket and no pending reconnect. Initial state, and terminal
    /// after `disconnect` or an exhausted retry budget.
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// Socket is open and frames are being dispatched.
    Connected,
    /// A reconnect timer is armed after a transport failure.
    ReconnectScheduled,
}

/// Immutable configuration for one stream channel.
#[derive(Clone, Debug)]
pub struct ChannelConfig {
    /// Endpoint path appended to the websocket base URL.
    pub endpoint_path: String,
    /// Delay before the first reconnect attempt; each later attempt doubles
    /// the previous delay.
    pub base_reconnect_delay: Duration,
    /// Maximum consecutive failed connection attempts before the channel
    /// goes terminal.
    pub max_connect_attempts: u32,
}

impl ChannelConfig {
    /// Creates a config for `endpoint_path` with default reconnect settings.
    pub fn new(endpoint_path: impl Into<String>) -> Self {
        Self {
            endpoint_path: endpoint_path.into(),
            base_reconnect_delay: Duration::from_secs(1),
            max_connect_attempts: 5,
        }
    }

    /// Sets the delay used before the first reconnect attempt.
    pub fn with_base_reconnect_delay(mut self, delay: Duration) -> Self {
        self.base_reconnect_delay = delay;
        self
    }

    /// Sets the consecutive-failure budget.
    pub fn with_max_connect_attempts(mut self, attempts: u32) -> Self {
        self.max_connect_attempts = attempts;
        self
    }
}

/// Counters exposed as the channel's observability hook.
#[derive(Debug, Default)]
pub struct ChannelStats {
    frames_dispatched: AtomicU64,
    decode_failures: AtomicU64,
    reconnects_scheduled: AtomicU64,
    retries_exhausted: AtomicBool,
}

impl ChannelStats {
    /// Frames decoded and handed to subscribers.
    pub fn frames_dispatched(&self) -> u64 {
        self.frames_dispatched.load(Ordering::Relaxed)
    }

    /// Frames dropped by the decoder.
    pub fn decode_failures(&self) -> u64 {
        self.decode_failures.load(Ordering::Relaxed)
    }

    /// Reconnect timers armed since the last `connect` call.
    pub fn reconnects_scheduled(&self) -> u64 {
        self.reconnects_scheduled.load(Ordering::Relaxed)
    }

    /// Whether the retry budget has been spent.
    pub fn retries_exhausted(&self) -> bool {
        self.retries_exhausted.load(Ordering::Relaxed)
    }

    fn record_dispatch(&self) {
        self.frames_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn record_reconnect_scheduled(&self) {
        self.reconnects_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    fn record_exhausted(&self) {
        self.retries_exhausted.store(true, Ordering::Relaxed);
    }
}

/// One websocket channel and its full lifecycle.
pub struct ChannelConnection {
    url: String,
    config: ChannelConfig,
    connector: Arc<dyn Connector>,
    registry: Arc<SubscriberRegistry>,
    state: Arc<RwLock<ConnectionState>>,
    stats: Arc<ChannelStats>,
    outbound: Mutex<Option<UnboundedSender<Value>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ChannelConnection {
    /// Creates a disconnected channel for `base_url` + the configured
    /// endpoint path.
    pub fn new(base_url: &str, config: ChannelConfig, connector: Arc<dyn Connector>) -> Self {
        let url = format!("{}{}", base_url, config.endpoint_path);
        Self {
            url,
            config,
            connector,
            registry: Arc::new(SubscriberRegistry::new()),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            stats: Arc::new(ChannelStats::default()),
            outbound: Mutex::new(None),
            worker: Mutex::new(None),
        }
    }

    /// Full websocket URL this channel connects to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Observability counters for this channel.
    pub fn stats(&self) -> &ChannelStats {
        &self.stats
    }

    /// Registers a subscriber for this channel's envelopes.
    pub fn subscribe<F>(&self, handler: F) -> SubscriberHandle
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.registry.subscribe(handler)
    }

    /// Starts the channel worker. No-op while a worker is already live.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&self) {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = worker.as_ref() {
            if !handle.is_finished() {
                return;
            }
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        *self
            .outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(outbound_tx);

        let ctx = WorkerContext {
            url: self.url.clone(),
            config: self.config.clone(),
            connector: Arc::clone(&self.connector),
            registry: Arc::clone(&self.registry),
            state: Arc::clone(&self.state),
            stats: Arc::clone(&self.stats),
        };
        *worker = Some(tokio::spawn(channel_worker(ctx, outbound_rx)));
    }

    /// Tears the channel down: closes any open socket, cancels any pending
    /// reconnect timer, and leaves the state `Disconnected` until the next
    /// explicit `connect`.
    pub fn disconnect(&self) {
        if let Some(handle) = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
        self.outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        set_state(&self.state, ConnectionState::Disconnected);
    }

    /// Queues an arbitrary JSON control message for the channel socket.
    ///
    /// Messages are sent in order while a session is open; there is no
    /// delivery contract beyond that.
    pub fn send(&self, message: Value) -> Result<(), StreamError> {
        let guard = self.outbound.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(tx) => tx.send(message).map_err(|_| StreamError::SendQueueClosed),
            None => Err(StreamError::SendQueueClosed),
        }
    }
}

impl Drop for ChannelConnection {
    fn drop(&mut self) {
        if let Some(handle) = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

struct WorkerContext {
    url: String,
    config: ChannelConfig,
    connector: Arc<dyn Connector>,
    registry: Arc<SubscriberRegistry>,
    state: Arc<RwLock<ConnectionState>>,
    stats: Arc<ChannelStats>,
}

enum SessionOutcome {
    /// All outbound senders dropped; the channel is shutting down.
    Shutdown,
    /// Transport failure or abnormal close; eligible for reconnect.
    Lost,
}

async fn channel_worker(ctx: WorkerContext, mut outbound_rx: UnboundedReceiver<Value>) {
    let mut attempts: u32 = 0;
    loop {
        set_state(&ctx.state, ConnectionState::Connecting);
        match ctx.connector.connect(ctx.url.clone()).await {
            Ok((sink, source)) => {
                // Open event: the consecutive-failure counter starts over.
                attempts = 0;
                set_state(&ctx.state, ConnectionState::Connected);
                info!(event = "channel_connected", url = %ctx.url);

                match run_session(sink, source, &mut outbound_rx, &ctx).await {
                    SessionOutcome::Shutdown => {
                        set_state(&ctx.state, ConnectionState::Disconnected);
                        return;
                    }
                    SessionOutcome::Lost => {}
                }
            }
            Err(err) => {
                warn!(event = "connect_failed", url = %ctx.url, error = %err);
            }
        }

        attempts += 1;
        if attempts >= ctx.config.max_connect_attempts {
            error!(
                event = "retries_exhausted",
                url = %ctx.url,
                attempts,
                "retry budget spent; channel stays disconnected until an explicit connect"
            );
            ctx.stats.record_exhausted();
            set_state(&ctx.state, ConnectionState::Disconnected);
            return;
        }

        let delay = reconnect_delay(attempts, ctx.config.base_reconnect_delay);
        ctx.stats.record_reconnect_scheduled();
        set_state(&ctx.state, ConnectionState::ReconnectScheduled);
        debug!(
            event = "reconnect_scheduled",
            url = %ctx.url,
            attempt = attempts,
            delay_ms = delay.as_millis() as u64
        );
        tokio::time::sleep(delay).await;
    }
}

async fn run_session(
    mut sink: WsSink,
    mut source: WsSource,
    outbound_rx: &mut UnboundedReceiver<Value>,
    ctx: &WorkerContext,
) -> SessionOutcome {
    loop {
        tokio::select! {
            maybe_outbound = outbound_rx.recv() => match maybe_outbound {
                Some(message) => {
                    if sink.send(Message::Text(message.to_string())).await.is_err() {
                        return SessionOutcome::Lost;
                    }
                }
                None => {
                    let _ = sink.close().await;
                    return SessionOutcome::Shutdown;
                }
            },
            maybe_frame = source.next() => match maybe_frame {
                Some(Ok(Message::Text(text))) => match decode_frame(&text) {
                    Ok(envelope) => {
                        ctx.stats.record_dispatch();
                        ctx.registry.dispatch(&envelope);
                    }
                    Err(err) => {
                        // A bad frame is dropped; the stream stays up.
                        ctx.stats.record_decode_failure();
                        warn!(event = "frame_rejected", url = %ctx.url, error = %err);
                    }
                },
                Some(Ok(Message::Ping(payload))) => {
                    if sink.send(Message::Pong(payload)).await.is_err() {
                        return SessionOutcome::Lost;
                    }
                }
                Some(Ok(Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) => return SessionOutcome::Lost,
                Some(Ok(_)) => {
                    ctx.stats.record_decode_failure();
                    warn!(event = "frame_rejected", url = %ctx.url, "non-text frame dropped");
                }
                Some(Err(err)) => {
                    warn!(event = "transport_error", url = %ctx.url, error = %err);
                    return SessionOutcome::Lost;
                }
                None => return SessionOutcome::Lost,
            },
        }
    }
}

fn set_state(state: &RwLock<ConnectionState>, next: ConnectionState) {
    *state.write().unwrap_or_else(PoisonError::into_inner) = next;
}
