//! Socket factory seam and transport errors.
//!
//! Channel connections never call the network stack directly; they open
//! sockets through a [`Connector`] so tests can substitute a scripted
//! transport.

use std::pin::Pin;

use futures_util::future::BoxFuture;
use futures_util::{Sink, Stream, StreamExt};
use thiserror::Error;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

/// Outbound half of an open socket.
pub type WsSink = Pin<Box<dyn Sink<Message, Error = WsError> + Send>>;
/// Inbound half of an open socket.
pub type WsSource = Pin<Box<dyn Stream<Item = Result<Message, WsError>> + Send>>;

/// Errors produced by stream transport handling.
///
/// Decode failures are deliberately not part of this enum; they are local
/// to a single frame and live in [`crate::stream::proto::DecodeFailure`].
#[derive(Debug, Error)]
pub enum StreamError {
    /// Websocket transport error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] WsError),

    /// Page URL could not be mapped onto a websocket scheme.
    #[error("invalid stream base url: {0}")]
    InvalidUrl(String),

    /// No live session is accepting outbound messages.
    #[error("send queue is closed")]
    SendQueueClosed,
}

/// Capability to open one websocket connection to a URL.
pub trait Connector: Send + Sync {
    /// Opens a socket and returns its split halves.
    fn connect(&self, url: String) -> BoxFuture<'static, Result<(WsSink, WsSource), StreamError>>;
}

/// Production connector backed by `tokio-tungstenite`.
#[derive(Clone, Copy, Debug, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn connect(&self, url: String) -> BoxFuture<'static, Result<(WsSink, WsSource), StreamError>> {
        Box::pin(async move {
            let (socket, _) = connect_async(url.as_str()).await?;
            let (sink, source) = socket.split();
            Ok((Box::pin(sink) as WsSink, Box::pin(source) as WsSource))
        })
    }
}
