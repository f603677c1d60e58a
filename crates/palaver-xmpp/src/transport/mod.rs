// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::time::Instant;

use async_trait::async_trait;
use jid::{FullJid, Jid};
use minidom::Element;
use serde::{Deserialize, Serialize};

pub use bosh::{BoshConfig, BoshTransport, HttpClient, ReqwestHttpClient};
pub use error::TransportError;
pub use websocket::WebSocketTransport;

pub mod bosh;
mod error;
pub mod websocket;

/// Selects the physical channel once, when the connection is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    WebSocket,
    Bosh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportStatus {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A stanza or stream-level element (features, SASL, stream errors) arrived.
    Element(Element),
    /// The server refused the stream. The transport has been reset.
    Failed { condition: String },
    /// The server asked us to continue on another service URL.
    Redirect { url: String },
    /// The channel is gone. `error` is `None` for a graceful close.
    Closed { error: Option<TransportError> },
}

/// A single physical channel to the server.
///
/// All methods are called from the connection's driver task only.
#[async_trait]
pub trait Transport: Send {
    /// Opens the channel and the XML stream towards `domain`.
    async fn connect(&mut self, domain: &str) -> Result<(), TransportError>;

    /// Restarts the XML stream, e.g. after successful SASL authentication.
    async fn restart(&mut self) -> Result<(), TransportError>;

    async fn send(&mut self, stanza: Element) -> Result<(), TransportError>;

    /// Closes the stream gracefully, sending `presence` as the last stanza.
    async fn disconnect(&mut self, presence: Option<Element>) -> Result<(), TransportError>;

    /// Drops the channel without any further traffic.
    fn reset(&mut self);

    /// Waits for the next event. Must be cancel-safe.
    async fn next_event(&mut self) -> Option<TransportEvent>;

    /// Called every 100 ms by the connection's idle tick.
    fn on_idle(&mut self, _now: Instant) {}

    fn status_check(&self) -> TransportStatus;

    /// Points the transport at another service URL for the next `connect`.
    fn set_service(&mut self, url: String);

    /// Informs the transport that the stream is authenticated as `jid` (or no longer is).
    fn set_authenticated(&mut self, _jid: Option<FullJid>) {}

    /// Reattaches to a previously persisted session. Returns the JID the session belongs to.
    fn restore(&mut self, _jid: &Jid) -> Result<FullJid, TransportError> {
        Err(TransportError::NoSession)
    }

    /// Forgets a persisted session.
    fn clear_session(&mut self) {}
}

/// Creates a fresh transport for every connection attempt.
pub type TransportProvider = Box<dyn Fn() -> Box<dyn Transport> + Send + Sync>;
