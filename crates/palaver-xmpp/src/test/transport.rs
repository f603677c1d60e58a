// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use minidom::Element;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};

use crate::ns;
use crate::stanza::StanzaBuilder;
use crate::transport::{
    Transport, TransportError, TransportEvent, TransportProvider, TransportStatus,
};

pub const BOUND_JID: &str = "test@prose.org/test";

pub type SentStanzaHandler = dyn FnMut(&Element) -> Vec<Element> + Send;

/// The server side of a [`MockTransport`].
///
/// Negotiation (SASL PLAIN and resource binding) is answered automatically and succeeds unless
/// told otherwise via [`MockServer::reject_auth`] or [`MockServer::reject_bind`]. Every other
/// stanza is recorded and handed to the stanza handler whose return values are delivered back to the
/// client. Without a handler, `get` and `set` iqs receive an empty result.
#[derive(Default, Clone)]
pub struct MockServer {
    inner: Arc<MockServerInner>,
}

#[derive(Default)]
struct MockServerInner {
    sent_stanzas: Mutex<Vec<Element>>,
    stanza_handler: Mutex<Option<Box<SentStanzaHandler>>>,
    inbound: Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>,
    delivered: AtomicUsize,
    consumed: AtomicUsize,
    handled: AtomicUsize,
    idle: Notify,
    auth_failure: Mutex<Option<String>>,
    bind_error: Mutex<Option<String>>,
    withholds_auth: AtomicBool,
    ignores_disconnect: AtomicBool,
}

impl MockServer {
    pub fn provider(&self) -> TransportProvider {
        let server = self.clone();
        Box::new(move || Box::new(MockTransport::new(server.clone())) as Box<dyn Transport>)
    }

    pub fn set_stanza_handler<F>(&self, handler: F)
    where
        F: FnMut(&Element) -> Vec<Element> + Send + 'static,
    {
        *self.inner.stanza_handler.lock() = Some(Box::new(handler))
    }

    /// Answers the next SASL `<auth/>` with a `<failure/>` carrying `condition`.
    pub fn reject_auth(&self, condition: impl Into<String>) {
        *self.inner.auth_failure.lock() = Some(condition.into())
    }

    /// Never answers SASL `<auth/>`, which keeps the client in `Authenticating`.
    pub fn withhold_auth_response(&self) {
        self.inner.withholds_auth.store(true, Ordering::SeqCst)
    }

    /// Answers resource binding with an error carrying the stanza error `condition`.
    pub fn reject_bind(&self, condition: impl Into<String>) {
        *self.inner.bind_error.lock() = Some(condition.into())
    }

    /// Leaves the stream open when the client disconnects, as an unresponsive server would.
    pub fn ignore_disconnect(&self) {
        self.inner.ignores_disconnect.store(true, Ordering::SeqCst)
    }

    pub fn sent_stanzas(&self) -> Vec<Element> {
        self.inner.sent_stanzas.lock().clone()
    }

    pub fn sent_stanza_strings(&self) -> Vec<String> {
        self.inner
            .sent_stanzas
            .lock()
            .iter()
            .map(String::from)
            .collect()
    }

    pub fn reset(&self) {
        self.inner.sent_stanzas.lock().clear()
    }

    /// Delivers `stanza` to the client and waits until the connection has dispatched it.
    pub async fn receive_stanza(&self, stanza: impl Into<Element>) {
        let target = self.deliver(TransportEvent::Element(stanza.into()));

        loop {
            let idle = self.inner.idle.notified();
            if self.inner.handled.load(Ordering::SeqCst) >= target {
                break;
            }
            idle.await;
        }
    }

    /// Waits until the connection has sent everything that was queued before this call.
    ///
    /// Outbound stanzas are flushed before the next inbound element is handled, so a round trip
    /// of an element nobody is interested in suffices.
    pub async fn flush(&self) {
        self.receive_stanza(
            StanzaBuilder::iq("result")
                .attr("id", "mock-server-flush")
                .build(),
        )
        .await
    }

    /// Ends the stream from the server side.
    pub fn close(&self) {
        self.deliver(TransportEvent::Closed { error: None });
    }

    fn deliver(&self, event: TransportEvent) -> usize {
        let Some(inbound) = &*self.inner.inbound.lock() else {
            return self.inner.delivered.load(Ordering::SeqCst);
        };
        if inbound.send(event).is_err() {
            return self.inner.delivered.load(Ordering::SeqCst);
        }
        self.inner.delivered.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn respond_to(&self, stanza: &Element) {
        self.inner.sent_stanzas.lock().push(stanza.clone());

        let responses = match self.inner.stanza_handler.lock().as_mut() {
            Some(handler) => handler(stanza),
            None => default_response(stanza).into_iter().collect(),
        };

        for response in responses {
            self.deliver(TransportEvent::Element(response));
        }
    }
}

pub struct MockTransport {
    server: MockServer,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    status: TransportStatus,
}

impl MockTransport {
    fn new(server: MockServer) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        *server.inner.inbound.lock() = Some(tx);
        server.inner.delivered.store(0, Ordering::SeqCst);
        server.inner.consumed.store(0, Ordering::SeqCst);
        server.inner.handled.store(0, Ordering::SeqCst);

        MockTransport {
            server,
            events: rx,
            status: TransportStatus::Disconnected,
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&mut self, _domain: &str) -> Result<(), TransportError> {
        self.status = TransportStatus::Connected;
        self.server.deliver(TransportEvent::Element(
            StanzaBuilder::new("features", ns::STREAM)
                .c_ns("mechanisms", ns::SASL)
                .text_child("mechanism", "PLAIN")
                .build(),
        ));
        Ok(())
    }

    async fn restart(&mut self) -> Result<(), TransportError> {
        self.server.deliver(TransportEvent::Element(
            StanzaBuilder::new("features", ns::STREAM)
                .c_ns("bind", ns::BIND)
                .build(),
        ));
        Ok(())
    }

    async fn send(&mut self, stanza: Element) -> Result<(), TransportError> {
        if stanza.is("auth", ns::SASL) {
            if self.server.inner.withholds_auth.load(Ordering::SeqCst) {
                return Ok(());
            }
            let response = match self.server.inner.auth_failure.lock().take() {
                Some(condition) => StanzaBuilder::new("failure", ns::SASL)
                    .c(condition)
                    .build(),
                None => StanzaBuilder::new("success", ns::SASL).build(),
            };
            self.server.deliver(TransportEvent::Element(response));
            return Ok(());
        }

        if stanza.name() == "iq" && stanza.get_child("bind", ns::BIND).is_some() {
            let response = match self.server.inner.bind_error.lock().as_deref() {
                Some(condition) => StanzaBuilder::iq("error")
                    .attr("id", stanza.attr("id"))
                    .c("error")
                    .attr("type", "cancel")
                    .c_ns(condition, ns::STANZAS)
                    .build(),
                None => StanzaBuilder::iq("result")
                    .attr("id", stanza.attr("id"))
                    .c_ns("bind", ns::BIND)
                    .text_child("jid", BOUND_JID)
                    .build(),
            };
            self.server.deliver(TransportEvent::Element(response));
            return Ok(());
        }

        self.server.respond_to(&stanza);
        Ok(())
    }

    async fn disconnect(&mut self, _presence: Option<Element>) -> Result<(), TransportError> {
        self.status = TransportStatus::Disconnecting;
        if !self.server.inner.ignores_disconnect.load(Ordering::SeqCst) {
            self.server.close();
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.status = TransportStatus::Disconnected;
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        // The driver only asks for the next event once the previous one has been handled.
        let consumed = self.server.inner.consumed.load(Ordering::SeqCst);
        self.server.inner.handled.store(consumed, Ordering::SeqCst);
        self.server.inner.idle.notify_waiters();
        let event = self.events.recv().await;
        if event.is_some() {
            self.server.inner.consumed.fetch_add(1, Ordering::SeqCst);
        }
        event
    }

    fn status_check(&self) -> TransportStatus {
        self.status
    }

    fn set_service(&mut self, _url: String) {}
}

fn default_response(stanza: &Element) -> Option<Element> {
    if stanza.name() != "iq" || !matches!(stanza.attr("type"), Some("get") | Some("set")) {
        return None;
    }

    let mut result = StanzaBuilder::iq("result")
        .attr("id", stanza.attr("id"))
        .attr("from", stanza.attr("to"));

    // Roster-style queries are answered with an empty query so that modules expecting a
    // payload find one.
    if let Some(query) = stanza
        .children()
        .find(|child| child.name() == "query" && child.ns() == ns::ROSTER)
    {
        result = result.c_ns("query", query.ns());
    }

    Some(result.build())
}
