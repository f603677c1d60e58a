// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use jid::{FullJid, Jid};
use minidom::Element;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, error};

pub use body::Body;
pub use http::{HttpClient, ReqwestHttpClient};
pub use session::{BoshAction, BoshSession, BoshStep, StoredSession, SESSION_STORAGE_KEY};

use crate::deps::KeyValueStore;
use crate::transport::{Transport, TransportError, TransportEvent, TransportStatus};

mod body;
mod http;
mod request;
mod session;

/// XEP-0124 session parameters we ask the connection manager for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoshConfig {
    /// Longest time in seconds the connection manager may hold a request.
    pub wait: u64,
    pub hold: u32,
    /// Maximum rid distance between the two concurrent requests.
    pub window: u32,
    pub max_retries: u32,
    pub content_type: String,
}

impl Default for BoshConfig {
    fn default() -> Self {
        BoshConfig {
            wait: 60,
            hold: 1,
            window: 5,
            max_retries: 5,
            content_type: "text/xml; charset=utf-8".to_string(),
        }
    }
}

struct HttpResponse {
    request_id: u64,
    status: u16,
    body: String,
}

/// Runs a `BoshSession` over HTTP. Each POST runs in its own task, completions are fed back into
/// the session from `next_event`.
pub struct BoshTransport {
    service: String,
    content_type: String,
    session: BoshSession,
    http: Arc<dyn HttpClient>,
    in_flight: HashMap<u64, AbortHandle>,
    responses_tx: mpsc::UnboundedSender<HttpResponse>,
    responses_rx: mpsc::UnboundedReceiver<HttpResponse>,
    pending_events: VecDeque<TransportEvent>,
}

impl BoshTransport {
    pub fn new(service: impl Into<String>, config: BoshConfig, http: Arc<dyn HttpClient>) -> Self {
        let (responses_tx, responses_rx) = mpsc::unbounded_channel();

        BoshTransport {
            service: service.into(),
            content_type: config.content_type.clone(),
            session: BoshSession::new(config),
            http,
            in_flight: Default::default(),
            responses_tx,
            responses_rx,
            pending_events: Default::default(),
        }
    }

    /// Keeps the session in `store` so that it can be restored later.
    pub fn with_session_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.session.set_session_store(store);
        self
    }

    fn apply(&mut self, step: BoshStep) {
        for action in step.actions {
            match action {
                BoshAction::Post {
                    request_id,
                    body,
                    delay,
                } => self.post(request_id, body, delay),
                BoshAction::Abort { request_id } => {
                    if let Some(handle) = self.in_flight.remove(&request_id) {
                        debug!("Aborting request {}", request_id);
                        handle.abort()
                    }
                }
            }
        }
        self.pending_events.extend(step.events);
    }

    fn post(&mut self, request_id: u64, body: String, delay: std::time::Duration) {
        let http = self.http.clone();
        let tx = self.responses_tx.clone();
        let url = self.service.clone();
        let content_type = self.content_type.clone();

        #[cfg(feature = "trace-stanzas")]
        tracing::trace!("POST {}: {}", request_id, body);

        let handle = tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let (status, body) = match http.post(&url, &content_type, body).await {
                Ok(response) => response,
                Err(err) => {
                    error!("BOSH request {} failed. {}", request_id, err);
                    (0, String::new())
                }
            };

            _ = tx.send(HttpResponse {
                request_id,
                status,
                body,
            });
        });

        self.in_flight.insert(request_id, handle.abort_handle());
    }

    fn abort_all(&mut self) {
        for (_, handle) in self.in_flight.drain() {
            handle.abort()
        }
    }
}

impl Drop for BoshTransport {
    fn drop(&mut self) {
        self.abort_all()
    }
}

#[async_trait]
impl Transport for BoshTransport {
    async fn connect(&mut self, domain: &str) -> Result<(), TransportError> {
        if url::Url::parse(&self.service).is_err() {
            return Err(TransportError::InvalidService {
                url: self.service.clone(),
            });
        }

        self.abort_all();
        self.session.reset();
        self.pending_events.clear();

        let step = self.session.connect(domain, now());
        self.apply(step);
        Ok(())
    }

    async fn restart(&mut self) -> Result<(), TransportError> {
        let step = self.session.restart(now());
        self.apply(step);
        Ok(())
    }

    async fn send(&mut self, stanza: Element) -> Result<(), TransportError> {
        if self.session.status() == TransportStatus::Disconnected {
            return Err(TransportError::NotConnected);
        }
        let step = self.session.send(stanza, now());
        self.apply(step);
        Ok(())
    }

    async fn disconnect(&mut self, presence: Option<Element>) -> Result<(), TransportError> {
        let step = self.session.disconnect(presence, now());
        self.apply(step);
        Ok(())
    }

    fn reset(&mut self) {
        self.abort_all();
        self.session.reset();
        self.pending_events.clear();
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        loop {
            if let Some(event) = self.pending_events.pop_front() {
                return Some(event);
            }

            let response = self.responses_rx.recv().await?;
            if self.in_flight.remove(&response.request_id).is_none() {
                continue;
            }

            #[cfg(feature = "trace-stanzas")]
            tracing::trace!("RECV {}: {}", response.request_id, response.body);

            let step = self.session.on_response(
                response.request_id,
                response.status,
                &response.body,
                now(),
            );
            self.apply(step);
        }
    }

    fn on_idle(&mut self, now: Instant) {
        let step = self.session.tick(now);
        self.apply(step);
    }

    fn status_check(&self) -> TransportStatus {
        self.session.status()
    }

    fn set_service(&mut self, url: String) {
        self.service = url
    }

    fn set_authenticated(&mut self, jid: Option<FullJid>) {
        self.session.set_authenticated(jid)
    }

    fn restore(&mut self, jid: &Jid) -> Result<FullJid, TransportError> {
        self.session.restore(jid)
    }

    fn clear_session(&mut self) {
        self.session.clear_stored_session()
    }
}

fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}
