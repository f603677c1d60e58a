// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::collections::VecDeque;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use minidom::Element;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

pub use framing::{check_stream_start, close_frame, is_secure_redirect, open_frame, parse_frame, Frame};

use crate::transport::{Transport, TransportError, TransportEvent, TransportStatus};

mod framing;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// XMPP over a single WebSocket (RFC 7395).
pub struct WebSocketTransport {
    service: String,
    domain: Option<String>,
    sink: Option<SplitSink<Socket, Message>>,
    stream: Option<SplitStream<Socket>>,
    status: TransportStatus,
    /// True until the first element after the server's `<open/>` arrived.
    initialising: bool,
    pending_events: VecDeque<TransportEvent>,
}

impl WebSocketTransport {
    pub fn new(service: impl Into<String>) -> Self {
        WebSocketTransport {
            service: service.into(),
            domain: None,
            sink: None,
            stream: None,
            status: TransportStatus::Disconnected,
            initialising: false,
            pending_events: Default::default(),
        }
    }

    async fn send_frame(&mut self, elem: &Element) -> Result<(), TransportError> {
        let Some(sink) = self.sink.as_mut() else {
            return Err(TransportError::NotConnected);
        };

        let text = String::from(elem);

        #[cfg(feature = "trace-stanzas")]
        tracing::trace!("SEND: {}", text);

        sink.send(Message::Text(text.into()))
            .await
            .map_err(|err| TransportError::Socket {
                msg: err.to_string(),
            })
    }

    fn handle_frame(&mut self, text: &str) -> Option<TransportEvent> {
        #[cfg(feature = "trace-stanzas")]
        tracing::trace!("RECV: {}", text);

        let frame = match parse_frame(text) {
            Ok(frame) => frame,
            Err(err) => {
                error!("Failed to parse WebSocket frame. {}", err);
                self.teardown();
                return Some(TransportEvent::Closed { error: Some(err) });
            }
        };

        match frame {
            Frame::Empty => None,
            Frame::Open(open) => {
                if let Err(msg) = check_stream_start(&open) {
                    error!("{}", msg);
                    self.teardown();
                    return Some(TransportEvent::Failed {
                        condition: "bad-format".to_string(),
                    });
                }
                None
            }
            Frame::Close { see_other_uri } if self.initialising => {
                self.teardown();

                let Some(see_other_uri) = see_other_uri else {
                    warn!("Received closing stream");
                    return Some(TransportEvent::Failed {
                        condition: "closed".to_string(),
                    });
                };

                if !is_secure_redirect(&self.service, &see_other_uri) {
                    error!("Received closing stream with insecure see-other-uri");
                    return Some(TransportEvent::Failed {
                        condition: "insecure-redirect".to_string(),
                    });
                }

                info!("Received see-other-uri, redirecting to {}", see_other_uri);
                self.service = see_other_uri.clone();
                Some(TransportEvent::Redirect { url: see_other_uri })
            }
            Frame::Close { .. } => {
                debug!("Server closed the stream");
                self.teardown();
                Some(TransportEvent::Closed { error: None })
            }
            Frame::Element(elem) => {
                self.initialising = false;

                // We're waiting for the server's <close/>, the final unavailable presence is
                // of no interest anymore.
                if self.status == TransportStatus::Disconnecting
                    && elem.name() == "presence"
                    && elem.attr("type") == Some("unavailable")
                {
                    return None;
                }

                if self.status == TransportStatus::Connecting {
                    self.status = TransportStatus::Connected;
                }

                Some(TransportEvent::Element(elem))
            }
        }
    }

    fn teardown(&mut self) {
        self.sink = None;
        self.stream = None;
        self.status = TransportStatus::Disconnected;
        self.initialising = false;
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&mut self, domain: &str) -> Result<(), TransportError> {
        self.teardown();
        self.pending_events.clear();
        self.domain = Some(domain.to_string());

        let mut request =
            self.service
                .as_str()
                .into_client_request()
                .map_err(|_| TransportError::InvalidService {
                    url: self.service.clone(),
                })?;
        request
            .headers_mut()
            .insert("Sec-WebSocket-Protocol", HeaderValue::from_static("xmpp"));

        debug!("Opening WebSocket to {}", self.service);
        self.status = TransportStatus::Connecting;

        let (socket, _) = connect_async(request).await.map_err(|err| {
            self.status = TransportStatus::Disconnected;
            TransportError::Socket {
                msg: err.to_string(),
            }
        })?;

        let (sink, stream) = socket.split();
        self.sink = Some(sink);
        self.stream = Some(stream);
        self.initialising = true;

        self.send_frame(&open_frame(domain)).await
    }

    async fn restart(&mut self) -> Result<(), TransportError> {
        let domain = self.domain.clone().unwrap_or_default();
        self.send_frame(&open_frame(&domain)).await
    }

    async fn send(&mut self, stanza: Element) -> Result<(), TransportError> {
        self.send_frame(&stanza).await
    }

    async fn disconnect(&mut self, presence: Option<Element>) -> Result<(), TransportError> {
        if self.sink.is_none() {
            self.pending_events
                .push_back(TransportEvent::Closed { error: None });
            return Ok(());
        }

        self.status = TransportStatus::Disconnecting;

        if let Some(presence) = presence {
            self.send_frame(&presence).await?;
        }
        self.send_frame(&close_frame()).await
    }

    fn reset(&mut self) {
        self.teardown();
        self.pending_events.clear();
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        loop {
            if let Some(event) = self.pending_events.pop_front() {
                return Some(event);
            }

            let message = self.stream.as_mut()?.next().await;

            match message {
                Some(Ok(Message::Text(text))) => {
                    if let Some(event) = self.handle_frame(text.as_str()) {
                        return Some(event);
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    let was_disconnecting = self.status == TransportStatus::Disconnecting;
                    self.teardown();
                    return Some(TransportEvent::Closed {
                        error: (!was_disconnecting).then(|| TransportError::Socket {
                            msg: "The WebSocket connection was closed".to_string(),
                        }),
                    });
                }
                Some(Ok(_)) => (),
                Some(Err(err)) => {
                    error!("WebSocket error. {}", err);
                    self.teardown();
                    return Some(TransportEvent::Closed {
                        error: Some(TransportError::Socket {
                            msg: err.to_string(),
                        }),
                    });
                }
            }
        }
    }

    fn status_check(&self) -> TransportStatus {
        self.status
    }

    fn set_service(&mut self, url: String) {
        self.service = url
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use anyhow::Result;
    use pretty_assertions::assert_eq;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_hdr_async;
    use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};

    use super::*;

    /// Accepts one WebSocket, answers the client's first frame with `reply` and returns that
    /// first frame.
    async fn serve_once(listener: TcpListener, reply: String) -> Result<String> {
        let (stream, _) = listener.accept().await?;
        let mut socket = accept_hdr_async(stream, |_: &Request, mut response: Response| {
            response
                .headers_mut()
                .insert("Sec-WebSocket-Protocol", HeaderValue::from_static("xmpp"));
            Ok(response)
        })
        .await?;

        let first = match socket.next().await {
            Some(Ok(message)) => message.to_text()?.to_string(),
            other => anyhow::bail!("Expected the client's open frame, got {:?}", other),
        };
        socket.send(Message::Text(reply.into())).await?;
        Ok(first)
    }

    #[tokio::test]
    async fn test_reconnects_to_see_other_uri() -> Result<()> {
        let origin = TcpListener::bind("127.0.0.1:0").await?;
        let other = TcpListener::bind("127.0.0.1:0").await?;
        let origin_url = format!("ws://{}/xmpp", origin.local_addr()?);
        let other_url = format!("ws://{}/xmpp", other.local_addr()?);

        let origin_server = tokio::spawn(serve_once(
            origin,
            format!(
                r#"<close xmlns="urn:ietf:params:xml:ns:xmpp-framing" see-other-uri="{other_url}"/>"#
            ),
        ));
        let other_server = tokio::spawn(serve_once(
            other,
            r#"<open xmlns="urn:ietf:params:xml:ns:xmpp-framing" from="prose.org" id="s-1" version="1.0"/>"#
                .to_string(),
        ));

        let mut transport = WebSocketTransport::new(origin_url);
        transport.connect("prose.org").await?;

        assert_eq!(
            transport.next_event().await,
            Some(TransportEvent::Redirect {
                url: other_url.clone()
            })
        );
        assert_eq!(transport.status_check(), TransportStatus::Disconnected);
        assert_eq!(transport.service, other_url);
        origin_server.await??;

        transport.connect("prose.org").await?;
        let open = Element::from_str(&other_server.await??)?;
        assert_eq!(open.name(), "open");
        assert_eq!(open.attr("to"), Some("prose.org"));

        Ok(())
    }

    #[test]
    fn test_refuses_redirect_from_secure_to_insecure_service() {
        let mut transport = WebSocketTransport::new("wss://prose.org/xmpp");
        transport.initialising = true;

        let event = transport.handle_frame(
            r#"<close xmlns="urn:ietf:params:xml:ns:xmpp-framing" see-other-uri="ws://prose.org/xmpp"/>"#,
        );

        assert_eq!(
            event,
            Some(TransportEvent::Failed {
                condition: "insecure-redirect".to_string()
            })
        );
        assert_eq!(transport.service, "wss://prose.org/xmpp");
        assert_eq!(transport.status_check(), TransportStatus::Disconnected);
    }

    #[test]
    fn test_close_after_stream_start_is_not_a_redirect() {
        let mut transport = WebSocketTransport::new("ws://prose.org/xmpp");
        transport.initialising = false;

        let event = transport.handle_frame(
            r#"<close xmlns="urn:ietf:params:xml:ns:xmpp-framing" see-other-uri="ws://other.prose.org/xmpp"/>"#,
        );

        assert_eq!(event, Some(TransportEvent::Closed { error: None }));
        assert_eq!(transport.service, "ws://prose.org/xmpp");
    }
}
