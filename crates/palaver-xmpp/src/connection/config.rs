// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::deps::KeyValueStore;
use crate::transport::{
    BoshConfig, BoshTransport, ReqwestHttpClient, Transport, TransportKind, TransportProvider,
    WebSocketTransport,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// `wss://…` for WebSocket, `https://…` for BOSH.
    pub service: String,
    pub transport: TransportKind,
    /// How long a graceful disconnect may take before the connection is torn down.
    pub disconnect_timeout: Duration,
    pub request_timeout: Duration,
    /// Stop at `BindRequired` after authentication and wait for `Connection::bind`.
    pub explicit_resource_binding: bool,
    /// Treat the stream as authenticated right away.
    pub skip_authentication: bool,
    /// Fall back to XEP-0078 if no SASL mechanism matches.
    pub allow_legacy_auth: bool,
    /// Persist BOSH sessions so that they can be restored.
    pub keepalive: bool,
    pub ping_interval: Duration,
    pub bosh: BoshConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            service: String::new(),
            transport: TransportKind::default(),
            disconnect_timeout: Duration::from_millis(3000),
            request_timeout: Duration::from_secs(15),
            explicit_resource_binding: false,
            skip_authentication: false,
            allow_legacy_auth: true,
            keepalive: false,
            ping_interval: Duration::from_secs(60),
            bosh: BoshConfig::default(),
        }
    }
}

impl ConnectionConfig {
    pub fn websocket(service: impl Into<String>) -> Self {
        ConnectionConfig {
            service: service.into(),
            transport: TransportKind::WebSocket,
            ..Default::default()
        }
    }

    pub fn bosh(service: impl Into<String>) -> Self {
        ConnectionConfig {
            service: service.into(),
            transport: TransportKind::Bosh,
            ..Default::default()
        }
    }

    /// The provider for the transport this configuration selects. BOSH sessions are persisted in
    /// `store` if `keepalive` is set.
    pub fn transport_provider(&self, store: Arc<dyn KeyValueStore>) -> TransportProvider {
        let config = self.clone();

        Box::new(move || -> Box<dyn Transport> {
            match config.transport {
                TransportKind::WebSocket => Box::new(WebSocketTransport::new(&config.service)),
                TransportKind::Bosh => {
                    let transport = BoshTransport::new(
                        &config.service,
                        config.bosh.clone(),
                        Arc::new(ReqwestHttpClient::default()),
                    );
                    if config.keepalive {
                        Box::new(transport.with_session_store(store.clone()))
                    } else {
                        Box::new(transport)
                    }
                }
            }
        })
    }
}
