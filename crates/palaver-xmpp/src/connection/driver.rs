// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::str::FromStr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use jid::{FullJid, Jid};
use minidom::Element;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::connection::connection::ConnectionInner;
use crate::connection::{ConnectionError, ConnectionStatus};
use crate::handler::service_unavailable_reply;
use crate::ns;
use crate::sasl::{advertised_mechanisms, SaslExchange, SaslSession, SaslStep};
use crate::stanza::{DefinedCondition, StanzaBuilder, StanzaError, StreamError};
use crate::transport::{Transport, TransportError, TransportEvent};

const IDLE_PERIOD: Duration = Duration::from_millis(100);

const REGISTER_FORM_ID: &str = "reg_1";
const REGISTER_SUBMIT_ID: &str = "reg_2";
const LEGACY_AUTH_FIELDS_ID: &str = "auth_1";
const LEGACY_AUTH_SUBMIT_ID: &str = "auth_2";
const BIND_ID: &str = "bind_1";
const SESSION_ID: &str = "session_1";
const DEFAULT_RESOURCE: &str = "palaver";

pub(super) enum Command {
    Send(Element),
    Bind,
    Disconnect,
}

pub(super) enum Start {
    Connect { register: bool },
    Attach { jid: FullJid },
}

enum Phase {
    AwaitingFeatures { post_auth: bool },
    Registering { features: Element, submitted: bool },
    Authenticating(Box<SaslExchange>),
    LegacyAuth,
    Binding,
    Session,
    BindRequired,
    Connected,
    Disconnecting { deadline: Instant },
}

#[must_use]
enum Flow {
    Continue,
    Stop,
}

enum Next {
    Command(Option<Command>),
    Event(Option<TransportEvent>),
    Idle,
}

/// Runs one connection attempt, from opening the transport until the session is gone.
pub(super) struct Driver {
    inner: Arc<ConnectionInner>,
    generation: u64,
    jid: Jid,
    password: SecretString,
    register: bool,
    phase: Phase,
    /// Set once the server sent anything, i.e. there is a stream to close gracefully.
    stream_open: bool,
    do_session: bool,
}

impl Driver {
    pub fn new(
        inner: Arc<ConnectionInner>,
        generation: u64,
        jid: Jid,
        password: SecretString,
    ) -> Self {
        Driver {
            inner,
            generation,
            jid,
            password,
            register: false,
            phase: Phase::AwaitingFeatures { post_auth: false },
            stream_open: false,
            do_session: false,
        }
    }

    pub async fn run(
        mut self,
        mut transport: Box<dyn Transport>,
        mut commands: mpsc::UnboundedReceiver<Command>,
        start: Start,
    ) {
        let flow = match start {
            Start::Connect { register } => {
                self.register = register;
                self.open(transport.as_mut()).await
            }
            Start::Attach { jid } => {
                self.attach(jid, transport.as_mut());
                Flow::Continue
            }
        };

        if let Flow::Continue = flow {
            self.run_loop(transport.as_mut(), &mut commands).await;
        }

        self.inner.driver_finished(self.generation);
    }

    async fn run_loop(
        &mut self,
        transport: &mut dyn Transport,
        commands: &mut mpsc::UnboundedReceiver<Command>,
    ) {
        let mut idle = tokio::time::interval(IDLE_PERIOD);
        idle.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // Outbound stanzas are flushed before the next inbound element is handled.
            let next = tokio::select! {
                biased;
                command = commands.recv() => Next::Command(command),
                event = transport.next_event() => Next::Event(event),
                _ = idle.tick() => Next::Idle,
            };

            let flow = match next {
                Next::Command(None) => {
                    transport.reset();
                    Flow::Stop
                }
                Next::Command(Some(command)) => self.handle_command(command, transport).await,
                Next::Event(event) => self.handle_event(event, transport).await,
                Next::Idle => self.on_idle(transport),
            };

            if let Flow::Stop = flow {
                break;
            }
        }
    }

    async fn open(&mut self, transport: &mut dyn Transport) -> Flow {
        self.phase = Phase::AwaitingFeatures { post_auth: false };
        self.stream_open = false;

        let domain = self.jid.domain().to_string();
        if let Err(err) = transport.connect(&domain).await {
            error!("Failed to open transport. {}", err);
            let condition = err.condition();
            return self.fail(
                transport,
                ConnectionStatus::Connfail,
                Some(condition),
                ConnectionError::Transport(err),
            );
        }
        Flow::Continue
    }

    fn attach(&mut self, jid: FullJid, transport: &mut dyn Transport) {
        *self.inner.jid.write() = Some(jid.clone());
        self.inner.authenticated.store(true, Ordering::SeqCst);
        transport.set_authenticated(Some(jid));
        self.stream_open = true;
        self.phase = Phase::Connected;
        self.set_status(ConnectionStatus::Attached, None);
    }

    async fn handle_command(&mut self, command: Command, transport: &mut dyn Transport) -> Flow {
        match command {
            Command::Send(stanza) => {
                self.send(transport, stanza).await;
                Flow::Continue
            }
            Command::Bind => {
                if !matches!(self.phase, Phase::BindRequired) {
                    warn!("Ignoring bind request outside of BindRequired");
                    return Flow::Continue;
                }
                self.bind(transport).await;
                Flow::Continue
            }
            Command::Disconnect => self.disconnect(transport).await,
        }
    }

    async fn disconnect(&mut self, transport: &mut dyn Transport) -> Flow {
        if matches!(self.phase, Phase::Disconnecting { .. }) {
            return Flow::Continue;
        }

        // Only an established session is closed gracefully.
        let has_session = matches!(self.phase, Phase::Connected | Phase::BindRequired);
        if !has_session || !self.stream_open {
            debug!("Disconnect was called before the connection was established");
            transport.reset();
            return self.finish(transport, None);
        }

        self.set_status(ConnectionStatus::Disconnecting, None);

        let presence = self
            .inner
            .authenticated
            .load(Ordering::SeqCst)
            .then(|| StanzaBuilder::presence().attr("type", "unavailable").build());

        self.phase = Phase::Disconnecting {
            deadline: Instant::now() + self.inner.config.disconnect_timeout,
        };

        if let Err(err) = transport.disconnect(presence).await {
            warn!("Failed to close stream. {}", err);
            transport.reset();
            return self.finish(transport, None);
        }

        Flow::Continue
    }

    fn on_idle(&mut self, transport: &mut dyn Transport) -> Flow {
        let now = Instant::now();

        if let Phase::Disconnecting { deadline } = self.phase {
            if now >= deadline {
                warn!("Disconnect timed out");
                *self.inner.last_error.lock() = Some(ConnectionError::TimedOut);
                self.set_status(ConnectionStatus::ConnTimeout, None);
                transport.reset();
                return self.finish(transport, None);
            }
        }

        let now = now.into_std();
        transport.on_idle(now);
        self.inner
            .handlers
            .run_timed(now, self.inner.authenticated.load(Ordering::SeqCst));

        Flow::Continue
    }

    async fn handle_event(
        &mut self,
        event: Option<TransportEvent>,
        transport: &mut dyn Transport,
    ) -> Flow {
        let Some(event) = event else {
            debug!("Transport has no more events");
            transport.reset();
            return self.finish(transport, None);
        };

        match event {
            TransportEvent::Element(elem) => self.handle_element(elem, transport).await,
            TransportEvent::Failed { condition } => {
                error!("Connection failed with condition {}", condition);
                self.fail(
                    transport,
                    ConnectionStatus::Connfail,
                    Some(condition.clone()),
                    ConnectionError::Failed { condition },
                )
            }
            TransportEvent::Redirect { url } => {
                info!("Redirected to {}", url);
                self.set_status(ConnectionStatus::Redirect, None);
                transport.reset();
                transport.set_service(url);
                self.open(transport).await
            }
            TransportEvent::Closed { error: None } => {
                debug!("Stream closed");
                transport.reset();
                self.finish(transport, None)
            }
            TransportEvent::Closed { error: Some(err) } => {
                if matches!(self.phase, Phase::Disconnecting { .. }) {
                    transport.reset();
                    return self.finish(transport, None);
                }

                error!("Connection closed with error. {}", err);
                let condition = err.condition();

                match err {
                    TransportError::RetriesExhausted => {
                        *self.inner.last_error.lock() = Some(ConnectionError::TimedOut);
                        self.set_status(ConnectionStatus::ConnTimeout, Some(condition.clone()));
                    }
                    TransportError::Http { .. } => {
                        *self.inner.last_error.lock() = Some(ConnectionError::Transport(err));
                        self.set_status(ConnectionStatus::Disconnecting, Some(condition.clone()));
                    }
                    err => {
                        *self.inner.last_error.lock() = Some(ConnectionError::Transport(err));
                        self.set_status(ConnectionStatus::Connfail, Some(condition.clone()));
                    }
                }

                transport.reset();
                self.finish(transport, Some(condition))
            }
        }
    }

    async fn handle_element(&mut self, elem: Element, transport: &mut dyn Transport) -> Flow {
        #[cfg(feature = "trace-stanzas")]
        tracing::trace!("RECV: {}", String::from(&elem));

        _ = self.inner.stanza_in.send(elem.clone());
        self.stream_open = true;

        if let Some(err) = StreamError::from_element(&elem) {
            return self.on_stream_error(err, transport);
        }

        match &self.phase {
            Phase::AwaitingFeatures { post_auth } if elem.is("features", ns::STREAM) => {
                return if *post_auth {
                    self.on_features_after_auth(&elem, transport).await
                } else {
                    self.on_features(elem, transport).await
                };
            }
            Phase::Authenticating(_) if elem.ns() == ns::SASL => {
                return self.on_sasl(&elem, transport).await;
            }
            Phase::Registering { .. }
                if is_response(&elem, &[REGISTER_FORM_ID, REGISTER_SUBMIT_ID]) =>
            {
                return self.on_register_response(&elem, transport).await;
            }
            Phase::LegacyAuth
                if is_response(&elem, &[LEGACY_AUTH_FIELDS_ID, LEGACY_AUTH_SUBMIT_ID]) =>
            {
                return self.on_legacy_auth_response(&elem, transport).await;
            }
            Phase::Binding if is_response(&elem, &[BIND_ID]) => {
                return self.on_bind_response(&elem, transport).await;
            }
            Phase::Session if is_response(&elem, &[SESSION_ID]) => {
                return self.on_session_response(&elem, transport);
            }
            _ => (),
        }

        self.dispatch(elem, transport).await;
        Flow::Continue
    }

    async fn dispatch(&mut self, elem: Element, transport: &mut dyn Transport) {
        let authenticated = self.inner.authenticated.load(Ordering::SeqCst);
        let dispatched = self.inner.handlers.dispatch(&elem, authenticated);

        if !dispatched.matched {
            if let Some(reply) = service_unavailable_reply(&elem) {
                self.send(transport, reply).await;
            }
        }

        // Async handlers finish before the next element is dispatched.
        for job in dispatched.async_jobs {
            job.run().await
        }
    }

    async fn send(&mut self, transport: &mut dyn Transport, stanza: Element) {
        #[cfg(feature = "trace-stanzas")]
        tracing::trace!("SEND: {}", String::from(&stanza));

        match transport.send(stanza.clone()).await {
            Ok(()) => _ = self.inner.stanza_out.send(stanza),
            Err(err) => error!("Failed to send stanza. {}", err),
        }
    }
}

// Authentication
impl Driver {
    async fn on_features(&mut self, features: Element, transport: &mut dyn Transport) -> Flow {
        if self.register {
            return self.start_registration(features, transport).await;
        }
        self.authenticate(&features, transport).await
    }

    async fn authenticate(&mut self, features: &Element, transport: &mut dyn Transport) -> Flow {
        if self.inner.config.skip_authentication {
            debug!("Skipping authentication");
            self.inner.authenticated.store(true, Ordering::SeqCst);
            self.phase = Phase::AwaitingFeatures { post_auth: true };
            return self.on_features_after_auth(features, transport).await;
        }

        let advertised = advertised_mechanisms(features);
        let supports_legacy_auth = features.children().any(|child| child.name() == "auth");

        if !self.inner.sasl.supports_any(&advertised) && !supports_legacy_auth {
            return self.fail_no_auth_mechanism(transport);
        }

        let session = self.sasl_session();
        let Some(mechanism) = self.inner.sasl.select(&advertised, &session) else {
            if !self.inner.config.allow_legacy_auth {
                return self.fail_no_auth_mechanism(transport);
            }
            return self.start_legacy_auth(transport).await;
        };

        self.set_status(ConnectionStatus::Authenticating, None);

        let mut exchange = SaslExchange::new(mechanism, session);
        match exchange.start() {
            Ok(auth) => {
                self.phase = Phase::Authenticating(Box::new(exchange));
                self.send(transport, auth).await;
                Flow::Continue
            }
            Err(err) => {
                let condition = err.to_string();
                self.fail(
                    transport,
                    ConnectionStatus::Authfail,
                    None,
                    ConnectionError::Auth { condition },
                )
            }
        }
    }

    async fn on_sasl(&mut self, elem: &Element, transport: &mut dyn Transport) -> Flow {
        let Phase::Authenticating(exchange) = &mut self.phase else {
            return Flow::Continue;
        };

        match exchange.handle(elem) {
            Ok(SaslStep::Respond(response)) => {
                self.send(transport, response).await;
                Flow::Continue
            }
            Ok(SaslStep::Success) => {
                info!("SASL authentication succeeded");
                self.phase = Phase::AwaitingFeatures { post_auth: true };
                if let Err(err) = transport.restart().await {
                    let condition = err.condition();
                    return self.fail(
                        transport,
                        ConnectionStatus::Connfail,
                        Some(condition),
                        ConnectionError::Transport(err),
                    );
                }
                Flow::Continue
            }
            Ok(SaslStep::Failure(condition)) => self.fail(
                transport,
                ConnectionStatus::Authfail,
                Some(condition.clone()),
                ConnectionError::Auth { condition },
            ),
            Err(err) => {
                warn!("SASL exchange failed. {}", err);
                self.fail(
                    transport,
                    ConnectionStatus::Authfail,
                    None,
                    ConnectionError::Auth {
                        condition: err.to_string(),
                    },
                )
            }
        }
    }

    async fn start_legacy_auth(&mut self, transport: &mut dyn Transport) -> Flow {
        let Some(node) = self.jid.node().map(|node| node.to_string()) else {
            return self.fail(
                transport,
                ConnectionStatus::Connfail,
                Some("missing-jid-node".to_string()),
                ConnectionError::Failed {
                    condition: "missing-jid-node".to_string(),
                },
            );
        };

        self.set_status(ConnectionStatus::Authenticating, None);
        self.phase = Phase::LegacyAuth;

        let iq = StanzaBuilder::iq("get")
            .attr("id", LEGACY_AUTH_FIELDS_ID)
            .attr("to", self.jid.domain().to_string())
            .c_ns("query", ns::AUTH)
            .text_child("username", node)
            .build();
        self.send(transport, iq).await;
        Flow::Continue
    }

    async fn on_legacy_auth_response(
        &mut self,
        elem: &Element,
        transport: &mut dyn Transport,
    ) -> Flow {
        if elem.attr("id") == Some(LEGACY_AUTH_FIELDS_ID) {
            let iq = StanzaBuilder::iq("set")
                .attr("id", LEGACY_AUTH_SUBMIT_ID)
                .c_ns("query", ns::AUTH)
                .text_child(
                    "username",
                    self.jid.node().map(|n| n.to_string()).unwrap_or_default(),
                )
                .text_child("password", self.password.expose_secret().as_str())
                .text_child("resource", self.resource())
                .build();
            self.send(transport, iq).await;
            return Flow::Continue;
        }

        if elem.attr("type") != Some("result") {
            let condition = condition_of(elem);
            return self.fail(
                transport,
                ConnectionStatus::Authfail,
                None,
                ConnectionError::Auth { condition },
            );
        }

        let jid = FullJid::from_str(&format!("{}/{}", self.jid.to_bare(), self.resource()));
        match jid {
            Ok(jid) => {
                *self.inner.jid.write() = Some(jid);
                self.connected(transport);
                Flow::Continue
            }
            Err(err) => self.fail(
                transport,
                ConnectionStatus::Authfail,
                None,
                ConnectionError::Protocol {
                    msg: err.to_string(),
                },
            ),
        }
    }

    async fn on_features_after_auth(
        &mut self,
        features: &Element,
        transport: &mut dyn Transport,
    ) -> Flow {
        let do_bind = features.get_child("bind", ns::BIND).is_some();
        self.do_session = features
            .get_child("session", ns::SESSION)
            .map(|session| session.get_child("optional", ns::SESSION).is_none())
            .unwrap_or(false);

        if !do_bind {
            return self.fail(
                transport,
                ConnectionStatus::Authfail,
                None,
                ConnectionError::Protocol {
                    msg: "Server does not offer resource binding".to_string(),
                },
            );
        }

        if self.inner.config.explicit_resource_binding {
            self.phase = Phase::BindRequired;
            self.set_status(ConnectionStatus::BindRequired, None);
            return Flow::Continue;
        }

        self.bind(transport).await;
        Flow::Continue
    }

    async fn bind(&mut self, transport: &mut dyn Transport) {
        let mut iq = StanzaBuilder::iq("set")
            .attr("id", BIND_ID)
            .c_ns("bind", ns::BIND);
        if let Some(resource) = self.jid.resource() {
            iq = iq.text_child("resource", resource.to_string());
        }

        self.phase = Phase::Binding;
        self.send(transport, iq.build()).await;
    }

    async fn on_bind_response(&mut self, elem: &Element, transport: &mut dyn Transport) -> Flow {
        if elem.attr("type") == Some("error") {
            warn!("Resource binding failed");
            let is_conflict = StanzaError::from_stanza(elem)
                .map(|err| err.condition == DefinedCondition::Conflict)
                .unwrap_or(false);
            let condition = is_conflict.then(|| "conflict".to_string());

            return self.fail(
                transport,
                ConnectionStatus::Authfail,
                condition.clone(),
                ConnectionError::Auth {
                    condition: condition.unwrap_or_else(|| condition_of(elem)),
                },
            );
        }

        let jid = elem
            .get_child("bind", ns::BIND)
            .and_then(|bind| bind.get_child("jid", ns::BIND))
            .and_then(|jid| FullJid::from_str(jid.text().trim()).ok());

        let Some(jid) = jid else {
            return self.fail(
                transport,
                ConnectionStatus::Authfail,
                None,
                ConnectionError::Protocol {
                    msg: "Bind result is missing a valid JID".to_string(),
                },
            );
        };

        *self.inner.jid.write() = Some(jid);

        if self.do_session {
            self.phase = Phase::Session;
            let iq = StanzaBuilder::iq("set")
                .attr("id", SESSION_ID)
                .c_ns("session", ns::SESSION)
                .build();
            self.send(transport, iq).await;
            return Flow::Continue;
        }

        self.connected(transport);
        Flow::Continue
    }

    fn on_session_response(&mut self, elem: &Element, transport: &mut dyn Transport) -> Flow {
        if elem.attr("type") == Some("result") {
            self.connected(transport);
            return Flow::Continue;
        }

        warn!("Session creation failed");
        self.fail(
            transport,
            ConnectionStatus::Authfail,
            None,
            ConnectionError::Auth {
                condition: condition_of(elem),
            },
        )
    }

    fn connected(&mut self, transport: &mut dyn Transport) {
        self.inner.authenticated.store(true, Ordering::SeqCst);
        transport.set_authenticated(self.inner.jid.read().clone());
        self.phase = Phase::Connected;
        self.set_status(ConnectionStatus::Connected, None);
    }

    fn fail_no_auth_mechanism(&mut self, transport: &mut dyn Transport) -> Flow {
        error!("Server did not offer a supported authentication mechanism");
        self.fail(
            transport,
            ConnectionStatus::Connfail,
            Some("no-auth-mech".to_string()),
            ConnectionError::Failed {
                condition: "no-auth-mech".to_string(),
            },
        )
    }

    fn sasl_session(&self) -> SaslSession {
        let authcid = self.jid.node().map(|node| node.to_string());
        let password = authcid.as_ref().map(|_| self.password.clone());

        SaslSession::new(
            self.jid.to_bare().to_string(),
            authcid,
            password,
            self.jid.domain().to_string(),
        )
    }

    fn resource(&self) -> String {
        self.jid
            .resource()
            .map(|resource| resource.to_string())
            .unwrap_or_else(|| DEFAULT_RESOURCE.to_string())
    }
}

// In-band registration
impl Driver {
    async fn start_registration(&mut self, features: Element, transport: &mut dyn Transport) -> Flow {
        if features
            .get_child("register", ns::REGISTER_FEATURE)
            .is_none()
        {
            return self.fail(
                transport,
                ConnectionStatus::RegiFail,
                Some("registration-not-supported".to_string()),
                ConnectionError::Registration {
                    condition: "registration-not-supported".to_string(),
                },
            );
        }

        self.set_status(ConnectionStatus::Register, None);
        self.phase = Phase::Registering {
            features,
            submitted: false,
        };

        let iq = StanzaBuilder::iq("get")
            .attr("id", REGISTER_FORM_ID)
            .attr("to", self.jid.domain().to_string())
            .c_ns("query", ns::REGISTER)
            .build();
        self.send(transport, iq).await;
        Flow::Continue
    }

    async fn on_register_response(
        &mut self,
        elem: &Element,
        transport: &mut dyn Transport,
    ) -> Flow {
        let Phase::Registering {
            features,
            submitted,
        } = &self.phase
        else {
            return Flow::Continue;
        };
        let (features, submitted) = (features.clone(), *submitted);

        if elem.attr("type") == Some("error") {
            let (status, condition) = match StanzaError::from_stanza(elem).map(|e| e.condition) {
                Some(DefinedCondition::Conflict) => (ConnectionStatus::Conflict, "conflict"),
                Some(DefinedCondition::NotAcceptable) => {
                    (ConnectionStatus::NotAcceptable, "not-acceptable")
                }
                _ => (ConnectionStatus::RegiFail, "registration-failed"),
            };
            warn!("Registration failed with condition {}", condition);
            return self.fail(
                transport,
                status,
                Some(condition.to_string()),
                ConnectionError::Registration {
                    condition: condition.to_string(),
                },
            );
        }

        if !submitted {
            let iq = StanzaBuilder::iq("set")
                .attr("id", REGISTER_SUBMIT_ID)
                .attr("to", self.jid.domain().to_string())
                .c_ns("query", ns::REGISTER)
                .text_child(
                    "username",
                    self.jid.node().map(|n| n.to_string()).unwrap_or_default(),
                )
                .text_child("password", self.password.expose_secret().as_str())
                .build();
            self.phase = Phase::Registering {
                features,
                submitted: true,
            };
            self.send(transport, iq).await;
            return Flow::Continue;
        }

        info!("Account registered");
        self.set_status(ConnectionStatus::Registered, None);
        self.register = false;
        self.authenticate(&features, transport).await
    }
}

// Teardown
impl Driver {
    fn on_stream_error(&mut self, err: StreamError, transport: &mut dyn Transport) -> Flow {
        error!(
            "Received stream error {} {}",
            err.condition,
            err.text.as_deref().unwrap_or_default()
        );

        let connected = matches!(
            self.phase,
            Phase::Connected | Phase::BindRequired | Phase::Disconnecting { .. }
        );

        *self.inner.last_error.lock() = Some(ConnectionError::Transport(TransportError::Stream {
            condition: err.condition.clone(),
            text: err.text.clone(),
        }));

        if !connected {
            self.set_status(ConnectionStatus::Connfail, Some(err.condition.clone()));
        }

        transport.reset();
        self.finish(transport, Some(err.condition))
    }

    /// Reports `status`, tears the transport down and ends the session.
    fn fail(
        &mut self,
        transport: &mut dyn Transport,
        status: ConnectionStatus,
        condition: Option<String>,
        error: ConnectionError,
    ) -> Flow {
        *self.inner.last_error.lock() = Some(error);
        self.set_status(status, condition);
        transport.reset();
        self.finish(transport, None)
    }

    fn finish(&mut self, transport: &mut dyn Transport, condition: Option<String>) -> Flow {
        self.inner.authenticated.store(false, Ordering::SeqCst);
        transport.set_authenticated(None);
        self.inner.handlers.reset();
        self.set_status(ConnectionStatus::Disconnected, condition);
        Flow::Stop
    }

    fn set_status(&self, status: ConnectionStatus, condition: Option<String>) {
        self.inner.set_status(self.generation, status, condition)
    }
}

fn is_response(elem: &Element, ids: &[&str]) -> bool {
    elem.name() == "iq"
        && matches!(elem.attr("type"), Some("result") | Some("error"))
        && elem.attr("id").map(|id| ids.contains(&id)).unwrap_or(false)
}

fn condition_of(elem: &Element) -> String {
    StanzaError::from_stanza(elem)
        .map(|err| err.condition.as_ref().to_string())
        .unwrap_or_else(|| "undefined-condition".to_string())
}
