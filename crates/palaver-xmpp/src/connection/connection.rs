// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use jid::{BareJid, FullJid, Jid};
use minidom::Element;
use parking_lot::{Mutex, RwLock};
use secrecy::SecretString;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::AbortHandle;
use tracing::{info, warn};

use crate::connection::driver::{Command, Driver, Start};
use crate::connection::{ConnectionConfig, ConnectionError, ConnectionStatus};
use crate::deps::{IDProvider, UUIDProvider};
use crate::handler::{HandlerDispatch, HandlerScope, Matcher};
use crate::sasl::SaslEngine;
use crate::stanza::StanzaError;
use crate::transport::{Transport, TransportProvider};
use crate::util::{ReplayStream, ReplaySubject, RequestError};

pub type StatusListener = Box<dyn Fn(ConnectionStatus) + Send + Sync>;

/// A session with an XMPP server.
///
/// `Connection` is a cheap handle. The session itself is run by a driver task that owns the
/// transport; every clone talks to the same driver.
#[derive(Clone)]
pub struct Connection {
    pub(super) inner: Arc<ConnectionInner>,
}

pub(super) struct Credentials {
    pub jid: Jid,
    pub password: SecretString,
}

pub(super) struct DriverHandle {
    generation: u64,
    commands: mpsc::UnboundedSender<Command>,
    task: AbortHandle,
}

pub(super) struct ConnectionInner {
    pub config: ConnectionConfig,
    pub transport_provider: TransportProvider,
    pub sasl: SaslEngine,
    pub handlers: HandlerDispatch,
    pub id_provider: Arc<dyn IDProvider>,
    pub authenticated: AtomicBool,
    pub jid: RwLock<Option<FullJid>>,
    pub last_error: Mutex<Option<ConnectionError>>,
    pub stanza_in: broadcast::Sender<Element>,
    pub stanza_out: broadcast::Sender<Element>,
    status: ReplaySubject<ConnectionStatus>,
    status_listeners: RwLock<Vec<StatusListener>>,
    last_condition: RwLock<Option<String>>,
    generation: AtomicU64,
    driver: Mutex<Option<DriverHandle>>,
    credentials: RwLock<Option<Credentials>>,
}

impl Connection {
    pub fn new(
        config: ConnectionConfig,
        transport_provider: TransportProvider,
        id_provider: Arc<dyn IDProvider>,
        sasl: SaslEngine,
    ) -> Self {
        let (stanza_in, _) = broadcast::channel(64);
        let (stanza_out, _) = broadcast::channel(64);

        Connection {
            inner: Arc::new(ConnectionInner {
                config,
                transport_provider,
                sasl,
                handlers: HandlerDispatch::new(),
                id_provider,
                authenticated: AtomicBool::new(false),
                jid: Default::default(),
                last_error: Default::default(),
                stanza_in,
                stanza_out,
                status: ReplaySubject::new(ConnectionStatus::Disconnected),
                status_listeners: Default::default(),
                last_condition: Default::default(),
                generation: AtomicU64::new(0),
                driver: Default::default(),
                credentials: Default::default(),
            }),
        }
    }

    /// A connection with the default SASL mechanisms and UUID stanza ids.
    pub fn with_transport_provider(
        config: ConnectionConfig,
        transport_provider: TransportProvider,
    ) -> Self {
        Self::new(
            config,
            transport_provider,
            Arc::new(UUIDProvider::new()),
            SaslEngine::default(),
        )
    }

    /// Connects and authenticates as `jid`. A JID without local part logs in anonymously.
    ///
    /// Resolves once the connection is `Connected` (or `BindRequired` with explicit resource
    /// binding) and fails with the first failure status.
    pub async fn connect(
        &self,
        jid: &Jid,
        password: impl AsRef<str>,
    ) -> Result<(), ConnectionError> {
        self.set_credentials(jid, password);
        self.start(Start::Connect { register: false }).await
    }

    /// Registers a new account via XEP-0077 and logs in with it.
    pub async fn register(
        &self,
        jid: &Jid,
        password: impl AsRef<str>,
    ) -> Result<(), ConnectionError> {
        self.set_credentials(jid, password);
        self.start(Start::Connect { register: true }).await
    }

    /// Reattaches to a persisted session belonging to `jid`.
    pub async fn restore(&self, jid: &Jid) -> Result<(), ConnectionError> {
        self.stop();
        self.inner.last_error.lock().take();

        let mut transport = (self.inner.transport_provider)();
        let full_jid = match transport.restore(jid) {
            Ok(full_jid) => full_jid,
            Err(err) => {
                warn!("Failed to restore session. {}", err);
                let generation = self.inner.generation.load(Ordering::SeqCst);
                self.inner.set_status(generation, ConnectionStatus::AttachFail, None);
                return Err(ConnectionError::NoRestorableSession);
            }
        };

        *self.inner.credentials.write() = Some(Credentials {
            jid: Jid::from(full_jid.clone()),
            password: SecretString::new(String::new()),
        });

        let mut statuses = self.inner.status.subscribe();
        let generation = self.spawn_driver(transport, Start::Attach { jid: full_jid })?;
        self.wait_for_outcome(&mut statuses, generation).await
    }

    /// Drops the current session and connects again with the last credentials.
    pub async fn reconnect(&self) -> Result<(), ConnectionError> {
        if self.inner.credentials.read().is_none() {
            return Err(ConnectionError::Failed {
                condition: "no-credentials".to_string(),
            });
        }

        self.stop();
        let generation = self.inner.generation.load(Ordering::SeqCst);
        self.inner
            .set_status(generation, ConnectionStatus::Reconnecting, None);
        self.start(Start::Connect { register: false }).await
    }

    /// Continues a connection that stopped at `BindRequired`.
    pub async fn bind(&self) -> Result<(), ConnectionError> {
        if self.status() != ConnectionStatus::BindRequired {
            return Err(ConnectionError::Protocol {
                msg: "bind() requires the connection to be in state BindRequired".to_string(),
            });
        }

        let mut statuses = self.inner.status.subscribe();
        let generation = self.command(Command::Bind).map_err(|_| ConnectionError::Failed {
            condition: "disconnected".to_string(),
        })?;
        self.wait_for_outcome(&mut statuses, generation).await
    }

    /// Closes the session gracefully. If the server doesn't confirm within the disconnect
    /// timeout, the connection is torn down.
    pub fn disconnect(&self) {
        if self.command(Command::Disconnect).is_err() {
            let generation = self.inner.generation.load(Ordering::SeqCst);
            self.inner
                .set_status(generation, ConnectionStatus::Disconnected, None);
        }
    }

    /// Tears the connection down right away and forgets any persisted session.
    pub fn disconnect_finally(&self) {
        self.stop();
        (self.inner.transport_provider)().clear_session();
        self.reset_handlers();
        let generation = self.inner.generation.load(Ordering::SeqCst);
        self.inner
            .set_status(generation, ConnectionStatus::Disconnected, None);
    }

    /// Drops the current session without touching a persisted one and removes all handlers.
    pub fn reset(&self) {
        self.stop();
        self.reset_handlers();
        let generation = self.inner.generation.load(Ordering::SeqCst);
        self.inner
            .set_status(generation, ConnectionStatus::Disconnected, None);
    }

    pub fn send(&self, stanza: impl Into<Element>) -> Result<(), RequestError> {
        self.command(Command::Send(stanza.into()))
            .map(|_| ())
            .map_err(|_| RequestError::Disconnected)
    }

    /// Sends `iq` and waits for the `result` or `error` with the same id. Returns the payload of
    /// the result, if any.
    pub async fn send_iq(&self, iq: Element) -> Result<Option<Element>, RequestError> {
        let mut iq = iq;
        let id = match iq.attr("id") {
            Some(id) => id.to_string(),
            None => {
                let id = self.generate_id();
                iq.set_attr("id", id.clone());
                id
            }
        };

        let expected_from = ExpectedSender::new(iq.attr("to"), self.jid());
        let (tx, rx) = oneshot::channel::<Element>();
        let tx = Mutex::new(Some(tx));

        let handler = self.inner.handlers.add_handler(
            Matcher::new().name("iq").id(id).types(["result", "error"]),
            HandlerScope::System,
            move |elem| {
                if !expected_from.accepts(elem.attr("from")) {
                    warn!(
                        "Got answer to IQ from wrong sender {:?}",
                        elem.attr("from")
                    );
                    return Ok(true);
                }
                if let Some(tx) = tx.lock().take() {
                    _ = tx.send(elem.clone());
                }
                Ok(false)
            },
        );

        if let Err(err) = self.send(iq) {
            self.inner.handlers.remove_handler(&handler);
            return Err(err);
        }

        let response = match tokio::time::timeout(self.inner.config.request_timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(RequestError::Disconnected),
            Err(_) => {
                self.inner.handlers.remove_handler(&handler);
                return Err(RequestError::TimedOut);
            }
        };

        match response.attr("type") {
            Some("result") => Ok(response.children().next().cloned()),
            _ => Err(stanza_error(&response)),
        }
    }

    /// Sends `presence` and waits for the presence the addressee sends back.
    pub async fn send_presence_awaiting(
        &self,
        presence: Element,
    ) -> Result<Element, RequestError> {
        let Some(to) = presence.attr("to").map(ToString::to_string) else {
            return Err(RequestError::Generic {
                msg: "Expected `to` for sending presence exchange.".to_string(),
            });
        };

        let (tx, rx) = oneshot::channel::<Element>();
        let tx = Mutex::new(Some(tx));

        let handler = self.inner.handlers.add_handler(
            Matcher::new().name("presence").from(to),
            HandlerScope::System,
            move |elem| {
                if let Some(tx) = tx.lock().take() {
                    _ = tx.send(elem.clone());
                }
                Ok(false)
            },
        );

        if let Err(err) = self.send(presence) {
            self.inner.handlers.remove_handler(&handler);
            return Err(err);
        }

        let response = match tokio::time::timeout(self.inner.config.request_timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(RequestError::Disconnected),
            Err(_) => {
                self.inner.handlers.remove_handler(&handler);
                return Err(RequestError::TimedOut);
            }
        };

        if response.attr("type") == Some("error") {
            return Err(stanza_error(&response));
        }
        Ok(response)
    }

    pub fn handlers(&self) -> &HandlerDispatch {
        &self.inner.handlers
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.status.value()
    }

    /// Replays the current status, then every distinct change.
    pub fn status_stream(&self) -> ReplayStream<ConnectionStatus> {
        self.inner.status.subscribe()
    }

    /// Calls `listener` synchronously with every distinct status change.
    pub fn add_status_listener(&self, listener: impl Fn(ConnectionStatus) + Send + Sync + 'static) {
        self.inner.status_listeners.write().push(Box::new(listener))
    }

    /// The condition that accompanied the last failure status, e.g. `no-auth-mech` or `conflict`.
    pub fn last_condition(&self) -> Option<String> {
        self.inner.last_condition.read().clone()
    }

    pub fn stanza_in(&self) -> broadcast::Receiver<Element> {
        self.inner.stanza_in.subscribe()
    }

    pub fn stanza_out(&self) -> broadcast::Receiver<Element> {
        self.inner.stanza_out.subscribe()
    }

    /// The JID the session is bound to.
    pub fn jid(&self) -> Option<FullJid> {
        self.inner.jid.read().clone()
    }

    pub fn bare_jid(&self) -> Option<BareJid> {
        self.jid().map(|jid| jid.to_bare())
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.authenticated.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    pub fn generate_id(&self) -> String {
        self.inner.id_provider.new_id()
    }
}

impl Connection {
    fn set_credentials(&self, jid: &Jid, password: impl AsRef<str>) {
        *self.inner.credentials.write() = Some(Credentials {
            jid: jid.clone(),
            password: SecretString::new(password.as_ref().to_string()),
        });
    }

    async fn start(&self, start: Start) -> Result<(), ConnectionError> {
        self.stop();
        self.inner.last_error.lock().take();

        let mut statuses = self.inner.status.subscribe();
        let transport = (self.inner.transport_provider)();
        let generation = self.spawn_driver(transport, start)?;
        self.wait_for_outcome(&mut statuses, generation).await
    }

    fn spawn_driver(
        &self,
        transport: Box<dyn Transport>,
        start: Start,
    ) -> Result<u64, ConnectionError> {
        let (jid, password) = self
            .inner
            .credentials
            .read()
            .as_ref()
            .map(|c| (c.jid.clone(), c.password.clone()))
            .ok_or(ConnectionError::Failed {
                condition: "no-credentials".to_string(),
            })?;

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        if matches!(start, Start::Connect { .. }) {
            self.inner
                .set_status(generation, ConnectionStatus::Connecting, None);
        }

        let driver = Driver::new(self.inner.clone(), generation, jid, password);
        let task = tokio::spawn(driver.run(transport, commands_rx, start));

        *self.inner.driver.lock() = Some(DriverHandle {
            generation,
            commands: commands_tx,
            task: task.abort_handle(),
        });

        Ok(generation)
    }

    /// Aborts the driver task. The transport is dropped with it.
    fn stop(&self) {
        if let Some(driver) = self.inner.driver.lock().take() {
            driver.task.abort();
        }
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.authenticated.store(false, Ordering::SeqCst);
    }

    fn reset_handlers(&self) {
        self.inner.handlers.reset();
    }

    fn command(&self, command: Command) -> Result<u64, Command> {
        let driver = self.inner.driver.lock();
        let Some(driver) = driver.as_ref() else {
            return Err(command);
        };
        driver
            .commands
            .send(command)
            .map(|_| driver.generation)
            .map_err(|err| err.0)
    }

    async fn wait_for_outcome(
        &self,
        statuses: &mut ReplayStream<ConnectionStatus>,
        generation: u64,
    ) -> Result<(), ConnectionError> {
        // The first value is the replayed status from before the attempt.
        _ = statuses.recv().await;

        loop {
            let Some(status) = statuses.recv().await else {
                return Err(ConnectionError::Failed {
                    condition: "disconnected".to_string(),
                });
            };

            if self.inner.generation.load(Ordering::SeqCst) != generation {
                return Err(ConnectionError::Failed {
                    condition: "superseded".to_string(),
                });
            }

            if !status.is_terminal() {
                continue;
            }

            let condition = self
                .last_condition()
                .unwrap_or_else(|| status.as_ref().to_string());
            let error = self.inner.last_error.lock().take();

            return match status {
                ConnectionStatus::Connected
                | ConnectionStatus::Attached
                | ConnectionStatus::BindRequired => Ok(()),
                ConnectionStatus::Authfail => Err(error.unwrap_or(ConnectionError::Auth { condition })),
                ConnectionStatus::ConnTimeout => Err(error.unwrap_or(ConnectionError::TimedOut)),
                ConnectionStatus::AttachFail => Err(ConnectionError::NoRestorableSession),
                ConnectionStatus::RegiFail
                | ConnectionStatus::Conflict
                | ConnectionStatus::NotAcceptable => {
                    Err(error.unwrap_or(ConnectionError::Registration { condition }))
                }
                _ => Err(error.unwrap_or(ConnectionError::Failed { condition })),
            };
        }
    }
}

impl ConnectionInner {
    /// Publishes `status` unless the driver that reports it has been superseded.
    pub(super) fn set_status(
        &self,
        generation: u64,
        status: ConnectionStatus,
        condition: Option<String>,
    ) {
        if self.generation.load(Ordering::SeqCst) != generation {
            return;
        }

        if let Some(condition) = condition {
            *self.last_condition.write() = Some(condition);
        } else if status == ConnectionStatus::Connecting {
            *self.last_condition.write() = None;
        }

        if !self.status.next(status) {
            return;
        }

        match self.last_condition.read().as_deref() {
            Some(condition) if !status.is_connected() => {
                info!("Connection status changed to {} ({})", status, condition)
            }
            _ => info!("Connection status changed to {}", status),
        }

        for listener in self.status_listeners.read().iter() {
            listener(status)
        }
    }

    /// Called by the driver when it exits on its own.
    pub(super) fn driver_finished(&self, generation: u64) {
        let mut driver = self.driver.lock();
        if driver.as_ref().map(|d| d.generation) == Some(generation) {
            driver.take();
        }
    }
}

/// Who may answer an IQ. Responses to requests without `to` may come from the server or our own
/// account.
struct ExpectedSender {
    to: Option<String>,
    own_jid: Option<FullJid>,
}

impl ExpectedSender {
    fn new(to: Option<&str>, own_jid: Option<FullJid>) -> Self {
        ExpectedSender {
            to: to.map(ToString::to_string),
            own_jid,
        }
    }

    fn accepts(&self, from: Option<&str>) -> bool {
        let own_full = self.own_jid.as_ref().map(|jid| jid.to_string());
        let own_bare = self.own_jid.as_ref().map(|jid| jid.to_bare().to_string());
        let own_domain = self.own_jid.as_ref().map(|jid| jid.domain().to_string());

        let is_own_account = |jid: Option<&str>| {
            jid.is_none() || jid == own_bare.as_deref() || jid == own_full.as_deref()
        };

        match self.to.as_deref() {
            Some(to) if Some(to) == own_bare.as_deref() => is_own_account(from),
            Some(to) => from == Some(to),
            None => is_own_account(from) || from == own_domain.as_deref(),
        }
    }
}

fn stanza_error(stanza: &Element) -> RequestError {
    match StanzaError::from_stanza(stanza) {
        Some(err) => RequestError::XMPP { err },
        None => RequestError::UnexpectedResponse,
    }
}
