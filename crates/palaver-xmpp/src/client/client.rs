// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Weak};

use anyhow::Result;
use jid::{BareJid, FullJid, Jid};
use minidom::Element;
use tracing::error;

use crate::client::builder::ClientBuilder;
use crate::client::module_context::{lookup, ModuleContextInner};
use crate::client::{Event, ModuleLookup};
use crate::connection::{Connection, ConnectionError, ConnectionStatus};
use crate::models::{Contacts, Conversations, MessageStore, Rooms};
use crate::mods::AnyModule;
use crate::util::ReplayStream;
use crate::Event as ClientEvent;

#[derive(Clone)]
pub struct Client {
    pub(super) inner: Arc<ClientInner>,
}

impl Debug for Client {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").finish()
    }
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub(super) fn new(inner: ClientInner) -> Self {
        let client = Client {
            inner: Arc::new(inner),
        };
        client.observe_connection();
        client
    }

    pub async fn connect(&self, jid: &Jid, password: impl AsRef<str>) -> Result<(), ConnectionError> {
        self.inner.prepare_session();
        self.connection().connect(jid, password).await?;
        self.inner.session_started().await;
        Ok(())
    }

    /// Creates the account `jid` on the server, then logs in with it.
    pub async fn register(
        &self,
        jid: &Jid,
        password: impl AsRef<str>,
    ) -> Result<(), ConnectionError> {
        self.inner.prepare_session();
        self.connection().register(jid, password).await?;
        self.inner.session_started().await;
        Ok(())
    }

    /// Reattaches to a persisted BOSH session.
    pub async fn restore(&self, jid: &Jid) -> Result<(), ConnectionError> {
        self.inner.prepare_session();
        self.connection().restore(jid).await?;
        self.inner.session_started().await;
        Ok(())
    }

    pub async fn reconnect(&self) -> Result<(), ConnectionError> {
        self.inner.prepare_session();
        self.connection().reconnect().await?;
        self.inner.session_started().await;
        Ok(())
    }

    /// Continues a connection that stopped at `BindRequired`.
    pub async fn bind(&self) -> Result<(), ConnectionError> {
        self.connection().bind().await?;
        self.inner.session_started().await;
        Ok(())
    }

    pub fn disconnect(&self) {
        self.connection().disconnect()
    }

    /// Tears the session down immediately and forgets a persisted one.
    pub fn disconnect_finally(&self) {
        self.connection().disconnect_finally()
    }

    pub fn connected_jid(&self) -> Option<FullJid> {
        self.connection().jid()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.connection().status()
    }

    pub fn status_stream(&self) -> ReplayStream<ConnectionStatus> {
        self.connection().status_stream()
    }

    pub fn contacts(&self) -> Contacts {
        self.inner.context.store.contacts()
    }

    pub fn contacts_stream(&self) -> ReplayStream<Contacts> {
        self.inner.context.store.contacts_stream()
    }

    /// Conversations with JIDs that are not on the roster.
    pub fn conversations(&self) -> Conversations {
        self.inner.context.store.conversations()
    }

    pub fn conversations_stream(&self) -> ReplayStream<Conversations> {
        self.inner.context.store.conversations_stream()
    }

    /// Messages exchanged with `jid`, whether it is a contact or not.
    pub fn messages_with(&self, jid: &BareJid) -> Option<MessageStore> {
        self.inner.context.store.messages_with(jid)
    }

    pub fn rooms(&self) -> Rooms {
        self.inner.context.store.rooms()
    }

    pub fn rooms_stream(&self) -> ReplayStream<Rooms> {
        self.inner.context.store.rooms_stream()
    }

    pub fn connection(&self) -> &Connection {
        &self.inner.context.connection
    }

    pub fn get_mod<M: AnyModule + Clone>(&self) -> M {
        self.inner.get_mod()
    }

    pub fn send_raw_stanza(&self, stanza: impl Into<Element>) -> Result<()> {
        self.connection().send(stanza)?;
        Ok(())
    }
}

impl Client {
    fn observe_connection(&self) {
        let context = Arc::downgrade(&self.inner.context);

        self.connection().add_status_listener(move |status| {
            if status != ConnectionStatus::Disconnected {
                return;
            }
            let Some(context) = Weak::upgrade(&context) else {
                return;
            };
            ClientInner::session_ended(context);
        });
    }
}

pub(super) struct ClientInner {
    pub context: Arc<ModuleContextInner>,
    pub mods: Arc<ModuleLookup>,
}

impl ClientInner {
    pub(super) fn new(context: Arc<ModuleContextInner>, mods: Arc<ModuleLookup>) -> Self {
        ClientInner { context, mods }
    }

    /// Drops the previous session and installs the stanza handlers of all modules. Handlers must
    /// be in place before the connection is authenticated so that no stanza is missed.
    fn prepare_session(&self) {
        self.context.connection.reset();

        for m in self.mods.values() {
            m.add_handlers();
        }
    }

    async fn session_started(&self) {
        if !self.context.connection.status().is_connected() {
            return;
        }

        for m in self.mods.values() {
            if let Err(err) = m.handle_connect().await {
                error!("Encountered error in module. {:?}", err);
            }
        }

        self.context
            .clone()
            .schedule_event(ClientEvent::Client(Event::Connected));
    }

    fn session_ended(context: Arc<ModuleContextInner>) {
        if let Some(mods) = context.mods() {
            for m in mods.values() {
                m.handle_disconnect();
            }
        }
        context.store.clear();

        let condition = context.connection.last_condition();
        context.schedule_event(ClientEvent::Client(Event::Disconnected { condition }));
    }

    fn get_mod<M: AnyModule + Clone>(&self) -> M {
        match lookup::<M>(&self.mods) {
            Some(m) => m.clone(),
            None => panic!("Could not find requested module."),
        }
    }
}

impl TryFrom<Arc<ModuleContextInner>> for Client {
    type Error = anyhow::Error;

    fn try_from(value: Arc<ModuleContextInner>) -> std::result::Result<Self, Self::Error> {
        let mods = value.mods().ok_or(anyhow::format_err!(
            "Used module after client was released."
        ))?;

        Ok(Client {
            inner: Arc::new(ClientInner {
                context: value,
                mods,
            }),
        })
    }
}
