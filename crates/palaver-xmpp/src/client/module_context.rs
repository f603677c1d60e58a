// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::any::TypeId;
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use jid::{BareJid, FullJid, Jid};
use minidom::Element;
use tracing::error;

use crate::client::{EventHandler, ModuleLookup};
use crate::connection::{Connection, ConnectionConfig};
use crate::deps::{SystemTimeProvider, TimeProvider};
use crate::handler::{HandlerRef, HandlerScope, Matcher};
use crate::models::SessionStore;
use crate::mods::AnyModule;
use crate::transport::{Transport, WebSocketTransport};
use crate::util::{PinnedFuture, RequestError};
use crate::{Client, Event};

/// The view of the client a module works with.
#[derive(Clone)]
pub struct ModuleContext {
    pub(super) inner: Arc<ModuleContextInner>,
}

pub(super) struct ModuleContextInner {
    pub connection: Connection,
    /// Set once the modules are registered.
    pub mods: OnceLock<Weak<ModuleLookup>>,
    pub time_provider: Arc<dyn TimeProvider>,
    pub event_handler: EventHandler,
    pub store: SessionStore,
}

impl ModuleContext {
    pub(crate) async fn send_iq(
        &self,
        iq: impl Into<Element>,
    ) -> Result<Option<Element>, RequestError> {
        self.inner.connection.send_iq(iq.into()).await
    }

    /// Like `send_iq` but fails with `UnexpectedResponse` if the result carries no payload.
    pub(crate) async fn send_iq_expecting_payload(
        &self,
        iq: impl Into<Element>,
    ) -> Result<Element, RequestError> {
        self.send_iq(iq)
            .await?
            .ok_or(RequestError::UnexpectedResponse)
    }

    pub(crate) async fn send_presence_awaiting(
        &self,
        presence: impl Into<Element>,
    ) -> Result<Element, RequestError> {
        self.inner
            .connection
            .send_presence_awaiting(presence.into())
            .await
    }

    pub(crate) fn send_stanza(&self, stanza: impl Into<Element>) -> Result<()> {
        self.inner.connection.send(stanza)?;
        Ok(())
    }

    pub(crate) fn jid(&self) -> Option<FullJid> {
        self.inner.connection.jid()
    }

    pub(crate) fn bare_jid(&self) -> Result<BareJid, RequestError> {
        self.inner
            .connection
            .bare_jid()
            .ok_or(RequestError::Disconnected)
    }

    /// Whether `stanza` was sent by our server on behalf of our account, i.e. it has no `from` or
    /// one whose bare JID is ours.
    pub(crate) fn is_from_own_account(&self, stanza: &Element) -> bool {
        let Some(from) = stanza.attr("from") else {
            return true;
        };
        let Ok(own) = self.bare_jid() else {
            return false;
        };
        from.parse::<Jid>()
            .map(|from| from.to_bare() == own)
            .unwrap_or(false)
    }

    pub(crate) fn generate_id(&self) -> String {
        self.inner.connection.generate_id()
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.inner.time_provider.now()
    }

    pub(crate) fn store(&self) -> &SessionStore {
        &self.inner.store
    }

    pub(crate) fn config(&self) -> &ConnectionConfig {
        self.inner.connection.config()
    }

    pub(crate) fn disconnect(&self) {
        self.inner.connection.disconnect()
    }

    /// Returns the module of type `M` if the client was built with it.
    pub(crate) fn get_mod<M: AnyModule + Clone>(&self) -> Option<M> {
        let mods = self.inner.mods()?;
        lookup::<M>(&mods).cloned()
    }

    /// Routes stanzas matching `matcher` to module `M` once the connection is authenticated.
    /// The handler stays registered when it fails. Errors are logged.
    pub(crate) fn add_handler<M, F>(&self, matcher: Matcher, handler: F) -> HandlerRef
    where
        M: AnyModule + Clone,
        F: Fn(&M, &Element) -> Result<()> + Send + Sync + 'static,
    {
        let mods = self.inner.weak_mods();

        self.inner
            .connection
            .handlers()
            .add_handler(matcher, HandlerScope::User, move |elem| {
                let Some(mods) = mods.upgrade() else {
                    return Ok(false);
                };
                let Some(module) = lookup::<M>(&mods) else {
                    return Ok(false);
                };
                if let Err(err) = handler(module, elem) {
                    error!("Failed to handle stanza. {:?}", err);
                }
                Ok(true)
            })
    }

    pub(crate) fn add_timed_handler<M, F>(&self, period: Duration, handler: F) -> HandlerRef
    where
        M: AnyModule + Clone,
        F: Fn(&M) -> bool + Send + Sync + 'static,
    {
        let mods = self.inner.weak_mods();

        self.inner.connection.handlers().add_timed_handler(
            period,
            HandlerScope::User,
            tokio::time::Instant::now().into_std(),
            move || {
                let Some(mods) = mods.upgrade() else {
                    return false;
                };
                lookup::<M>(&mods)
                    .map(|module| handler(module))
                    .unwrap_or(false)
            },
        )
    }

    /// Registers a handler that isn't bound to a module, e.g. to collect the results of a query.
    pub(crate) fn add_collector<F>(&self, matcher: Matcher, handler: F) -> HandlerRef
    where
        F: Fn(&Element) -> Result<bool> + Send + Sync + 'static,
    {
        self.inner
            .connection
            .handlers()
            .add_handler(matcher, HandlerScope::User, handler)
    }

    pub(crate) fn remove_handler(&self, handler: &HandlerRef) {
        self.inner.connection.handlers().remove_handler(handler)
    }

    /// Hands `event` to the client's event handler.
    pub(crate) fn schedule_event(&self, event: Event) {
        self.inner.clone().schedule_event(event)
    }
}

impl ModuleContextInner {
    pub(super) fn mods(&self) -> Option<Arc<ModuleLookup>> {
        self.mods.get().and_then(Weak::upgrade)
    }

    fn weak_mods(&self) -> Weak<ModuleLookup> {
        self.mods.get().cloned().unwrap_or_default()
    }

    pub(super) fn schedule_event(self: Arc<Self>, event: Event) {
        let Ok(client) = Client::try_from(self.clone()) else {
            return;
        };
        let fut = (self.event_handler)(client, event);

        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(fut);
        }
    }
}

pub(super) fn lookup<M: AnyModule>(mods: &ModuleLookup) -> Option<&M> {
    mods.get(&TypeId::of::<M>())
        .and_then(|module| module.as_any().downcast_ref::<M>())
}

impl Default for ModuleContext {
    fn default() -> Self {
        let config = ConnectionConfig::default();
        let service = config.service.clone();

        ModuleContext {
            inner: Arc::new(ModuleContextInner {
                connection: Connection::with_transport_provider(
                    config,
                    Box::new(move || -> Box<dyn Transport> {
                        Box::new(WebSocketTransport::new(service.clone()))
                    }),
                ),
                mods: OnceLock::new(),
                time_provider: Arc::new(SystemTimeProvider::default()),
                event_handler: Box::new(|_, _| Box::pin(async {}) as PinnedFuture<_>),
                store: Default::default(),
            }),
        }
    }
}
