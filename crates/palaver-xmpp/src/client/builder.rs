// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::any::TypeId;
use std::future::Future;
use std::sync::{Arc, OnceLock};

use crate::client::client::ClientInner;
use crate::client::module_context::ModuleContextInner;
use crate::client::{EventHandler, ModuleContext, ModuleLookup};
use crate::connection::{Connection, ConnectionConfig};
use crate::deps::{
    IDProvider, KeyValueStore, MemoryKeyValueStore, SystemTimeProvider, TimeProvider,
    UUIDProvider,
};
use crate::mods::AnyModule;
use crate::sasl::SaslEngine;
use crate::transport::TransportProvider;
use crate::util::PinnedFuture;
use crate::{mods, Client, Event};

pub struct ClientBuilder {
    config: ConnectionConfig,
    transport_provider: Option<TransportProvider>,
    mods: ModuleLookup,
    id_provider: Arc<dyn IDProvider>,
    time_provider: Arc<dyn TimeProvider>,
    key_value_store: Arc<dyn KeyValueStore>,
    sasl: SaslEngine,
    event_handler: EventHandler,
}

impl ClientBuilder {
    pub(super) fn new() -> Self {
        ClientBuilder {
            config: Default::default(),
            transport_provider: None,
            mods: Default::default(),
            id_provider: Arc::new(UUIDProvider::new()),
            time_provider: Arc::new(SystemTimeProvider::default()),
            key_value_store: Arc::new(MemoryKeyValueStore::default()),
            sasl: SaslEngine::default(),
            event_handler: Box::new(|_, _| Box::pin(async {}) as PinnedFuture<_>),
        }
    }

    pub fn set_config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Overrides the transport that `config` would select.
    pub fn set_transport_provider(mut self, transport_provider: TransportProvider) -> Self {
        self.transport_provider = Some(transport_provider);
        self
    }

    pub fn set_event_handler<T>(
        mut self,
        handler: impl Fn(Client, Event) -> T + Send + Sync + 'static,
    ) -> Self
    where
        T: Future<Output = ()> + Send + 'static,
    {
        self.event_handler = Box::new(move |client, event| {
            let fut = handler(client, event);
            Box::pin(async move { fut.await }) as PinnedFuture<_>
        });
        self
    }

    pub fn add_mod<M: AnyModule + Clone + 'static>(mut self, m: M) -> Self {
        self.mods.insert(TypeId::of::<M>(), Box::new(m));
        self
    }

    pub fn set_id_provider<P: IDProvider + 'static>(mut self, id_provider: P) -> Self {
        self.id_provider = Arc::new(id_provider);
        self
    }

    pub fn set_time_provider<T: TimeProvider + 'static>(mut self, time_provider: T) -> Self {
        self.time_provider = Arc::new(time_provider);
        self
    }

    /// Where BOSH sessions are persisted when `keepalive` is enabled.
    pub fn set_key_value_store<S: KeyValueStore + 'static>(mut self, store: S) -> Self {
        self.key_value_store = Arc::new(store);
        self
    }

    pub fn set_sasl_engine(mut self, sasl: SaslEngine) -> Self {
        self.sasl = sasl;
        self
    }

    pub fn build(self) -> Client {
        let mut mods = self.mods;
        mods.entry(TypeId::of::<mods::Ping>())
            .or_insert_with(|| Box::new(mods::Ping::default()));
        mods.entry(TypeId::of::<mods::Disco>())
            .or_insert_with(|| Box::new(mods::Disco::default()));

        let transport_provider = self
            .transport_provider
            .unwrap_or_else(|| self.config.transport_provider(self.key_value_store.clone()));

        let connection = Connection::new(
            self.config,
            transport_provider,
            self.id_provider,
            self.sasl,
        );

        let context_inner = Arc::new(ModuleContextInner {
            connection,
            mods: OnceLock::new(),
            time_provider: self.time_provider,
            event_handler: self.event_handler,
            store: Default::default(),
        });

        for m in mods.values_mut() {
            m.register_with(ModuleContext {
                inner: context_inner.clone(),
            });
        }

        let mods = Arc::new(mods);
        _ = context_inner.mods.set(Arc::downgrade(&mods));

        Client::new(ClientInner::new(context_inner, mods))
    }
}
