// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use jid::{FullJid, Jid};
use minidom::Element;
use parking_lot::RwLock;

use crate::test::{ConstantTimeProvider, IncrementingIDProvider, MockServer, BOUND_JID};
use crate::{mods, Client, Event, IDProvider, TimeProvider};

#[async_trait]
pub trait ClientTestAdditions {
    /// A client with all modules installed that is connected to a [`MockServer`] as
    /// `test@prose.org/test`.
    async fn connected_client() -> Result<ConnectedClient>;
}

pub struct ConnectedClient {
    pub client: Client,
    pub server: MockServer,
    pub id_provider: Arc<IncrementingIDProvider>,
    pub time_provider: Arc<ConstantTimeProvider>,
    pub sent_events: Arc<RwLock<Vec<Event>>>,
}

#[async_trait]
impl ClientTestAdditions for Client {
    async fn connected_client() -> Result<ConnectedClient> {
        let server = MockServer::default();
        let id_provider = Arc::new(IncrementingIDProvider::new("id"));
        let time_provider = Arc::new(ConstantTimeProvider::ymd(2024, 1, 1));
        let sent_events = Arc::new(RwLock::new(vec![]));

        let handler_events = sent_events.clone();
        let client = Client::builder()
            .set_transport_provider(server.provider())
            .set_id_provider(id_provider.clone() as Arc<dyn IDProvider>)
            .set_time_provider(time_provider.clone() as Arc<dyn TimeProvider>)
            .set_event_handler(move |_, event| {
                handler_events.write().push(event);
                async {}
            })
            .add_mod(mods::BlockList::default())
            .add_mod(mods::Bookmark::default())
            .add_mod(mods::Bookmark2::default())
            .add_mod(mods::Chat::default())
            .add_mod(mods::EntityTime::default())
            .add_mod(mods::HttpUpload::default())
            .add_mod(mods::MAM::default())
            .add_mod(mods::MUC::default())
            .add_mod(mods::PubSub::default())
            .add_mod(mods::Push::default())
            .add_mod(mods::Roster::default())
            .build();

        let jid: FullJid = BOUND_JID.parse()?;
        client.connect(&Jid::from(jid), "").await?;
        server.flush().await;

        id_provider.reset();
        server.reset();
        sent_events.write().clear();

        Ok(ConnectedClient {
            client,
            server,
            id_provider,
            time_provider,
            sent_events,
        })
    }
}

impl ConnectedClient {
    pub fn sent_events(&self) -> Vec<Event> {
        self.sent_events.read().clone()
    }

    pub fn sent_stanzas(&self) -> Vec<Element> {
        self.server.sent_stanzas()
    }

    pub async fn receive_stanza(&self, stanza: impl Into<Element>) {
        self.server.receive_stanza(stanza).await
    }

    pub fn get_mod<M: mods::AnyModule + Clone>(&self) -> M {
        self.client.get_mod::<M>()
    }
}
